use std::net::SocketAddr;

use kube::Client;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::{config::AdmissionConfig, controller::run_controllers, web::run_http_server};

/// Compute the HTTP bind address based on config.
pub fn compute_http_addr(cfg: &AdmissionConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.http_port).into()
}

pub fn spawn_controllers(
    client: Client,
    cfg: AdmissionConfig,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_controllers(client, cfg).await })
}

pub fn spawn_http(addr: SocketAddr) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_http_server(addr).await })
}

/// Start the controllers and the health server and wait until either
/// finishes.
pub async fn run_all(client: Client, cfg: AdmissionConfig) -> anyhow::Result<()> {
    let http_addr = compute_http_addr(&cfg);

    let controllers = spawn_controllers(client, cfg);
    let http = spawn_http(http_addr);

    tokio::select! {
        res = controllers => {
            warn!("controllers stopped");
            res?
        }
        res = http => {
            warn!("http server stopped");
            res?
        }
    }
}
