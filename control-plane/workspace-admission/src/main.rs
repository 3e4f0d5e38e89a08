use envconfig::Envconfig;
use kube::Client;
use tracing::info;
use workspace_admission::{config::AdmissionConfig, init_tracing, runtime};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing("info");

    let cfg = AdmissionConfig::init_from_env()?.normalized();
    info!(?cfg, "Starting workspace admission controllers");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
