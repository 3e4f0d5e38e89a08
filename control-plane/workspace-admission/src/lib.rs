pub mod access;
pub mod admission;
pub mod config;
pub mod controller;
pub mod crd;
pub mod defaulting;
pub mod diff;
pub mod errors;
pub mod finalizer;
pub mod identity;
pub mod quantity;
pub mod resolver;
pub mod runtime;
pub mod validation;
pub mod web;

pub use admission::WorkspaceAdmission;
pub use errors::{AdmissionError, AdmissionResult, Violation, ViolationKind, Warnings};
pub use identity::{AdmissionIdentity, Operation, RequestContext};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing(default_env: &str) {
    let mut filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy();
    if let Ok(directive) = default_env.parse().or_else(|_| "info".parse()) {
        filter = filter.add_directive(directive);
    }

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
