//! Controllers that keep template and access-strategy side state in step
//! with the workspaces that reference them.

mod access_strategy;
pub mod compliance;
mod template;

use std::sync::Arc;

use kube::Client;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use tokio::time::Duration;
use tracing::warn;
use workspace_store::kubernetes::KubeStore;

use crate::config::AdmissionConfig;
use crate::crd::Workspace;
use crate::errors::AdmissionError;
use crate::finalizer::{FinalizerGuard, ProtectedObject};

#[derive(thiserror::Error, Debug)]
pub enum ReconcileErr {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Clone)]
pub struct ControllerContext {
    pub client: Client,
    pub store: Arc<KubeStore>,
    pub guard: FinalizerGuard<KubeStore>,
    pub cfg: AdmissionConfig,
}

impl ControllerContext {
    pub fn new(client: Client, cfg: AdmissionConfig) -> Self {
        let store = Arc::new(KubeStore::new(client.clone()));
        let guard = FinalizerGuard::new(store.clone(), cfg.finalizer_max_retries);
        Self {
            client,
            store,
            guard,
            cfg,
        }
    }
}

/// Map a workspace to the protected object its labels point at.
fn referenced_object<K: ProtectedObject>(ws: &Workspace) -> Option<ObjectRef<K>> {
    let labels = ws.metadata.labels.as_ref()?;
    let name = labels.get(K::LABEL_NAME).filter(|n| !n.is_empty())?;
    let namespace = labels.get(K::LABEL_NAMESPACE).filter(|n| !n.is_empty())?;
    Some(ObjectRef::new(name).within(namespace))
}

fn error_policy<K>(_obj: Arc<K>, error: &ReconcileErr, _ctx: Arc<ControllerContext>) -> Action {
    match error {
        ReconcileErr::Admission(AdmissionError::StoreConflict(_)) => {
            Action::requeue(Duration::from_secs(5))
        }
        other => {
            warn!(error = %other, "reconcile failed");
            Action::requeue(Duration::from_secs(60))
        }
    }
}

/// Run both controllers until either stream ends.
pub async fn run_controllers(client: Client, cfg: AdmissionConfig) -> anyhow::Result<()> {
    let ctx = Arc::new(ControllerContext::new(client, cfg));
    tokio::select! {
        _ = template::run(ctx.clone()) => {}
        _ = access_strategy::run(ctx) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::keys;
    use crate::crd::{WorkspaceAccessStrategy, WorkspaceSpec, WorkspaceTemplate};
    use kube::ResourceExt;

    #[test]
    fn workspace_labels_map_to_referenced_objects() {
        let mut ws = Workspace::new("ws", WorkspaceSpec::default());
        assert!(referenced_object::<WorkspaceTemplate>(&ws).is_none());

        ws.labels_mut().insert(keys::LABEL_TEMPLATE.into(), "tpl".into());
        ws.labels_mut()
            .insert(keys::LABEL_TEMPLATE_NAMESPACE.into(), "shared".into());
        let r = referenced_object::<WorkspaceTemplate>(&ws).unwrap();
        assert_eq!(r.name, "tpl");
        assert_eq!(r.namespace.as_deref(), Some("shared"));
        assert!(referenced_object::<WorkspaceAccessStrategy>(&ws).is_none());
    }
}
