use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{error, info};
use workspace_store::ObjectStore;

use crate::crd::keys;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::RequestContext;

/// Restricts the controller's own service account to exec into workspace
/// pods. Every other caller is left to cluster RBAC.
pub struct PodExecPolicy<S> {
    store: Arc<S>,
    controller_username: Option<String>,
}

impl<S: ObjectStore> PodExecPolicy<S> {
    pub fn new(store: Arc<S>, controller_username: Option<String>) -> Self {
        Self {
            store,
            controller_username: controller_username.filter(|u| !u.is_empty()),
        }
    }

    pub async fn check(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        pod_name: &str,
    ) -> AdmissionResult<()> {
        let identity = ctx.identity()?;
        let Some(controller) = self.controller_username.as_deref() else {
            error!("controller service account identity is not configured");
            return Err(AdmissionError::Configuration(
                "CONTROLLER_POD_NAMESPACE and CONTROLLER_POD_SERVICE_ACCOUNT must be set".into(),
            ));
        };
        if identity.username != controller {
            return Ok(());
        }

        let pod: Pod = ctx
            .run(self.store.get::<Pod>(namespace, pod_name))
            .await
            .map_err(|e| match e {
                AdmissionError::NotFound(_) => {
                    AdmissionError::NotFound(format!("Pod {}/{}", namespace, pod_name))
                }
                other => other,
            })?;

        match pod.labels().get(keys::LABEL_WORKSPACE_NAME) {
            Some(workspace) => {
                info!(%namespace, pod = %pod_name, %workspace, "controller exec into workspace pod allowed");
                Ok(())
            }
            None => {
                info!(%namespace, pod = %pod_name, "controller exec into non-workspace pod denied");
                Err(AdmissionError::AccessDenied(
                    "controller service account can only exec into workspace pods".into(),
                ))
            }
        }
    }
}
