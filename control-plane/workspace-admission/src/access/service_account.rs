use k8s_openapi::api::core::v1::ServiceAccount;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, warn};
use workspace_store::ObjectStore;

use super::acl::AccessList;
use crate::crd::Workspace;
use crate::defaulting::default_service_account;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::{AdmissionIdentity, RequestContext};

/// Decides whether a user may run a workspace under its service account.
pub struct ServiceAccountPolicy<S> {
    store: Arc<S>,
}

impl<S> Clone for ServiceAccountPolicy<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: ObjectStore> ServiceAccountPolicy<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn check(
        &self,
        ctx: &RequestContext,
        identity: &AdmissionIdentity,
        ws: &Workspace,
    ) -> AdmissionResult<()> {
        let name = ws.spec.service_account_name.as_str();
        if name.is_empty() {
            return Ok(());
        }
        let namespace = ws.namespace().unwrap_or_default();

        let account: ServiceAccount = ctx
            .run(self.store.get::<ServiceAccount>(&namespace, name))
            .await
            .map_err(|e| match e {
                AdmissionError::NotFound(_) => {
                    AdmissionError::NotFound(format!("ServiceAccount {}/{}", namespace, name))
                }
                other => other,
            })?;

        match default_service_account(self.store.as_ref(), ctx, &namespace).await {
            Ok(default) if default == name => {
                debug!(%namespace, service_account = %name, "default service account is open to everyone");
                return Ok(());
            }
            Ok(_) => {}
            Err(AdmissionError::Cancelled) => return Err(AdmissionError::Cancelled),
            Err(e) => {
                warn!(%namespace, error = %e, "could not determine default service account");
            }
        }

        if AccessList::from_annotations(account.annotations()).has_access(identity) {
            return Ok(());
        }
        Err(AdmissionError::AccessDenied(format!(
            "user does not have access to service account {}",
            name
        )))
    }
}
