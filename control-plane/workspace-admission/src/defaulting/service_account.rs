use k8s_openapi::api::core::v1::ServiceAccount;
use kube::ResourceExt;
use workspace_store::{ListQuery, ObjectStore};

use crate::crd::Workspace;
use crate::crd::keys;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::RequestContext;

/// The namespace's designated default service account: the single one
/// labelled as default, or `default` when none is labelled.
pub async fn default_service_account<S: ObjectStore>(
    store: &S,
    ctx: &RequestContext,
    namespace: &str,
) -> AdmissionResult<String> {
    let query = ListQuery::new()
        .in_namespace(namespace)
        .label(keys::LABEL_DEFAULT_SERVICE_ACCOUNT, "true");
    let accounts: Vec<ServiceAccount> = ctx.run(store.list(&query)).await?;
    match accounts.as_slice() {
        [] => Ok(keys::DEFAULT_SERVICE_ACCOUNT.to_string()),
        [only] => Ok(only.name_any()),
        _ => Err(AdmissionError::Invalid(format!(
            "multiple service accounts found with default label in namespace {}",
            namespace
        ))),
    }
}

pub async fn apply_service_account_default<S: ObjectStore>(
    store: &S,
    ctx: &RequestContext,
    ws: &mut Workspace,
) -> AdmissionResult<()> {
    if !ws.spec.service_account_name.is_empty() {
        return Ok(());
    }
    let namespace = ws.namespace().unwrap_or_default();
    ws.spec.service_account_name =
        default_service_account(store, ctx, &namespace).await?;
    Ok(())
}
