use kube::ResourceExt;
use tracing::info;
use workspace_store::{ListQuery, ObjectStore};

use crate::crd::keys;
use crate::crd::workspace::TemplateRef;
use crate::crd::{Workspace, WorkspaceTemplate};
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::RequestContext;

/// Bind a workspace without a template reference to the cluster default
/// template, if exactly one template is labelled as such.
pub async fn apply_cluster_default_template<S: ObjectStore>(
    store: &S,
    ctx: &RequestContext,
    ws: &mut Workspace,
) -> AdmissionResult<()> {
    if ws.template_ref().is_some() {
        return Ok(());
    }
    let query = ListQuery::new().label(keys::LABEL_DEFAULT_CLUSTER_TEMPLATE, "true");
    let templates: Vec<WorkspaceTemplate> = ctx.run(store.list(&query)).await?;
    match templates.as_slice() {
        [] => Ok(()),
        [only] => {
            info!(workspace = %ws.name_any(), template = %only.name_any(), "binding cluster default template");
            ws.spec.template_ref = Some(TemplateRef {
                name: only.name_any(),
                namespace: String::new(),
            });
            Ok(())
        }
        many => {
            let names: Vec<String> = many.iter().map(|t| t.name_any()).collect();
            Err(AdmissionError::Invalid(format!(
                "multiple templates found with default-cluster-template label: [{}], expected exactly one",
                names.join(", ")
            )))
        }
    }
}
