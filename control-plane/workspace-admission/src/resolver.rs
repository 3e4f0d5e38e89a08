use std::sync::Arc;
use tracing::debug;
use workspace_store::ObjectStore;

use crate::crd::WorkspaceTemplate;
use crate::crd::workspace::TemplateRef;
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::RequestContext;

/// Finds the template a workspace is bound to.
///
/// An explicit namespace on the reference is authoritative. Otherwise the
/// workspace namespace is tried first, then the configured default template
/// namespace.
pub struct TemplateResolver<S> {
    store: Arc<S>,
    default_namespace: Option<String>,
}

impl<S> Clone for TemplateResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            default_namespace: self.default_namespace.clone(),
        }
    }
}

impl<S: ObjectStore> TemplateResolver<S> {
    pub fn new(store: Arc<S>, default_namespace: Option<String>) -> Self {
        Self {
            store,
            default_namespace: default_namespace.filter(|ns| !ns.is_empty()),
        }
    }

    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        template_ref: &TemplateRef,
        workspace_namespace: &str,
    ) -> AdmissionResult<WorkspaceTemplate> {
        let name = template_ref.name.as_str();
        if name.is_empty() {
            return Err(AdmissionError::Invalid("template reference has no name".into()));
        }

        if !template_ref.namespace.is_empty() {
            return self.fetch(ctx, &template_ref.namespace, name).await;
        }

        let first = ctx
            .run(self.store.get::<WorkspaceTemplate>(workspace_namespace, name))
            .await;
        match first {
            Err(AdmissionError::NotFound(_)) => {}
            other => return other,
        }

        match self.default_namespace.as_deref() {
            Some(fallback) if fallback != workspace_namespace => {
                debug!(template = %name, %workspace_namespace, %fallback, "template not in workspace namespace, trying default");
                ctx.run(self.store.get::<WorkspaceTemplate>(fallback, name))
                    .await
                    .map_err(|e| match e {
                        AdmissionError::NotFound(_) => AdmissionError::NotFound(format!(
                            "WorkspaceTemplate {} in namespace {} or default namespace {}",
                            name, workspace_namespace, fallback
                        )),
                        other => other,
                    })
            }
            _ => Err(not_found(workspace_namespace, name)),
        }
    }

    async fn fetch(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> AdmissionResult<WorkspaceTemplate> {
        ctx.run(self.store.get::<WorkspaceTemplate>(namespace, name))
            .await
            .map_err(|e| match e {
                AdmissionError::NotFound(_) => not_found(namespace, name),
                other => other,
            })
    }
}

fn not_found(namespace: &str, name: &str) -> AdmissionError {
    AdmissionError::NotFound(format!("WorkspaceTemplate {}/{}", namespace, name))
}
