//! Mutating path for workspaces.

mod appliers;
mod cluster_template;
mod service_account;

pub use appliers::{APPLIERS, Applier, apply_all};
pub use cluster_template::apply_cluster_default_template;
pub use service_account::{apply_service_account_default, default_service_account};

use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use workspace_store::ObjectStore;

use crate::access::sanitize_username;
use crate::crd::keys;
use crate::crd::{
    OwnershipType, Workspace, WorkspaceAccessStrategy, WorkspaceTemplate, is_terminating,
};
use crate::errors::{AdmissionError, AdmissionResult};
use crate::finalizer::FinalizerGuard;
use crate::identity::{Operation, RequestContext};
use crate::resolver::TemplateResolver;

/// Runs the full defaulting cascade on a copy of the incoming workspace and
/// returns it only if every step succeeded.
pub struct WorkspaceDefaulter<S> {
    store: Arc<S>,
    resolver: TemplateResolver<S>,
    guard: FinalizerGuard<S>,
}

impl<S: ObjectStore> WorkspaceDefaulter<S> {
    pub fn new(
        store: Arc<S>,
        resolver: TemplateResolver<S>,
        guard: FinalizerGuard<S>,
    ) -> Self {
        Self {
            store,
            resolver,
            guard,
        }
    }

    #[instrument(skip_all, fields(ns = %ws.namespace().unwrap_or_default(), name = %ws.name_any()))]
    pub async fn default(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<Workspace> {
        if is_terminating(ws) {
            debug!("skipping defaulting for workspace being deleted");
            return Ok(ws.clone());
        }
        let mut out = ws.clone();
        let namespace = out.namespace().unwrap_or_default();

        stamp_identity(ctx, &mut out)?;
        apply_cluster_default_template(self.store.as_ref(), ctx, &mut out).await?;

        let template = match out.template_ref().cloned() {
            Some(template_ref) => {
                let template = self.resolver.resolve(ctx, &template_ref, &namespace).await?;
                apply_all(&mut out, &template);
                Some(template)
            }
            None => None,
        };

        apply_service_account_default(self.store.as_ref(), ctx, &mut out).await?;
        apply_sharing_defaults(&mut out);
        stamp_access_strategy_labels(&mut out);

        // every lookup that can reject the call happens before the first write
        let strategy = match out.access_strategy_ref() {
            Some(r) => {
                let strategy_ns = out.access_strategy_namespace();
                Some(
                    self.guard
                        .fetch::<WorkspaceAccessStrategy>(ctx, &strategy_ns, &r.name)
                        .await?,
                )
            }
            None => None,
        };
        let protect_template = match &template {
            Some(t) => self.template_in_use(ctx, t).await?,
            None => false,
        };
        if ctx.is_cancelled() {
            return Err(AdmissionError::Cancelled);
        }

        if let Some(template) = template.filter(|_| protect_template) {
            self.protect_template(ctx, template).await?;
        }
        if let Some(strategy) = strategy {
            self.guard.protect(ctx, strategy).await?;
        }

        Ok(out)
    }

    async fn template_in_use(
        &self,
        ctx: &RequestContext,
        template: &WorkspaceTemplate,
    ) -> AdmissionResult<bool> {
        let ns = template.namespace().unwrap_or_default();
        let name = template.name_any();
        let in_use = self
            .guard
            .first_active_reference::<WorkspaceTemplate>(ctx, &ns, &name)
            .await?
            .is_some();
        if !in_use {
            debug!(template = %name, template_ns = %ns, "no active workspaces use template yet");
        }
        Ok(in_use)
    }

    async fn protect_template(
        &self,
        ctx: &RequestContext,
        template: WorkspaceTemplate,
    ) -> AdmissionResult<()> {
        let ns = template.namespace().unwrap_or_default();
        let name = template.name_any();
        match self.guard.protect(ctx, template).await {
            Ok(_) => Ok(()),
            Err(AdmissionError::NotFound(_)) => {
                info!(template = %name, template_ns = %ns, "template vanished during finalizer check");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn stamp_identity(ctx: &RequestContext, ws: &mut Workspace) -> AdmissionResult<()> {
    let identity = ctx.identity()?;
    let user = sanitize_username(&identity.username);
    let annotations = ws.annotations_mut();
    if identity.operation == Operation::Create {
        annotations.insert(keys::ANNOTATION_CREATED_BY.to_string(), user.clone());
    }
    annotations.insert(keys::ANNOTATION_LAST_UPDATED_BY.to_string(), user);
    Ok(())
}

/// Empty ownership becomes `Public`; empty access type follows ownership.
pub fn apply_sharing_defaults(ws: &mut Workspace) {
    if ws.spec.ownership_type.is_empty() {
        ws.spec.ownership_type = OwnershipType::Public.to_string();
    }
    if ws.spec.access_type.is_empty() {
        ws.spec.access_type = ws.spec.ownership_type.clone();
    }
}

/// Keep the access-strategy labels in step with the spec so the guard's
/// label query finds the workspace.
fn stamp_access_strategy_labels(ws: &mut Workspace) {
    let target = ws
        .access_strategy_ref()
        .map(|r| (r.name.clone(), ws.access_strategy_namespace()));
    let labels = ws.labels_mut();
    match target {
        Some((name, ns)) => {
            labels.insert(keys::LABEL_ACCESS_STRATEGY_NAME.to_string(), name);
            labels.insert(keys::LABEL_ACCESS_STRATEGY_NAMESPACE.to_string(), ns);
        }
        None => {
            labels.remove(keys::LABEL_ACCESS_STRATEGY_NAME);
            labels.remove(keys::LABEL_ACCESS_STRATEGY_NAMESPACE);
        }
    }
}
