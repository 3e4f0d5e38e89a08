//! Entry points for the mutating and validating admission calls.

use kube::ResourceExt;
use std::sync::Arc;
use tracing::{info, instrument};
use workspace_store::ObjectStore;

use crate::access::{AccessPolicy, AdminPolicy, PodExecPolicy};
use crate::config::AdmissionConfig;
use crate::crd::{Workspace, WorkspaceTemplate, is_terminating};
use crate::defaulting::WorkspaceDefaulter;
use crate::errors::{AdmissionResult, Warnings};
use crate::finalizer::FinalizerGuard;
use crate::identity::RequestContext;
use crate::resolver::TemplateResolver;
use crate::validation::{TemplatePolicy, TemplateValidator};

pub struct WorkspaceAdmission<S> {
    defaulter: WorkspaceDefaulter<S>,
    validator: TemplateValidator<S>,
    access: AccessPolicy<S>,
    pod_exec: PodExecPolicy<S>,
}

impl<S: ObjectStore> WorkspaceAdmission<S> {
    pub fn new(store: Arc<S>, config: &AdmissionConfig) -> Self {
        let guard = FinalizerGuard::new(store.clone(), config.finalizer_max_retries);
        Self::with_guard(store, config, guard)
    }

    pub fn with_guard(store: Arc<S>, config: &AdmissionConfig, guard: FinalizerGuard<S>) -> Self {
        let resolver =
            TemplateResolver::new(store.clone(), config.default_template_namespace.clone());
        Self {
            defaulter: WorkspaceDefaulter::new(store.clone(), resolver.clone(), guard),
            validator: TemplateValidator::new(store.clone(), resolver),
            access: AccessPolicy::new(store.clone(), AdminPolicy::from_config(config)),
            pod_exec: PodExecPolicy::new(store, config.controller_username()),
        }
    }

    /// Mutating call: the defaulted copy of `ws`.
    pub async fn default(&self, ctx: &RequestContext, ws: &Workspace) -> AdmissionResult<Workspace> {
        self.defaulter.default(ctx, ws).await
    }

    #[instrument(skip_all, fields(ns = %ws.namespace().unwrap_or_default(), name = %ws.name_any()))]
    pub async fn validate_create(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<Warnings> {
        let warnings = self.validator.validate_create(ctx, ws).await?;
        self.access.authorize_create(ctx, ws).await?;
        info!("workspace create admitted");
        Ok(warnings)
    }

    #[instrument(skip_all, fields(ns = %new.namespace().unwrap_or_default(), name = %new.name_any()))]
    pub async fn validate_update(
        &self,
        ctx: &RequestContext,
        old: &Workspace,
        new: &Workspace,
    ) -> AdmissionResult<Warnings> {
        if is_terminating(new) {
            return Ok(vec![]);
        }
        self.access.authorize_update(ctx, old, new).await?;
        let warnings = self.validator.validate_update(ctx, old, new).await?;
        info!("workspace update admitted");
        Ok(warnings)
    }

    #[instrument(skip_all, fields(ns = %ws.namespace().unwrap_or_default(), name = %ws.name_any()))]
    pub async fn validate_delete(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<Warnings> {
        self.access.authorize_delete(ctx, ws)?;
        Ok(vec![])
    }

    /// `pods/exec` gate: the controller may only exec into workspace pods.
    #[instrument(skip_all, fields(ns = %namespace, pod = %pod_name))]
    pub async fn validate_pod_exec(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        pod_name: &str,
    ) -> AdmissionResult<()> {
        self.pod_exec.check(ctx, namespace, pod_name).await
    }

    /// Template updates are always admitted; constraint changes only warn.
    pub fn validate_template_update(
        &self,
        old: &WorkspaceTemplate,
        new: &WorkspaceTemplate,
    ) -> Warnings {
        TemplatePolicy::validate_update(old, new)
    }
}
