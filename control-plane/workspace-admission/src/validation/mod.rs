//! Validating path for workspaces: template constraints and volume
//! ownership, re-evaluated differentially on update.

mod rules;
mod template_policy;
mod volume;

pub use rules::{
    Rule, check_idle_shutdown, check_image, check_resources, check_secondary_storage,
    check_storage,
};
pub use template_policy::{CONSTRAINTS_CHANGED_WARNING, TemplatePolicy, constraints_changed};
pub use volume::check_volume_ownership;

use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, instrument};
use workspace_store::ObjectStore;

use crate::crd::keys;
use crate::crd::{Workspace, WorkspaceTemplate};
use crate::diff::SpecDiff;
use crate::errors::{AdmissionError, AdmissionResult, Violation, Warnings};
use crate::identity::RequestContext;
use crate::resolver::TemplateResolver;

pub struct TemplateValidator<S> {
    store: Arc<S>,
    resolver: TemplateResolver<S>,
}

impl<S: ObjectStore> TemplateValidator<S> {
    pub fn new(store: Arc<S>, resolver: TemplateResolver<S>) -> Self {
        Self { store, resolver }
    }

    #[instrument(skip_all, fields(ns = %ws.namespace().unwrap_or_default(), name = %ws.name_any()))]
    pub async fn validate_create(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<Warnings> {
        if ws.template_ref().is_none() {
            if ws.spec.image.is_empty() {
                return Err(AdmissionError::Invalid(
                    "must specify either template or image".into(),
                ));
            }
            let violations = check_volume_ownership(self.store.as_ref(), ctx, ws).await?;
            return standalone_outcome(violations);
        }

        let template = self.template_for(ctx, ws).await?;
        let mut violations = check_rules(&Rule::ALL, ws, &template);
        violations.extend(check_volume_ownership(self.store.as_ref(), ctx, ws).await?);
        template_outcome(&template, violations)
    }

    #[instrument(skip_all, fields(ns = %new.namespace().unwrap_or_default(), name = %new.name_any()))]
    pub async fn validate_update(
        &self,
        ctx: &RequestContext,
        old: &Workspace,
        new: &Workspace,
    ) -> AdmissionResult<Warnings> {
        let diff = SpecDiff::between(&old.spec, &new.spec)?;
        if !diff.changed() {
            return Ok(vec![]);
        }
        if diff.only_lifecycle_state_changed()
            && new.spec.desired_status == keys::DESIRED_STATUS_STOPPED
        {
            debug!("stop request bypasses template validation");
            return Ok(vec![]);
        }

        let volume_violations = if diff.contains("volumes") {
            check_volume_ownership(self.store.as_ref(), ctx, new).await?
        } else {
            vec![]
        };

        let Some(new_ref) = new.template_ref() else {
            if old.template_ref().is_some() {
                debug!("template reference removed, workspace is now standalone");
            }
            return standalone_outcome(volume_violations);
        };

        let rebound = old.template_ref() != Some(new_ref);
        let rules: Vec<Rule> = if rebound {
            debug!(template = %new_ref.name, "template reference changed, validating in full");
            Rule::ALL.to_vec()
        } else {
            Rule::ALL
                .into_iter()
                .filter(|r| diff.contains(r.triggered_by()))
                .collect()
        };
        if rules.is_empty() && volume_violations.is_empty() {
            return Ok(vec![]);
        }

        let template = self.template_for(ctx, new).await?;
        let mut violations = check_rules(&rules, new, &template);
        violations.extend(volume_violations);
        template_outcome(&template, violations)
    }

    async fn template_for(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<WorkspaceTemplate> {
        let namespace = ws.namespace().unwrap_or_default();
        match ws.template_ref() {
            Some(template_ref) => self.resolver.resolve(ctx, template_ref, &namespace).await,
            None => Err(AdmissionError::Invalid(
                "workspace has no template reference".into(),
            )),
        }
    }
}

/// Run the given rule families and collect every violation.
pub fn check_rules(rules: &[Rule], ws: &Workspace, template: &WorkspaceTemplate) -> Vec<Violation> {
    rules
        .iter()
        .flat_map(|rule| rule.check(&ws.spec, template))
        .collect()
}

fn template_outcome(
    template: &WorkspaceTemplate,
    violations: Vec<Violation>,
) -> AdmissionResult<Warnings> {
    if violations.is_empty() {
        return Ok(vec![]);
    }
    Err(AdmissionError::PolicyViolation {
        context: format!(
            "workspace violates template '{}' constraints",
            template.name_any()
        ),
        violations,
    })
}

fn standalone_outcome(violations: Vec<Violation>) -> AdmissionResult<Warnings> {
    if violations.is_empty() {
        return Ok(vec![]);
    }
    Err(AdmissionError::PolicyViolation {
        context: "workspace violates volume ownership constraints".into(),
        violations,
    })
}
