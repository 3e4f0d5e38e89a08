//! Flag workspaces for re-validation after their template changes.

use kube::ResourceExt;
use tracing::{info, warn};
use workspace_store::{ListQuery, ObjectStore};

use crate::crd::keys;
use crate::crd::{Workspace, WorkspaceTemplate, is_terminating};
use crate::errors::{AdmissionError, AdmissionResult};
use crate::finalizer::ProtectedObject;
use crate::identity::RequestContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationDecision {
    /// Generation already handled.
    Skip,
    /// First observation of a new template; nothing to re-check.
    RecordOnly,
    MarkAndRecord,
}

pub fn generation_decision(generation: Option<i64>, observed: i64) -> GenerationDecision {
    let Some(generation) = generation else {
        return GenerationDecision::Skip;
    };
    if observed >= generation {
        GenerationDecision::Skip
    } else if generation == 1 && observed == 0 {
        GenerationDecision::RecordOnly
    } else {
        GenerationDecision::MarkAndRecord
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComplianceReport {
    pub marked: usize,
    pub failed: usize,
}

/// Label every active workspace bound to `template` with
/// `compliance-check-needed=true`. Individual write failures are counted and
/// skipped; cancellation aborts the pass.
pub async fn mark_for_compliance<S: ObjectStore>(
    store: &S,
    ctx: &RequestContext,
    template: &WorkspaceTemplate,
) -> AdmissionResult<ComplianceReport> {
    let namespace = template.namespace().unwrap_or_default();
    let name = template.name_any();
    let query = ListQuery::new()
        .label(keys::LABEL_TEMPLATE, &name)
        .label(keys::LABEL_TEMPLATE_NAMESPACE, &namespace);
    let workspaces: Vec<Workspace> = ctx.run(store.list(&query)).await?;

    let mut report = ComplianceReport::default();
    for mut ws in workspaces {
        if is_terminating(&ws) || !WorkspaceTemplate::referenced_by(&ws, &name, &namespace) {
            continue;
        }
        if ws
            .labels()
            .get(keys::LABEL_COMPLIANCE_CHECK_NEEDED)
            .is_some_and(|v| v == "true")
        {
            continue;
        }
        ws.labels_mut()
            .insert(keys::LABEL_COMPLIANCE_CHECK_NEEDED.to_string(), "true".to_string());
        match ctx.run(store.update(&ws)).await {
            Ok(_) => report.marked += 1,
            Err(AdmissionError::Cancelled) => return Err(AdmissionError::Cancelled),
            Err(e) => {
                warn!(workspace = %ws.name_any(), ns = %ws.namespace().unwrap_or_default(), error = %e, "failed to mark workspace for compliance check");
                report.failed += 1;
            }
        }
    }
    info!(template = %name, template_ns = %namespace, marked = report.marked, failed = report.failed, "compliance marking done");
    Ok(report)
}
