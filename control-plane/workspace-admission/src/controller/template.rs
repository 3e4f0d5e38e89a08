use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    ResourceExt,
    api::{Api, Patch, PatchParams},
    runtime::{Controller, controller::Action, watcher::Config},
};
use serde_json::json;
use tracing::{debug, error, info, instrument};

use super::compliance::{GenerationDecision, generation_decision, mark_for_compliance};
use super::{ControllerContext, ReconcileErr, error_policy, referenced_object};
use crate::crd::{Workspace, WorkspaceTemplate};
use crate::identity::RequestContext;

pub(super) async fn run(ctx: Arc<ControllerContext>) {
    let templates: Api<WorkspaceTemplate> = Api::all(ctx.client.clone());
    let workspaces: Api<Workspace> = Api::all(ctx.client.clone());

    Controller::new(templates, Config::default())
        .watches(workspaces, Config::default(), |ws| {
            referenced_object::<WorkspaceTemplate>(&ws)
        })
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(template = %obj_ref.name, ?action, "reconciled template")
                }
                Err(e) => error!(error = ?e, "template reconcile error"),
            }
        })
        .await;
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<WorkspaceTemplate>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let rctx = RequestContext::system();

    if ctx.cfg.features.compliance_marking {
        observe_generation(&obj, &ctx, &rctx).await?;
    }

    let action = ctx.guard.reconcile(&rctx, obj.as_ref()).await?;
    debug!(?action, "template protection reconciled");
    Ok(Action::await_change())
}

async fn observe_generation(
    obj: &WorkspaceTemplate,
    ctx: &ControllerContext,
    rctx: &RequestContext,
) -> Result<(), ReconcileErr> {
    let observed = obj.status.as_ref().map(|s| s.observed_generation).unwrap_or(0);
    let generation = obj.metadata.generation;

    match generation_decision(generation, observed) {
        GenerationDecision::Skip => return Ok(()),
        GenerationDecision::RecordOnly => {}
        GenerationDecision::MarkAndRecord => {
            let report = mark_for_compliance(ctx.store.as_ref(), rctx, obj).await?;
            if report.failed > 0 {
                error!(failed = report.failed, "some workspaces could not be marked for compliance");
            }
        }
    }

    let namespace = obj.namespace().unwrap_or_default();
    let api: Api<WorkspaceTemplate> = Api::namespaced(ctx.client.clone(), &namespace);
    let status = json!({ "status": { "observedGeneration": generation } });
    api.patch_status(&obj.name_any(), &PatchParams::default(), &Patch::Merge(&status))
        .await
        .map_err(|e| ReconcileErr::Internal(e.to_string()))?;
    info!(?generation, "recorded observed template generation");
    Ok(())
}
