use std::sync::Arc;

use futures_util::StreamExt;
use kube::{
    ResourceExt,
    api::Api,
    runtime::{Controller, controller::Action, watcher::Config},
};
use tracing::{debug, error, instrument};

use super::{ControllerContext, ReconcileErr, error_policy, referenced_object};
use crate::crd::{Workspace, WorkspaceAccessStrategy};
use crate::identity::RequestContext;

pub(super) async fn run(ctx: Arc<ControllerContext>) {
    let strategies: Api<WorkspaceAccessStrategy> = Api::all(ctx.client.clone());
    let workspaces: Api<Workspace> = Api::all(ctx.client.clone());

    Controller::new(strategies, Config::default())
        .watches(workspaces, Config::default(), |ws| {
            referenced_object::<WorkspaceAccessStrategy>(&ws)
        })
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj_ref, action)) => {
                    debug!(access_strategy = %obj_ref.name, ?action, "reconciled access strategy")
                }
                Err(e) => error!(error = ?e, "access strategy reconcile error"),
            }
        })
        .await;
}

#[instrument(skip_all, fields(ns = %obj.namespace().unwrap_or_default(), name = %obj.name_any()))]
async fn reconcile(
    obj: Arc<WorkspaceAccessStrategy>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, ReconcileErr> {
    let action = ctx
        .guard
        .reconcile(&RequestContext::system(), obj.as_ref())
        .await?;
    debug!(?action, "access strategy protection reconciled");
    Ok(Action::await_change())
}
