//! Who may create, change or delete a workspace.

mod acl;
mod ownership;
mod pod_exec;
mod service_account;

pub use acl::{AccessList, glob_matches};
pub use ownership::{
    AdminPolicy, SYSTEM_MASTERS_GROUP, check_created_by, check_owner, check_ownership_change,
    sanitize_username,
};
pub use pod_exec::PodExecPolicy;
pub use service_account::ServiceAccountPolicy;

use std::sync::Arc;
use tracing::debug;
use workspace_store::ObjectStore;

use crate::crd::{OwnershipType, Workspace, is_terminating};
use crate::errors::AdmissionResult;
use crate::identity::RequestContext;

/// Access gates run ahead of template validation. Administrators bypass
/// all of them.
pub struct AccessPolicy<S> {
    admins: AdminPolicy,
    service_accounts: ServiceAccountPolicy<S>,
}

impl<S: ObjectStore> AccessPolicy<S> {
    pub fn new(store: Arc<S>, admins: AdminPolicy) -> Self {
        Self {
            admins,
            service_accounts: ServiceAccountPolicy::new(store),
        }
    }

    pub fn admins(&self) -> &AdminPolicy {
        &self.admins
    }

    pub async fn authorize_create(
        &self,
        ctx: &RequestContext,
        ws: &Workspace,
    ) -> AdmissionResult<()> {
        let identity = ctx.identity()?;
        if self.admins.is_admin(identity) {
            debug!(user = %identity.username, "admin bypasses access checks");
            return Ok(());
        }
        self.service_accounts.check(ctx, identity, ws).await
    }

    pub async fn authorize_update(
        &self,
        ctx: &RequestContext,
        old: &Workspace,
        new: &Workspace,
    ) -> AdmissionResult<()> {
        if is_terminating(new) {
            return Ok(());
        }
        let identity = ctx.identity()?;
        if self.admins.is_admin(identity) {
            debug!(user = %identity.username, "admin bypasses access checks");
            return Ok(());
        }
        self.service_accounts.check(ctx, identity, new).await?;
        check_created_by(old, new)?;
        check_ownership_change(identity, old, new)
    }

    pub fn authorize_delete(&self, ctx: &RequestContext, ws: &Workspace) -> AdmissionResult<()> {
        let identity = ctx.identity()?;
        if self.admins.is_admin(identity) || ws.ownership() != OwnershipType::OwnerOnly {
            return Ok(());
        }
        check_owner(identity, ws)
    }
}
