use tracing::{debug, info};

use crate::config::AdmissionConfig;
use crate::crd::{OwnershipType, Workspace};
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::AdmissionIdentity;

pub const SYSTEM_MASTERS_GROUP: &str = "system:masters";

/// Who bypasses the access gates.
#[derive(Debug, Clone, Default)]
pub struct AdminPolicy {
    admin_group: Option<String>,
    controller_username: Option<String>,
}

impl AdminPolicy {
    pub fn new(admin_group: Option<String>, controller_username: Option<String>) -> Self {
        Self {
            admin_group: admin_group.filter(|g| !g.is_empty()),
            controller_username,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(
            config.cluster_admin_group.clone(),
            config.controller_username(),
        )
    }

    pub fn is_admin(&self, identity: &AdmissionIdentity) -> bool {
        if self
            .controller_username
            .as_deref()
            .is_some_and(|c| c == identity.username)
        {
            return true;
        }
        identity.groups.iter().any(|g| {
            g == SYSTEM_MASTERS_GROUP || self.admin_group.as_deref() == Some(g.as_str())
        })
    }
}

/// Usernames are stored JSON-escaped, without the surrounding quotes.
pub fn sanitize_username(raw: &str) -> String {
    let quoted = serde_json::Value::String(raw.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}

/// Only the recorded creator may touch an `OwnerOnly` workspace. A missing
/// creator record denies.
pub fn check_owner(identity: &AdmissionIdentity, ws: &Workspace) -> AdmissionResult<()> {
    let current = sanitize_username(&identity.username);
    let owner = ws.created_by();
    debug!(%current, owner = ?owner, "checking workspace ownership");
    if owner == Some(current.as_str()) {
        return Ok(());
    }
    Err(AdmissionError::AccessDenied(
        "only workspace owner can modify OwnerOnly workspaces".into(),
    ))
}

/// The gate applies when either side of the update is `OwnerOnly`, and is
/// always checked against the old object's creator.
pub fn check_ownership_change(
    identity: &AdmissionIdentity,
    old: &Workspace,
    new: &Workspace,
) -> AdmissionResult<()> {
    if old.ownership() == OwnershipType::OwnerOnly || new.ownership() == OwnershipType::OwnerOnly {
        return check_owner(identity, old);
    }
    Ok(())
}

/// `created-by` can neither be removed nor rewritten once set.
pub fn check_created_by(old: &Workspace, new: &Workspace) -> AdmissionResult<()> {
    let Some(previous) = old.created_by() else {
        return Ok(());
    };
    match new.created_by() {
        None => Err(AdmissionError::AccessDenied(
            "created-by annotation cannot be removed".into(),
        )),
        Some(current) if current != previous => {
            info!(%previous, %current, "rejecting created-by rewrite");
            Err(AdmissionError::AccessDenied(
                "created-by annotation is immutable".into(),
            ))
        }
        Some(_) => Ok(()),
    }
}
