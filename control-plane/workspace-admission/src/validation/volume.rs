use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::ResourceExt;
use tracing::debug;
use workspace_store::{ObjectStore, get_opt};

use crate::crd::keys;
use crate::crd::Workspace;
use crate::errors::{AdmissionResult, Violation, ViolationKind};
use crate::identity::RequestContext;

const WORKSPACE_KIND: &str = "Workspace";

/// Name of the other workspace that owns the claim, if any.
fn foreign_owner(pvc: &PersistentVolumeClaim, ws: &Workspace) -> Option<String> {
    let uid = ws.uid();
    pvc.owner_references()
        .iter()
        .find(|o| {
            o.api_version == keys::API_VERSION
                && o.kind == WORKSPACE_KIND
                && Some(o.uid.as_str()) != uid.as_deref()
        })
        .map(|o| o.name.clone())
}

/// Every secondary volume whose claim exists and belongs to a different
/// workspace. Missing claims are left to the workspace controller.
pub async fn check_volume_ownership<S: ObjectStore>(
    store: &S,
    ctx: &RequestContext,
    ws: &Workspace,
) -> AdmissionResult<Vec<Violation>> {
    let namespace = ws.namespace().unwrap_or_default();
    let mut out = Vec::new();
    for volume in &ws.spec.volumes {
        let claim = &volume.persistent_volume_claim_name;
        let pvc: Option<PersistentVolumeClaim> =
            ctx.run(get_opt(store, &namespace, claim)).await?;
        let Some(pvc) = pvc else {
            debug!(%namespace, pvc = %claim, "claim does not exist yet");
            continue;
        };
        if let Some(owner) = foreign_owner(&pvc, ws) {
            out.push(Violation::new(
                ViolationKind::VolumeOwnedByAnotherWorkspace,
                format!("spec.volumes[{}].persistentVolumeClaimName", volume.name),
                format!(
                    "Volume '{}' references PVC '{}' which is owned by another workspace '{}'",
                    volume.name, claim, owner
                ),
                "a claim not owned by another workspace",
                format!("owned by {owner}"),
            ));
        }
    }
    Ok(out)
}
