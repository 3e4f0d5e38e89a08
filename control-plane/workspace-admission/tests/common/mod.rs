#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{ResourceRequirements, ServiceAccount};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::ResourceExt;
use workspace_admission::config::AdmissionConfig;
use workspace_admission::crd::keys;
use workspace_admission::crd::workspace::TemplateRef;
use workspace_admission::crd::{
    Workspace, WorkspaceSpec, WorkspaceTemplate, WorkspaceTemplateSpec,
};
use workspace_admission::finalizer::FinalizerGuard;
use workspace_admission::{AdmissionIdentity, Operation, RequestContext, WorkspaceAdmission};
use workspace_store::ObjectStore;
use workspace_store::memory::MemoryStore;

pub const NS: &str = "team";
pub const ADMIN_GROUP: &str = "platform-admins";

pub fn config() -> AdmissionConfig {
    AdmissionConfig {
        cluster_admin_group: Some(ADMIN_GROUP.into()),
        ..Default::default()
    }
}

pub fn admission(store: &Arc<MemoryStore>) -> WorkspaceAdmission<MemoryStore> {
    admission_with(store, &config())
}

pub fn admission_with<S: ObjectStore>(store: &Arc<S>, cfg: &AdmissionConfig) -> WorkspaceAdmission<S> {
    let guard = FinalizerGuard::new(store.clone(), cfg.finalizer_max_retries)
        .with_backoff(Duration::ZERO, Duration::ZERO);
    WorkspaceAdmission::with_guard(store.clone(), cfg, guard)
}

pub fn q(s: &str) -> Quantity {
    Quantity(s.into())
}

pub fn requests(pairs: &[(&str, &str)]) -> ResourceRequirements {
    let map: BTreeMap<String, Quantity> =
        pairs.iter().map(|(k, v)| (k.to_string(), q(v))).collect();
    ResourceRequirements {
        requests: Some(map),
        ..Default::default()
    }
}

pub fn template(name: &str, spec: WorkspaceTemplateSpec) -> WorkspaceTemplate {
    let mut t = WorkspaceTemplate::new(name, spec);
    t.metadata.namespace = Some(NS.into());
    t
}

pub fn workspace(name: &str, spec: WorkspaceSpec) -> Workspace {
    let mut ws = Workspace::new(name, spec);
    ws.metadata.namespace = Some(NS.into());
    ws
}

pub fn bound_to(template: &str) -> WorkspaceSpec {
    WorkspaceSpec {
        template_ref: Some(TemplateRef {
            name: template.into(),
            namespace: String::new(),
        }),
        ..Default::default()
    }
}

pub fn created_by(mut ws: Workspace, user: &str) -> Workspace {
    ws.annotations_mut()
        .insert(keys::ANNOTATION_CREATED_BY.into(), user.into());
    ws
}

pub fn as_user(name: &str, op: Operation) -> RequestContext {
    RequestContext::new(AdmissionIdentity::new(name, op))
}

pub fn as_admin(name: &str, op: Operation) -> RequestContext {
    RequestContext::new(AdmissionIdentity::new(name, op).with_groups([ADMIN_GROUP]))
}

pub fn service_account(name: &str, annotations: &[(&str, &str)]) -> ServiceAccount {
    let mut sa = ServiceAccount::default();
    sa.metadata.name = Some(name.into());
    sa.metadata.namespace = Some(NS.into());
    for (k, v) in annotations {
        sa.annotations_mut().insert(k.to_string(), v.to_string());
    }
    sa
}
