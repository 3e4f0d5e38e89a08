//! Template default appliers. Each one fills a single category of unset
//! workspace fields from the template and never touches the template.

use kube::ResourceExt;

use crate::crd::keys;
use crate::crd::workspace::StorageSpec;
use crate::crd::{Workspace, WorkspaceTemplate};
use crate::quantity::is_unset;

pub type Applier = fn(&mut Workspace, &WorkspaceTemplate);

/// Ordered registry. Only `metadata` depends on running after template
/// resolution; the rest are independent because each skips fields that are
/// already set.
pub const APPLIERS: &[(&str, Applier)] = &[
    ("core", apply_core),
    ("resources", apply_resources),
    ("storage", apply_storage),
    ("scheduling", apply_scheduling),
    ("metadata", apply_metadata),
    ("access-strategy", apply_access_strategy),
    ("lifecycle", apply_lifecycle),
    ("security", apply_security),
];

pub fn apply_all(ws: &mut Workspace, template: &WorkspaceTemplate) {
    for (_, applier) in APPLIERS {
        applier(ws, template);
    }
}

fn fill(target: &mut String, default: &str) {
    if target.is_empty() && !default.is_empty() {
        *target = default.to_string();
    }
}

pub fn apply_core(ws: &mut Workspace, template: &WorkspaceTemplate) {
    let t = &template.spec;
    fill(&mut ws.spec.image, &t.default_image);
    fill(&mut ws.spec.ownership_type, &t.default_ownership_type);
    fill(&mut ws.spec.access_type, &t.default_access_type);
    fill(&mut ws.spec.app_type, &t.app_type);
    if ws.spec.container_config.is_none() {
        ws.spec.container_config = t.default_container_config.clone();
    }
}

pub fn apply_resources(ws: &mut Workspace, template: &WorkspaceTemplate) {
    if ws.spec.resources.is_none() {
        ws.spec.resources = template.spec.default_resources.clone();
    }
}

pub fn apply_storage(ws: &mut Workspace, template: &WorkspaceTemplate) {
    let Some(policy) = template.spec.primary_storage.as_ref() else {
        return;
    };
    let has_default_size = !is_unset(policy.default_size.as_ref());
    if ws.spec.storage.is_none() && has_default_size {
        ws.spec.storage = Some(StorageSpec::default());
    }
    let Some(storage) = ws.spec.storage.as_mut() else {
        return;
    };
    if is_unset(storage.size.as_ref()) && has_default_size {
        storage.size = policy.default_size.clone();
    }
    if storage.storage_class_name.is_none() {
        storage.storage_class_name = policy.default_storage_class_name.clone();
    }
    fill(&mut storage.mount_path, &policy.default_mount_path);
}

pub fn apply_scheduling(ws: &mut Workspace, template: &WorkspaceTemplate) {
    let t = &template.spec;
    if ws.spec.node_selector.is_none() {
        if let Some(selector) = &t.default_node_selector {
            ws.spec.node_selector = Some(
                selector
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            );
        }
    }
    if ws.spec.affinity.is_none() {
        ws.spec.affinity = t.default_affinity.clone();
    }
    if ws.spec.tolerations.is_none() {
        if let Some(tolerations) = &t.default_tolerations {
            ws.spec.tolerations = Some(tolerations.to_vec());
        }
    }
}

/// Always stamps the bound-template labels, using the namespace the template
/// was actually found in.
pub fn apply_metadata(ws: &mut Workspace, template: &WorkspaceTemplate) {
    let namespace = template
        .namespace()
        .unwrap_or_else(|| ws.template_ref_namespace());
    let labels = ws.labels_mut();
    labels.insert(keys::LABEL_TEMPLATE.to_string(), template.name_any());
    labels.insert(keys::LABEL_TEMPLATE_NAMESPACE.to_string(), namespace);
}

pub fn apply_access_strategy(ws: &mut Workspace, template: &WorkspaceTemplate) {
    if ws.spec.access_strategy.is_none() {
        ws.spec.access_strategy = template.spec.default_access_strategy.clone();
    }
}

pub fn apply_lifecycle(ws: &mut Workspace, template: &WorkspaceTemplate) {
    if ws.spec.lifecycle.is_none() {
        ws.spec.lifecycle = template.spec.default_lifecycle.clone();
    }
    if ws.spec.idle_shutdown.is_none() {
        ws.spec.idle_shutdown = template.spec.default_idle_shutdown.clone();
    }
}

pub fn apply_security(ws: &mut Workspace, template: &WorkspaceTemplate) {
    if ws.spec.pod_security_context.is_none() {
        ws.spec.pod_security_context =
            template.spec.default_pod_security_context.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::workspace::{ContainerConfig, TemplateRef};
    use crate::crd::workspace_template::StorageConfig;
    use crate::crd::{WorkspaceSpec, WorkspaceTemplateSpec};
    use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
    use std::collections::BTreeMap;

    fn template() -> WorkspaceTemplate {
        let mut requests = BTreeMap::new();
        requests.insert("cpu".to_string(), Quantity("500m".into()));
        let mut t = WorkspaceTemplate::new(
            "base",
            WorkspaceTemplateSpec {
                default_image: "img:a".into(),
                default_ownership_type: "OwnerOnly".into(),
                default_resources: Some(ResourceRequirements {
                    requests: Some(requests),
                    ..Default::default()
                }),
                default_container_config: Some(ContainerConfig {
                    command: vec!["start.sh".into()],
                    args: vec![],
                }),
                primary_storage: Some(StorageConfig {
                    default_size: Some(Quantity("5Gi".into())),
                    default_mount_path: "/home/jovyan".into(),
                    ..Default::default()
                }),
                default_node_selector: Some(
                    [("pool".to_string(), "cpu".to_string())].into(),
                ),
                default_tolerations: Some(vec![Toleration {
                    key: Some("dedicated".into()),
                    ..Default::default()
                }]),
                ..Default::default()
            },
        );
        t.metadata.namespace = Some("shared".into());
        t
    }

    fn workspace() -> Workspace {
        let mut ws = Workspace::new(
            "ws",
            WorkspaceSpec {
                template_ref: Some(TemplateRef {
                    name: "base".into(),
                    namespace: String::new(),
                }),
                ..Default::default()
            },
        );
        ws.metadata.namespace = Some("team".into());
        ws
    }

    #[test]
    fn fills_unset_fields_only() {
        let t = template();
        let mut ws = workspace();
        ws.spec.image = "img:b".into();
        apply_all(&mut ws, &t);

        assert_eq!(ws.spec.image, "img:b");
        assert_eq!(ws.spec.ownership_type, "OwnerOnly");
        assert_eq!(ws.spec.resources, t.spec.default_resources);
        let storage = ws.spec.storage.as_ref().unwrap();
        assert_eq!(storage.size, Some(Quantity("5Gi".into())));
        assert_eq!(storage.mount_path, "/home/jovyan");
        assert_eq!(ws.labels()[keys::LABEL_TEMPLATE], "base");
        assert_eq!(ws.labels()[keys::LABEL_TEMPLATE_NAMESPACE], "shared");
    }

    #[test]
    fn zero_size_is_replaced_by_default() {
        let t = template();
        let mut ws = workspace();
        ws.spec.storage = Some(StorageSpec {
            size: Some(Quantity("0".into())),
            ..Default::default()
        });
        apply_storage(&mut ws, &t);
        assert_eq!(
            ws.spec.storage.unwrap().size,
            Some(Quantity("5Gi".into()))
        );
    }

    #[test]
    fn no_storage_block_without_default_size() {
        let mut t = template();
        t.spec.primary_storage.as_mut().unwrap().default_size = None;
        let mut ws = workspace();
        apply_storage(&mut ws, &t);
        assert!(ws.spec.storage.is_none());
    }

    #[test]
    fn copies_are_independent() {
        let t = template();
        let before = t.spec.clone();
        let mut ws = workspace();
        apply_all(&mut ws, &t);

        ws.spec
            .node_selector
            .as_mut()
            .unwrap()
            .insert("extra".into(), "x".into());
        ws.spec.tolerations.as_mut().unwrap().clear();
        ws.spec.container_config.as_mut().unwrap().command.push("more".into());
        ws.spec
            .resources
            .as_mut()
            .unwrap()
            .requests
            .as_mut()
            .unwrap()
            .insert("cpu".into(), Quantity("8".into()));

        assert_eq!(t.spec.default_node_selector, before.default_node_selector);
        assert_eq!(t.spec.default_tolerations, before.default_tolerations);
        assert_eq!(
            t.spec.default_container_config,
            before.default_container_config
        );
        assert_eq!(t.spec.default_resources, before.default_resources);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let t = template();
        let mut once = workspace();
        apply_all(&mut once, &t);
        let mut twice = once.clone();
        apply_all(&mut twice, &t);
        assert_eq!(once.spec, twice.spec);
        assert_eq!(once.metadata.labels, twice.metadata.labels);
    }
}
