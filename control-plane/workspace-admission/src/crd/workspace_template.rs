use k8s_openapi::api::core::v1::{
    Affinity, Lifecycle, PodSecurityContext, ResourceRequirements, Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::workspace::{AccessStrategyRef, ContainerConfig, IdleShutdownSpec};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceTemplate",
    plural = "workspacetemplates",
    namespaced,
    status = "WorkspaceTemplateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplateSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub default_image: String,
    /// Exact image names instances may use. Empty means only `defaultImage`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_custom_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_bounds: Option<ResourceBounds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_storage: Option<StorageConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_container_config: Option<ContainerConfig>,
    /// Absent means secondary volumes are allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_secondary_storages: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_affinity: Option<Affinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_ownership_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_idle_shutdown: Option<IdleShutdownSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_shutdown_overrides: Option<IdleShutdownOverridePolicy>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_access_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_access_strategy: Option<AccessStrategyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_lifecycle: Option<Lifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_pod_security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_type: String,
}

/// Per-resource request bounds keyed by resource name (`cpu`, `memory`,
/// `nvidia.com/gpu`, ...).
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceBounds {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resources: BTreeMap<String, ResourceRange>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
pub struct ResourceRange {
    pub min: Quantity,
    pub max: Quantity,
}

pub const GPU_RESOURCE: &str = "nvidia.com/gpu";

impl ResourceBounds {
    /// Build the keyed form from the older scalar cpu/memory/gpu ranges.
    pub fn from_legacy(
        cpu: Option<ResourceRange>,
        memory: Option<ResourceRange>,
        gpu: Option<ResourceRange>,
    ) -> Self {
        let resources = [("cpu", cpu), ("memory", memory), (GPU_RESOURCE, gpu)]
            .into_iter()
            .filter_map(|(k, r)| r.map(|r| (k.to_string(), r)))
            .collect();
        Self { resources }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_size: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<Quantity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_storage_class_name: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub default_mount_path: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdleShutdownOverridePolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_idle_timeout_in_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_idle_timeout_in_minutes: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceTemplateStatus {
    #[serde(default)]
    pub observed_generation: i64,
}
