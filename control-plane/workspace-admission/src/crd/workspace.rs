use k8s_openapi::api::core::v1::{
    Affinity, Lifecycle, PodSecurityContext, ResourceRequirements, Toleration,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::keys;

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema,
)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "Workspace",
    plural = "workspaces",
    namespaced,
    status = "WorkspaceStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceSpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image: String,
    /// `Running` or `Stopped`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub desired_status: String,
    /// `OwnerOnly` or `Public`; empty resolves to `Public`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ownership_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<StorageSpec>,
    /// Secondary volumes bound to existing claims.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<VolumeSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity: Option<Affinity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_config: Option<ContainerConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lifecycle: Option<Lifecycle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_shutdown: Option<IdleShutdownSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_security_context: Option<PodSecurityContext>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service_account_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_strategy: Option<AccessStrategyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<TemplateRef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<Quantity>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_path: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSpec {
    pub name: String,
    pub persistent_volume_claim_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mount_path: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContainerConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdleShutdownSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_in_minutes: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection: Option<IdleDetectionSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IdleDetectionSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccessStrategyRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnershipType {
    Public,
    OwnerOnly,
}

impl OwnershipType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnershipType::Public => "Public",
            OwnershipType::OwnerOnly => "OwnerOnly",
        }
    }

    /// Resolve the stored value; empty or unknown values are treated as
    /// `Public`.
    pub fn effective(raw: &str) -> Self {
        raw.parse().unwrap_or(OwnershipType::Public)
    }
}

impl FromStr for OwnershipType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Public" => Ok(OwnershipType::Public),
            "OwnerOnly" => Ok(OwnershipType::OwnerOnly),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OwnershipType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TemplateRef {
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

impl Workspace {
    /// Template reference with a non-empty name, if any.
    pub fn template_ref(&self) -> Option<&TemplateRef> {
        self.spec.template_ref.as_ref().filter(|r| r.is_set())
    }

    /// Namespace the template reference points at before any fallback.
    pub fn template_ref_namespace(&self) -> String {
        match self.template_ref() {
            Some(r) if !r.namespace.is_empty() => r.namespace.clone(),
            _ => self.namespace().unwrap_or_default(),
        }
    }

    pub fn access_strategy_ref(&self) -> Option<&AccessStrategyRef> {
        self.spec.access_strategy.as_ref().filter(|r| !r.name.is_empty())
    }

    pub fn access_strategy_namespace(&self) -> String {
        match self.access_strategy_ref() {
            Some(r) if !r.namespace.is_empty() => r.namespace.clone(),
            _ => self.namespace().unwrap_or_default(),
        }
    }

    pub fn ownership(&self) -> OwnershipType {
        OwnershipType::effective(&self.spec.ownership_type)
    }

    pub fn created_by(&self) -> Option<&str> {
        self.annotations()
            .get(keys::ANNOTATION_CREATED_BY)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }
}
