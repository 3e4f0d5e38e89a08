use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Shared connection policy referenced by workspaces. Only its identity and
/// metadata matter to admission; the handler settings are carried through.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "workspace.jupyter.org",
    version = "v1alpha1",
    kind = "WorkspaceAccessStrategy",
    plural = "workspaceaccessstrategies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceAccessStrategySpec {
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_url_template: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub create_connection_handler: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub create_connection_context: BTreeMap<String, String>,
}
