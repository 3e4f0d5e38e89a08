pub mod access_strategy;
pub mod keys;
pub mod workspace;
pub mod workspace_template;

pub use access_strategy::{WorkspaceAccessStrategy, WorkspaceAccessStrategySpec};
pub use workspace::{OwnershipType, Workspace, WorkspaceSpec};
pub use workspace_template::{WorkspaceTemplate, WorkspaceTemplateSpec};

/// True when the object carries a deletion timestamp.
pub fn is_terminating<K: kube::Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}
