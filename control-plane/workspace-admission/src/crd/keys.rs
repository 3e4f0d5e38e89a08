//! Label, annotation and finalizer keys shared by the admission core and the
//! controllers.

pub const GROUP: &str = "workspace.jupyter.org";
pub const API_VERSION: &str = "workspace.jupyter.org/v1alpha1";

pub const LABEL_TEMPLATE: &str = "workspace.jupyter.org/template";
pub const LABEL_TEMPLATE_NAMESPACE: &str =
    "workspace.jupyter.org/template-namespace";
pub const LABEL_ACCESS_STRATEGY_NAME: &str =
    "workspace.jupyter.org/access-strategy-name";
pub const LABEL_ACCESS_STRATEGY_NAMESPACE: &str =
    "workspace.jupyter.org/access-strategy-namespace";
pub const LABEL_COMPLIANCE_CHECK_NEEDED: &str =
    "workspace.jupyter.org/compliance-check-needed";
pub const LABEL_DEFAULT_CLUSTER_TEMPLATE: &str =
    "workspace.jupyter.org/default-cluster-template";
pub const LABEL_DEFAULT_SERVICE_ACCOUNT: &str =
    "workspace.jupyter.org/default-service-account";
/// Set on pods that belong to a workspace.
pub const LABEL_WORKSPACE_NAME: &str = "workspace.jupyter.org/workspace-name";

pub const ANNOTATION_CREATED_BY: &str = "workspace.jupyter.org/created-by";
pub const ANNOTATION_LAST_UPDATED_BY: &str =
    "workspace.jupyter.org/last-updated-by";
pub const ANNOTATION_SA_USERS: &str =
    "workspace.jupyter.org/service-account-users";
pub const ANNOTATION_SA_USER_PATTERNS: &str =
    "workspace.jupyter.org/service-account-user-patterns";
pub const ANNOTATION_SA_GROUPS: &str =
    "workspace.jupyter.org/service-account-groups";

pub const TEMPLATE_FINALIZER: &str = "workspace.jupyter.org/template-protection";
pub const ACCESS_STRATEGY_FINALIZER: &str =
    "workspace.jupyter.org/accessstrategy-protection";

pub const DESIRED_STATUS_RUNNING: &str = "Running";
pub const DESIRED_STATUS_STOPPED: &str = "Stopped";

pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
