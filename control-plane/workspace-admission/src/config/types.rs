use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct AdmissionConfig {
    /// Namespace searched for templates when the workspace namespace has none.
    /// Env: WORKSPACE_DEFAULT_TEMPLATE_NAMESPACE
    #[envconfig(from = "WORKSPACE_DEFAULT_TEMPLATE_NAMESPACE")]
    pub default_template_namespace: Option<String>,

    /// Extra group treated as administrators next to `system:masters`.
    #[envconfig(from = "CLUSTER_ADMIN_GROUP")]
    pub cluster_admin_group: Option<String>,

    #[envconfig(nested)]
    pub controller: ControllerIdentityConfig,

    #[envconfig(from = "WORKSPACE_HTTP_PORT", default = "8081")]
    pub http_port: u16,

    /// Conflict retries for finalizer writes.
    #[envconfig(from = "WORKSPACE_FINALIZER_MAX_RETRIES", default = "3")]
    pub finalizer_max_retries: u32,

    #[envconfig(nested)]
    pub features: FeaturesConfig,
}

#[derive(Envconfig, Clone, Debug, Default)]
pub struct ControllerIdentityConfig {
    #[envconfig(from = "CONTROLLER_POD_NAMESPACE")]
    pub pod_namespace: Option<String>,
    #[envconfig(from = "CONTROLLER_POD_SERVICE_ACCOUNT")]
    pub pod_service_account: Option<String>,
}

#[derive(Envconfig, Clone, Debug)]
pub struct FeaturesConfig {
    /// Label referencing workspaces when a template's constraints change.
    /// Env: WORKSPACE_FEATURES_COMPLIANCE_MARKING
    #[envconfig(from = "WORKSPACE_FEATURES_COMPLIANCE_MARKING", default = "true")]
    pub compliance_marking: bool,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            compliance_marking: true,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            default_template_namespace: None,
            cluster_admin_group: None,
            controller: ControllerIdentityConfig::default(),
            http_port: 8081,
            finalizer_max_retries: 3,
            features: FeaturesConfig::default(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl AdmissionConfig {
    /// Treat variables that are set but blank as unset.
    pub fn normalized(mut self) -> Self {
        self.default_template_namespace =
            non_empty(self.default_template_namespace);
        self.cluster_admin_group = non_empty(self.cluster_admin_group);
        self.controller.pod_namespace = non_empty(self.controller.pod_namespace);
        self.controller.pod_service_account =
            non_empty(self.controller.pod_service_account);
        self
    }

    /// Full username of the controller's service account, when both parts
    /// are configured.
    pub fn controller_username(&self) -> Option<String> {
        match (
            self.controller.pod_namespace.as_deref(),
            self.controller.pod_service_account.as_deref(),
        ) {
            (Some(ns), Some(sa)) => {
                Some(format!("system:serviceaccount:{}:{}", ns, sa))
            }
            _ => None,
        }
    }
}
