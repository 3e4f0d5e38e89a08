use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::info;

use crate::crd::WorkspaceTemplate;
use crate::crd::workspace_template::{IdleShutdownOverridePolicy, WorkspaceTemplateSpec};
use crate::errors::Warnings;
use crate::quantity::parse;

pub const CONSTRAINTS_CHANGED_WARNING: &str = "Template constraints changed. Affected workspaces will be marked for compliance validation by the controller.";

/// Admission checks for template updates. Templates are never rejected for
/// tightening constraints; existing workspaces are re-checked later.
pub struct TemplatePolicy;

impl TemplatePolicy {
    pub fn validate_update(old: &WorkspaceTemplate, new: &WorkspaceTemplate) -> Warnings {
        if constraints_changed(&old.spec, &new.spec) {
            info!(template = ?new.metadata.name, "template constraints changed");
            vec![CONSTRAINTS_CHANGED_WARNING.to_string()]
        } else {
            vec![]
        }
    }
}

fn same_quantity(a: Option<&Quantity>, b: Option<&Quantity>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => match (parse(a), parse(b)) {
            (Ok(a), Ok(b)) => a == b,
            _ => a == b,
        },
        _ => false,
    }
}

fn overrides_changed(
    old: Option<&IdleShutdownOverridePolicy>,
    new: Option<&IdleShutdownOverridePolicy>,
) -> bool {
    let allow = |p: Option<&IdleShutdownOverridePolicy>| p.and_then(|p| p.allow);
    let min = |p: Option<&IdleShutdownOverridePolicy>| p.and_then(|p| p.min_idle_timeout_in_minutes);
    let max = |p: Option<&IdleShutdownOverridePolicy>| p.and_then(|p| p.max_idle_timeout_in_minutes);
    allow(old) != allow(new) || min(old) != min(new) || max(old) != max(new)
}

/// Whether any field that constrains existing workspaces differs.
pub fn constraints_changed(old: &WorkspaceTemplateSpec, new: &WorkspaceTemplateSpec) -> bool {
    if old.allowed_images != new.allowed_images
        || old.allow_custom_images != new.allow_custom_images
    {
        return true;
    }

    let old_bounds = old.resource_bounds.as_ref().map(|b| &b.resources);
    let new_bounds = new.resource_bounds.as_ref().map(|b| &b.resources);
    let bounds_changed = match (old_bounds, new_bounds) {
        (None, None) => false,
        (Some(a), Some(b)) => {
            a.len() != b.len()
                || a.iter().any(|(name, range)| match b.get(name) {
                    Some(other) => {
                        !same_quantity(Some(&range.min), Some(&other.min))
                            || !same_quantity(Some(&range.max), Some(&other.max))
                    }
                    None => true,
                })
        }
        (Some(m), None) | (None, Some(m)) => !m.is_empty(),
    };
    if bounds_changed {
        return true;
    }

    let old_storage = old.primary_storage.as_ref();
    let new_storage = new.primary_storage.as_ref();
    if !same_quantity(
        old_storage.and_then(|s| s.min_size.as_ref()),
        new_storage.and_then(|s| s.min_size.as_ref()),
    ) || !same_quantity(
        old_storage.and_then(|s| s.max_size.as_ref()),
        new_storage.and_then(|s| s.max_size.as_ref()),
    ) {
        return true;
    }

    overrides_changed(
        old.idle_shutdown_overrides.as_ref(),
        new.idle_shutdown_overrides.as_ref(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::workspace_template::{ResourceBounds, ResourceRange, StorageConfig};

    fn tpl(spec: WorkspaceTemplateSpec) -> WorkspaceTemplate {
        WorkspaceTemplate::new("tpl", spec)
    }

    fn cpu_bounds(max: &str) -> Option<ResourceBounds> {
        Some(ResourceBounds::from_legacy(
            Some(ResourceRange {
                min: Quantity("100m".into()),
                max: Quantity(max.into()),
            }),
            None,
            None,
        ))
    }

    #[test]
    fn cosmetic_changes_produce_no_warning() {
        let old = tpl(WorkspaceTemplateSpec {
            display_name: "Old".into(),
            resource_bounds: cpu_bounds("2"),
            ..Default::default()
        });
        let new = tpl(WorkspaceTemplateSpec {
            display_name: "New".into(),
            description: "changed".into(),
            resource_bounds: cpu_bounds("2000m"),
            ..Default::default()
        });
        assert!(TemplatePolicy::validate_update(&old, &new).is_empty());
    }

    #[test]
    fn tightened_bounds_warn() {
        let old = tpl(WorkspaceTemplateSpec {
            resource_bounds: cpu_bounds("4"),
            ..Default::default()
        });
        let new = tpl(WorkspaceTemplateSpec {
            resource_bounds: cpu_bounds("2"),
            ..Default::default()
        });
        assert_eq!(
            TemplatePolicy::validate_update(&old, &new),
            vec![CONSTRAINTS_CHANGED_WARNING.to_string()]
        );
    }

    #[test]
    fn image_storage_and_idle_policy_changes_are_constraints() {
        let base = WorkspaceTemplateSpec::default();

        let images = WorkspaceTemplateSpec {
            allowed_images: vec!["img:a".into()],
            ..Default::default()
        };
        assert!(constraints_changed(&base, &images));

        let storage = WorkspaceTemplateSpec {
            primary_storage: Some(StorageConfig {
                max_size: Some(Quantity("10Gi".into())),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(constraints_changed(&base, &storage));

        let idle = WorkspaceTemplateSpec {
            idle_shutdown_overrides: Some(IdleShutdownOverridePolicy {
                allow: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(constraints_changed(&base, &idle));
        assert!(!constraints_changed(&idle, &idle.clone()));
    }
}
