//! Template constraint rules. Every rule reports all of its violations and
//! never stops at the first one.

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use kube::ResourceExt;

use crate::crd::{WorkspaceSpec, WorkspaceTemplate};
use crate::errors::{Violation, ViolationKind};
use crate::quantity::{ParsedQuantity, is_unset, parse};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    Image,
    Resources,
    Storage,
    SecondaryStorage,
    IdleShutdown,
}

impl Rule {
    pub const ALL: [Rule; 5] = [
        Rule::Image,
        Rule::Resources,
        Rule::Storage,
        Rule::SecondaryStorage,
        Rule::IdleShutdown,
    ];

    /// Top-level spec field whose change re-runs this rule on update.
    pub fn triggered_by(&self) -> &'static str {
        match self {
            Rule::Image => "image",
            Rule::Resources => "resources",
            Rule::Storage => "storage",
            Rule::SecondaryStorage => "volumes",
            Rule::IdleShutdown => "idleShutdown",
        }
    }

    pub fn check(&self, spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<Violation> {
        match self {
            Rule::Image => check_image(spec, template),
            Rule::Resources => check_resources(spec, template),
            Rule::Storage => check_storage(spec, template),
            Rule::SecondaryStorage => check_secondary_storage(spec, template),
            Rule::IdleShutdown => check_idle_shutdown(spec, template),
        }
    }
}

pub fn check_image(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<Violation> {
    let t = &template.spec;
    if spec.image.is_empty() || t.allow_custom_images == Some(true) {
        return vec![];
    }
    let allowed: Vec<&str> = if t.allowed_images.is_empty() {
        vec![t.default_image.as_str()]
    } else {
        t.allowed_images.iter().map(String::as_str).collect()
    };
    if allowed.contains(&spec.image.as_str()) {
        return vec![];
    }
    let allowed = format!("[{}]", allowed.join(", "));
    vec![Violation::new(
        ViolationKind::ImageNotAllowed,
        "spec.image",
        format!(
            "Image '{}' is not allowed by template '{}'. Allowed images: {}",
            spec.image,
            template.name_any(),
            allowed
        ),
        allowed,
        spec.image.clone(),
    )]
}

fn parse_instance(field: &str, q: &Quantity, out: &mut Vec<Violation>) -> Option<ParsedQuantity> {
    match parse(q) {
        Ok(p) => Some(p),
        Err(e) => {
            out.push(Violation::new(
                ViolationKind::InvalidQuantity,
                field,
                format!("Invalid quantity for {}: {}", field, e),
                "a valid quantity",
                q.0.clone(),
            ));
            None
        }
    }
}

fn parse_template(
    template: &str,
    field: &str,
    q: &Quantity,
    out: &mut Vec<Violation>,
) -> Option<ParsedQuantity> {
    match parse(q) {
        Ok(p) => Some(p),
        Err(e) => {
            out.push(Violation::new(
                ViolationKind::InvalidTemplate,
                field,
                format!("Template '{}' has an invalid {}: {}", template, field, e),
                "a valid quantity",
                q.0.clone(),
            ));
            None
        }
    }
}

/// Request quantities parsed at most once per check, so an invalid request
/// is reported a single time however many rules look at it.
#[derive(Default)]
struct ParsedRequests {
    seen: BTreeMap<String, Option<ParsedQuantity>>,
}

impl ParsedRequests {
    fn get(&mut self, name: &str, q: &Quantity, out: &mut Vec<Violation>) -> Option<ParsedQuantity> {
        if let Some(p) = self.seen.get(name) {
            return *p;
        }
        let p = parse_instance(&format!("spec.resources.requests.{name}"), q, out);
        self.seen.insert(name.to_string(), p);
        p
    }
}

pub fn check_resources(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<Violation> {
    let mut out = Vec::new();
    let Some(resources) = spec.resources.as_ref() else {
        return out;
    };
    let requests = resources.requests.as_ref();
    let limits = resources.limits.as_ref();
    let mut parsed = ParsedRequests::default();

    for (name, label, request_label) in [("cpu", "CPU", "CPU"), ("memory", "Memory", "memory")] {
        let (Some(request), Some(limit)) = (
            requests.and_then(|r| r.get(name)),
            limits.and_then(|l| l.get(name)),
        ) else {
            continue;
        };
        let limit_field = format!("spec.resources.limits.{name}");
        let (Some(req), Some(lim)) = (
            parsed.get(name, request, &mut out),
            parse_instance(&limit_field, limit, &mut out),
        ) else {
            continue;
        };
        if lim < req {
            out.push(Violation::new(
                ViolationKind::ResourceExceeded,
                limit_field,
                format!(
                    "{} limit must be greater than or equal to {} request",
                    label, request_label
                ),
                format!(">= {}", request.0),
                limit.0.clone(),
            ));
        }
    }

    let Some(bounds) = template.spec.resource_bounds.as_ref() else {
        return out;
    };
    let template_name = template.name_any();
    for (name, range) in &bounds.resources {
        let Some(requested) = requests.and_then(|r| r.get(name)) else {
            continue;
        };
        let Some(value) = parsed.get(name, requested, &mut out) else {
            continue;
        };
        let field = format!("spec.resources.requests.{name}");
        let bound_field = format!("resourceBounds.resources.{name}");
        let min = parse_template(&template_name, &format!("{bound_field}.min"), &range.min, &mut out);
        let max = parse_template(&template_name, &format!("{bound_field}.max"), &range.max, &mut out);

        if min.is_some_and(|min| value < min) {
            out.push(Violation::new(
                ViolationKind::ResourceExceeded,
                field.clone(),
                format!(
                    "{} request {} is below minimum {} required by template '{}'",
                    name, requested.0, range.min.0, template_name
                ),
                format!("min: {}", range.min.0),
                requested.0.clone(),
            ));
        }
        if max.is_some_and(|max| value > max) {
            out.push(Violation::new(
                ViolationKind::ResourceExceeded,
                field,
                format!(
                    "{} request {} exceeds maximum {} allowed by template '{}'",
                    name, requested.0, range.max.0, template_name
                ),
                format!("max: {}", range.max.0),
                requested.0.clone(),
            ));
        }
    }
    out
}

pub fn check_storage(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<Violation> {
    let mut out = Vec::new();
    let Some(policy) = template.spec.primary_storage.as_ref() else {
        return out;
    };
    let Some(size) = spec.storage.as_ref().and_then(|s| s.size.as_ref()) else {
        return out;
    };
    if is_unset(Some(size)) {
        return out;
    }
    let field = "spec.storage.size";
    let Some(value) = parse_instance(field, size, &mut out) else {
        return out;
    };
    let template_name = template.name_any();

    if let Some(min_q) = policy.min_size.as_ref() {
        let min = parse_template(&template_name, "primaryStorage.minSize", min_q, &mut out);
        if min.is_some_and(|min| value < min) {
            out.push(Violation::new(
                ViolationKind::StorageExceeded,
                field,
                format!(
                    "Storage size {} is below minimum {} required by template '{}'",
                    size.0, min_q.0, template_name
                ),
                format!("min: {}", min_q.0),
                size.0.clone(),
            ));
        }
    }
    if let Some(max_q) = policy.max_size.as_ref() {
        let max = parse_template(&template_name, "primaryStorage.maxSize", max_q, &mut out);
        if max.is_some_and(|max| value > max) {
            out.push(Violation::new(
                ViolationKind::StorageExceeded,
                field,
                format!(
                    "Storage size {} exceeds maximum {} allowed by template '{}'",
                    size.0, max_q.0, template_name
                ),
                format!("max: {}", max_q.0),
                size.0.clone(),
            ));
        }
    }
    out
}

pub fn check_secondary_storage(
    spec: &WorkspaceSpec,
    template: &WorkspaceTemplate,
) -> Vec<Violation> {
    if spec.volumes.is_empty() || template.spec.allow_secondary_storages != Some(false) {
        return vec![];
    }
    let count = spec.volumes.len();
    vec![Violation::new(
        ViolationKind::SecondaryStorageNotAllowed,
        "spec.volumes",
        format!(
            "Template '{}' does not allow secondary storage volumes, but workspace specifies {} volume(s)",
            template.name_any(),
            count
        ),
        "no secondary volumes",
        format!("{count} volume(s)"),
    )]
}

pub fn check_idle_shutdown(spec: &WorkspaceSpec, template: &WorkspaceTemplate) -> Vec<Violation> {
    let Some(policy) = template.spec.idle_shutdown_overrides.as_ref() else {
        return vec![];
    };
    let template_name = template.name_any();

    if policy.allow == Some(false) {
        if spec.idle_shutdown != template.spec.default_idle_shutdown {
            return vec![Violation::new(
                ViolationKind::IdleShutdownOverrideNotAllowed,
                "spec.idleShutdown",
                format!(
                    "Template '{}' does not allow overriding idle shutdown settings",
                    template_name
                ),
                "template default",
                "custom idle shutdown settings",
            )];
        }
        return vec![];
    }

    let Some(idle) = spec.idle_shutdown.as_ref().filter(|i| i.enabled) else {
        return vec![];
    };
    let Some(timeout) = idle.idle_timeout_in_minutes else {
        return vec![];
    };
    let field = "spec.idleShutdown.idleTimeoutInMinutes";
    let mut out = Vec::new();
    if let Some(min) = policy.min_idle_timeout_in_minutes.filter(|min| timeout < *min) {
        out.push(Violation::new(
            ViolationKind::IdleShutdownTimeoutOutOfBounds,
            field,
            format!(
                "Idle timeout {} minutes is below minimum {} minutes required by template '{}'",
                timeout, min, template_name
            ),
            format!("min: {min}"),
            timeout.to_string(),
        ));
    }
    if let Some(max) = policy.max_idle_timeout_in_minutes.filter(|max| timeout > *max) {
        out.push(Violation::new(
            ViolationKind::IdleShutdownTimeoutOutOfBounds,
            field,
            format!(
                "Idle timeout {} minutes exceeds maximum {} minutes allowed by template '{}'",
                timeout, max, template_name
            ),
            format!("max: {max}"),
            timeout.to_string(),
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::WorkspaceTemplateSpec;
    use crate::crd::workspace::{IdleShutdownSpec, StorageSpec, VolumeSpec};
    use crate::crd::workspace_template::{
        IdleShutdownOverridePolicy, ResourceBounds, ResourceRange, StorageConfig,
    };
    use k8s_openapi::api::core::v1::ResourceRequirements;
    use std::collections::BTreeMap;

    fn q(s: &str) -> Quantity {
        Quantity(s.into())
    }

    fn template(spec: WorkspaceTemplateSpec) -> WorkspaceTemplate {
        WorkspaceTemplate::new("tpl", spec)
    }

    fn resources(requests: &[(&str, &str)], limits: &[(&str, &str)]) -> ResourceRequirements {
        let to_map = |pairs: &[(&str, &str)]| -> Option<BTreeMap<String, Quantity>> {
            (!pairs.is_empty()).then(|| pairs.iter().map(|(k, v)| (k.to_string(), q(v))).collect())
        };
        ResourceRequirements {
            requests: to_map(requests),
            limits: to_map(limits),
            ..Default::default()
        }
    }

    #[test]
    fn image_allow_list_and_default_fallback() {
        let t = template(WorkspaceTemplateSpec {
            default_image: "img:a".into(),
            ..Default::default()
        });
        let spec = WorkspaceSpec {
            image: "img:a".into(),
            ..Default::default()
        };
        assert!(check_image(&spec, &t).is_empty());

        let spec = WorkspaceSpec {
            image: "img:c".into(),
            ..Default::default()
        };
        let v = check_image(&spec, &t);
        assert_eq!(v.len(), 1);
        assert_eq!(
            v[0].message,
            "Image 'img:c' is not allowed by template 'tpl'. Allowed images: [img:a]"
        );
    }

    #[test]
    fn custom_images_flag_skips_image_rule() {
        let t = template(WorkspaceTemplateSpec {
            allowed_images: vec!["img:a".into()],
            allow_custom_images: Some(true),
            ..Default::default()
        });
        let spec = WorkspaceSpec {
            image: "anything".into(),
            ..Default::default()
        };
        assert!(check_image(&spec, &t).is_empty());
    }

    #[test]
    fn limit_below_request_is_rejected() {
        let spec = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "2"), ("memory", "1Gi")], &[("cpu", "1"), ("memory", "512Mi")])),
            ..Default::default()
        };
        let v = check_resources(&spec, &template(Default::default()));
        let messages: Vec<_> = v.iter().map(|v| v.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "CPU limit must be greater than or equal to CPU request",
                "Memory limit must be greater than or equal to memory request",
            ]
        );
    }

    #[test]
    fn bounds_compare_numerically() {
        let t = template(WorkspaceTemplateSpec {
            resource_bounds: Some(ResourceBounds::from_legacy(
                Some(ResourceRange {
                    min: q("100m"),
                    max: q("2"),
                }),
                None,
                None,
            )),
            ..Default::default()
        });
        let ok = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "2000m")], &[])),
            ..Default::default()
        };
        assert!(check_resources(&ok, &t).is_empty());

        let over = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "3")], &[])),
            ..Default::default()
        };
        let v = check_resources(&over, &t);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].field, "spec.resources.requests.cpu");
        assert_eq!(v[0].allowed, "max: 2");

        let under = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "50m")], &[])),
            ..Default::default()
        };
        assert!(check_resources(&under, &t)[0].message.contains("below minimum 100m"));
    }

    #[test]
    fn garbage_quantity_is_reported() {
        let spec = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "lots")], &[("cpu", "1")])),
            ..Default::default()
        };
        let v = check_resources(&spec, &template(Default::default()));
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::InvalidQuantity);
    }

    #[test]
    fn invalid_request_is_reported_once_across_checks() {
        let t = template(WorkspaceTemplateSpec {
            resource_bounds: Some(ResourceBounds::from_legacy(
                Some(ResourceRange {
                    min: q("100m"),
                    max: q("2"),
                }),
                None,
                None,
            )),
            ..Default::default()
        });
        let spec = WorkspaceSpec {
            resources: Some(resources(&[("cpu", "lots")], &[("cpu", "1")])),
            ..Default::default()
        };
        let v = check_resources(&spec, &t);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::InvalidQuantity);
        assert_eq!(v[0].field, "spec.resources.requests.cpu");
    }

    #[test]
    fn storage_bounds() {
        let t = template(WorkspaceTemplateSpec {
            primary_storage: Some(StorageConfig {
                min_size: Some(q("1Gi")),
                max_size: Some(q("10Gi")),
                ..Default::default()
            }),
            ..Default::default()
        });
        let spec = |size: &str| WorkspaceSpec {
            storage: Some(StorageSpec {
                size: Some(q(size)),
                ..Default::default()
            }),
            ..Default::default()
        };
        let v = check_storage(&spec("500Mi"), &t);
        assert_eq!(v.len(), 1);
        assert_eq!(
            v[0].message,
            "Storage size 500Mi is below minimum 1Gi required by template 'tpl'"
        );
        assert!(check_storage(&spec("10Gi"), &t).is_empty());
        assert_eq!(check_storage(&spec("11Gi"), &t)[0].allowed, "max: 10Gi");
        assert!(check_storage(&spec("0"), &t).is_empty());
    }

    #[test]
    fn secondary_storage_needs_explicit_false() {
        let spec = WorkspaceSpec {
            volumes: vec![VolumeSpec {
                name: "data".into(),
                persistent_volume_claim_name: "pvc".into(),
                mount_path: "/data".into(),
            }],
            ..Default::default()
        };
        assert!(check_secondary_storage(&spec, &template(Default::default())).is_empty());

        let t = template(WorkspaceTemplateSpec {
            allow_secondary_storages: Some(false),
            ..Default::default()
        });
        let v = check_secondary_storage(&spec, &t);
        assert_eq!(v[0].actual, "1 volume(s)");
    }

    #[test]
    fn idle_shutdown_override_and_bounds() {
        let default_idle = IdleShutdownSpec {
            enabled: true,
            idle_timeout_in_minutes: Some(30),
            detection: None,
        };
        let mut t = template(WorkspaceTemplateSpec {
            default_idle_shutdown: Some(default_idle.clone()),
            idle_shutdown_overrides: Some(IdleShutdownOverridePolicy {
                allow: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut spec = WorkspaceSpec {
            idle_shutdown: Some(default_idle),
            ..Default::default()
        };
        assert!(check_idle_shutdown(&spec, &t).is_empty());

        spec.idle_shutdown.as_mut().unwrap().idle_timeout_in_minutes = Some(240);
        assert_eq!(
            check_idle_shutdown(&spec, &t)[0].kind,
            ViolationKind::IdleShutdownOverrideNotAllowed
        );

        t.spec.idle_shutdown_overrides = Some(IdleShutdownOverridePolicy {
            allow: Some(true),
            min_idle_timeout_in_minutes: Some(10),
            max_idle_timeout_in_minutes: Some(120),
        });
        let v = check_idle_shutdown(&spec, &t);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].kind, ViolationKind::IdleShutdownTimeoutOutOfBounds);

        spec.idle_shutdown.as_mut().unwrap().idle_timeout_in_minutes = Some(120);
        assert!(check_idle_shutdown(&spec, &t).is_empty());
    }

    #[test]
    fn rule_triggers_cover_constrained_fields() {
        let fields: Vec<_> = Rule::ALL.iter().map(Rule::triggered_by).collect();
        assert_eq!(fields, vec!["image", "resources", "storage", "volumes", "idleShutdown"]);
    }
}
