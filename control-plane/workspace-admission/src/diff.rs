//! Semantic comparison of workspace specs.
//!
//! Specs are compared through their JSON form after normalisation: absent,
//! null and empty collections are the same thing, and quantities under
//! `resources` and `storage.size` compare by value.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::crd::WorkspaceSpec;
use crate::errors::AdmissionResult;
use crate::quantity::ParsedQuantity;

pub const FIELD_DESIRED_STATUS: &str = "desiredStatus";

/// Top-level spec fields whose values differ between two specs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecDiff {
    fields: BTreeSet<String>,
}

impl SpecDiff {
    pub fn between(old: &WorkspaceSpec, new: &WorkspaceSpec) -> AdmissionResult<Self> {
        let old = normalized_fields(old)?;
        let new = normalized_fields(new)?;
        let fields = old
            .keys()
            .chain(new.keys())
            .filter(|k| old.get(*k) != new.get(*k))
            .cloned()
            .collect();
        Ok(Self { fields })
    }

    pub fn changed(&self) -> bool {
        !self.fields.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains(field)
    }

    pub fn only_lifecycle_state_changed(&self) -> bool {
        self.fields.len() == 1 && self.contains(FIELD_DESIRED_STATUS)
    }
}

pub fn spec_changed(old: &WorkspaceSpec, new: &WorkspaceSpec) -> AdmissionResult<bool> {
    Ok(SpecDiff::between(old, new)?.changed())
}

pub fn only_lifecycle_state_changed(
    old: &WorkspaceSpec,
    new: &WorkspaceSpec,
) -> AdmissionResult<bool> {
    Ok(SpecDiff::between(old, new)?.only_lifecycle_state_changed())
}

fn normalized_fields(spec: &WorkspaceSpec) -> AdmissionResult<Map<String, Value>> {
    let value = serde_json::to_value(spec)?;
    match normalize(value, &[]) {
        Some(Value::Object(map)) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn is_quantity_path(path: &[&str]) -> bool {
    matches!(
        path,
        ["resources", "requests" | "limits", _] | ["storage", "size"]
    )
}

fn normalize(value: Value, path: &[&str]) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::Object(map) => {
            let out: Map<String, Value> = map
                .into_iter()
                .filter_map(|(k, v)| {
                    let normalized = {
                        let mut child = path.to_vec();
                        child.push(k.as_str());
                        normalize(v, &child)
                    };
                    normalized.map(|v| (k, v))
                })
                .collect();
            (!out.is_empty()).then_some(Value::Object(out))
        }
        Value::Array(items) => {
            let out: Vec<Value> = items
                .into_iter()
                .map(|v| normalize(v, &[]).unwrap_or(Value::Null))
                .collect();
            (!out.is_empty()).then_some(Value::Array(out))
        }
        Value::String(s) if is_quantity_path(path) => match s.parse::<ParsedQuantity>() {
            Ok(q) => Some(Value::String(q.to_string())),
            Err(_) => Some(Value::String(s)),
        },
        other => Some(other),
    }
}
