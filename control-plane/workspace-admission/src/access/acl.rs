//! Allow-lists carried as YAML string sequences in annotations.

use regex::Regex;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::crd::keys;
use crate::identity::AdmissionIdentity;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    pub users: Vec<String>,
    pub user_patterns: Vec<String>,
    pub groups: Vec<String>,
}

fn parse_list(annotations: &BTreeMap<String, String>, key: &str) -> Vec<String> {
    let Some(raw) = annotations.get(key) else {
        return vec![];
    };
    match serde_yaml::from_str::<Option<Vec<String>>>(raw) {
        Ok(list) => list.unwrap_or_default(),
        Err(e) => {
            warn!(annotation = %key, error = %e, "ignoring malformed access list");
            vec![]
        }
    }
}

impl AccessList {
    /// Read the service-account access annotations. Missing or malformed
    /// lists are empty.
    pub fn from_annotations(annotations: &BTreeMap<String, String>) -> Self {
        Self {
            users: parse_list(annotations, keys::ANNOTATION_SA_USERS),
            user_patterns: parse_list(annotations, keys::ANNOTATION_SA_USER_PATTERNS),
            groups: parse_list(annotations, keys::ANNOTATION_SA_GROUPS),
        }
    }

    pub fn has_access(&self, identity: &AdmissionIdentity) -> bool {
        let username = identity.username.as_str();
        if self.users.iter().any(|u| u == username) {
            debug!(%username, "access granted by exact user match");
            return true;
        }
        if let Some(pattern) = self
            .user_patterns
            .iter()
            .find(|p| glob_matches(p, username))
        {
            debug!(%username, %pattern, "access granted by pattern");
            return true;
        }
        if let Some(group) = self
            .groups
            .iter()
            .find(|g| identity.groups.iter().any(|ug| ug == *g))
        {
            debug!(%username, %group, "access granted by group");
            return true;
        }
        false
    }
}

/// Whole-string glob match: `*` is any run, `?` one character, everything
/// else literal.
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    let escaped = regex::escape(pattern)
        .replace(r"\*", ".*")
        .replace(r"\?", ".");
    match Regex::new(&format!("^(?s:{escaped})$")) {
        Ok(re) => re.is_match(value),
        Err(_) => false,
    }
}
