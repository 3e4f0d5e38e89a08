use serde::Serialize;
use std::fmt;
use workspace_store::StoreError;

/// Rule family that produced a [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ViolationKind {
    ImageNotAllowed,
    ResourceExceeded,
    StorageExceeded,
    SecondaryStorageNotAllowed,
    VolumeOwnedByAnotherWorkspace,
    IdleShutdownOverrideNotAllowed,
    IdleShutdownTimeoutOutOfBounds,
    InvalidQuantity,
    InvalidTemplate,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One failed constraint. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub kind: ViolationKind,
    pub field: String,
    pub message: String,
    pub allowed: String,
    pub actual: String,
}

impl Violation {
    pub fn new(
        kind: ViolationKind,
        field: impl Into<String>,
        message: impl Into<String>,
        allowed: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            field: field.into(),
            message: message.into(),
            allowed: allowed.into(),
            actual: actual.into(),
        }
    }
}

/// One violation renders as its message; several as
/// `"<n> violations: m1; m2"`.
pub fn format_violations(violations: &[Violation]) -> String {
    match violations {
        [] => String::new(),
        [only] => only.message.clone(),
        many => format!(
            "{} violations: {}",
            many.len(),
            many.iter()
                .map(|v| v.message.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{}: {}", .context, format_violations(.violations))]
    PolicyViolation {
        context: String,
        violations: Vec<Violation>,
    },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("missing request identity: {0}")]
    PreconditionMissing(String),

    #[error("conflicting update on {0}")]
    StoreConflict(String),

    #[error("admission call cancelled")]
    Cancelled,

    #[error("{0}")]
    Invalid(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(StoreError),
}

impl AdmissionError {
    pub fn violations(&self) -> &[Violation] {
        match self {
            AdmissionError::PolicyViolation { violations, .. } => violations,
            _ => &[],
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AdmissionError::NotFound(_))
    }
}

impl From<StoreError> for AdmissionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(key) => AdmissionError::NotFound(key),
            StoreError::Conflict(key) => AdmissionError::StoreConflict(key),
            StoreError::Cancelled => AdmissionError::Cancelled,
            other => AdmissionError::Store(other),
        }
    }
}

impl From<serde_json::Error> for AdmissionError {
    fn from(e: serde_json::Error) -> Self {
        AdmissionError::Store(StoreError::Serialization(e))
    }
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;

/// Non-fatal advisories returned alongside an admitted request.
pub type Warnings = Vec<String>;

#[cfg(test)]
mod tests {
    use super::*;

    fn v(msg: &str) -> Violation {
        Violation::new(ViolationKind::ImageNotAllowed, "spec.image", msg, "", "")
    }

    #[test]
    fn single_violation_is_bare_message() {
        assert_eq!(format_violations(&[v("bad image")]), "bad image");
        assert_eq!(format_violations(&[]), "");
    }

    #[test]
    fn many_violations_are_counted_and_joined() {
        let err = AdmissionError::PolicyViolation {
            context: "workspace violates template 't' constraints".into(),
            violations: vec![v("a"), v("b")],
        };
        assert_eq!(
            err.to_string(),
            "workspace violates template 't' constraints: 2 violations: a; b"
        );
        assert_eq!(err.violations().len(), 2);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            AdmissionError::from(StoreError::Conflict("x".into())),
            AdmissionError::StoreConflict(_)
        ));
        assert!(matches!(
            AdmissionError::from(StoreError::Cancelled),
            AdmissionError::Cancelled
        ));
        assert!(AdmissionError::from(StoreError::NotFound("x".into())).is_not_found());
    }
}
