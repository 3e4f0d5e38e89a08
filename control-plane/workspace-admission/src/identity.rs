use std::future::Future;
use tokio_util::sync::CancellationToken;
use workspace_store::{StoreResult, cancellable};

use crate::errors::{AdmissionError, AdmissionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    /// `pods/exec` requests.
    Connect,
}

/// Acting user attached to a mutating request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionIdentity {
    pub username: String,
    pub groups: Vec<String>,
    pub operation: Operation,
}

impl AdmissionIdentity {
    pub fn new(username: impl Into<String>, operation: Operation) -> Self {
        Self {
            username: username.into(),
            groups: Vec::new(),
            operation,
        }
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }
}

/// Per-call context: the optional acting identity and the caller's
/// cancellation token. Every store call made on behalf of the request goes
/// through [`RequestContext::run`].
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    identity: Option<AdmissionIdentity>,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(identity: AdmissionIdentity) -> Self {
        Self {
            identity: Some(identity),
            cancel: CancellationToken::new(),
        }
    }

    /// Context without an acting identity, used by controllers.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn identity(&self) -> AdmissionResult<&AdmissionIdentity> {
        self.identity.as_ref().ok_or_else(|| {
            AdmissionError::PreconditionMissing(
                "no user information on request".into(),
            )
        })
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn run<T, F>(&self, fut: F) -> AdmissionResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        cancellable(&self.cancel, fut).await.map_err(AdmissionError::from)
    }
}
