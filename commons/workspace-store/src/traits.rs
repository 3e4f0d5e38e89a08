use std::collections::BTreeMap;
use std::fmt::Debug;
use std::future::Future;

use async_trait::async_trait;
use kube_core::{NamespaceResourceScope, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::StoreError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Any namespaced object the store can fetch, list and update.
pub trait StoreObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Label-filtered list request. `namespace: None` lists across all namespaces.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Equality-based selector string, e.g. `a=1,b=2`.
    pub fn label_selector(&self) -> String {
        self.labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.labels.iter().all(|(k, v)| {
            labels.and_then(|l| l.get(k)).map(|x| x == v).unwrap_or(false)
        })
    }
}

/// Point lookup, label-filtered list and conditional update over
/// namespaced objects.
///
/// `update` must honour `metadata.resourceVersion` when present and return
/// [`StoreError::Conflict`] if the stored object moved on.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<K>;

    async fn list<K: StoreObject>(
        &self,
        query: &ListQuery,
    ) -> StoreResult<Vec<K>>;

    async fn update<K: StoreObject>(&self, obj: &K) -> StoreResult<K>;
}

/// Like `get`, but maps NotFound to `None`.
pub async fn get_opt<S, K>(
    store: &S,
    namespace: &str,
    name: &str,
) -> StoreResult<Option<K>>
where
    S: ObjectStore + ?Sized,
    K: StoreObject,
{
    match store.get::<K>(namespace, name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(StoreError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Race a store call against the caller's cancellation token.
pub async fn cancellable<T, F>(
    token: &CancellationToken,
    fut: F,
) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(StoreError::Cancelled),
        res = fut => res,
    }
}

pub fn object_key<K: StoreObject>(namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", K::kind(&()), namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_is_sorted_and_comma_joined() {
        let q = ListQuery::new()
            .label("b", "2")
            .label("a", "1")
            .in_namespace("ns");
        assert_eq!(q.label_selector(), "a=1,b=2");
        assert_eq!(q.namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn matches_requires_every_label() {
        let q = ListQuery::new().label("a", "1").label("b", "2");
        let mut labels = BTreeMap::new();
        labels.insert("a".to_string(), "1".to_string());
        assert!(!q.matches(Some(&labels)));
        labels.insert("b".to_string(), "2".to_string());
        assert!(q.matches(Some(&labels)));
        assert!(!q.matches(None));
        assert!(ListQuery::new().matches(None));
    }

    #[tokio::test]
    async fn cancellable_reports_cancellation() {
        let token = CancellationToken::new();
        token.cancel();
        let res: StoreResult<()> =
            cancellable(&token, std::future::pending()).await;
        assert!(matches!(res, Err(StoreError::Cancelled)));
    }
}
