use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::error::StoreError;
use crate::traits::*;

/// Store backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

fn map_err(err: kube::Error, what: String) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(what),
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(what),
        other => StoreError::Backend(other.to_string()),
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<K> {
        self.api::<K>(Some(namespace))
            .get(name)
            .await
            .map_err(|e| map_err(e, object_key::<K>(namespace, name)))
    }

    async fn list<K: StoreObject>(
        &self,
        query: &ListQuery,
    ) -> StoreResult<Vec<K>> {
        let mut lp = ListParams::default();
        let selector = query.label_selector();
        if !selector.is_empty() {
            lp = lp.labels(&selector);
        }
        if let Some(limit) = query.limit {
            lp = lp.limit(limit);
        }
        debug!(kind = %K::kind(&()), %selector, "listing objects");
        let list = self
            .api::<K>(query.namespace.as_deref())
            .list(&lp)
            .await
            .map_err(|e| map_err(e, K::kind(&()).to_string()))?;
        Ok(list.items)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> StoreResult<K> {
        let meta = obj.meta();
        let name = meta.name.clone().ok_or_else(|| {
            StoreError::Backend(format!("{} without metadata.name", K::kind(&())))
        })?;
        let namespace = meta.namespace.clone().unwrap_or_default();
        self.api::<K>(Some(&namespace))
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(|e| map_err(e, object_key::<K>(&namespace, &name)))
    }
}
