use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::traits::*;

type Key = (String, String, String);

/// In-process object store. Objects are kept as JSON so one store can hold
/// every kind; `resourceVersion` is a store-wide counter.
#[derive(Clone, Default)]
pub struct MemoryStore {
    objects: Arc<RwLock<BTreeMap<Key, serde_json::Value>>>,
    version: Arc<AtomicU64>,
    updates: Arc<AtomicUsize>,
    pending_conflicts: Arc<AtomicUsize>,
}

fn key_of<K: StoreObject>(namespace: &str, name: &str) -> Key {
    (
        K::kind(&()).to_string(),
        namespace.to_string(),
        name.to_string(),
    )
}

fn namespace_and_name<K: StoreObject>(obj: &K) -> StoreResult<(String, String)> {
    let meta = obj.meta();
    let name = meta.name.clone().ok_or_else(|| {
        StoreError::Backend(format!("{} without metadata.name", K::kind(&())))
    })?;
    Ok((meta.namespace.clone().unwrap_or_default(), name))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Create or overwrite an object, assigning a fresh resourceVersion.
    pub async fn insert<K: StoreObject>(&self, obj: K) -> StoreResult<K> {
        let (namespace, name) = namespace_and_name(&obj)?;
        let mut obj = obj;
        obj.meta_mut().resource_version = Some(self.next_version());
        let value = serde_json::to_value(&obj)?;
        self.objects
            .write()
            .await
            .insert(key_of::<K>(&namespace, &name), value);
        Ok(obj)
    }

    pub async fn remove<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<K> {
        self.objects
            .write()
            .await
            .remove(&key_of::<K>(namespace, name))
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Number of successful `update` calls so far.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make the next `n` updates fail with a conflict, as if another writer
    /// got there first. Each injected conflict bumps the stored version.
    pub fn inject_conflicts(&self, n: usize) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    fn take_injected_conflict(&self) -> bool {
        self.pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<K> {
        let objects = self.objects.read().await;
        match objects.get(&key_of::<K>(namespace, name)) {
            Some(v) => Ok(serde_json::from_value(v.clone())?),
            None => Err(StoreError::NotFound(object_key::<K>(namespace, name))),
        }
    }

    async fn list<K: StoreObject>(
        &self,
        query: &ListQuery,
    ) -> StoreResult<Vec<K>> {
        let kind = K::kind(&()).to_string();
        let objects = self.objects.read().await;
        let mut out = Vec::new();
        for ((k, ns, _), value) in objects.iter() {
            if *k != kind {
                continue;
            }
            if let Some(want) = &query.namespace {
                if ns != want {
                    continue;
                }
            }
            let obj: K = serde_json::from_value(value.clone())?;
            if !query.matches(obj.meta().labels.as_ref()) {
                continue;
            }
            out.push(obj);
            if let Some(limit) = query.limit {
                if out.len() >= limit as usize {
                    break;
                }
            }
        }
        Ok(out)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> StoreResult<K> {
        let (namespace, name) = namespace_and_name(obj)?;
        let key = key_of::<K>(&namespace, &name);
        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound(object_key::<K>(&namespace, &name)));
        };

        if self.take_injected_conflict() {
            let bumped = self.next_version();
            if let Some(meta) = stored.get_mut("metadata") {
                meta["resourceVersion"] = serde_json::Value::String(bumped);
            }
            return Err(StoreError::Conflict(object_key::<K>(&namespace, &name)));
        }

        let current = stored
            .pointer("/metadata/resourceVersion")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        if let Some(expected) = obj.meta().resource_version.as_ref() {
            if current.as_ref() != Some(expected) {
                return Err(StoreError::Conflict(object_key::<K>(&namespace, &name)));
            }
        }

        let mut next = obj.clone();
        next.meta_mut().resource_version = Some(self.next_version());
        *stored = serde_json::to_value(&next)?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(next)
    }
}
