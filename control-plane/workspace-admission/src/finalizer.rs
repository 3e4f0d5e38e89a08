//! Deletion protection for objects that workspaces point at.
//!
//! There is no reference counter. Each observation runs one existence query
//! for an active referencing workspace and converges the marker to the
//! answer, so the marker can trail the last reference being dropped until
//! the next observation.

use kube::ResourceExt;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use workspace_store::{ListQuery, ObjectStore, StoreObject};

use crate::crd::keys;
use crate::crd::{Workspace, WorkspaceAccessStrategy, WorkspaceTemplate, is_terminating};
use crate::errors::{AdmissionError, AdmissionResult};
use crate::identity::RequestContext;

/// A resource whose deletion is blocked while active workspaces reference it.
pub trait ProtectedObject: StoreObject {
    const FINALIZER: &'static str;
    const LABEL_NAME: &'static str;
    const LABEL_NAMESPACE: &'static str;

    /// Whether the workspace spec, not just its labels, points at the object.
    fn referenced_by(ws: &Workspace, name: &str, namespace: &str) -> bool;
}

impl ProtectedObject for WorkspaceTemplate {
    const FINALIZER: &'static str = keys::TEMPLATE_FINALIZER;
    const LABEL_NAME: &'static str = keys::LABEL_TEMPLATE;
    const LABEL_NAMESPACE: &'static str = keys::LABEL_TEMPLATE_NAMESPACE;

    fn referenced_by(ws: &Workspace, name: &str, namespace: &str) -> bool {
        // an unqualified reference may have resolved through the default
        // template namespace, which only the label records
        ws.template_ref().is_some_and(|r| {
            r.name == name && (r.namespace.is_empty() || r.namespace == namespace)
        })
    }
}

impl ProtectedObject for WorkspaceAccessStrategy {
    const FINALIZER: &'static str = keys::ACCESS_STRATEGY_FINALIZER;
    const LABEL_NAME: &'static str = keys::LABEL_ACCESS_STRATEGY_NAME;
    const LABEL_NAMESPACE: &'static str = keys::LABEL_ACCESS_STRATEGY_NAMESPACE;

    fn referenced_by(ws: &Workspace, name: &str, namespace: &str) -> bool {
        ws.access_strategy_ref().is_some_and(|r| r.name == name)
            && ws.access_strategy_namespace() == namespace
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizerAction {
    Added,
    Removed,
    Unchanged,
}

pub fn has_finalizer<K: ResourceExt>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

fn set_finalizer<K: ResourceExt>(obj: &mut K, finalizer: &str, present: bool) {
    let finalizers = obj.finalizers_mut();
    if present {
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
    } else {
        finalizers.retain(|f| f != finalizer);
    }
}

pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(100);
pub const DEFAULT_RETRY_JITTER: Duration = Duration::from_millis(50);

pub struct FinalizerGuard<S> {
    store: Arc<S>,
    max_retries: u32,
    base_delay: Duration,
    jitter: Duration,
}

impl<S> Clone for FinalizerGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            max_retries: self.max_retries,
            base_delay: self.base_delay,
            jitter: self.jitter,
        }
    }
}

impl<S: ObjectStore> FinalizerGuard<S> {
    pub fn new(store: Arc<S>, max_retries: u32) -> Self {
        Self {
            store,
            max_retries,
            base_delay: DEFAULT_RETRY_BASE,
            jitter: DEFAULT_RETRY_JITTER,
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, jitter: Duration) -> Self {
        self.base_delay = base_delay;
        self.jitter = jitter;
        self
    }

    /// First non-terminating workspace whose labels and spec both point at
    /// `namespace/name`. Label/spec disagreements are logged and skipped.
    pub async fn first_active_reference<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> AdmissionResult<Option<Workspace>> {
        let query = ListQuery::new()
            .label(K::LABEL_NAME, name)
            .label(K::LABEL_NAMESPACE, namespace);
        let workspaces: Vec<Workspace> = ctx.run(self.store.list(&query)).await?;
        Ok(workspaces.into_iter().find(|ws| {
            if is_terminating(ws) {
                return false;
            }
            if !K::referenced_by(ws, name, namespace) {
                warn!(
                    workspace = %ws.name_any(),
                    ns = %ws.namespace().unwrap_or_default(),
                    kind = %K::kind(&()),
                    %name,
                    "workspace labels disagree with its spec reference"
                );
                return false;
            }
            true
        }))
    }

    /// Add or remove the marker on `obj` according to whether anything still
    /// references it.
    pub async fn reconcile<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        obj: &K,
    ) -> AdmissionResult<FinalizerAction> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let in_use = self
            .first_active_reference::<K>(ctx, &namespace, &name)
            .await?
            .is_some();
        debug!(kind = %K::kind(&()), %namespace, %name, in_use, "finalizer check");
        self.converge(ctx, obj.clone(), in_use).await
    }

    /// Fetch a protected object, naming it by kind and key when missing.
    pub async fn fetch<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> AdmissionResult<K> {
        ctx.run(self.store.get::<K>(namespace, name))
            .await
            .map_err(|e| match e {
                AdmissionError::NotFound(_) => AdmissionError::NotFound(format!(
                    "{} {}/{}",
                    K::kind(&()),
                    namespace,
                    name
                )),
                other => other,
            })
    }

    /// Make sure the marker is present on `namespace/name`.
    pub async fn ensure_marker<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> AdmissionResult<FinalizerAction> {
        let obj: K = self.fetch(ctx, namespace, name).await?;
        self.protect(ctx, obj).await
    }

    /// Add the marker to an object the caller already fetched.
    pub async fn protect<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        obj: K,
    ) -> AdmissionResult<FinalizerAction> {
        self.converge(ctx, obj, true).await
    }

    async fn converge<K: ProtectedObject>(
        &self,
        ctx: &RequestContext,
        mut obj: K,
        want: bool,
    ) -> AdmissionResult<FinalizerAction> {
        let namespace = obj.namespace().unwrap_or_default();
        let name = obj.name_any();
        let done = if want {
            FinalizerAction::Added
        } else {
            FinalizerAction::Removed
        };
        let mut conflicts = 0u32;

        loop {
            if has_finalizer(&obj, K::FINALIZER) == want {
                return Ok(FinalizerAction::Unchanged);
            }
            set_finalizer(&mut obj, K::FINALIZER, want);

            match ctx.run(self.store.update(&obj)).await {
                Ok(_) => {
                    info!(kind = %K::kind(&()), %namespace, %name, action = ?done, "updated protection finalizer");
                    return Ok(done);
                }
                Err(AdmissionError::NotFound(_)) if !want => {
                    debug!(kind = %K::kind(&()), %namespace, %name, "object already gone");
                    return Ok(FinalizerAction::Unchanged);
                }
                Err(AdmissionError::StoreConflict(key)) => {
                    conflicts += 1;
                    obj = match ctx.run(self.store.get::<K>(&namespace, &name)).await {
                        Ok(latest) => latest,
                        Err(AdmissionError::NotFound(_)) if !want => {
                            return Ok(FinalizerAction::Unchanged);
                        }
                        Err(e) => return Err(e),
                    };
                    if has_finalizer(&obj, K::FINALIZER) == want {
                        debug!(%namespace, %name, "concurrent writer already converged finalizer");
                        return Ok(FinalizerAction::Unchanged);
                    }
                    if conflicts > self.max_retries {
                        warn!(%namespace, %name, conflicts, "giving up on finalizer update");
                        return Err(AdmissionError::StoreConflict(key));
                    }
                    self.backoff(ctx).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn backoff(&self, ctx: &RequestContext) -> AdmissionResult<()> {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ms)
        };
        let delay = self.base_delay + Duration::from_millis(extra);
        tokio::select! {
            biased;
            _ = ctx.cancel_token().cancelled() => Err(AdmissionError::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::workspace::{AccessStrategyRef, TemplateRef};
    use crate::crd::{WorkspaceSpec, WorkspaceTemplateSpec};
    use workspace_store::memory::MemoryStore;

    fn template(ns: &str, name: &str) -> WorkspaceTemplate {
        let mut t = WorkspaceTemplate::new(name, WorkspaceTemplateSpec::default());
        t.metadata.namespace = Some(ns.into());
        t
    }

    fn referencing(name: &str, tpl: &str, tpl_ns: &str) -> Workspace {
        let mut ws = Workspace::new(
            name,
            WorkspaceSpec {
                template_ref: Some(TemplateRef {
                    name: tpl.into(),
                    namespace: tpl_ns.into(),
                }),
                ..Default::default()
            },
        );
        ws.metadata.namespace = Some(tpl_ns.into());
        ws.labels_mut().insert(keys::LABEL_TEMPLATE.into(), tpl.into());
        ws.labels_mut()
            .insert(keys::LABEL_TEMPLATE_NAMESPACE.into(), tpl_ns.into());
        ws
    }

    fn guard(store: &Arc<MemoryStore>) -> FinalizerGuard<MemoryStore> {
        FinalizerGuard::new(store.clone(), 3).with_backoff(Duration::ZERO, Duration::ZERO)
    }

    #[tokio::test]
    async fn adds_once_while_referenced() {
        let store = Arc::new(MemoryStore::new());
        store.insert(template("ns", "t")).await.unwrap();
        store.insert(referencing("ws", "t", "ns")).await.unwrap();
        let g = guard(&store);
        let ctx = RequestContext::system();

        for _ in 0..3 {
            let t: WorkspaceTemplate = store.get("ns", "t").await.unwrap();
            g.reconcile(&ctx, &t).await.unwrap();
        }
        let t: WorkspaceTemplate = store.get("ns", "t").await.unwrap();
        assert!(has_finalizer(&t, keys::TEMPLATE_FINALIZER));
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn removes_once_when_unreferenced() {
        let store = Arc::new(MemoryStore::new());
        let mut t = template("ns", "t");
        t.finalizers_mut().push(keys::TEMPLATE_FINALIZER.into());
        store.insert(t).await.unwrap();
        let g = guard(&store);
        let ctx = RequestContext::system();

        let mut actions = Vec::new();
        for _ in 0..3 {
            let t: WorkspaceTemplate = store.get("ns", "t").await.unwrap();
            actions.push(g.reconcile(&ctx, &t).await.unwrap());
        }
        assert_eq!(
            actions,
            vec![
                FinalizerAction::Removed,
                FinalizerAction::Unchanged,
                FinalizerAction::Unchanged
            ]
        );
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn terminating_and_mislabelled_workspaces_do_not_count() {
        let store = Arc::new(MemoryStore::new());
        store.insert(template("ns", "t")).await.unwrap();

        let mut gone = referencing("gone", "t", "ns");
        gone.metadata.deletion_timestamp =
            serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).unwrap();
        store.insert(gone).await.unwrap();

        let mut drifted = referencing("drifted", "t", "ns");
        drifted.spec.template_ref.as_mut().unwrap().name = "other".into();
        store.insert(drifted).await.unwrap();

        let g = guard(&store);
        let found = g
            .first_active_reference::<WorkspaceTemplate>(&RequestContext::system(), "ns", "t")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn conflict_is_retried_after_refetch() {
        let store = Arc::new(MemoryStore::new());
        store.insert(template("ns", "t")).await.unwrap();
        store.insert(referencing("ws", "t", "ns")).await.unwrap();
        store.inject_conflicts(2);
        let g = guard(&store);

        let t: WorkspaceTemplate = store.get("ns", "t").await.unwrap();
        let action = g.reconcile(&RequestContext::system(), &t).await.unwrap();
        assert_eq!(action, FinalizerAction::Added);
        assert_eq!(store.update_count(), 1);
    }

    #[tokio::test]
    async fn conflict_budget_is_bounded() {
        let store = Arc::new(MemoryStore::new());
        store.insert(template("ns", "t")).await.unwrap();
        store.inject_conflicts(10);
        let g = FinalizerGuard::new(store.clone(), 2).with_backoff(Duration::ZERO, Duration::ZERO);

        let err = g
            .ensure_marker::<WorkspaceTemplate>(&RequestContext::system(), "ns", "t")
            .await
            .unwrap_err();
        assert!(matches!(err, AdmissionError::StoreConflict(_)));
        assert_eq!(store.update_count(), 0);
    }

    #[tokio::test]
    async fn missing_access_strategy_is_not_found() {
        let store = Arc::new(MemoryStore::new());
        let err = guard(&store)
            .ensure_marker::<WorkspaceAccessStrategy>(&RequestContext::system(), "ns", "as")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "WorkspaceAccessStrategy ns/as not found");
    }

    #[test]
    fn access_strategy_reference_uses_resolved_namespace() {
        let mut ws = Workspace::new(
            "ws",
            WorkspaceSpec {
                access_strategy: Some(AccessStrategyRef {
                    name: "as".into(),
                    namespace: String::new(),
                }),
                ..Default::default()
            },
        );
        ws.metadata.namespace = Some("team".into());
        assert!(WorkspaceAccessStrategy::referenced_by(&ws, "as", "team"));
        assert!(!WorkspaceAccessStrategy::referenced_by(&ws, "as", "shared"));
    }
}
