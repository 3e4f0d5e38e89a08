mod common;

use std::sync::Arc;

use common::*;
use kube::ResourceExt;
use workspace_admission::crd::keys;
use workspace_admission::crd::{Workspace, WorkspaceTemplate, WorkspaceTemplateSpec};
use workspace_admission::finalizer::{FinalizerAction, FinalizerGuard, has_finalizer};
use workspace_admission::{Operation, RequestContext};
use workspace_store::ObjectStore;
use workspace_store::memory::MemoryStore;

fn guard(store: &Arc<MemoryStore>) -> FinalizerGuard<MemoryStore> {
    FinalizerGuard::new(store.clone(), 5)
        .with_backoff(std::time::Duration::ZERO, std::time::Duration::ZERO)
}

async fn stored_template(store: &MemoryStore) -> WorkspaceTemplate {
    store.get(NS, "base").await.unwrap()
}

/// Admit a workspace bound to `base` and persist the defaulted result.
async fn admit(store: &Arc<MemoryStore>, name: &str) -> Workspace {
    let ws = admission(store)
        .default(
            &as_user("alice", Operation::Create),
            &workspace(name, bound_to("base")),
        )
        .await
        .unwrap();
    store.insert(ws).await.unwrap()
}

/// A stored workspace pointing at `base`, written without going through
/// defaulting.
fn labelled(name: &str) -> Workspace {
    let mut ws = workspace(name, bound_to("base"));
    ws.labels_mut().insert(keys::LABEL_TEMPLATE.into(), "base".into());
    ws.labels_mut()
        .insert(keys::LABEL_TEMPLATE_NAMESPACE.into(), NS.into());
    ws
}

#[test_log::test(tokio::test)]
async fn marker_follows_workspace_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(template("base", WorkspaceTemplateSpec {
            default_image: "img:base".into(),
            ..Default::default()
        }))
        .await
        .unwrap();
    let g = guard(&store);
    let ctx = RequestContext::system();

    admit(&store, "ws").await;
    let action = g.reconcile(&ctx, &stored_template(&store).await).await.unwrap();
    assert_eq!(action, FinalizerAction::Added);
    assert!(has_finalizer(&stored_template(&store).await, keys::TEMPLATE_FINALIZER));

    store.remove::<Workspace>(NS, "ws").await.unwrap();
    let action = g.reconcile(&ctx, &stored_template(&store).await).await.unwrap();
    assert_eq!(action, FinalizerAction::Removed);
    assert!(!has_finalizer(&stored_template(&store).await, keys::TEMPLATE_FINALIZER));
}

#[test_log::test(tokio::test)]
async fn terminating_workspace_releases_template() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(template("base", WorkspaceTemplateSpec::default()))
        .await
        .unwrap();
    let g = guard(&store);
    let ctx = RequestContext::system();

    let mut ws = admit(&store, "ws").await;
    g.reconcile(&ctx, &stored_template(&store).await).await.unwrap();

    ws.metadata.deletion_timestamp =
        serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).unwrap();
    store.insert(ws).await.unwrap();

    let action = g.reconcile(&ctx, &stored_template(&store).await).await.unwrap();
    assert_eq!(action, FinalizerAction::Removed);
}

#[test_log::test(tokio::test)]
async fn concurrent_reconciles_write_once() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(template("base", WorkspaceTemplateSpec::default()))
        .await
        .unwrap();
    for name in ["a", "b"] {
        store.insert(labelled(name)).await.unwrap();
    }
    let before = store.update_count();

    let snapshot = stored_template(&store).await;
    let g1 = guard(&store);
    let g2 = guard(&store);
    let ctx = RequestContext::system();
    let (first, second) = tokio::join!(g1.reconcile(&ctx, &snapshot), g2.reconcile(&ctx, &snapshot));

    let mut actions = vec![first.unwrap(), second.unwrap()];
    actions.sort_by_key(|a| format!("{a:?}"));
    assert_eq!(actions, vec![FinalizerAction::Added, FinalizerAction::Unchanged]);
    assert_eq!(store.update_count() - before, 1);
    assert!(has_finalizer(&stored_template(&store).await, keys::TEMPLATE_FINALIZER));
}
