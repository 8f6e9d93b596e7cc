use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::dao::{
    room_store::{RoomStore, StorePath, StoreSubscription, memory::merge},
    storage::StoreResult,
};

/// Per-path broadcast capacity. Subscribers that lag past this many
/// snapshots skip ahead to the latest one, which is all they need.
const WATCHER_CAPACITY: usize = 16;

/// In-process implementation of the replicated store: a JSON tree behind a
/// lock with per-path broadcast fan-out.
///
/// This backend stands in for the replicated database in tests and
/// single-node deployments; a networked backend plugs in behind the same
/// [`RoomStore`] trait.
pub struct MemoryRoomStore {
    inner: Arc<Inner>,
}

struct Inner {
    tree: RwLock<Value>,
    watchers: DashMap<StorePath, broadcast::Sender<Value>>,
}

impl MemoryRoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                tree: RwLock::new(Value::Object(Map::new())),
                watchers: DashMap::new(),
            }),
        }
    }

    /// Create an empty store already wrapped for shared use.
    pub fn shared() -> Arc<dyn RoomStore> {
        Arc::new(Self::new())
    }
}

impl Default for MemoryRoomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    /// Notify every subscriber whose path overlaps the written one with the
    /// current value at its own path. Runs under the write lock so each
    /// delivered snapshot reflects a consistent tree.
    fn notify(&self, tree: &Value, written: &StorePath) {
        self.watchers.retain(|path, sender| {
            if sender.receiver_count() == 0 {
                return false;
            }
            if path.overlaps(written) {
                let snapshot = merge::value_at(tree, path.segments())
                    .cloned()
                    .unwrap_or(Value::Null);
                let _ = sender.send(snapshot);
            }
            true
        });
    }
}

impl RoomStore for MemoryRoomStore {
    fn get(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>> {
        let inner = self.inner.clone();
        let path = path.clone();
        Box::pin(async move {
            let tree = inner.tree.read().await;
            Ok(merge::value_at(&tree, path.segments()).cloned())
        })
    }

    fn update(
        &self,
        path: &StorePath,
        patch: Map<String, Value>,
    ) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        let path = path.clone();
        Box::pin(async move {
            let mut tree = inner.tree.write().await;
            merge::apply_patch(&mut tree, path.segments(), &patch);
            inner.notify(&tree, &path);
            Ok(())
        })
    }

    fn push(&self, _path: &StorePath) -> BoxFuture<'static, StoreResult<String>> {
        Box::pin(async move { Ok(Uuid::new_v4().simple().to_string()) })
    }

    fn subscribe(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<StoreSubscription>> {
        let inner = self.inner.clone();
        let path = path.clone();
        Box::pin(async move {
            // Hold the read lock across receiver creation and the initial
            // snapshot so no update can slip between the two.
            let tree = inner.tree.read().await;
            let updates = inner
                .watchers
                .entry(path.clone())
                .or_insert_with(|| broadcast::channel(WATCHER_CAPACITY).0)
                .subscribe();
            let initial = merge::value_at(&tree, path.segments()).cloned();
            Ok(StoreSubscription { initial, updates })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patch(entries: &[(&str, Value)]) -> Map<String, Value> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn update_then_get_round_trips() {
        let store = MemoryRoomStore::new();
        let room = StorePath::new(["rooms", "ab12cd34"]);

        store
            .update(&room, patch(&[("reveal", json!(false))]))
            .await
            .unwrap();

        let snapshot = store.get(&room).await.unwrap();
        assert_eq!(snapshot, Some(json!({"reveal": false})));
        assert_eq!(store.get(&room.child("reveal")).await.unwrap(), Some(json!(false)));
    }

    #[tokio::test]
    async fn subscriber_sees_descendant_writes() {
        let store = MemoryRoomStore::new();
        let room = StorePath::new(["rooms", "ab12cd34"]);
        store
            .update(&room, patch(&[("reveal", json!(false))]))
            .await
            .unwrap();

        let mut subscription = store.subscribe(&room).await.unwrap();
        assert_eq!(subscription.initial, Some(json!({"reveal": false})));

        store
            .update(&room.child("timer"), patch(&[("enabled", json!(true))]))
            .await
            .unwrap();

        let snapshot = subscription.updates.recv().await.unwrap();
        assert_eq!(
            snapshot,
            json!({"reveal": false, "timer": {"enabled": true}})
        );
    }

    #[tokio::test]
    async fn unrelated_writes_do_not_notify() {
        let store = MemoryRoomStore::new();
        let room_a = StorePath::new(["rooms", "aaaaaaaa"]);
        let room_b = StorePath::new(["rooms", "bbbbbbbb"]);

        let mut subscription = store.subscribe(&room_a).await.unwrap();
        store
            .update(&room_b, patch(&[("reveal", json!(true))]))
            .await
            .unwrap();

        assert!(matches!(
            subscription.updates.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));
    }

    #[tokio::test]
    async fn removal_delivers_null_snapshot() {
        let store = MemoryRoomStore::new();
        let room = StorePath::new(["rooms", "ab12cd34"]);
        store
            .update(&room, patch(&[("title", json!("Sprint 12"))]))
            .await
            .unwrap();

        let mut subscription = store.subscribe(&room.child("title")).await.unwrap();
        assert_eq!(subscription.initial, Some(json!("Sprint 12")));

        store
            .update(&room, patch(&[("title", Value::Null)]))
            .await
            .unwrap();
        assert_eq!(subscription.updates.recv().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn push_mints_distinct_ids() {
        let store = MemoryRoomStore::new();
        let path = StorePath::new(["rooms", "x", "participants"]);
        let first = store.push(&path).await.unwrap();
        let second = store.push(&path).await.unwrap();
        assert_ne!(first, second);
        assert!(!first.is_empty());
    }
}
