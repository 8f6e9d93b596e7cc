pub mod memory;
mod path;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::sync::broadcast;

use crate::dao::storage::StoreResult;

pub use self::path::StorePath;

/// Handed out by [`RoomStore::subscribe`]: the value at subscription time
/// plus a channel of subsequent snapshots for the same path.
pub struct StoreSubscription {
    /// Snapshot of the subscribed subtree at subscription time, if present.
    pub initial: Option<Value>,
    /// Latest-value snapshots delivered after every overlapping write.
    pub updates: broadcast::Receiver<Value>,
}

/// Abstraction over the replicated, subscription-capable data tree that
/// backs every room.
///
/// Implementations guarantee at-least-once delivery of the latest value per
/// subscribed path and atomicity at single-`update` granularity; nothing
/// more. Callers that need several fields to change together must cover
/// them with one `update` call.
pub trait RoomStore: Send + Sync {
    /// Read-once fetch of the subtree at `path`.
    fn get(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<Option<Value>>>;

    /// Atomic partial update rooted at `path`.
    ///
    /// Patch keys are slash-separated paths relative to `path`; each entry
    /// replaces the subtree at its location, and a `null` value removes it.
    fn update(
        &self,
        path: &StorePath,
        patch: Map<String, Value>,
    ) -> BoxFuture<'static, StoreResult<()>>;

    /// Mint a store-assigned child id under `path` without writing.
    fn push(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<String>>;

    /// Open a standing subscription on the subtree at `path`.
    fn subscribe(&self, path: &StorePath) -> BoxFuture<'static, StoreResult<StoreSubscription>>;
}
