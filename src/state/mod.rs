pub mod room;
pub mod voting;

use std::sync::Arc;

use crate::{config::AppConfig, dao::room_store::RoomStore};

/// Shared handle to the application state.
pub type SharedState = Arc<AppState>;

/// Central application state: the replicated store handle and the runtime
/// configuration. Everything else lives in the store's tree.
pub struct AppState {
    store: Arc<dyn RoomStore>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct the shared state over a store backend and configuration.
    pub fn new(store: Arc<dyn RoomStore>, config: AppConfig) -> SharedState {
        Arc::new(Self {
            store,
            config: Arc::new(config),
        })
    }

    /// Handle to the replicated store.
    pub fn store(&self) -> Arc<dyn RoomStore> {
        self.store.clone()
    }

    /// Handle to the runtime configuration.
    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }
}
