//! ads-api: local gateway for a provisioned classifieds stage.
//!
//! Serves the routes of the stage's current deployment snapshot, as recorded
//! by the local control plane, under `/{stage}/...`:
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/{stage}/listings` | `listAds` |
//! | POST | `/{stage}/listings` | `createAd` |
//! | GET | `/{stage}/listings/{id}` | `getAd` |
//! | GET | `/{stage}/listings/{id}/comments` | `listComments` |
//! | POST | `/{stage}/listings/{id}/comments` | `createComment` |
//! | OPTIONS | every node above | CORS pre-flight |
//!
//! The snapshot is read on every request, so re-provisioning takes effect
//! without a restart. Requests are shaped per the bound mapping template,
//! handed to the handler unit named by the function's entry point, and the
//! handler's `statusCode` becomes the HTTP status.

pub mod gateway;
pub mod items;

use std::sync::Arc;

use ads_handlers::ItemStore;
use ads_state::StateStore;
use axum::Router;

pub use gateway::published_deployment;
pub use items::LocalItemStore;

/// Shared state for the gateway handler.
#[derive(Clone)]
pub struct GatewayState {
    pub store: StateStore,
    pub api_name: String,
    pub stage: String,
    pub items: Arc<dyn ItemStore>,
}

impl GatewayState {
    /// Gateway over `store`, keeping table items in the same store.
    pub fn new(store: StateStore, api_name: &str, stage: &str) -> Self {
        let items = Arc::new(LocalItemStore::new(store.clone()));
        Self {
            store,
            api_name: api_name.to_string(),
            stage: stage.to_string(),
            items,
        }
    }

    pub fn with_items(mut self, items: Arc<dyn ItemStore>) -> Self {
        self.items = items;
        self
    }
}

/// Build the gateway router. Routing is resolved per request against the
/// deployed snapshot, so everything goes through one fallback handler.
pub fn build_router(state: GatewayState) -> Router {
    Router::new().fallback(gateway::dispatch).with_state(state)
}
