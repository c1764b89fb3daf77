//! Relay server — Axum router + shared state.

pub mod api;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::CorsLayer;

use mayfly_core::store::MemoryStore;

/// Shared application state — every room lives in one in-process store.
pub struct AppState {
    pub store: Arc<MemoryStore>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::very_permissive();

    Router::new()
        .merge(api::routes())
        .merge(ws::routes())
        .layer(cors)
        .with_state(state)
}
