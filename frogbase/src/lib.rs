//! FrogBase library interface
//!
//! Turns spoken media into searchable text: sources are resolved, fetched,
//! transcribed into segments, embedded and indexed; queries are answered
//! from the index. `Library` is the entry point; the HTTP API and CLI are
//! thin layers over it.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod index;
pub mod ingest;
pub mod library;
pub mod models;
pub mod search;
pub mod services;

pub use crate::error::{ApiError, ApiResult, IngestError, IngestResult};
pub use crate::library::{list_libraries, remove_library, Backends, Library, MediaDetail};

use axum::Router;
use chrono::{DateTime, Utc};
use frogbase_common::events::EventBus;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub library: Arc<Library>,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Cancellation tokens for running add batches
    pub cancellation_tokens: Arc<RwLock<HashMap<Uuid, CancellationToken>>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last background error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(library: Arc<Library>) -> Self {
        let event_bus = library.events().clone();
        Self {
            library,
            event_bus,
            cancellation_tokens: Arc::new(RwLock::new(HashMap::new())),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::media_routes())
        .merge(api::search_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
