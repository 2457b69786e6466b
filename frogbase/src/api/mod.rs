//! HTTP API handlers
//!
//! REST endpoints over one library plus a server-sent event stream of
//! ingest progress.

pub mod health;
pub mod media;
pub mod search;
pub mod sse;

pub use health::health_routes;
pub use media::media_routes;
pub use search::search_routes;
pub use sse::event_stream;
