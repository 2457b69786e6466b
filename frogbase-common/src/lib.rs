//! # FrogBase Common Library
//!
//! Shared code for the FrogBase crates including:
//! - Error type and result alias
//! - Configuration file loading and root folder resolution
//! - SQLite schema initialization for a library database
//! - Ingest event types and the broadcast event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
