//! SQLite-backed store for versioned response caches and deferred actions.
//!
//! This module provides a persistent store using SQLite with async access via
//! tokio-rusqlite. It supports:
//!
//! - Named cache namespaces, one per deploy version
//! - Request-addressed entries replaced whole by UPSERT
//! - Deferred action queues with background-sync registrations
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod queue;

use std::collections::BTreeMap;

use tokio_rusqlite::rusqlite;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, NamespaceInfo};
pub use queue::{PendingAction, PendingRequest};

/// Timestamp format used for every stored row; fixed width so rows sort lexically.
pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

pub(crate) fn encode_headers(headers: &BTreeMap<String, String>) -> Result<String, Error> {
    serde_json::to_string(headers).map_err(|e| Error::Corrupt(format!("headers: {e}")))
}

pub(crate) fn decode_headers(idx: usize, json: &str) -> rusqlite::Result<BTreeMap<String, String>> {
    serde_json::from_str(json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}
