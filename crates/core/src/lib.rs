//! Core types and shared functionality for hero-sw.
//!
//! This crate provides:
//! - Versioned response cache and deferred action queue with a SQLite backend
//! - Worker lifecycle state machine
//! - Push notification payload handling
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod push;

pub use cache::{CacheDb, CacheEntry, NamespaceInfo, PendingAction, PendingRequest};
pub use config::{AppConfig, SyncQueueConfig};
pub use error::Error;
pub use lifecycle::WorkerState;
