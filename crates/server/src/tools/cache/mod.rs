//! Cache inspection tools.
//!
//! Read and purge the SQLite-backed response caches directly, outside the
//! fetch path.

pub mod get;
pub mod purge;

pub use get::{CacheGetParams, get_impl};
pub use purge::{CachePurgeParams, purge_impl};
