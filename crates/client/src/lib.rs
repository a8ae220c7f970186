//! Client side of hero-sw.
//!
//! This crate provides the network-first fetch interceptor, deferred action
//! replay, and the offline worker that ties lifecycle events together.

pub mod event;
pub mod fetch;
pub mod interceptor;
pub mod sync;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use event::Extended;
pub use fetch::{FetchConfig, HttpTransport, Method, NetworkError, Request, RequestMode, Response, Transport};
pub use interceptor::{FetchOutcome, NetworkFirst, ResponseSource};
pub use sync::{ReplayError, ReplayHandler, SyncReconciler, SyncReport, TransportReplay};
pub use worker::{ActivateReport, InstallReport, OfflineWorker};
