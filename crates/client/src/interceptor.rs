//! Network-first fetch interception.
//!
//! 1. Requests with a non-http(s) scheme, or cross-origin requests when
//!    restricted to the app origin, are not intercepted.
//! 2. The network is tried first, unmodified.
//! 3. A 2xx answer to a GET is stored by a detached task and returned at once.
//! 4. When the network is unreachable: cached entry, else the root shell for
//!    navigations, else a synthetic 503.
//!
//! Nothing is retried here; deferred mutations go through the sync queue.

use std::sync::Arc;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use hero_core::cache::hash::compute_cache_key;
use hero_core::{CacheDb, CacheEntry};

use crate::event::Extended;
use crate::fetch::{Request, Response, Transport, is_http, same_origin};

/// Where the response handed to the page came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Cached root route, served for an uncached navigation.
    Shell,
    /// Synthetic 503.
    Offline,
}

/// Result of intercepting one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Not intercepted; the host sends the request itself.
    Bypass,
    Respond { response: Response, source: ResponseSource },
}

/// The network-first policy over one cache namespace.
pub struct NetworkFirst {
    db: CacheDb,
    transport: Arc<dyn Transport>,
    cache_name: String,
    origin: Url,
    shell_url: Url,
    same_origin_only: bool,
}

impl NetworkFirst {
    pub fn new(
        db: CacheDb, transport: Arc<dyn Transport>, cache_name: String, origin: Url, same_origin_only: bool,
    ) -> Self {
        let shell_url = origin.join("/").unwrap_or_else(|_| origin.clone());
        Self { db, transport, cache_name, origin, shell_url, same_origin_only }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn intercepts(&self, request: &Request) -> bool {
        is_http(&request.url) && (!self.same_origin_only || same_origin(&request.url, &self.origin))
    }

    /// Answer a request.
    ///
    /// The returned event carries the pending cache write, if any.
    pub async fn handle(&self, request: &Request) -> Extended<FetchOutcome> {
        if !self.intercepts(request) {
            tracing::debug!("not intercepting {} {}", request.method, request.url);
            return Extended::new(FetchOutcome::Bypass);
        }

        match self.transport.send(request).await {
            Ok(response) => {
                let store = response.is_success() && request.method == Method::GET;
                let task = store.then(|| self.spawn_store(response.to_entry(&self.cache_name, request)));
                let event = Extended::new(FetchOutcome::Respond { response, source: ResponseSource::Network });
                match task {
                    Some(task) => event.wait_until(task),
                    None => event,
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "network failed for {} {}, falling back to cache", request.method, request.url);
                Extended::new(self.fallback(request).await)
            }
        }
    }

    fn spawn_store(&self, entry: CacheEntry) -> tokio::task::JoinHandle<()> {
        let db = self.db.clone();
        tokio::spawn(async move {
            match db.put_entry(&entry).await {
                Ok(()) => tracing::debug!("cached {} {} in {}", entry.method, entry.url, entry.namespace),
                Err(e) => tracing::warn!(error = %e, url = %entry.url, "failed to cache response"),
            }
        })
    }

    async fn fallback(&self, request: &Request) -> FetchOutcome {
        if let Some(entry) = self.lookup(&request.cache_key()).await {
            tracing::debug!("cache hit for {}", request.url);
            return FetchOutcome::Respond { response: entry.into(), source: ResponseSource::Cache };
        }

        if request.is_navigation() {
            let shell_key = compute_cache_key(Method::GET.as_str(), self.shell_url.as_str());
            if let Some(entry) = self.lookup(&shell_key).await {
                tracing::debug!("serving cached shell for {}", request.url);
                return FetchOutcome::Respond { response: entry.into(), source: ResponseSource::Shell };
            }
        }

        tracing::debug!("offline with no cached copy of {}", request.url);
        FetchOutcome::Respond { response: Response::offline(), source: ResponseSource::Offline }
    }

    /// Cache read that treats a store failure as a miss.
    async fn lookup(&self, cache_key: &str) -> Option<CacheEntry> {
        match self.db.match_entry(&self.cache_name, cache_key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "cache lookup failed");
                None
            }
        }
    }
}
