//! HTTP transport between the interceptor and the application server.
//!
//! ### Request identity
//! - URLs are resolved against the app origin before keying (see [`url`]).
//! - The cache key is (method, absolute URL); headers never vary it.
//!
//! ### Transport
//! - [`Transport`] is the seam the interceptor and the reconciler send
//!   through; [`HttpTransport`] is the reqwest implementation.
//! - A transport error means "the network is unavailable". An HTTP error
//!   status is a successful round trip and is returned as a [`Response`].
//! - No timeout unless configured.

pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use serde::{Deserialize, Serialize};

pub use reqwest::Method;

pub use self::url::{UrlError, is_http, resolve, same_origin};

use hero_core::cache::hash::compute_cache_key;
use hero_core::{AppConfig, CacheEntry, Error};

/// Response headers kept when a response is stored.
pub const CACHED_HEADERS: &[&str] = &["content-type", "cache-control", "etag", "last-modified", "content-language"];

/// Body of the synthetic response for an uncached request while offline.
pub const OFFLINE_BODY: &str = r#"{"error":"Offline - resource not available","offline":true}"#;

/// How the request was issued by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    /// Top-level page navigation.
    Navigate,
    #[default]
    Cors,
    SameOrigin,
    NoCors,
}

/// An outgoing request seen by the interceptor.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: ::url::Url,
    pub mode: RequestMode,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl Request {
    pub fn new(method: Method, url: ::url::Url) -> Self {
        Self { method, url, mode: RequestMode::default(), headers: BTreeMap::new(), body: None }
    }

    pub fn get(url: ::url::Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A page navigation to `url`.
    pub fn navigate(url: ::url::Url) -> Self {
        Self { mode: RequestMode::Navigate, ..Self::get(url) }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    pub fn cache_key(&self) -> String {
        compute_cache_key(self.method.as_str(), self.url.as_str())
    }
}

/// A response handed back to the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The 503 returned for an uncached, non-navigation request while offline.
    pub fn offline() -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        Self { status: 503, headers, body: Bytes::from_static(OFFLINE_BODY.as_bytes()) }
    }

    /// Copy of this response for the cache namespace `namespace`.
    pub fn to_entry(&self, namespace: &str, request: &Request) -> CacheEntry {
        let headers = self
            .headers
            .iter()
            .filter(|(name, _)| CACHED_HEADERS.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        CacheEntry::new(namespace, request.method.as_str(), request.url.as_str(), self.status, headers, self.body.to_vec())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

impl From<CacheEntry> for Response {
    fn from(entry: CacheEntry) -> Self {
        Self { status: entry.status, headers: entry.headers, body: Bytes::from(entry.body) }
    }
}

/// The network could not be reached.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            NetworkError::Timeout
        } else if err.is_connect() {
            NetworkError::Connect(err.to_string())
        } else {
            NetworkError::Other(err.to_string())
        }
    }
}

/// Sends requests to the application server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "hero-sw/0.1")
    pub user_agent: String,

    /// Request timeout; None waits for the network to settle (default: None)
    pub timeout: Option<Duration>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "hero-sw/0.1".to_string(), timeout: None }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self { user_agent: config.user_agent.clone(), timeout: config.network_timeout() }
    }
}

/// reqwest-backed transport.
pub struct HttpTransport {
    http: Client,
    config: FetchConfig,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response, NetworkError> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.clone(), request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();
        let body = response.bytes().await?;

        tracing::debug!(
            "{} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status,
            start.elapsed().as_millis(),
            body.len()
        );

        Ok(Response { status, headers, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(path: &str) -> ::url::Url {
        ::url::Url::parse("https://app.test").unwrap().join(path).unwrap()
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "hero-sw/0.1");
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { network_timeout_ms: Some(2_000), user_agent: "ua".into(), ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "ua");
        assert_eq!(config.timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_offline_response() {
        let response = Response::offline();
        assert_eq!(response.status, 503);
        assert_eq!(response.headers.get("content-type").map(String::as_str), Some("application/json"));
        let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
        assert_eq!(body, serde_json::json!({"error": "Offline - resource not available", "offline": true}));
    }

    #[test]
    fn test_to_entry_keeps_header_subset() {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), "application/json".to_string());
        headers.insert("set-cookie".to_string(), "session=secret".to_string());
        let response = Response { status: 200, headers, body: Bytes::from_static(b"[]") };
        let request = Request::get(url("/api/goals"));

        let entry = response.to_entry("iep-hero-v1", &request);
        assert_eq!(entry.cache_key, request.cache_key());
        assert_eq!(entry.url, "https://app.test/api/goals");
        assert_eq!(entry.headers.len(), 1);
        assert!(!entry.headers.contains_key("set-cookie"));

        let back = Response::from(entry);
        assert_eq!(back.body, response.body);
        assert_eq!(back.status, 200);
    }

    #[test]
    fn test_request_builders() {
        let request = Request::navigate(url("/goals"));
        assert!(request.is_navigation());
        assert_eq!(request.method, Method::GET);

        let request = Request::new(Method::POST, url("/api/goals"))
            .with_header("Content-Type", "application/json")
            .with_body("{}");
        assert!(!request.is_navigation());
        assert_eq!(request.headers.get("content-type").map(String::as_str), Some("application/json"));
        assert_ne!(request.cache_key(), Request::get(url("/api/goals")).cache_key());
    }

    #[tokio::test]
    async fn test_http_transport_new() {
        let transport = HttpTransport::new(FetchConfig::default());
        assert!(transport.is_ok());
    }
}
