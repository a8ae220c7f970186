//! sw_fetch tool implementation.
//!
//! Hands one page request to the network-first interceptor. The reply waits
//! for the cache write the interception started, so a following `cache_get`
//! sees it.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::{FetchOutcome, OfflineWorker, Request, RequestMode, ResponseSource};

use super::{body_text, default_get, json_result, normalize_headers, parse_method};

/// Parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Path or absolute URL; paths resolve against the app origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_get")]
    pub method: String,

    /// Whether this is a top-level page navigation.
    #[serde(default)]
    pub navigate: bool,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body as text.
    #[serde(default)]
    pub body: Option<String>,
}

/// Output from the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchOutput {
    pub url: String,
    /// False when the request was left to the host untouched.
    pub intercepted: bool,
    /// One of network, cache, shell, offline.
    pub source: Option<String>,
    pub status: Option<u16>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<String>,
}

fn source_name(source: ResponseSource) -> &'static str {
    match source {
        ResponseSource::Network => "network",
        ResponseSource::Cache => "cache",
        ResponseSource::Shell => "shell",
        ResponseSource::Offline => "offline",
    }
}

pub async fn fetch_impl(worker: &OfflineWorker, params: FetchParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let mut request = Request::new(parse_method(&params.method)?, url.clone());
    if params.navigate {
        request.mode = RequestMode::Navigate;
    }
    request.headers = normalize_headers(params.headers)?;
    request.body = params.body.map(Into::into);

    let outcome = worker.fetch(&request).await?.settle().await;
    let output = match outcome {
        FetchOutcome::Bypass => FetchOutput {
            url: url.to_string(),
            intercepted: false,
            source: None,
            status: None,
            headers: BTreeMap::new(),
            body: None,
        },
        FetchOutcome::Respond { response, source } => FetchOutput {
            url: url.to_string(),
            intercepted: true,
            source: Some(source_name(source).to_string()),
            status: Some(response.status),
            body: Some(body_text(&response.body)),
            headers: response.headers,
        },
    };
    json_result(&output)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::tools::test_support::{ReplayTransport, output_json, worker_with};

    fn params(url: &str) -> FetchParams {
        FetchParams { url: url.into(), method: "GET".into(), navigate: false, headers: BTreeMap::new(), body: None }
    }

    #[tokio::test]
    async fn test_fetch_requires_active_worker() {
        let worker = worker_with(Arc::new(ReplayTransport::new(true))).await;
        let err = fetch_impl(&worker, params("/api/goals")).await.unwrap_err();
        assert_eq!(err.code.0, -32021);
    }

    #[tokio::test]
    async fn test_fetch_network_then_cache() {
        let transport = Arc::new(ReplayTransport::new(true));
        let worker = worker_with(transport.clone()).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let online = output_json(&fetch_impl(&worker, params("/api/goals")).await.unwrap());
        assert_eq!(online["source"], "network");
        assert_eq!(online["body"], "ok https://app.test/api/goals");

        transport.set_online(false);
        let offline = output_json(&fetch_impl(&worker, params("/api/goals")).await.unwrap());
        assert_eq!(offline["source"], "cache");
        assert_eq!(offline["status"], 200);
        assert_eq!(offline["body"], "ok https://app.test/api/goals");

        let miss = output_json(&fetch_impl(&worker, params("/api/messages")).await.unwrap());
        assert_eq!(miss["source"], "offline");
        assert_eq!(miss["status"], 503);

        let page = FetchParams { navigate: true, ..params("/goals/7") };
        let shell = output_json(&fetch_impl(&worker, page).await.unwrap());
        assert_eq!(shell["source"], "shell");
        assert_eq!(shell["body"], "ok https://app.test/");
    }

    #[tokio::test]
    async fn test_fetch_cross_origin_not_intercepted() {
        let worker = worker_with(Arc::new(ReplayTransport::new(true))).await;
        worker.install().await.unwrap();
        worker.activate().await.unwrap();

        let output = output_json(&fetch_impl(&worker, params("https://cdn.test/lib.js")).await.unwrap());
        assert_eq!(output["intercepted"], false);
        assert!(output["status"].is_null());
    }

    #[tokio::test]
    async fn test_fetch_rejects_bad_method() {
        let worker = worker_with(Arc::new(ReplayTransport::new(true))).await;
        let bad = FetchParams { method: "BAD METHOD".into(), ..params("/") };
        assert_eq!(fetch_impl(&worker, bad).await.unwrap_err().code.0, -32602);
    }
}
