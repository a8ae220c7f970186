//! cache_get tool implementation.
//!
//! Looks up a stored response by method and URL, or lists the cache
//! namespaces when no URL is given.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::OfflineWorker;
use hero_core::{CacheEntry, Error, cache::hash::compute_cache_key};

use crate::tools::{body_text, default_get, json_result, parse_method};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// Path or absolute URL of the cached resource. Omit to list namespaces.
    #[serde(default)]
    pub url: Option<String>,

    /// HTTP method the response was stored under (default: GET).
    #[serde(default = "default_get")]
    pub method: String,

    /// Namespace to read; the current version's cache by default.
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A cached response as returned by the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetOutput {
    pub namespace: String,
    pub cache_key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub stored_at: String,
}

impl From<CacheEntry> for CacheGetOutput {
    fn from(entry: CacheEntry) -> Self {
        Self {
            body: body_text(&entry.body),
            namespace: entry.namespace,
            cache_key: entry.cache_key,
            method: entry.method,
            url: entry.url,
            status: entry.status,
            headers: entry.headers,
            stored_at: entry.stored_at,
        }
    }
}

pub async fn get_impl(worker: &OfflineWorker, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let Some(url) = params.url else {
        return json_result(&worker.db().list_namespaces().await?);
    };

    let url = worker.resolve(&url)?;
    let method = parse_method(&params.method)?;
    let namespace = params
        .namespace
        .unwrap_or_else(|| worker.cache_name().to_string());
    let key = compute_cache_key(method.as_str(), url.as_str());

    let entry = worker
        .db()
        .match_entry(&namespace, &key)
        .await?
        .ok_or_else(|| Error::CacheMiss(format!("{method} {url} in {namespace}")))?;

    json_result(&CacheGetOutput::from(entry))
}
