//! sw_enqueue and sw_sync tool implementations.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::OfflineWorker;
use hero_core::PendingRequest;

use super::{default_post, json_result, normalize_headers, parse_method};

/// Parameters for the sw_enqueue tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueParams {
    /// Sync tag, e.g. `sync-memory-questions`.
    pub tag: String,

    /// Path or absolute URL of the deferred mutation.
    pub url: String,

    /// HTTP method (default: POST).
    #[serde(default = "default_post")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,
}

/// Output from the sw_enqueue tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnqueueOutput {
    pub id: i64,
    pub tag: String,
    pub namespace: String,
    pub enqueued_at: String,
}

/// Parameters for the sw_sync tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Tag to reconcile; every registered tag when omitted.
    #[serde(default)]
    pub tag: Option<String>,
}

pub async fn enqueue_impl(worker: &OfflineWorker, params: EnqueueParams) -> Result<CallToolResult, McpError> {
    let url = worker.resolve(&params.url)?;
    let request = PendingRequest {
        method: parse_method(&params.method)?.to_string(),
        url: url.to_string(),
        headers: normalize_headers(params.headers)?,
        body: params.body.map(String::into_bytes),
    };

    let action = worker.enqueue(&params.tag, &request).await?;
    json_result(&EnqueueOutput {
        id: action.id,
        tag: action.tag,
        namespace: action.namespace,
        enqueued_at: action.enqueued_at,
    })
}

pub async fn sync_impl(worker: &OfflineWorker, params: SyncParams) -> Result<CallToolResult, McpError> {
    let reports = match params.tag {
        Some(tag) => vec![worker.sync(&tag).await?],
        None => worker.sync_registered().await?,
    };
    json_result(&reports)
}
