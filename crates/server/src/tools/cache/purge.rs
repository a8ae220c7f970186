//! cache_purge tool implementation.
//!
//! Purges whole namespaces, entries by URL, or the least recently stored
//! entries of the current cache.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::OfflineWorker;
use hero_core::Error;

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Delete this namespace and every entry in it.
    #[serde(default)]
    pub namespace: Option<String>,

    /// Delete entries whose URL contains this substring, in every namespace.
    #[serde(default)]
    pub url_pattern: Option<String>,

    /// Keep only the newest N entries of the current cache (LRU purge).
    #[serde(default)]
    pub max_entries: Option<usize>,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// Number of entries deleted.
    pub deleted: u64,
    /// Namespaces removed.
    pub namespaces: Vec<String>,
}

pub async fn purge_impl(worker: &OfflineWorker, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    if params.namespace.is_none() && params.url_pattern.is_none() && params.max_entries.is_none() {
        return Err(
            Error::InvalidInput("At least one of namespace, url_pattern, or max_entries must be specified".into())
                .into(),
        );
    }

    let db = worker.db();
    let mut output = CachePurgeOutput { deleted: 0, namespaces: Vec::new() };

    if let Some(namespace) = params.namespace {
        let entries = db.count_entries(&namespace).await?;
        if db.delete_namespace(&namespace).await? {
            output.deleted += entries;
            output.namespaces.push(namespace);
        }
    }

    if let Some(pattern) = params.url_pattern {
        if pattern.is_empty() {
            return Err(Error::InvalidInput("url_pattern cannot be empty".into()).into());
        }
        output.deleted += db.purge_entries_by_url(&pattern).await?;
    }

    if let Some(max_entries) = params.max_entries {
        output.deleted += db.purge_lru_entries(worker.cache_name(), max_entries).await?;
    }

    tracing::info!(deleted = output.deleted, namespaces = output.namespaces.len(), "cache purged");
    json_result(&output)
}
