//! sw_install, sw_activate and sw_status tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::OfflineWorker;
use hero_core::{NamespaceInfo, WorkerState};

use super::json_result;

/// Output from the sw_status tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusOutput {
    pub version: String,
    pub state: WorkerState,
    /// Cache serving fetches for this version.
    pub cache_name: String,
    pub caches: Vec<NamespaceInfo>,
    pub queues: Vec<QueueStatus>,
    /// Tags still waiting for a sync pass.
    pub registered_tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueueStatus {
    pub tag: String,
    pub namespace: String,
    pub pending: u64,
}

pub async fn install_impl(worker: &OfflineWorker) -> Result<CallToolResult, McpError> {
    let report = worker.install().await?;
    json_result(&report)
}

pub async fn activate_impl(worker: &OfflineWorker) -> Result<CallToolResult, McpError> {
    let report = worker.activate().await?;
    json_result(&report)
}

pub async fn status_impl(worker: &OfflineWorker) -> Result<CallToolResult, McpError> {
    let db = worker.db();
    let mut queues = Vec::new();
    for queue in &worker.config().sync_queues {
        let pending = db.count_pending(&queue.namespace).await?;
        queues.push(QueueStatus { tag: queue.tag.clone(), namespace: queue.namespace.clone(), pending });
    }

    let output = StatusOutput {
        version: worker.config().cache_version.clone(),
        state: worker.state().await,
        cache_name: worker.cache_name().to_string(),
        caches: db.list_namespaces().await?,
        queues,
        registered_tags: db.registered_tags().await?,
    };
    json_result(&output)
}
