//! sw_push and sw_notification_click tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use hero_client::OfflineWorker;
use hero_core::push::{ClickOutcome, Notification};

use super::json_result;

/// Parameters for the sw_push tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Raw push payload text, normally a JSON object with `title` and `body`.
    #[serde(default)]
    pub payload: Option<String>,
}

/// Parameters for the sw_notification_click tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ClickParams {
    /// Payload of the push that produced the notification.
    #[serde(default)]
    pub payload: Option<String>,

    /// Action button clicked; omitted for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,
}

/// Output from the sw_notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClickOutput {
    pub notification: Notification,
    pub close: bool,
    pub outcome: ClickOutcome,
}

pub fn push_impl(worker: &OfflineWorker, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = worker.push(params.payload.as_deref().map(str::as_bytes));
    json_result(&notification)
}

pub fn click_impl(worker: &OfflineWorker, params: ClickParams) -> Result<CallToolResult, McpError> {
    let notification = worker.push(params.payload.as_deref().map(str::as_bytes));
    let outcome = worker.notification_click(&notification, params.action.as_deref());
    json_result(&ClickOutput { notification, close: true, outcome })
}
