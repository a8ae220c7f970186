//! MCP tool implementations.
//!
//! Each worker event and cache inspection operation is one tool. Tools take
//! JSON parameters and answer with pretty-printed JSON text content.

pub mod cache;
pub mod fetch;
pub mod lifecycle;
pub mod push;
pub mod queue;

use std::collections::BTreeMap;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use hero_client::Method;

use crate::error::ToolError;

/// Encode `output` as the tool's text result.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output).map_err(|e| ToolError::Output(e.to_string()))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

pub(crate) fn parse_method(method: &str) -> Result<Method, ToolError> {
    Method::from_bytes(method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| ToolError::InvalidInput(format!("invalid HTTP method: {method}")))
}

/// Header names lower-cased; empty names rejected.
pub(crate) fn normalize_headers(headers: BTreeMap<String, String>) -> Result<BTreeMap<String, String>, ToolError> {
    headers
        .into_iter()
        .map(|(name, value)| {
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return Err(ToolError::InvalidInput("header name cannot be empty".into()));
            }
            Ok((name, value))
        })
        .collect()
}

/// Bodies cross the tool boundary as text.
pub(crate) fn body_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

fn default_get() -> String {
    "GET".into()
}

fn default_post() -> String {
    "POST".into()
}
