//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker event implementations.
use std::sync::Arc;

use crate::tools::{
    cache::{CacheGetParams, CachePurgeParams, get_impl, purge_impl},
    fetch::{FetchParams, fetch_impl},
    lifecycle::{activate_impl, install_impl, status_impl},
    push::{ClickParams, PushParams, click_impl, push_impl},
    queue::{EnqueueParams, SyncParams, enqueue_impl, sync_impl},
};

use hero_client::OfflineWorker;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};

/// The MCP server handler for hero-sw.
#[derive(Clone)]
pub struct HeroSwServer {
    worker: Arc<OfflineWorker>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl HeroSwServer {
    pub fn new(worker: Arc<OfflineWorker>) -> Self {
        Self { worker, tool_router: Self::tool_router() }
    }

    #[tool(description = "Install event: pre-cache the install manifest into the current version's cache.")]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.worker).await
    }

    #[tool(description = "Activate event: make the installed version current and delete every older cache.")]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.worker).await
    }

    /// Fetch event.
    ///
    /// Network first; falls back to the cache, the app shell for navigations,
    /// or a 503 JSON body when offline.
    #[tool(
        description = "Fetch event: request a URL network-first with offline fallback. Returns status, headers, body and where the response came from."
    )]
    async fn sw_fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(description = "Defer a mutation made while offline under a sync tag.")]
    async fn sw_enqueue(&self, params: Parameters<EnqueueParams>) -> Result<CallToolResult, McpError> {
        enqueue_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Sync event: replay deferred actions for a tag, or for every registered tag when none is given."
    )]
    async fn sw_sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.worker, params.0).await
    }

    #[tool(description = "Push event: build the notification to display for a push payload.")]
    async fn sw_push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.worker, params.0)
    }

    #[tool(description = "Notification click event: close the notification and return the page to open, if any.")]
    async fn sw_notification_click(&self, params: Parameters<ClickParams>) -> Result<CallToolResult, McpError> {
        click_impl(&self.worker, params.0)
    }

    #[tool(description = "Lifecycle state, caches with entry counts, and pending deferred actions.")]
    async fn sw_status(&self) -> Result<CallToolResult, McpError> {
        status_impl(&self.worker).await
    }

    #[tool(description = "Retrieve a cached response by method and URL, or list caches when no URL is given.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.worker, params.0).await
    }

    #[tool(description = "Purge a cache namespace, entries by URL substring, or the current cache down to N entries.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.worker, params.0).await
    }
}

impl ServerHandler for HeroSwServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "hero-sw".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
