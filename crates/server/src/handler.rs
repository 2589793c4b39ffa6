//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the worker engine.
use std::sync::Arc;

use astral_client::OfflineWorker;
use astral_client::worker::ClientHandle;
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
use tokio::sync::Mutex;

use crate::tools::crisis::{DetectCrisisParams, detect_crisis_impl};
use crate::tools::fetch::{FetchParams, fetch_impl};
use crate::tools::lifecycle::{LifecycleParams, lifecycle_impl};
use crate::tools::messages::{PostMessageParams, poll_messages_impl, post_message_impl};
use crate::tools::push::{NotificationClickParams, PushParams, notification_click_impl, push_impl};
use crate::tools::status::cache_status_impl;
use crate::tools::sync::{SyncParams, sync_impl};

/// The main MCP server handler for the offline worker.
#[derive(Clone)]
pub struct AstralWorkerServer {
    tool_router: ToolRouter<Self>,
    worker: Arc<OfflineWorker>,
    /// The MCP host's own page context.
    inbox: Arc<Mutex<ClientHandle>>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl AstralWorkerServer {
    /// Create a new server handler, registering the host as a page context at `client_url`.
    pub fn new(worker: Arc<OfflineWorker>, client_url: &str) -> Self {
        let inbox = Arc::new(Mutex::new(worker.bridge().connect(client_url)));
        Self { tool_router: Self::tool_router(), worker, inbox }
    }

    #[tool(description = "Run a worker lifecycle phase: install (pre-cache crisis resources) or activate.")]
    async fn lifecycle(&self, params: Parameters<LifecycleParams>) -> Result<CallToolResult, McpError> {
        lifecycle_impl(&self.worker, params.0).await
    }

    /// Intercept a request.
    ///
    /// Routes the request through cache-first, network-first or queue-on-failure
    /// handling and always answers, falling back to offline content when needed.
    #[tool(
        description = "Intercept a page request (method, url, headers, body, mode). Returns the route taken and the response, served from network, cache, or an offline fallback."
    )]
    async fn fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.worker, params.0).await
    }

    #[tool(
        description = "Post a page message to the worker: SKIP_WAITING, CRISIS_MODE_ACTIVATED, REQUEST_NOTIFICATION_PERMISSION, SUBSCRIBE_TO_PUSH, CACHE_CRISIS_RESOURCES."
    )]
    async fn post_message(&self, params: Parameters<PostMessageParams>) -> Result<CallToolResult, McpError> {
        post_message_impl(&self.worker, &self.inbox, params.0).await
    }

    #[tool(description = "Drain messages the worker broadcast to page contexts.")]
    async fn poll_messages(&self) -> Result<CallToolResult, McpError> {
        poll_messages_impl(&self.inbox).await
    }

    #[tool(description = "Signal restored connectivity and replay queued background-sync requests.")]
    async fn sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.worker, params.0).await
    }

    #[tool(description = "Build the notification shown for a push message body.")]
    async fn push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.worker, params.0).await
    }

    #[tool(description = "Resolve a notification click to a client to focus or a window to open.")]
    async fn notification_click(&self, params: Parameters<NotificationClickParams>) -> Result<CallToolResult, McpError> {
        notification_click_impl(&self.worker, params.0).await
    }

    #[tool(description = "Check free text for crisis phrases. Presence-only keyword match, not a risk assessment.")]
    async fn detect_crisis(&self, params: Parameters<DetectCrisisParams>) -> Result<CallToolResult, McpError> {
        detect_crisis_impl(params.0).await
    }

    #[tool(description = "Report worker state, cache contents, missing critical resources, and pending sync queue entries.")]
    async fn cache_status(&self) -> Result<CallToolResult, McpError> {
        cache_status_impl(&self.worker).await
    }
}

impl ServerHandler for AstralWorkerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "astral-worker".into(),
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
