//! fetch tool implementation.
//!
//! Hands an intercepted request to the worker and reports the route taken
//! along with the response it produced.

use std::collections::BTreeMap;

use astral_client::OfflineWorker;
use astral_core::{Destination, Request, RequestMode, ResponseSource};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Request URL, absolute or relative to the worker origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request body as text.
    #[serde(default)]
    pub body: Option<String>,

    /// Request mode; "navigate" marks a page navigation.
    #[serde(default)]
    pub mode: RequestMode,

    /// Request destination; "document" also marks a page load.
    #[serde(default)]
    pub destination: Destination,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutput {
    /// Route that matched the request.
    pub route: String,
    pub status: u16,
    /// Network, cache or fallback.
    pub source: ResponseSource,
    pub headers: BTreeMap<String, String>,
    /// Response body decoded as UTF-8.
    pub body: String,
}

pub async fn fetch_impl(worker: &OfflineWorker, params: FetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(ToolError::InvalidInput("url cannot be empty".into()).into());
    }
    if params.method.is_empty() || !params.method.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ToolError::InvalidInput(format!("invalid method: {:?}", params.method)).into());
    }

    let mut request = Request::new(params.method, params.url);
    for (name, value) in params.headers {
        request = request.with_header(&name, value);
    }
    request.body = params.body.map(String::into_bytes);
    request.mode = params.mode;
    request.destination = params.destination;

    let route = worker.router().route(&request).map(|m| m.route).unwrap_or("invalid");
    let response = worker.handle_fetch(request).await;

    let output = FetchOutput {
        route: route.to_string(),
        status: response.status,
        source: response.source,
        body: response.text(),
        headers: response.headers,
    };
    json_result(&output)
}
