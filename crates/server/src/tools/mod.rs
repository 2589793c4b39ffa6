//! MCP tool implementations.
//!
//! This module contains all tools exposed by the worker server. Each tool
//! answers with one text content block holding pretty-printed JSON.

pub mod crisis;
pub mod fetch;
pub mod lifecycle;
pub mod messages;
pub mod push;
pub mod status;
pub mod sync;

use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content},
};
use serde::Serialize;

use crate::error::ToolError;

pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| ToolError::OutputFailed(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
