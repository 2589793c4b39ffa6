//! cache_status tool implementation.
//!
//! Reports lifecycle state, cache contents, pending queue entries and
//! connected clients.

use astral_client::OfflineWorker;
use rmcp::{ErrorData as McpError, model::CallToolResult};

use super::json_result;

pub async fn cache_status_impl(worker: &OfflineWorker) -> Result<CallToolResult, McpError> {
    let status = worker.status().await?;
    json_result(&status)
}
