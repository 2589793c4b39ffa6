//! sync tool implementation.
//!
//! Signals restored connectivity and replays queued requests.

use astral_client::OfflineWorker;
use astral_client::worker::ReplayReport;
use astral_core::QueueKind;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the sync tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Queue to replay ("crisis" or "general"). Omit to replay both, crisis first.
    #[serde(default)]
    pub queue: Option<QueueKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutput {
    pub reports: Vec<ReplayReport>,
}

pub async fn sync_impl(worker: &OfflineWorker, params: SyncParams) -> Result<CallToolResult, McpError> {
    let reports = worker.handle_sync(params.queue).await?;
    json_result(&SyncOutput { reports })
}
