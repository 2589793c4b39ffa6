//! lifecycle tool implementation.
//!
//! Drives the worker through install and activate.

use astral_client::OfflineWorker;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LifecyclePhase {
    /// Pre-cache the critical resource set.
    Install,
    /// Drop stale caches, repair critical entries and claim clients.
    Activate,
}

/// Parameters for the lifecycle tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LifecycleParams {
    /// Phase to run.
    pub phase: LifecyclePhase,
}

/// Output from the lifecycle tool.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutput {
    /// Worker state after the phase.
    pub state: String,
    /// Phase report.
    pub report: serde_json::Value,
}

pub async fn lifecycle_impl(worker: &OfflineWorker, params: LifecycleParams) -> Result<CallToolResult, McpError> {
    let report = match params.phase {
        LifecyclePhase::Install => serde_json::to_value(worker.install().await?),
        LifecyclePhase::Activate => serde_json::to_value(worker.activate().await?),
    }
    .map_err(astral_core::Error::from)?;

    let output = LifecycleOutput { state: worker.state().await.to_string(), report };
    json_result(&output)
}
