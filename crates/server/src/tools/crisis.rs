//! detect_crisis tool implementation.

use astral_client::crisis;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the detect_crisis tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DetectCrisisParams {
    /// Free text to scan.
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectCrisisOutput {
    pub crisis: bool,
    /// Labels of the matched phrases.
    pub terms: Vec<&'static str>,
}

pub async fn detect_crisis_impl(params: DetectCrisisParams) -> Result<CallToolResult, McpError> {
    let terms = crisis::detect(&params.text);
    json_result(&DetectCrisisOutput { crisis: !terms.is_empty(), terms })
}
