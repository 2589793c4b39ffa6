//! push and notification_click tool implementations.

use astral_client::OfflineWorker;
use astral_client::worker::{ClickAction, Notification};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the push tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Push message body, usually JSON `{title, body, type, data}`.
    pub payload: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushOutput {
    pub notification: Notification,
}

/// Parameters for the notification_click tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// The push body the clicked notification was built from.
    pub payload: String,

    /// Action button pressed, if any ("open", "call", "dismiss").
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NotificationClickOutput {
    /// `null` when the click only dismissed the notification.
    pub result: Option<ClickAction>,
}

pub async fn push_impl(worker: &OfflineWorker, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = worker.handle_push(params.payload.as_bytes());
    json_result(&PushOutput { notification })
}

pub async fn notification_click_impl(
    worker: &OfflineWorker, params: NotificationClickParams,
) -> Result<CallToolResult, McpError> {
    let notification = worker.handle_push(params.payload.as_bytes());
    let result = worker.handle_notification_click(&notification, params.action.as_deref());
    json_result(&NotificationClickOutput { result })
}
