//! post_message and poll_messages tool implementations.
//!
//! The server registers itself as one page context. `post_message` plays a
//! page posting a command; `poll_messages` drains what the worker broadcast.

use astral_client::OfflineWorker;
use astral_client::worker::ClientHandle;
use astral_core::{ClientMessage, Command, InboundMessage};
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::json_result;
use crate::error::ToolError;

/// Parameters for the post_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PostMessageParams {
    /// Message type, e.g. "SKIP_WAITING" or "CACHE_CRISIS_RESOURCES".
    #[serde(rename = "type")]
    pub kind: String,

    /// Optional message payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostMessageOutput {
    /// Whether the worker recognized the message type.
    pub recognized: bool,
    /// Messages waiting in the inbox once the command was handled.
    pub replies: Vec<ClientMessage>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollMessagesOutput {
    pub messages: Vec<ClientMessage>,
}

pub async fn post_message_impl(
    worker: &OfflineWorker, inbox: &Mutex<ClientHandle>, params: PostMessageParams,
) -> Result<CallToolResult, McpError> {
    if params.kind.trim().is_empty() {
        return Err(ToolError::InvalidInput("type cannot be empty".into()).into());
    }

    let message = InboundMessage { kind: params.kind, payload: params.payload };
    let recognized = !matches!(message.command(), Command::Unknown(_));

    let mut inbox = inbox.lock().await;
    worker.handle_message(&message).await?;

    let output = PostMessageOutput { recognized, replies: inbox.drain() };
    json_result(&output)
}

pub async fn poll_messages_impl(inbox: &Mutex<ClientHandle>) -> Result<CallToolResult, McpError> {
    let messages = inbox.lock().await.drain();
    json_result(&PollMessagesOutput { messages })
}
