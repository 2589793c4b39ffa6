//! Messages exchanged between the worker and page contexts.
//!
//! Outbound messages are fire-and-forget status updates. Inbound messages are
//! commands posted by a page; unrecognized types parse to
//! [`Command::Unknown`] so the worker can log and ignore them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outbound message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
pub enum MessageType {
    #[serde(rename = "SW_ACTIVATED")]
    SwActivated,
    #[serde(rename = "CRISIS_RESOURCES_CACHED")]
    CrisisResourcesCached,
    #[serde(rename = "CRISIS_MODE_READY")]
    CrisisModeReady,
    #[serde(rename = "crisis-sync-success")]
    CrisisSyncSuccess,
    #[serde(rename = "NOTIFICATION_PERMISSION_REQUIRED")]
    NotificationPermissionRequired,
    #[serde(rename = "PUSH_SUBSCRIPTION_SUCCESS")]
    PushSubscriptionSuccess,
    #[serde(rename = "PUSH_SUBSCRIPTION_ERROR")]
    PushSubscriptionError,
}

/// A message posted from the worker to page contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub payload: Value,
}

impl ClientMessage {
    pub fn new(kind: MessageType, payload: Value) -> Self {
        Self { kind, payload }
    }
}

/// Commands a page may post to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    SkipWaiting,
    CrisisModeActivated,
    RequestNotificationPermission,
    SubscribeToPush,
    CacheCrisisResources,
    Unknown(String),
}

/// A message posted from a page context to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

impl InboundMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self { kind: kind.into(), payload: Value::Null }
    }

    pub fn command(&self) -> Command {
        match self.kind.as_str() {
            "SKIP_WAITING" => Command::SkipWaiting,
            "CRISIS_MODE_ACTIVATED" => Command::CrisisModeActivated,
            "REQUEST_NOTIFICATION_PERMISSION" => Command::RequestNotificationPermission,
            "SUBSCRIBE_TO_PUSH" => Command::SubscribeToPush,
            "CACHE_CRISIS_RESOURCES" => Command::CacheCrisisResources,
            other => Command::Unknown(other.to_string()),
        }
    }
}
