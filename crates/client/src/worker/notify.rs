//! Push notification presets and click targets.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const ICON: &str = "/icon-192.png";
const BADGE: &str = "/icon-192.png";

/// Push message category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushKind {
    CrisisAlert,
    HelperRequest,
    SystemUpdate,
    #[serde(other)]
    General,
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default = "default_kind")]
    pub kind: PushKind,
    #[serde(default)]
    pub data: Value,
}

fn default_title() -> String {
    "Astral Core".to_string()
}

fn default_kind() -> PushKind {
    PushKind::General
}

/// Decode a push body. Anything that isn't a JSON payload becomes the body
/// of a general notification.
pub fn parse_push(raw: &[u8]) -> PushPayload {
    match serde_json::from_slice::<PushPayload>(raw) {
        Ok(payload) => payload,
        Err(_) => PushPayload {
            title: default_title(),
            body: String::from_utf8_lossy(raw).trim().to_string(),
            kind: PushKind::General,
            data: Value::Null,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    fn new(action: &str, title: &str) -> Self {
        Self { action: action.to_string(), title: title.to_string() }
    }
}

/// A notification ready for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    pub require_interaction: bool,
    pub actions: Vec<NotificationAction>,
    pub tag: String,
    /// Carries the click target under `url`.
    pub data: Value,
}

impl Notification {
    pub fn target_url(&self) -> &str {
        self.data.get("url").and_then(Value::as_str).unwrap_or("/")
    }
}

fn helper_target(data: &Value) -> String {
    let dilemma = match data.get("dilemmaId") {
        Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };
    match dilemma {
        Some(id) => format!("/chat/{id}"),
        None => "/dashboard".to_string(),
    }
}

/// Map a push payload onto its display preset.
pub fn build_notification(payload: &PushPayload) -> Notification {
    let (vibrate, require_interaction, actions, tag, url) = match payload.kind {
        PushKind::CrisisAlert => (
            vec![200, 100, 200, 100, 200],
            true,
            vec![NotificationAction::new("open", "Get Help Now"), NotificationAction::new("call", "Call 988")],
            "crisis-alert",
            "/crisis".to_string(),
        ),
        PushKind::HelperRequest => (
            vec![100, 50, 100],
            false,
            vec![NotificationAction::new("open", "View Request"), NotificationAction::new("dismiss", "Later")],
            "helper-request",
            helper_target(&payload.data),
        ),
        PushKind::SystemUpdate => (
            vec![50, 50, 50],
            false,
            vec![NotificationAction::new("open", "Review Settings"), NotificationAction::new("dismiss", "Later")],
            "system-update",
            "/settings".to_string(),
        ),
        PushKind::General => (vec![100], false, Vec::new(), "astral-notification", "/".to_string()),
    };

    let mut data = match &payload.data {
        Value::Object(map) => Value::Object(map.clone()),
        _ => json!({}),
    };
    data["url"] = Value::String(url);

    Notification {
        title: payload.title.clone(),
        body: payload.body.clone(),
        icon: ICON.to_string(),
        badge: BADGE.to_string(),
        vibrate,
        require_interaction,
        actions,
        tag: tag.to_string(),
        data,
    }
}

/// Where a click should take the user, or `None` when it only dismisses.
pub fn click_target(notification: &Notification, action: Option<&str>) -> Option<String> {
    match action {
        Some("dismiss") => None,
        Some("call") => Some("tel:988".to_string()),
        _ => Some(notification.target_url().to_string()),
    }
}
