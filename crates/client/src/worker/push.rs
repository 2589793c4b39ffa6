//! Push subscription through the subscribe function endpoint.

use std::sync::Arc;
use std::time::Duration;

use astral_core::{Error, Request};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::fetch::{Network, send_with_timeout};

/// A confirmed push subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    pub endpoint: String,
    #[serde(default)]
    pub keys: serde_json::Map<String, serde_json::Value>,
}

pub struct PushSubscriber {
    network: Arc<dyn Network>,
    vapid_public_key: Option<String>,
    subscribe_path: String,
    timeout: Duration,
}

impl PushSubscriber {
    pub fn new(
        network: Arc<dyn Network>, vapid_public_key: Option<String>, subscribe_path: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { network, vapid_public_key, subscribe_path: subscribe_path.into(), timeout }
    }

    /// Register for push. Not retried on failure.
    pub async fn subscribe(&self) -> Result<PushSubscription, Error> {
        let key = self
            .vapid_public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::PushSubscription("no VAPID public key configured".to_string()))?;

        let body = json!({ "applicationServerKey": key, "userVisibleOnly": true });
        let request = Request::post(&self.subscribe_path, body.to_string()).with_header("Content-Type", "application/json");

        let response = send_with_timeout(self.network.as_ref(), &request, self.timeout)
            .await
            .map_err(|e| Error::PushSubscription(e.to_string()))?;

        if !response.is_success() {
            return Err(Error::PushSubscription(format!("subscribe endpoint returned {}", response.status)));
        }

        let subscription: PushSubscription = serde_json::from_slice(&response.body)
            .map_err(|e| Error::PushSubscription(format!("malformed subscription: {e}")))?;

        if subscription.endpoint.is_empty() {
            return Err(Error::PushSubscription("subscription has no endpoint".to_string()));
        }

        tracing::info!(endpoint = %subscription.endpoint, "push subscription created");
        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::ScriptedNetwork;
    use astral_core::Response;

    const PATH: &str = "/.netlify/functions/push-subscribe";

    fn subscriber(network: Arc<ScriptedNetwork>, key: Option<&str>) -> PushSubscriber {
        PushSubscriber::new(network, key.map(String::from), PATH, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_subscribe_success() {
        let network = Arc::new(ScriptedNetwork::serving_site());
        network.respond(
            PATH,
            Response::new(201, r#"{"endpoint":"https://push.example/abc","keys":{"auth":"x","p256dh":"y"}}"#),
        );

        let subscription = subscriber(network.clone(), Some("BPk3")).subscribe().await.unwrap();
        assert_eq!(subscription.endpoint, "https://push.example/abc");
        assert_eq!(subscription.keys["auth"], "x");
        assert_eq!(network.requested(), vec![format!("POST {PATH}")]);
    }

    #[tokio::test]
    async fn test_missing_key_makes_no_request() {
        let network = Arc::new(ScriptedNetwork::serving_site());
        let err = subscriber(network.clone(), None).subscribe().await.unwrap_err();
        assert!(matches!(err, Error::PushSubscription(_)));
        assert!(network.requested().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_failure() {
        let network = Arc::new(ScriptedNetwork::serving_site());
        network.respond(PATH, Response::new(500, "nope"));
        assert!(matches!(subscriber(network.clone(), Some("BPk3")).subscribe().await, Err(Error::PushSubscription(_))));

        network.fail(PATH);
        assert!(matches!(subscriber(network, Some("BPk3")).subscribe().await, Err(Error::PushSubscription(_))));
    }

    #[tokio::test]
    async fn test_malformed_body() {
        let network = Arc::new(ScriptedNetwork::serving_site());
        network.respond(PATH, Response::new(200, "ok"));
        assert!(matches!(subscriber(network, Some("BPk3")).subscribe().await, Err(Error::PushSubscription(_))));
    }
}
