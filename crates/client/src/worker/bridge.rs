//! Worker to page messaging.
//!
//! Messages fan out over a tokio broadcast channel to every connected page
//! context. Delivery is fire-and-forget: with nobody connected the message is
//! dropped. The bridge also keeps the registry of open clients used by
//! activation (claim) and notification clicks (focus or open).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use astral_core::{ClientMessage, MessageType};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use url::Url;

use crate::fetch::resolve;

const CHANNEL_CAPACITY: usize = 64;

/// An open page context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: u64,
    pub url: String,
    /// Whether this worker controls the client.
    pub controlled: bool,
}

/// What a notification click does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClickAction {
    Focus { client_id: u64, url: String },
    OpenWindow { url: String },
}

type Registry = Arc<Mutex<BTreeMap<u64, ClientInfo>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, BTreeMap<u64, ClientInfo>> {
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Whether a client open at `client_url` is already showing `target`.
///
/// Both are resolved against the worker origin; query and fragment are ignored.
fn shows(origin: &Url, client_url: &str, target: &Url) -> bool {
    resolve(origin, client_url).is_ok_and(|url| url.origin() == target.origin() && url.path() == target.path())
}

pub struct ClientBridge {
    origin: Url,
    sender: broadcast::Sender<ClientMessage>,
    clients: Registry,
    next_id: AtomicU64,
}

impl ClientBridge {
    /// Bridge for page contexts of `origin`. Relative client URLs resolve against it.
    pub fn new(origin: Url) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { origin, sender, clients: Arc::new(Mutex::new(BTreeMap::new())), next_id: AtomicU64::new(1) }
    }

    /// Register a page context open at `url`.
    pub fn connect(&self, url: impl Into<String>) -> ClientHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let info = ClientInfo { id, url: url.into(), controlled: false };
        tracing::debug!(client_id = id, url = %info.url, "client connected");

        lock(&self.clients).insert(id, info);
        ClientHandle { id, receiver: self.sender.subscribe(), clients: self.clients.clone() }
    }

    /// Broadcast to every connected context.
    ///
    /// Returns how many contexts the message was delivered to.
    pub fn post(&self, message: ClientMessage) -> usize {
        let kind = message.kind;
        match self.sender.send(message) {
            Ok(delivered) => {
                tracing::debug!(?kind, delivered, "posted client message");
                delivered
            }
            Err(_) => {
                tracing::debug!(?kind, "no clients connected, message dropped");
                0
            }
        }
    }

    /// Post a message with a JSON payload.
    pub fn notify(&self, kind: MessageType, payload: serde_json::Value) -> usize {
        self.post(ClientMessage::new(kind, payload))
    }

    /// Take control of every connected client.
    ///
    /// Returns the number of newly controlled clients.
    pub fn claim(&self) -> usize {
        let mut clients = lock(&self.clients);
        let mut claimed = 0;
        for client in clients.values_mut().filter(|c| !c.controlled) {
            client.controlled = true;
            claimed += 1;
        }
        tracing::info!(claimed, total = clients.len(), "claimed clients");
        claimed
    }

    /// Snapshot of connected clients, ordered by id.
    pub fn clients(&self) -> Vec<ClientInfo> {
        lock(&self.clients).values().cloned().collect()
    }

    /// Focus a client already showing `url`, else open a new window.
    pub fn focus_or_open(&self, url: &str) -> ClickAction {
        let existing = match resolve(&self.origin, url) {
            Ok(target) => lock(&self.clients).values().find(|c| shows(&self.origin, &c.url, &target)).map(|c| c.id),
            Err(e) => {
                tracing::debug!(url, error = %e, "unresolvable click target");
                None
            }
        };

        match existing {
            Some(client_id) => ClickAction::Focus { client_id, url: url.to_string() },
            None => ClickAction::OpenWindow { url: url.to_string() },
        }
    }
}

/// A connected page context. Dropping the handle disconnects it.
pub struct ClientHandle {
    id: u64,
    receiver: broadcast::Receiver<ClientMessage>,
    clients: Registry,
}

impl ClientHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next message. `None` once the bridge is gone.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(client_id = self.id, skipped, "client lagged, messages lost");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<ClientMessage> {
        loop {
            match self.receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(client_id = self.id, skipped, "client lagged, messages lost");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Every message currently waiting.
    pub fn drain(&mut self) -> Vec<ClientMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        lock(&self.clients).remove(&self.id);
        tracing::debug!(client_id = self.id, "client disconnected");
    }
}
