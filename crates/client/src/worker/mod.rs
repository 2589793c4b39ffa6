//! Offline worker engine.
//!
//! ### Lifecycle
//! - `parsed -> installing -> installed -> activating -> activated`
//! - A failed install or activation leaves the worker `redundant`.
//! - Install populates the critical cache. Activation drops stale caches,
//!   repairs the critical set, claims clients, then announces itself.
//!
//! ### Fetch handling
//! - The router picks a strategy; anything a strategy can't answer goes to
//!   the fallback resolver, so callers always get a response.
//! - Every network attempt is bounded by the configured timeout.
//!
//! ### Messages, sync and push
//! - Inbound page commands are dispatched by [`OfflineWorker::handle_message`].
//! - Connectivity-restored events replay the sync queues.
//! - Push bodies become notifications; clicks focus or open a client.

pub mod bridge;
pub mod fallback;
pub mod notify;
pub mod push;
pub mod resources;
pub mod router;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use astral_core::{AppConfig, CacheDb, Command, Error, InboundMessage, MessageType, QueueKind, Request, Response};
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;

pub use bridge::{ClickAction, ClientBridge, ClientHandle, ClientInfo};
pub use fallback::FallbackResolver;
pub use notify::{Notification, PushKind, PushPayload, build_notification, click_target, parse_push};
pub use push::{PushSubscriber, PushSubscription};
pub use resources::{CRITICAL_RESOURCES, CacheNames, PRECACHE_EXTRAS, PopulationReport, ResourcePolicy};
pub use router::{RouteMatch, Router, Strategy, Target};
pub use sync::{BackgroundSync, ReplayReport};

use crate::fetch::{Network, send_with_timeout};
use resources::is_critical;

/// Worker lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Parsed => "parsed",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Activated => "activated",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted_caches: Vec<String>,
    pub repaired: PopulationReport,
    pub claimed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub name: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub queue: QueueKind,
    pub pending: u64,
}

/// Point-in-time view of caches, queues and clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
    pub state: WorkerState,
    pub cache_version: String,
    pub caches: Vec<CacheStatus>,
    pub missing_critical: Vec<String>,
    pub queues: Vec<QueueStatus>,
    pub clients: Vec<ClientInfo>,
}

pub struct OfflineWorker {
    state: Mutex<WorkerState>,
    version: String,
    db: CacheDb,
    network: Arc<dyn Network>,
    timeout: Duration,
    router: Router,
    resources: ResourcePolicy,
    fallback: FallbackResolver,
    sync: BackgroundSync,
    bridge: Arc<ClientBridge>,
    push: PushSubscriber,
}

impl OfflineWorker {
    pub fn new(config: &AppConfig, db: CacheDb, network: Arc<dyn Network>) -> Result<Self, Error> {
        let names = CacheNames::new(&config.cache_version);
        let timeout = config.timeout();
        let router = Router::new(&config.origin)?;
        let bridge = Arc::new(ClientBridge::new(router.origin().clone()));

        Ok(Self {
            state: Mutex::new(WorkerState::Parsed),
            version: config.cache_version.clone(),
            router,
            resources: ResourcePolicy::new(db.clone(), network.clone(), names.clone(), timeout),
            fallback: FallbackResolver::new(db.clone(), names),
            sync: BackgroundSync::new(
                db.clone(),
                network.clone(),
                bridge.clone(),
                timeout,
                config.crisis_retention(),
                config.general_retention(),
            ),
            push: PushSubscriber::new(
                network.clone(),
                config.vapid_public_key.clone(),
                config.push_subscribe_path.clone(),
                timeout,
            ),
            bridge,
            db,
            network,
            timeout,
        })
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.lock().await
    }

    pub fn bridge(&self) -> &Arc<ClientBridge> {
        &self.bridge
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn sync(&self) -> &BackgroundSync {
        &self.sync
    }

    pub fn names(&self) -> &CacheNames {
        self.resources.names()
    }

    /// Run the install phase.
    pub async fn install(&self) -> Result<PopulationReport, Error> {
        let mut state = self.state.lock().await;
        if *state != WorkerState::Parsed {
            return Err(Error::InvalidState(format!("cannot install from {}", *state)));
        }

        *state = WorkerState::Installing;
        tracing::info!(version = %self.version, "installing worker");

        match self.resources.install().await {
            Ok(report) => {
                *state = WorkerState::Installed;
                tracing::info!(cached = report.cached.len(), failed = report.failed.len(), "worker installed");
                Ok(report)
            }
            Err(e) => {
                *state = WorkerState::Redundant;
                tracing::error!(error = %e, "install failed");
                Err(e)
            }
        }
    }

    /// Run the activate phase. Requires a completed install.
    pub async fn activate(&self) -> Result<ActivationReport, Error> {
        let mut state = self.state.lock().await;
        if *state != WorkerState::Installed {
            return Err(Error::InvalidState(format!("cannot activate from {}", *state)));
        }

        *state = WorkerState::Activating;
        tracing::info!(version = %self.version, "activating worker");

        let result = async {
            let deleted_caches = self.resources.delete_stale_caches().await?;
            let repaired = self.resources.revalidate().await?;
            Ok::<_, Error>((deleted_caches, repaired))
        }
        .await;

        match result {
            Ok((deleted_caches, repaired)) => {
                let claimed = self.bridge.claim();
                *state = WorkerState::Activated;
                self.bridge.notify(
                    MessageType::SwActivated,
                    json!({ "version": self.version, "repaired": repaired.cached, "missing": repaired.failed }),
                );
                tracing::info!(deleted = deleted_caches.len(), claimed, "worker activated");
                Ok(ActivationReport { deleted_caches, repaired, claimed })
            }
            Err(e) => {
                *state = WorkerState::Redundant;
                tracing::error!(error = %e, "activation failed");
                Err(e)
            }
        }
    }

    /// Answer an intercepted request.
    pub async fn handle_fetch(&self, request: Request) -> Response {
        let matched = match self.router.route(&request) {
            Ok(matched) => matched,
            Err(e) => {
                tracing::warn!(url = %request.url, error = %e, "rejecting request");
                return Response::json(400, &json!({ "error": "Bad Request", "message": e.to_string() }));
            }
        };

        match matched.strategy {
            Strategy::CacheFirst => self.cache_first(&request, &matched.target).await,
            Strategy::NetworkFirst => self.network_first(&request, &matched.target).await,
            Strategy::NetworkOnly => match self.send(&request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(url = %matched.target.url, error = %e, "network-only request failed");
                    self.fallback.resolve(&request, &matched.target, false).await
                }
            },
            Strategy::QueueOnFailure(queue) => self.network_or_queue(&request, &matched.target, queue).await,
        }
    }

    /// Dispatch a message posted by a page.
    pub async fn handle_message(&self, message: &InboundMessage) -> Result<(), Error> {
        match message.command() {
            Command::SkipWaiting => {
                if self.state().await == WorkerState::Installed {
                    self.activate().await?;
                } else {
                    tracing::debug!("skip waiting ignored, worker not waiting");
                }
            }
            Command::CrisisModeActivated => {
                let report = self.resources.revalidate().await?;
                self.bridge.notify(
                    MessageType::CrisisModeReady,
                    json!({ "repaired": report.cached, "missing": report.failed }),
                );
            }
            Command::RequestNotificationPermission => {
                self.bridge.notify(MessageType::NotificationPermissionRequired, json!({}));
            }
            Command::SubscribeToPush => match self.push.subscribe().await {
                Ok(subscription) => {
                    self.bridge.notify(MessageType::PushSubscriptionSuccess, json!({ "subscription": subscription }));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "push subscription failed");
                    self.bridge.notify(MessageType::PushSubscriptionError, json!({ "error": e.to_string() }));
                }
            },
            Command::CacheCrisisResources => {
                let report = self.resources.refresh().await?;
                self.bridge.notify(
                    MessageType::CrisisResourcesCached,
                    json!({ "cached": report.cached, "failed": report.failed }),
                );
            }
            Command::Unknown(kind) => {
                tracing::warn!(kind = %kind, "ignoring unknown message");
            }
        }
        Ok(())
    }

    /// Connectivity restored: replay one queue, or all of them crisis first.
    pub async fn handle_sync(&self, queue: Option<QueueKind>) -> Result<Vec<ReplayReport>, Error> {
        match queue {
            Some(queue) => Ok(vec![self.sync.replay(queue).await?]),
            None => self.sync.replay_all().await,
        }
    }

    /// Turn a push body into a notification.
    pub fn handle_push(&self, raw: &[u8]) -> Notification {
        let payload = parse_push(raw);
        tracing::info!(kind = ?payload.kind, "push received");
        build_notification(&payload)
    }

    /// Resolve a notification click. `None` when the click only dismisses.
    pub fn handle_notification_click(&self, notification: &Notification, action: Option<&str>) -> Option<ClickAction> {
        let url = click_target(notification, action)?;
        if url.starts_with("tel:") {
            return Some(ClickAction::OpenWindow { url });
        }
        Some(self.bridge.focus_or_open(&url))
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        let mut caches = Vec::new();
        for name in self.db.cache_names().await? {
            let entries = self.db.open_cache(&name).await?.keys().await?.len();
            caches.push(CacheStatus { name, entries });
        }

        let mut queues = Vec::new();
        for queue in QueueKind::ALL {
            queues.push(QueueStatus { queue, pending: self.sync.len(queue).await? });
        }

        Ok(WorkerStatus {
            state: self.state().await,
            cache_version: self.version.clone(),
            caches,
            missing_critical: self.resources.missing_critical().await?.into_iter().map(String::from).collect(),
            queues,
            clients: self.bridge.clients(),
        })
    }

    async fn send(&self, request: &Request) -> Result<Response, Error> {
        send_with_timeout(self.network.as_ref(), request, self.timeout).await
    }

    async fn store(&self, cache: &str, key: &str, response: &Response) {
        let stored = match self.db.open_cache(cache).await {
            Ok(handle) => handle.put(key, response).await,
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            tracing::warn!(cache, key, error = %e, "failed to cache response");
        }
    }

    async fn lookup(&self, caches: &[&str], key: &str) -> Option<Response> {
        match self.db.match_any(caches, key).await {
            Ok(hit) => hit.map(|entry| entry.to_response()),
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                None
            }
        }
    }

    async fn cache_first(&self, request: &Request, target: &Target) -> Response {
        let names = self.names();
        let (home, caches) = if is_critical(&target.cache_key) {
            (names.critical.as_str(), vec![names.critical.as_str(), names.static_assets.as_str()])
        } else {
            (names.static_assets.as_str(), vec![names.static_assets.as_str(), names.critical.as_str()])
        };

        if let Some(response) = self.lookup(&caches, &target.cache_key).await {
            tracing::debug!(key = %target.cache_key, "cache hit");
            return response;
        }
        tracing::debug!(key = %target.cache_key, "cache miss");

        match self.send(request).await {
            Ok(response) => {
                if response.is_success() {
                    self.store(home, &target.cache_key, &response).await;
                }
                response
            }
            Err(e) => {
                tracing::debug!(url = %target.url, error = %e, "cache-first network attempt failed");
                self.fallback.resolve(request, target, false).await
            }
        }
    }

    /// Navigations are never cached; offline they always resolve to the
    /// fallback pages.
    async fn network_first(&self, request: &Request, target: &Target) -> Response {
        let navigation = request.is_navigation();
        match self.send(request).await {
            Ok(response) => {
                if response.is_success() && request.is_get() && !navigation {
                    self.store(&self.names().runtime, &target.cache_key, &response).await;
                }
                response
            }
            Err(e) if navigation => {
                tracing::debug!(url = %target.url, error = %e, "navigation failed, serving offline page");
                self.fallback.resolve(request, target, false).await
            }
            Err(e) => {
                tracing::debug!(url = %target.url, error = %e, "network-first attempt failed");
                let names = self.names();
                let caches = [names.runtime.as_str(), names.critical.as_str(), names.static_assets.as_str()];
                match self.lookup(&caches, &target.cache_key).await {
                    Some(response) => response,
                    None => self.fallback.resolve(request, target, false).await,
                }
            }
        }
    }

    async fn network_or_queue(&self, request: &Request, target: &Target, queue: QueueKind) -> Response {
        match self.send(request).await {
            Ok(response) => response,
            Err(e) if e.is_network_failure() => {
                let queued = match self.sync.enqueue(queue, request).await {
                    Ok(_) => true,
                    Err(store_err) => {
                        tracing::error!(url = %target.url, error = %store_err, "failed to queue request");
                        false
                    }
                };
                self.fallback.resolve(request, target, queued).await
            }
            Err(e) => {
                tracing::warn!(url = %target.url, error = %e, "request failed");
                self.fallback.resolve(request, target, false).await
            }
        }
    }
}
