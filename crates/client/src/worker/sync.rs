//! Background sync of queued mutating requests.
//!
//! Replay walks a queue strictly from the head. An entry leaves storage only
//! after a response of any status or once it has expired; a transport failure
//! leaves it at the head and ends the pass so a still-down network isn't
//! hammered.

use std::sync::Arc;
use std::time::Duration;

use astral_core::{CacheDb, Error, MessageType, QueueKind, Request, SyncQueueEntry};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;

use super::bridge::ClientBridge;
use crate::fetch::{Network, send_with_timeout};

/// Outcome of one replay pass over a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub queue: QueueKind,
    /// Entries reissued and answered.
    pub replayed: usize,
    /// Entries past retention, removed without a request.
    pub dropped: usize,
    /// Entries removed because they can never be delivered.
    pub failed: usize,
    /// Entries still queued after the pass.
    pub remaining: u64,
    /// Whether a transport failure ended the pass early.
    pub halted: bool,
}

fn mentions_crisis(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains("crisis") || url.contains("emergency")
}

pub struct BackgroundSync {
    db: CacheDb,
    network: Arc<dyn Network>,
    bridge: Arc<ClientBridge>,
    timeout: Duration,
    crisis_retention: chrono::Duration,
    general_retention: chrono::Duration,
}

impl BackgroundSync {
    pub fn new(
        db: CacheDb, network: Arc<dyn Network>, bridge: Arc<ClientBridge>, timeout: Duration,
        crisis_retention: chrono::Duration, general_retention: chrono::Duration,
    ) -> Self {
        Self { db, network, bridge, timeout, crisis_retention, general_retention }
    }

    pub fn retention(&self, queue: QueueKind) -> chrono::Duration {
        match queue {
            QueueKind::Crisis => self.crisis_retention,
            QueueKind::General => self.general_retention,
        }
    }

    /// Save a request for the next replay.
    pub async fn enqueue(&self, queue: QueueKind, request: &Request) -> Result<i64, Error> {
        let id = self.db.enqueue_request(queue, request).await?;
        tracing::info!(queue = queue.name(), id, url = %request.url, "request queued for background sync");
        Ok(id)
    }

    pub async fn len(&self, queue: QueueKind) -> Result<u64, Error> {
        self.db.queue_len(queue).await
    }

    /// Queued entries in replay order.
    pub async fn entries(&self, queue: QueueKind) -> Result<Vec<SyncQueueEntry>, Error> {
        self.db.queued_requests(queue).await
    }

    pub async fn clear(&self, queue: QueueKind) -> Result<u64, Error> {
        let cleared = self.db.clear_queue(queue).await?;
        tracing::info!(queue = queue.name(), cleared, "queue cleared");
        Ok(cleared)
    }

    /// Replay one queue from the head.
    pub async fn replay(&self, queue: QueueKind) -> Result<ReplayReport, Error> {
        let retention = self.retention(queue);
        let mut report =
            ReplayReport { queue, replayed: 0, dropped: 0, failed: 0, remaining: 0, halted: false };

        while let Some(entry) = self.db.peek_request(queue).await? {
            if entry.is_expired(retention, Utc::now()) {
                tracing::debug!(queue = queue.name(), id = entry.id, "dropping expired entry");
                self.db.remove_request(entry.id).await?;
                report.dropped += 1;
                continue;
            }

            match send_with_timeout(self.network.as_ref(), &entry.request, self.timeout).await {
                Ok(response) => {
                    self.db.remove_request(entry.id).await?;
                    tracing::info!(
                        queue = queue.name(),
                        id = entry.id,
                        url = %entry.request.url,
                        status = response.status,
                        "replayed queued request"
                    );
                    report.replayed += 1;

                    if mentions_crisis(&entry.request.url) {
                        self.bridge.notify(
                            MessageType::CrisisSyncSuccess,
                            json!({
                                "url": entry.request.url,
                                "status": response.status,
                                "queued_at": entry.enqueued_at.to_rfc3339(),
                            }),
                        );
                    }
                }
                Err(e) if e.is_network_failure() => {
                    tracing::warn!(queue = queue.name(), id = entry.id, error = %e, "replay failed, stopping pass");
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    tracing::warn!(queue = queue.name(), id = entry.id, error = %e, "discarding undeliverable entry");
                    self.db.remove_request(entry.id).await?;
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.db.queue_len(queue).await?;
        Ok(report)
    }

    /// Replay the crisis queue, then the general queue.
    ///
    /// A halted pass skips the queues after it.
    pub async fn replay_all(&self) -> Result<Vec<ReplayReport>, Error> {
        let mut reports = Vec::new();
        for queue in QueueKind::ALL {
            let report = self.replay(queue).await?;
            let halted = report.halted;
            reports.push(report);
            if halted {
                break;
            }
        }
        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::testing::ScriptedNetwork;
    use astral_core::Response;

    struct Fixture {
        db: CacheDb,
        network: Arc<ScriptedNetwork>,
        bridge: Arc<ClientBridge>,
        sync: BackgroundSync,
    }

    async fn fixture() -> Fixture {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(ScriptedNetwork::serving_site());
        let bridge = Arc::new(ClientBridge::new(url::Url::parse("https://astral.example/").unwrap()));
        let sync = BackgroundSync::new(
            db.clone(),
            network.clone(),
            bridge.clone(),
            Duration::from_secs(1),
            chrono::Duration::days(7),
            chrono::Duration::days(3),
        );
        Fixture { db, network, bridge, sync }
    }

    fn alert() -> Request {
        Request::post("/.netlify/functions/crisis/alert", r#"{"level":"high"}"#)
    }

    #[tokio::test]
    async fn test_replay_delivers_and_notifies() {
        let f = fixture().await;
        let mut client = f.bridge.connect("/crisis");
        f.sync.enqueue(QueueKind::Crisis, &alert()).await.unwrap();
        assert_eq!(f.sync.len(QueueKind::Crisis).await.unwrap(), 1);

        let report = f.sync.replay(QueueKind::Crisis).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
        assert!(!report.halted);
        assert_eq!(f.network.requested(), vec!["POST /.netlify/functions/crisis/alert".to_string()]);

        let message = client.try_recv().unwrap();
        assert_eq!(message.kind, MessageType::CrisisSyncSuccess);
        assert_eq!(message.payload["url"], "/.netlify/functions/crisis/alert");
    }

    #[tokio::test]
    async fn test_second_replay_finds_empty_queue() {
        let f = fixture().await;
        f.sync.enqueue(QueueKind::Crisis, &alert()).await.unwrap();

        f.sync.replay(QueueKind::Crisis).await.unwrap();
        let again = f.sync.replay(QueueKind::Crisis).await.unwrap();
        assert_eq!(again.replayed, 0);
        assert_eq!(f.network.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_general_success_does_not_notify() {
        let f = fixture().await;
        let mut client = f.bridge.connect("/");
        f.sync.enqueue(QueueKind::General, &Request::post("/api/mood", "{}")).await.unwrap();

        let report = f.sync.replay(QueueKind::General).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert!(client.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_error_status_counts_as_delivered() {
        let f = fixture().await;
        f.network.respond("/api/mood", Response::new(500, "boom"));
        f.sync.enqueue(QueueKind::General, &Request::post("/api/mood", "{}")).await.unwrap();

        let report = f.sync.replay(QueueKind::General).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert_eq!(report.remaining, 0);
    }

    #[tokio::test]
    async fn test_network_failure_requeues_at_head_and_halts() {
        let f = fixture().await;
        f.sync.enqueue(QueueKind::General, &Request::post("/api/first", "1")).await.unwrap();
        f.sync.enqueue(QueueKind::General, &Request::post("/api/second", "2")).await.unwrap();
        f.sync.enqueue(QueueKind::General, &Request::post("/api/third", "3")).await.unwrap();
        f.network.fail("/api/second");

        let report = f.sync.replay(QueueKind::General).await.unwrap();
        assert_eq!(report.replayed, 1);
        assert!(report.halted);
        assert_eq!(report.remaining, 2);
        assert_eq!(f.network.requested(), vec!["POST /api/first".to_string(), "POST /api/second".to_string()]);

        let urls: Vec<String> =
            f.sync.entries(QueueKind::General).await.unwrap().into_iter().map(|e| e.request.url).collect();
        assert_eq!(urls, vec!["/api/second".to_string(), "/api/third".to_string()]);
    }

    /// Network that records what the queue holds while a request is in flight,
    /// then fails like a dropped connection.
    struct InspectingNetwork {
        db: CacheDb,
        seen: std::sync::Mutex<Vec<Vec<i64>>>,
    }

    #[async_trait::async_trait]
    impl Network for InspectingNetwork {
        async fn send(&self, _request: &Request) -> Result<Response, Error> {
            let ids = self.db.queued_requests(QueueKind::Crisis).await?.into_iter().map(|e| e.id).collect();
            self.seen.lock().unwrap().push(ids);
            Err(Error::Network("connection reset".into()))
        }
    }

    #[tokio::test]
    async fn test_entry_stays_stored_while_in_flight() {
        let db = CacheDb::open_in_memory().await.unwrap();
        let network = Arc::new(InspectingNetwork { db: db.clone(), seen: Default::default() });
        let bridge = Arc::new(ClientBridge::new(url::Url::parse("https://astral.example/").unwrap()));
        let sync = BackgroundSync::new(
            db.clone(),
            network.clone(),
            bridge,
            Duration::from_secs(1),
            chrono::Duration::days(7),
            chrono::Duration::days(3),
        );
        let id = sync.enqueue(QueueKind::Crisis, &alert()).await.unwrap();

        let report = sync.replay(QueueKind::Crisis).await.unwrap();
        assert!(report.halted);
        assert_eq!(*network.seen.lock().unwrap(), vec![vec![id]]);

        let entries = sync.entries(QueueKind::Crisis).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
    }

    #[tokio::test]
    async fn test_expired_entries_dropped_without_request() {
        let f = fixture().await;
        let old = Utc::now() - chrono::Duration::days(4);
        f.db.enqueue_request_at(QueueKind::General, &Request::post("/api/stale", "{}"), old).await.unwrap();
        f.db.enqueue_request_at(QueueKind::Crisis, &alert(), old).await.unwrap();

        let general = f.sync.replay(QueueKind::General).await.unwrap();
        assert_eq!(general.dropped, 1);
        assert_eq!(general.remaining, 0);

        let crisis = f.sync.replay(QueueKind::Crisis).await.unwrap();
        assert_eq!(crisis.dropped, 0);
        assert_eq!(crisis.replayed, 1);

        assert_eq!(f.network.requested(), vec!["POST /.netlify/functions/crisis/alert".to_string()]);
    }

    #[tokio::test]
    async fn test_expired_entry_does_not_reappear() {
        let f = fixture().await;
        let old = Utc::now() - chrono::Duration::days(8);
        f.db.enqueue_request_at(QueueKind::Crisis, &alert(), old).await.unwrap();
        f.network.set_offline(true);

        let report = f.sync.replay(QueueKind::Crisis).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(!report.halted);
        assert_eq!(f.sync.len(QueueKind::Crisis).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replay_all_crisis_first_and_stops_when_halted() {
        let f = fixture().await;
        f.sync.enqueue(QueueKind::General, &Request::post("/api/mood", "{}")).await.unwrap();
        f.sync.enqueue(QueueKind::Crisis, &alert()).await.unwrap();

        let reports = f.sync.replay_all().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].queue, QueueKind::Crisis);
        assert_eq!(
            f.network.requested(),
            vec!["POST /.netlify/functions/crisis/alert".to_string(), "POST /api/mood".to_string()]
        );

        f.sync.enqueue(QueueKind::General, &Request::post("/api/mood", "{}")).await.unwrap();
        f.sync.enqueue(QueueKind::Crisis, &alert()).await.unwrap();
        f.network.set_offline(true);

        let reports = f.sync.replay_all().await.unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].halted);
        assert_eq!(f.sync.len(QueueKind::General).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_clear() {
        let f = fixture().await;
        f.sync.enqueue(QueueKind::General, &Request::post("/api/mood", "{}")).await.unwrap();
        assert_eq!(f.sync.clear(QueueKind::General).await.unwrap(), 1);
        assert_eq!(f.sync.len(QueueKind::General).await.unwrap(), 0);
    }
}
