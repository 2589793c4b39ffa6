//! Background sync queue storage.
//!
//! Failed mutating requests are appended per named queue and consumed from
//! the head. Reading the head leaves it in place; a consumer removes an entry
//! by id only once it has been delivered or has expired, so an interrupted
//! replay never loses a request.

use super::connection::CacheDb;
use crate::Error;
use crate::http::Request;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::OptionalExtension;

/// The two sync queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum QueueKind {
    /// Requests to crisis, emergency and help functions.
    Crisis,
    /// Every other function request.
    General,
}

impl QueueKind {
    pub const ALL: [QueueKind; 2] = [QueueKind::Crisis, QueueKind::General];

    /// Stable queue name used as the storage key.
    pub fn name(self) -> &'static str {
        match self {
            QueueKind::Crisis => "crisis-queue",
            QueueKind::General => "general-queue",
        }
    }
}

/// A queued request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: i64,
    pub queue: QueueKind,
    pub request: Request,
    pub enqueued_at: DateTime<Utc>,
}

impl SyncQueueEntry {
    /// Whether the entry has outlived `retention` as of `now`.
    pub fn is_expired(&self, retention: chrono::Duration, now: DateTime<Utc>) -> bool {
        now - self.enqueued_at > retention
    }
}

type QueueRow = (i64, String, String, String, Option<Vec<u8>>, String);

fn entry_from_row(queue: QueueKind, row: QueueRow) -> Result<SyncQueueEntry, Error> {
    let (id, method, url, headers_json, body, enqueued_at) = row;
    let mut request = Request::new(method, url);
    request.headers = serde_json::from_str(&headers_json)?;
    request.body = body;

    let enqueued_at = DateTime::parse_from_rfc3339(&enqueued_at)
        .map_err(|e| Error::InvalidInput(format!("bad enqueued_at on entry {id}: {e}")))?
        .with_timezone(&Utc);

    Ok(SyncQueueEntry { id, queue, request, enqueued_at })
}

impl CacheDb {
    /// Append a request to the tail of a queue.
    ///
    /// Returns the new entry id.
    pub async fn enqueue_request(&self, queue: QueueKind, request: &Request) -> Result<i64, Error> {
        self.enqueue_request_at(queue, request, Utc::now()).await
    }

    /// Append a request with an explicit enqueue time.
    pub async fn enqueue_request_at(
        &self, queue: QueueKind, request: &Request, enqueued_at: DateTime<Utc>,
    ) -> Result<i64, Error> {
        let method = request.method.clone();
        let url = request.url.clone();
        let headers_json = serde_json::to_string(&request.headers)?;
        let body = request.body.clone();
        let enqueued_at = enqueued_at.to_rfc3339();

        self.conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO sync_queue (queue_name, method, url, headers_json, body, enqueued_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![queue.name(), method, url, headers_json, body, enqueued_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)
    }

    /// The head of a queue, left in place.
    pub async fn peek_request(&self, queue: QueueKind) -> Result<Option<SyncQueueEntry>, Error> {
        let row = self
            .conn
            .call(move |conn| -> Result<Option<QueueRow>, Error> {
                let row = conn
                    .query_row(
                        "SELECT id, method, url, headers_json, body, enqueued_at
                         FROM sync_queue WHERE queue_name = ?1 ORDER BY id ASC LIMIT 1",
                        params![queue.name()],
                        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await
            .map_err(Error::from)?;

        row.map(|r| entry_from_row(queue, r)).transpose()
    }

    /// Remove one entry by id.
    ///
    /// Returns false when the entry was already gone.
    pub async fn remove_request(&self, id: i64) -> Result<bool, Error> {
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let removed = conn.execute("DELETE FROM sync_queue WHERE id = ?1", params![id])?;
                Ok(removed > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of entries waiting in a queue.
    pub async fn queue_len(&self, queue: QueueKind) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM sync_queue WHERE queue_name = ?1",
                    params![queue.name()],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// All entries of a queue in replay order, without removing them.
    pub async fn queued_requests(&self, queue: QueueKind) -> Result<Vec<SyncQueueEntry>, Error> {
        let rows = self
            .conn
            .call(move |conn| -> Result<Vec<QueueRow>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT id, method, url, headers_json, body, enqueued_at
                     FROM sync_queue WHERE queue_name = ?1 ORDER BY id ASC",
                )?;
                let rows = stmt
                    .query_map(params![queue.name()], |row| {
                        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
                    })?
                    .collect::<Result<Vec<QueueRow>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;

        rows.into_iter().map(|r| entry_from_row(queue, r)).collect()
    }

    /// Drop every entry of a queue.
    ///
    /// Returns the number of deleted entries.
    pub async fn clear_queue(&self, queue: QueueKind) -> Result<u64, Error> {
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute("DELETE FROM sync_queue WHERE queue_name = ?1", params![queue.name()])?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
