//! SQLite-backed storage for the offline worker.
//!
//! This module provides persistent storage using SQLite with async access via
//! tokio-rusqlite. It holds:
//!
//! - Named, versioned response caches (exact-URL keys, last write wins)
//! - FIFO background sync queues of failed mutating requests
//! - Automatic schema migrations
//! - WAL mode for concurrent access

pub mod connection;
pub mod migrations;
pub mod queue;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use queue::{QueueKind, SyncQueueEntry};
pub use store::{CacheEntry, CacheHandle};
