//! Core types and shared functionality for the Astral offline worker.
//!
//! This crate provides:
//! - Cache and sync queue storage with SQLite backend
//! - Request/response value types
//! - Worker ↔ page message types
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod message;

pub use cache::{CacheDb, CacheEntry, CacheHandle, QueueKind, SyncQueueEntry};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use http::{Destination, Headers, Request, RequestMode, Response, ResponseSource};
pub use message::{ClientMessage, Command, InboundMessage, MessageType};
