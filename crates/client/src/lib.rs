//! Worker engine for the Astral offline layer.
//!
//! This crate provides the network transport, request routing and caching
//! strategies, background sync, client messaging and push handling shared by
//! the server and CLI.

pub mod crisis;
pub mod fetch;
pub mod worker;

pub use fetch::{FetchClient, FetchConfig, Network};
pub use worker::{OfflineWorker, WorkerState, WorkerStatus};
