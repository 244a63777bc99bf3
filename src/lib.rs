//! Discovery Cache - read-path caching for a social discovery app
//!
//! TTL caches, request coalescing, key batching and cursor pagination, wired
//! into per-domain fetchers and exposed through a small HTTP gateway.

pub mod api;
pub mod cache;
pub mod coalesce;
pub mod config;
pub mod error;
pub mod fetchers;
pub mod models;
pub mod pagination;
pub mod tasks;

pub use api::AppState;
pub use config::Config;
pub use error::{CoreError, Result};
pub use fetchers::{Backend, DomainFetchers, InMemoryBackend};
pub use tasks::spawn_sweeper;
