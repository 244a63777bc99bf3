//! Fetchers Module
//!
//! The backend seam, an in-memory backend, and the cached domain read paths
//! built on top of them.

mod backend;
pub mod domain;
mod memory;

pub use backend::Backend;
pub use domain::DomainFetchers;
pub use memory::{BackendCalls, InMemoryBackend, Seed};
