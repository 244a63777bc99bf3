//! Cache Module
//!
//! In-memory TTL caching with lazy expiration and LRU capacity eviction.

mod entry;
mod lru;
mod stats;
mod store;
mod ttl_cache;


pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::CacheStats;
pub use store::TtlStore;
pub use ttl_cache::TtlCache;
