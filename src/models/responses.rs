//! Response DTOs for the gateway API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;

/// Response body for GET /users/:user_id/onboarding
#[derive(Debug, Clone, Serialize)]
pub struct OnboardingResponse {
    pub user_id: String,
    pub completed: bool,
}

impl OnboardingResponse {
    pub fn new(user_id: impl Into<String>, completed: bool) -> Self {
        Self {
            user_id: user_id.into(),
            completed,
        }
    }
}

/// Response body for DELETE /users/:user_id/cache
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    /// Number of cache entries dropped
    pub removed: usize,
}

impl InvalidateResponse {
    pub fn new(scope: impl AsRef<str>, removed: usize) -> Self {
        Self {
            message: format!("Cache for '{}' invalidated", scope.as_ref()),
            removed,
        }
    }
}

/// Statistics for one named cache.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub total_entries: usize,
    /// Cache hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl CacheReport {
    pub fn new(name: impl Into<String>, stats: &CacheStats) -> Self {
        Self {
            name: name.into(),
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            expirations: stats.expirations,
            total_entries: stats.total_entries,
            hit_rate: stats.hit_rate(),
        }
    }
}

/// Response body for GET /stats
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub caches: Vec<CacheReport>,
    /// Requests currently recorded by the coalescers
    pub pending_requests: usize,
}

impl StatsResponse {
    pub fn new(caches: Vec<CacheReport>, pending_requests: usize) -> Self {
        Self {
            caches,
            pending_requests,
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
