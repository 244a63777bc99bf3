//! Configuration Module
//!
//! Loads cache, coalescing and server settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::coalesce::{DEFAULT_BATCH_WINDOW, DEFAULT_DEDUPE_WINDOW};

/// Cache and dedupe policy for one domain fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    /// How long a fetched value stays fresh in the cache
    pub ttl: Duration,
    /// Window during which concurrent callers join the same request
    pub dedupe_window: Duration,
}

impl FetchPolicy {
    pub const fn from_millis(ttl_ms: u64, dedupe_ms: u64) -> Self {
        Self {
            ttl: Duration::from_millis(ttl_ms),
            dedupe_window: Duration::from_millis(dedupe_ms),
        }
    }
}

/// Runtime configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum number of entries each domain cache can hold
    pub max_entries: usize,
    /// Batcher collection window
    pub batch_window: Duration,
    /// Largest key set sent to the backend in one batch (0 = unbounded)
    pub batch_max_size: usize,
    /// Default page size for feed pagination
    pub page_size: usize,
    /// Interval between expired-entry sweeps
    pub sweep_interval: Duration,
    /// HTTP server port
    pub server_port: u16,
    /// Optional JSON file used to seed the in-memory backend
    pub seed_file: Option<String>,
    pub onboarding: FetchPolicy,
    pub stories: FetchPolicy,
    pub location: FetchPolicy,
    pub feed: FetchPolicy,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_ENTRIES` - Maximum entries per cache (default: 1000)
    /// - `BATCH_WINDOW_MS` - Batch collection window (default: 50)
    /// - `BATCH_MAX_SIZE` - Maximum keys per batch (default: 100)
    /// - `PAGE_SIZE` - Feed page size (default: 20)
    /// - `SWEEP_INTERVAL_SECS` - Expired-entry sweep interval (default: 30)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SEED_FILE` - JSON seed for the in-memory backend (default: unset)
    /// - `ONBOARDING_TTL_MS` / `ONBOARDING_DEDUPE_MS` (default: 300000 / 500)
    /// - `STORIES_TTL_MS` / `STORIES_DEDUPE_MS` (default: 30000 / 200)
    /// - `LOCATION_TTL_MS` / `LOCATION_DEDUPE_MS` (default: 600000 / 100)
    /// - `FEED_TTL_MS` / `FEED_DEDUPE_MS` (default: 15000 / 100)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entries: env_or("CACHE_MAX_ENTRIES", defaults.max_entries),
            batch_window: env_millis("BATCH_WINDOW_MS", defaults.batch_window),
            batch_max_size: env_or("BATCH_MAX_SIZE", defaults.batch_max_size),
            page_size: env_or("PAGE_SIZE", defaults.page_size),
            sweep_interval: non_zero(
                "SWEEP_INTERVAL_SECS",
                Duration::from_secs(env_or(
                    "SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval.as_secs(),
                )),
                defaults.sweep_interval,
            ),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            seed_file: env::var("SEED_FILE").ok().filter(|v| !v.is_empty()),
            onboarding: env_policy("ONBOARDING", defaults.onboarding),
            stories: env_policy("STORIES", defaults.stories),
            location: env_policy("LOCATION", defaults.location),
            feed: env_policy("FEED", defaults.feed),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            batch_window: DEFAULT_BATCH_WINDOW,
            batch_max_size: 100,
            page_size: 20,
            sweep_interval: Duration::from_secs(30),
            server_port: 3000,
            seed_file: None,
            onboarding: FetchPolicy::from_millis(5 * 60_000, 500),
            stories: FetchPolicy::from_millis(30_000, 200),
            location: FetchPolicy {
                ttl: Duration::from_secs(10 * 60),
                dedupe_window: DEFAULT_DEDUPE_WINDOW,
            },
            feed: FetchPolicy {
                ttl: Duration::from_secs(15),
                dedupe_window: DEFAULT_DEDUPE_WINDOW,
            },
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

/// Zero TTLs and intervals are unusable; fall back to the default.
fn non_zero(name: &str, value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        warn!("{} must be greater than zero, using {:?}", name, default);
        return default;
    }
    value
}

fn env_policy(prefix: &str, default: FetchPolicy) -> FetchPolicy {
    let ttl_var = format!("{prefix}_TTL_MS");
    FetchPolicy {
        ttl: non_zero(&ttl_var, env_millis(&ttl_var, default.ttl), default.ttl),
        dedupe_window: env_millis(&format!("{prefix}_DEDUPE_MS"), default.dedupe_window),
    }
}
