//! Expiry Sweeper
//!
//! Background task that periodically drops expired entries from every
//! domain cache. Reads already treat expired entries as misses; the sweep
//! only keeps memory bounded for keys nobody asks for again.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::fetchers::DomainFetchers;

/// Spawns the sweeper. Abort the returned handle to stop it.
///
/// # Example
/// ```ignore
/// let sweeper = spawn_sweeper(fetchers.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweeper(fetchers: DomainFetchers, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiry sweeper with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = fetchers.sweep_expired().await;
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
