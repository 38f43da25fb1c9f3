//! Background cleanup sweep.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::PermissionCache;

/// Spawn the proactive expiry sweep as an independently cancellable task.
///
/// The task ticks at the cache's configured interval and exits when the
/// shutdown signal flips to `true`.
pub fn spawn_sweeper(
    cache: Arc<PermissionCache>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let interval = cache.config().sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cache.purge_expired();
                    if removed > 0 {
                        debug!(removed, "cache sweep purged expired entries");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::CacheConfig;

    #[tokio::test]
    async fn sweeper_purges_and_stops_on_shutdown() {
        let cache = Arc::new(PermissionCache::new(CacheConfig {
            ttl: Duration::from_millis(10),
            max_entries: 100,
            sweep_interval: Duration::from_millis(20),
        }));
        cache.set("k1", &1_u32);

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(Arc::clone(&cache), rx);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(cache.stats().entries, 0);

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
