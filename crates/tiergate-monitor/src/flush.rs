//! Periodic flush task.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::PermissionMonitor;

/// Spawn the periodic flush as an independently cancellable task.
///
/// Each tick dispatches batched alerts and prunes anything past the
/// retention window. Shutdown performs one final flush before the task
/// exits, so buffered events and alerts are never dropped silently.
pub fn spawn_flusher(
    monitor: Arc<PermissionMonitor>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let pruned = monitor.flush();
                    if pruned > 0 {
                        debug!(pruned, "monitor flush pruned expired events");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        monitor.flush();
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MonitorConfig;

    #[tokio::test]
    async fn flusher_flushes_on_shutdown() {
        let monitor = Arc::new(PermissionMonitor::new(MonitorConfig::default()));
        let (tx, rx) = watch::channel(false);
        let handle = spawn_flusher(Arc::clone(&monitor), Duration::from_secs(30), rx);

        monitor.create_alert(crate::AlertSeverity::Info, "window open");
        tx.send(true).unwrap();
        handle.await.unwrap();
        // batched alert was dispatched and retained as active
        assert_eq!(monitor.active_alerts().len(), 1);
    }
}
