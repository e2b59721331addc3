//! Background retention sweep for [`ClientLogStore`].
//!
//! Fires every half retention window and prunes entries older than the full
//! window, so an entry lives at most 1.5x the configured retention. Stops as
//! soon as the shutdown token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::history::ClientLogStore;

/// Shortest sweep period, for retention windows under a few milliseconds.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Spawn the sweeper on `tracker` so shutdown can wait for it.
pub fn spawn(
    tracker: &TaskTracker,
    history: Arc<ClientLogStore>,
    retention: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tracker.spawn(run(history, retention, shutdown))
}

/// Sweep loop. Returns once `shutdown` is cancelled.
pub async fn run(history: Arc<ClientLogStore>, retention: Duration, shutdown: CancellationToken) {
    let period = (retention / 2).max(MIN_PERIOD);
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Retention sweeper started (every {period:?}, retention {retention:?})");
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let removed = history.prune(retention).await;
                if removed > 0 {
                    debug!(
                        "Pruned {removed} log entries, {} clients remain",
                        history.client_count().await
                    );
                }
            }
        }
    }
    debug!("Retention sweeper stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sweeper_prunes_expired_entries() {
        let history = Arc::new(ClientLogStore::new());
        history.append("10.0.0.1", "firmware request").await;

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        spawn(
            &tracker,
            history.clone(),
            Duration::from_millis(100),
            shutdown.clone(),
        );
        tracker.close();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(history.client_count().await, 0);

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), tracker.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_sweeper_keeps_fresh_entries_and_stops_on_cancel() {
        let history = Arc::new(ClientLogStore::new());
        history.append("10.0.0.1", "log request").await;

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run(
            history.clone(),
            Duration::from_secs(3600),
            shutdown.clone(),
        ));

        tokio::task::yield_now().await;
        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(history.render("10.0.0.1").await.len(), 1);
    }
}
