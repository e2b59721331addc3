//! Per-client request history.
//!
//! Every request that reaches a handler leaves a short diagnostic line keyed by
//! the client's address, so a user standing next to a device can open `/log`
//! from the same network and see what the device asked for and what it got.
//!
//! ## Design
//!
//! - **One lock**: the whole `client -> entries` map sits behind a single
//!   `Mutex`. Append, render and prune are mutually exclusive; contention is
//!   low and every critical section is short.
//! - **Append-only logs**: entries are stamped with the wall clock on append,
//!   so each client's `Vec` is ordered oldest first.
//! - **No empty logs**: pruning drops a client key once its last entry ages
//!   out, so a present key always has at least one entry.
//! - **Best effort**: nothing is persisted; a restart forgets all history.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use tokio::sync::Mutex;
use tracing::info;

/// `time.Stamp`-style timestamp, e.g. `Jan  2 15:04:05`.
pub const STAMP_FORMAT: &str = "%b %e %H:%M:%S";

/// A single diagnostic line in a client's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | {}",
            self.timestamp.format(STAMP_FORMAT),
            self.message
        )
    }
}

/// In-memory `client -> [LogEntry]` journal with age-based pruning.
#[derive(Default)]
pub struct ClientLogStore {
    logs: Mutex<HashMap<String, Vec<LogEntry>>>,
}

impl ClientLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` to `client`'s history, stamped with the current time.
    ///
    /// The clock is read under the lock, so concurrent appends for one client
    /// land in timestamp order.
    pub async fn append(&self, client: &str, message: impl Into<String>) {
        let message = message.into();
        info!("{client}: {message}");
        let mut logs = self.logs.lock().await;
        let timestamp = Local::now();
        logs.entry(client.to_string())
            .or_default()
            .push(LogEntry { timestamp, message });
    }

    /// Append with an explicit timestamp, for seeding aged entries. Callers
    /// must not go backwards in time for a given client.
    pub async fn append_at(
        &self,
        client: &str,
        message: impl Into<String>,
        timestamp: DateTime<Local>,
    ) {
        let message = message.into();
        info!("{client}: {message}");
        let mut logs = self.logs.lock().await;
        logs.entry(client.to_string())
            .or_default()
            .push(LogEntry { timestamp, message });
    }

    /// Snapshot of `client`'s history, oldest first. Empty if none exists.
    pub async fn render(&self, client: &str) -> Vec<LogEntry> {
        let logs = self.logs.lock().await;
        logs.get(client).cloned().unwrap_or_default()
    }

    /// Number of clients with at least one retained entry.
    pub async fn client_count(&self) -> usize {
        self.logs.lock().await.len()
    }

    /// Drop entries older than `max_age`. Returns the number of entries removed.
    pub async fn prune(&self, max_age: Duration) -> usize {
        self.prune_at(max_age, Local::now()).await
    }

    /// Drop entries stamped at or before `now - max_age`.
    ///
    /// Each log is scanned from the front until the first fresh entry; that
    /// entry and everything after it are kept. Logs with no fresh entry are
    /// removed from the map.
    pub async fn prune_at(&self, max_age: Duration, now: DateTime<Local>) -> usize {
        let Some(threshold) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            return 0;
        };

        let mut removed = 0;
        let mut logs = self.logs.lock().await;
        logs.retain(|_, entries| {
            match entries.iter().position(|e| e.timestamp > threshold) {
                Some(cutoff) => {
                    entries.drain(..cutoff);
                    removed += cutoff;
                    true
                }
                None => {
                    removed += entries.len();
                    false
                }
            }
        });
        removed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[tokio::test]
    async fn test_append_then_render_preserves_order() {
        let store = ClientLogStore::new();
        for i in 0..5 {
            store.append("10.0.0.1", format!("msg {i}")).await;
        }
        store.append("10.0.0.2", "other").await;

        let entries = store.render("10.0.0.1").await;
        assert_eq!(
            messages(&entries),
            vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]
        );
        assert!(entries
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(store.client_count().await, 2);
    }

    #[tokio::test]
    async fn test_render_unknown_client_is_empty() {
        let store = ClientLogStore::new();
        assert!(store.render("nobody").await.is_empty());
        assert_eq!(store.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_render_is_idempotent() {
        let store = ClientLogStore::new();
        store.append("c", "a").await;
        store.append("c", "b").await;
        assert_eq!(store.render("c").await, store.render("c").await);
    }

    #[tokio::test]
    async fn test_prune_keeps_fresh_tail() {
        let store = ClientLogStore::new();
        let now = Local::now();
        let max_age = Duration::from_secs(300);

        store
            .append_at("c", "old", now - chrono::Duration::seconds(600))
            .await;
        store
            .append_at("c", "half", now - chrono::Duration::seconds(150))
            .await;
        store.append_at("c", "new", now).await;

        let removed = store.prune_at(max_age, now).await;
        assert_eq!(removed, 1);
        assert_eq!(messages(&store.render("c").await), vec!["half", "new"]);
    }

    #[tokio::test]
    async fn test_prune_removes_fully_aged_client() {
        let store = ClientLogStore::new();
        let now = Local::now();
        store
            .append_at("stale", "a", now - chrono::Duration::seconds(900))
            .await;
        store
            .append_at("stale", "b", now - chrono::Duration::seconds(600))
            .await;
        store.append_at("fresh", "c", now).await;

        let removed = store.prune_at(Duration::from_secs(300), now).await;
        assert_eq!(removed, 2);
        assert_eq!(store.client_count().await, 1);
        assert!(store.render("stale").await.is_empty());
        assert_eq!(messages(&store.render("fresh").await), vec!["c"]);
    }

    #[tokio::test]
    async fn test_prune_boundary_is_inclusive() {
        let store = ClientLogStore::new();
        let now = Local::now();
        store
            .append_at("c", "edge", now - chrono::Duration::seconds(300))
            .await;
        store
            .append_at("c", "inside", now - chrono::Duration::seconds(299))
            .await;
        store.prune_at(Duration::from_secs(300), now).await;
        assert_eq!(messages(&store.render("c").await), vec!["inside"]);
    }

    #[tokio::test]
    async fn test_prune_with_huge_max_age_is_noop() {
        let store = ClientLogStore::new();
        store.append("c", "a").await;
        assert_eq!(store.prune(Duration::MAX).await, 0);
        assert_eq!(store.render("c").await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_appends_are_not_lost() {
        let store = Arc::new(ClientLogStore::new());
        let mut handles = Vec::new();
        for i in 0..200 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append("10.0.0.9", format!("req {i}")).await;
            }));
        }
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.prune(Duration::from_secs(300)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.render("10.0.0.9").await.len(), 200);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn test_concurrent_appends_keep_timestamp_order() {
        for _ in 0..20 {
            let store = Arc::new(ClientLogStore::new());
            let handles: Vec<_> = (0..400)
                .map(|i| {
                    let store = store.clone();
                    tokio::spawn(async move { store.append("c", format!("req {i}")).await })
                })
                .collect();
            for handle in handles {
                handle.await.unwrap();
            }

            let entries = store.render("c").await;
            assert_eq!(entries.len(), 400);
            assert!(entries
                .windows(2)
                .all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn test_entry_display() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T15:04:05+00:00")
            .unwrap()
            .with_timezone(&Local);
        let entry = LogEntry {
            timestamp: ts,
            message: "log request".to_string(),
        };
        let expected = format!("{} | log request", ts.format(STAMP_FORMAT));
        assert_eq!(entry.to_string(), expected);
    }
}
