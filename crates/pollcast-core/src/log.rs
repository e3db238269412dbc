//! MessageLog: the append-only, process-wide message store.
//!
//! Single source of truth for every delivery mode. Appends take the write
//! lock; snapshots take the read lock and run concurrently with each other.
//! Each append also publishes the new length on a `watch` channel so
//! long-poll waiters wake without touching the lock.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, watch};

use crate::message::{Message, Snapshot, next_timestamp};

pub struct MessageLog {
    entries: RwLock<Snapshot>,
    len_tx: watch::Sender<usize>,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageLog {
    /// Create an empty log. Called once at startup; nothing is persisted.
    pub fn new() -> Self {
        let (len_tx, _len_rx) = watch::channel(0);
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            len_tx,
        }
    }

    /// Append `text` stamped with the current time and return the stored message.
    pub async fn append(&self, text: impl Into<String>) -> Message {
        self.append_with_snapshot(text).await.0
    }

    /// Append and return the message together with the snapshot the append
    /// produced, both taken under the same write lock.
    pub async fn append_with_snapshot(&self, text: impl Into<String>) -> (Message, Snapshot) {
        let mut entries = self.entries.write().await;

        let previous = entries.last().map(|m| m.timestamp);
        let message = Message::new(text, next_timestamp(previous, Utc::now()));

        // Copies only when an outstanding snapshot still shares the buffer.
        Arc::make_mut(&mut *entries).push(message.clone());
        let snapshot = Arc::clone(&*entries);

        // Publish while still holding the write lock so waiters never see a
        // length ahead of what `snapshot()` can return.
        self.len_tx.send_replace(snapshot.len());

        tracing::trace!(len = snapshot.len(), "message appended");
        (message, snapshot)
    }

    /// Current full log. Unaffected by later appends.
    pub async fn snapshot(&self) -> Snapshot {
        Arc::clone(&*self.entries.read().await)
    }

    /// Current message count, read from the length channel without locking.
    pub fn len(&self) -> usize {
        *self.len_tx.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver that observes every length change. Used by long-poll waiters.
    pub fn watch_len(&self) -> watch::Receiver<usize> {
        self.len_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_log_is_empty() {
        let log = MessageLog::new();
        assert!(log.is_empty());
        assert!(log.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn append_preserves_order_and_stamps_increasing() {
        let log = MessageLog::new();
        let hello = log.append("hello").await;
        let world = log.append("world").await;

        let snap = log.snapshot().await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0], hello);
        assert_eq!(snap[1], world);
        assert!(snap[0].timestamp < snap[1].timestamp);
    }

    #[tokio::test]
    async fn snapshot_is_not_affected_by_later_appends() {
        let log = MessageLog::new();
        log.append("one").await;
        let before = log.snapshot().await;

        log.append("two").await;

        assert_eq!(before.len(), 1);
        assert_eq!(before[0].text, "one");
        assert_eq!(log.snapshot().await.len(), 2);
    }

    #[tokio::test]
    async fn append_with_snapshot_includes_the_new_message() {
        let log = MessageLog::new();
        log.append("first").await;
        let (msg, snap) = log.append_with_snapshot("second").await;
        assert_eq!(snap.len(), 2);
        assert_eq!(snap.last(), Some(&msg));
    }

    #[tokio::test]
    async fn len_and_watch_track_appends() {
        let log = MessageLog::new();
        let mut rx = log.watch_len();
        assert_eq!(*rx.borrow(), 0);

        log.append("a").await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn repeated_snapshots_without_appends_are_identical() {
        let log = MessageLog::new();
        log.append("x").await;
        let a = log.snapshot().await;
        let b = log.snapshot().await;
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a, &b));
    }
}
