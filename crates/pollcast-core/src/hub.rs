//! NotificationHub: registry of connected push subscribers and snapshot fan-out.
//!
//! Every subscriber owns a bounded queue. Broadcasting never waits on a
//! subscriber: a closed or full queue is a transport failure and the
//! subscriber is removed on the spot, without affecting anyone else.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};

use crate::error::DeliveryError;
use crate::log::MessageLog;
use crate::message::Snapshot;

pub type SubscriberId = u64;

/// Receiving side of one push client's delivery channel.
///
/// The first delivery is always the full history at subscribe time; every
/// later one is a post-append snapshot.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<Snapshot>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next delivery, or `None` once the hub has dropped this subscriber.
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Snapshot> {
        self.rx.try_recv().ok()
    }
}

/// Outcome of one `broadcast` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    /// The snapshot was older than one already broadcast and was not sent.
    pub stale: bool,
}

pub struct NotificationHub {
    log: Arc<MessageLog>,
    buffer: usize,
    inner: Mutex<HubInner>,
}

struct HubInner {
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, mpsc::Sender<Snapshot>>,
    /// Longest snapshot handed to any subscriber so far.
    high_water: usize,
}

impl NotificationHub {
    pub fn new(log: Arc<MessageLog>, buffer: usize) -> Self {
        Self {
            log,
            buffer: buffer.max(1),
            inner: Mutex::new(HubInner {
                next_id: 1,
                subscribers: HashMap::new(),
                high_water: 0,
            }),
        }
    }

    /// Register a subscriber and queue the current full log as its first delivery.
    ///
    /// The snapshot is taken under the registry lock, so no broadcast can
    /// slip in between the initial delivery and registration.
    pub async fn subscribe(&self) -> Subscriber {
        let (tx, rx) = mpsc::channel(self.buffer);
        let mut inner = self.inner.lock().await;

        let initial = self.log.snapshot().await;
        inner.high_water = inner.high_water.max(initial.len());
        // A fresh channel with capacity >= 1 always has room.
        let _ = tx.try_send(initial);

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        tracing::debug!(subscriber = id, total = inner.subscribers.len(), "subscriber registered");

        Subscriber { id, rx }
    }

    /// Remove a subscriber. Returns whether it was still registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock().await;
        let removed = inner.subscribers.remove(&id).is_some();
        if removed {
            tracing::debug!(subscriber = id, total = inner.subscribers.len(), "subscriber removed");
        }
        removed
    }

    /// Push `snapshot` to every registered subscriber.
    pub async fn broadcast(&self, snapshot: &Snapshot) -> BroadcastReport {
        let mut inner = self.inner.lock().await;

        if snapshot.len() < inner.high_water {
            tracing::debug!(
                len = snapshot.len(),
                high_water = inner.high_water,
                "skipping stale broadcast"
            );
            return BroadcastReport {
                stale: true,
                ..BroadcastReport::default()
            };
        }
        inner.high_water = snapshot.len();

        let mut report = BroadcastReport::default();
        let mut failed = Vec::new();
        for (&id, tx) in &inner.subscribers {
            match deliver(id, tx, snapshot) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping push subscriber");
                    failed.push(id);
                }
            }
        }
        for id in &failed {
            inner.subscribers.remove(id);
        }
        report.dropped = failed.len();

        tracing::debug!(
            len = snapshot.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast complete"
        );
        report
    }

    /// Number of currently registered subscribers.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn deliver(
    id: SubscriberId,
    tx: &mpsc::Sender<Snapshot>,
    snapshot: &Snapshot,
) -> Result<(), DeliveryError> {
    tx.try_send(Arc::clone(snapshot)).map_err(|e| {
        let reason = match e {
            mpsc::error::TrySendError::Full(_) => "queue full",
            mpsc::error::TrySendError::Closed(_) => "channel closed",
        };
        DeliveryError::TransportFailure { id, reason }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(buffer: usize) -> (Arc<MessageLog>, NotificationHub) {
        let log = Arc::new(MessageLog::new());
        let hub = NotificationHub::new(Arc::clone(&log), buffer);
        (log, hub)
    }

    fn texts(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.iter().map(|m| m.text.as_str()).collect()
    }

    #[tokio::test]
    async fn subscribe_delivers_full_history_first() {
        let (log, hub) = setup(8);
        log.append("a").await;
        log.append("b").await;

        let mut sub = hub.subscribe().await;
        let initial = sub.try_recv().expect("initial delivery queued");
        assert_eq!(texts(&initial), vec!["a", "b"]);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn subscribe_to_empty_log_gets_empty_list() {
        let (_log, hub) = setup(8);
        let mut sub = hub.subscribe().await;
        assert!(sub.try_recv().unwrap().is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_subscriber() {
        let (log, hub) = setup(8);
        let mut a = hub.subscribe().await;
        let mut b = hub.subscribe().await;
        a.try_recv();
        b.try_recv();

        let (_, snap) = log.append_with_snapshot("hi").await;
        let report = hub.broadcast(&snap).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);
        assert_eq!(texts(&a.try_recv().unwrap()), vec!["hi"]);
        assert_eq!(texts(&b.try_recv().unwrap()), vec!["hi"]);
    }

    #[tokio::test]
    async fn ids_are_unique() {
        let (_log, hub) = setup(8);
        let a = hub.subscribe().await;
        let b = hub.subscribe().await;
        assert_ne!(a.id(), b.id());
        assert_eq!(hub.len().await, 2);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let (_log, hub) = setup(8);
        let sub = hub.subscribe().await;
        assert!(hub.unsubscribe(sub.id()).await);
        assert!(!hub.unsubscribe(sub.id()).await);
        assert!(!hub.unsubscribe(9999).await);
        assert!(hub.is_empty().await);
    }

    #[tokio::test]
    async fn unsubscribed_handle_receives_nothing_more() {
        let (log, hub) = setup(8);
        let mut sub = hub.subscribe().await;
        sub.try_recv();
        hub.unsubscribe(sub.id()).await;

        let (_, snap) = log.append_with_snapshot("late").await;
        let report = hub.broadcast(&snap).await;
        assert_eq!(report.delivered, 0);
        // Sender side is gone, so the stream ends.
        assert!(sub.recv().await.is_none());
    }

    #[tokio::test]
    async fn closed_subscriber_is_removed_without_affecting_others() {
        let (log, hub) = setup(8);
        let gone = hub.subscribe().await;
        let mut alive = hub.subscribe().await;
        alive.try_recv();
        drop(gone);

        let (_, snap) = log.append_with_snapshot("x").await;
        let report = hub.broadcast(&snap).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(hub.len().await, 1);
        assert_eq!(texts(&alive.try_recv().unwrap()), vec!["x"]);
    }

    #[tokio::test]
    async fn full_queue_drops_the_slow_subscriber() {
        let (log, hub) = setup(1);
        // Never drained: the initial delivery fills its single slot.
        let mut slow = hub.subscribe().await;

        let (_, snap) = log.append_with_snapshot("x").await;
        let report = hub.broadcast(&snap).await;

        assert_eq!(report.dropped, 1);
        assert!(hub.is_empty().await);
        // Queued deliveries are still readable, then the stream ends.
        assert!(slow.recv().await.is_some());
        assert!(slow.recv().await.is_none());
    }

    #[tokio::test]
    async fn stale_snapshot_is_not_broadcast() {
        let (log, hub) = setup(8);
        let mut sub = hub.subscribe().await;
        sub.try_recv();

        let (_, older) = log.append_with_snapshot("1").await;
        let (_, newer) = log.append_with_snapshot("2").await;

        assert_eq!(hub.broadcast(&newer).await.delivered, 1);
        let report = hub.broadcast(&older).await;
        assert!(report.stale);
        assert_eq!(report.delivered, 0);

        assert_eq!(sub.try_recv().unwrap().len(), 2);
        assert!(sub.try_recv().is_none());
    }

    #[tokio::test]
    async fn subscriber_added_after_append_sees_it_in_initial_delivery() {
        let (log, hub) = setup(8);
        for text in ["a", "b", "c"] {
            log.append(text).await;
        }
        let mut sub = hub.subscribe().await;
        assert_eq!(sub.try_recv().unwrap().len(), 3);

        let (_, snap) = log.append_with_snapshot("d").await;
        hub.broadcast(&snap).await;
        assert_eq!(texts(&sub.try_recv().unwrap()), vec!["a", "b", "c", "d"]);
    }
}
