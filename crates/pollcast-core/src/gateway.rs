//! DeliveryGateway: the single entry point the transports call into.
//!
//! Each transport event maps to exactly one call here; the gateway knows
//! nothing about HTTP or WebSocket wiring.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::CoreConfig;
use crate::error::DeliveryError;
use crate::hub::{NotificationHub, Subscriber, SubscriberId};
use crate::log::MessageLog;
use crate::message::{Message, Snapshot};
use crate::waiter::{PollWaiter, WaitOutcome};

/// Point-in-time counters for health output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub messages: usize,
    pub subscribers: usize,
    pub pending_waits: usize,
}

pub struct DeliveryGateway {
    log: Arc<MessageLog>,
    hub: NotificationHub,
    waiter: PollWaiter,
    default_wait: Duration,
}

impl DeliveryGateway {
    /// Build the core around a fresh, empty log. Writes only enter through
    /// [`post_message`](Self::post_message) and [`on_message`](Self::on_message),
    /// so every append reaches both waiters and push subscribers.
    pub fn new(config: CoreConfig) -> Self {
        let config = config.normalized();
        let log = Arc::new(MessageLog::new());
        Self {
            hub: NotificationHub::new(Arc::clone(&log), config.subscriber_buffer),
            waiter: PollWaiter::new(Arc::clone(&log), config.recheck_interval, config.max_wait),
            default_wait: config.default_wait,
            log,
        }
    }

    /// Validate, append and fan the resulting snapshot out to push subscribers.
    /// Long-poll waiters are woken by the append itself.
    pub async fn post_message(&self, text: &str) -> Result<Message, DeliveryError> {
        validate_text(text)?;

        let (message, snapshot) = self.log.append_with_snapshot(text).await;
        let report = self.hub.broadcast(&snapshot).await;
        tracing::debug!(
            len = snapshot.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "message posted"
        );
        Ok(message)
    }

    /// Short-poll: the full log, right now.
    pub async fn get_short(&self) -> Snapshot {
        self.log.snapshot().await
    }

    /// Long-poll: the full log once it grows past `threshold`, or after the
    /// wait elapses. `None` uses the configured default wait.
    pub async fn get_long(&self, threshold: usize, max_wait: Option<Duration>) -> WaitOutcome {
        self.waiter
            .wait(threshold, max_wait.unwrap_or(self.default_wait))
            .await
    }

    /// Push channel opened. The returned subscriber already holds the full history.
    pub async fn on_connect(&self) -> Subscriber {
        self.hub.subscribe().await
    }

    /// Text received on a push channel.
    pub async fn on_message(&self, text: &str) -> Result<Message, DeliveryError> {
        self.post_message(text).await
    }

    /// Push channel closed. Safe to call more than once.
    pub async fn on_disconnect(&self, id: SubscriberId) {
        self.hub.unsubscribe(id).await;
    }

    pub async fn stats(&self) -> GatewayStats {
        GatewayStats {
            messages: self.log.len(),
            subscribers: self.hub.len().await,
            pending_waits: self.waiter.pending(),
        }
    }
}

fn validate_text(text: &str) -> Result<(), DeliveryError> {
    if text.trim().is_empty() {
        return Err(DeliveryError::InvalidInput("message text must not be empty".into()));
    }
    Ok(())
}
