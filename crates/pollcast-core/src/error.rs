//! Error types for the delivery core.

use thiserror::Error;

use crate::hub::SubscriberId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Missing or empty message text. Rejected before the log is touched.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A push subscriber's channel could not take a delivery.
    /// Handled inside the hub by dropping that subscriber.
    #[error("subscriber {id} cannot receive: {reason}")]
    TransportFailure { id: SubscriberId, reason: &'static str },
}
