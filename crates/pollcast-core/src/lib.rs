//! pollcast-core: one in-memory message log, three ways to read it.
//!
//! - push: [`NotificationHub`] subscribers receive the full list on connect
//!   and after every append;
//! - short-polling: [`DeliveryGateway::get_short`] returns the list now;
//! - long-polling: [`DeliveryGateway::get_long`] parks until the list grows
//!   past the caller's count or the wait elapses.
//!
//! Every mode hands out the full history, never a delta.

pub mod config;
pub mod error;
pub mod gateway;
pub mod hub;
pub mod log;
pub mod message;
pub mod waiter;

pub use config::CoreConfig;
pub use error::DeliveryError;
pub use gateway::{DeliveryGateway, GatewayStats};
pub use hub::{BroadcastReport, NotificationHub, Subscriber, SubscriberId};
pub use log::MessageLog;
pub use message::{Message, Snapshot};
pub use waiter::{PollWaiter, WaitOutcome, WaitState};
