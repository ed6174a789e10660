//! Notification queue
//!
//! Stores enqueue "re-evaluate X" events inside the transaction that made
//! the change; updater workers in any process drain them.

pub mod model;
pub mod queue;

pub use model::{NotificationRecord, NotifyEventType};
pub use queue::NotificationQueue;
