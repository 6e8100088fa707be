//! Completion notifications for live listeners.
//!
//! - [`NotificationBus`] — per-client fan-out over bounded mailboxes.
//! - [`NotificationEvent`] — the `generation_completed` envelope pushed to
//!   SSE listeners.

pub mod bus;
pub mod event;

pub use bus::{NotificationBus, Subscription, DEFAULT_MAILBOX_CAPACITY};
pub use event::{CompletionStatus, NotificationEvent, EVENT_GENERATION_COMPLETED};
