//! Per-client notification fan-out.
//!
//! [`NotificationBus`] keeps a map from client id to the bounded mailboxes
//! of that client's live listeners. Delivery is at-most-once: a full
//! mailbox drops the event and nothing is replayed to late subscribers.
//! It is designed to be shared via `Arc<NotificationBus>`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::event::NotificationEvent;

/// Default number of undelivered events a single listener may buffer.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live listener registered for one client id.
///
/// Dropping the subscription closes its mailbox; the bus prunes it on the
/// next publish. Call [`NotificationBus::unsubscribe`] to remove it eagerly.
pub struct Subscription {
    client_id: String,
    id: u64,
    receiver: mpsc::Receiver<NotificationEvent>,
}

impl Subscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Wait for the next event. Returns `None` once the bus has dropped
    /// this mailbox.
    pub async fn recv(&mut self) -> Option<NotificationEvent> {
        self.receiver.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<NotificationEvent> {
        self.receiver.try_recv().ok()
    }
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

type Mailbox = (u64, mpsc::Sender<NotificationEvent>);

/// In-process publish/subscribe hub keyed by client id.
pub struct NotificationBus {
    capacity: usize,
    next_id: AtomicU64,
    subscribers: Mutex<HashMap<String, Vec<Mailbox>>>,
}

impl NotificationBus {
    /// Create a bus whose mailboxes hold at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_id: AtomicU64::new(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new listener for `client_id`.
    pub fn subscribe(&self, client_id: impl Into<String>) -> Subscription {
        let client_id = client_id.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        self.lock().entry(client_id.clone()).or_default().push((id, tx));
        tracing::debug!(client_id = %client_id, subscription_id = id, "Listener subscribed");

        Subscription {
            client_id,
            id,
            receiver: rx,
        }
    }

    /// Remove a listener. Removing an unknown subscription is a no-op.
    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subscribers = self.lock();
        if let Some(mailboxes) = subscribers.get_mut(&subscription.client_id) {
            mailboxes.retain(|(id, _)| *id != subscription.id);
            if mailboxes.is_empty() {
                subscribers.remove(&subscription.client_id);
            }
        }
        tracing::debug!(
            client_id = %subscription.client_id,
            subscription_id = subscription.id,
            "Listener unsubscribed",
        );
    }

    /// Push `event` to every listener of `client_id` without waiting.
    ///
    /// Returns the number of mailboxes that accepted the event. Full
    /// mailboxes drop it with a warning; closed ones are pruned.
    pub fn publish(&self, client_id: &str, event: NotificationEvent) -> usize {
        let mailboxes: Vec<Mailbox> = match self.lock().get(client_id) {
            Some(mailboxes) => mailboxes.clone(),
            None => return 0,
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, tx) in mailboxes {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        client_id,
                        subscription_id = id,
                        record_id = event.record_id,
                        "Listener mailbox full, dropping notification",
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        if !closed.is_empty() {
            self.prune(client_id, &closed);
        }
        delivered
    }

    /// Number of live listeners for `client_id`.
    pub fn subscriber_count(&self, client_id: &str) -> usize {
        self.lock().get(client_id).map_or(0, Vec::len)
    }

    /// Number of client ids with at least one listener.
    pub fn client_count(&self) -> usize {
        self.lock().len()
    }

    fn prune(&self, client_id: &str, closed: &[u64]) {
        let mut subscribers = self.lock();
        if let Some(mailboxes) = subscribers.get_mut(client_id) {
            mailboxes.retain(|(id, _)| !closed.contains(id));
            if mailboxes.is_empty() {
                subscribers.remove(client_id);
            }
        }
        tracing::debug!(client_id, pruned = closed.len(), "Pruned closed mailboxes");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Mailbox>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_reaches_every_listener_of_the_client() {
        let bus = NotificationBus::default();
        let mut a = bus.subscribe("c1");
        let mut b = bus.subscribe("c1");
        let mut other = bus.subscribe("c2");

        assert_eq!(bus.publish("c1", NotificationEvent::success(1, None)), 2);

        assert_eq!(a.recv().await.unwrap().record_id, 1);
        assert_eq!(b.recv().await.unwrap().record_id, 1);
        assert!(other.try_recv().is_none());
    }

    #[test]
    fn publish_without_subscribers_is_a_noop() {
        let bus = NotificationBus::default();
        assert_eq!(bus.publish("nobody", NotificationEvent::failure(1, "x")), 0);
        assert_eq!(bus.client_count(), 0);
    }

    #[tokio::test]
    async fn full_mailbox_drops_without_blocking_others() {
        let bus = NotificationBus::new(1);
        let mut slow = bus.subscribe("c1");
        let mut fast = bus.subscribe("c1");

        assert_eq!(bus.publish("c1", NotificationEvent::success(1, None)), 2);
        assert_eq!(fast.recv().await.unwrap().record_id, 1);

        // `slow` still holds event 1, so event 2 only reaches `fast`.
        assert_eq!(bus.publish("c1", NotificationEvent::success(2, None)), 1);
        assert_eq!(fast.recv().await.unwrap().record_id, 2);

        assert_eq!(slow.recv().await.unwrap().record_id, 1);
        assert!(slow.try_recv().is_none());
        assert_eq!(bus.subscriber_count("c1"), 2);
    }

    #[test]
    fn unsubscribe_removes_listener_and_empty_client() {
        let bus = NotificationBus::default();
        let sub = bus.subscribe("c1");
        assert_eq!(bus.subscriber_count("c1"), 1);

        bus.unsubscribe(&sub);
        assert_eq!(bus.subscriber_count("c1"), 0);
        assert_eq!(bus.client_count(), 0);

        bus.unsubscribe(&sub);
    }

    #[test]
    fn dropped_subscriptions_are_pruned_on_publish() {
        let bus = NotificationBus::default();
        let gone = bus.subscribe("c1");
        let _kept = bus.subscribe("c1");
        drop(gone);

        assert_eq!(bus.publish("c1", NotificationEvent::success(3, None)), 1);
        assert_eq!(bus.subscriber_count("c1"), 1);
    }
}
