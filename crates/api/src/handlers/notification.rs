//! Server-sent event stream of generation completions.
//!
//! Each connected client gets one pull loop that waits on three things at
//! once: the client's mailbox on the [`NotificationBus`], a heartbeat
//! ticker, and the server's shutdown token. The mailbox is unsubscribed
//! when the stream is dropped, which happens as soon as the client goes
//! away.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use mediagate_events::{NotificationBus, NotificationEvent, Subscription};
use serde::Deserialize;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const EVENT_HEARTBEAT: &str = "heartbeat";

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    pub client_id: String,
}

/// GET /api/v1/notifications/stream?client_id=...
///
/// Emits `generation_completed` events for the client plus a `heartbeat`
/// event every `SSE_HEARTBEAT_SECS`. Events published while the client is
/// not connected are not replayed.
pub async fn stream_notifications(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let client_id = params.client_id.trim();
    if client_id.is_empty() {
        return Err(AppError::BadRequest("client_id is required".into()));
    }

    let bus = Arc::clone(state.bus());
    let subscription = bus.subscribe(client_id);
    tracing::info!(client_id, "SSE client connected");

    let stream = NotificationStream::new(
        Mailbox { bus, subscription },
        state.config.sse_heartbeat(),
        state.shutdown.clone(),
    );

    Ok(Sse::new(futures::stream::unfold(stream, NotificationStream::next)))
}

// ---------------------------------------------------------------------------
// Pull loop
// ---------------------------------------------------------------------------

/// A bus subscription that removes itself from the bus on drop.
struct Mailbox {
    bus: Arc<NotificationBus>,
    subscription: Subscription,
}

impl Drop for Mailbox {
    fn drop(&mut self) {
        self.bus.unsubscribe(&self.subscription);
        tracing::info!(client_id = self.subscription.client_id(), "SSE client disconnected");
    }
}

struct NotificationStream {
    mailbox: Mailbox,
    heartbeat: Interval,
    shutdown: CancellationToken,
}

impl NotificationStream {
    fn new(mailbox: Mailbox, period: Duration, shutdown: CancellationToken) -> Self {
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            mailbox,
            heartbeat,
            shutdown,
        }
    }

    /// Next SSE event, or `None` once the server shuts down or the bus
    /// closes the mailbox.
    async fn next(mut self) -> Option<(Result<Event, Infallible>, Self)> {
        let event = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return None,
            received = self.mailbox.subscription.recv() => completion_event(&received?),
            _ = self.heartbeat.tick() => heartbeat_event(),
        };
        Some((Ok(event), self))
    }
}

fn completion_event(notification: &NotificationEvent) -> Event {
    let event = Event::default().event(notification.event.as_str());
    match serde_json::to_string(notification) {
        Ok(json) => event.data(json),
        Err(e) => {
            tracing::warn!(
                record_id = notification.record_id,
                error = %e,
                "Failed to encode notification",
            );
            event.data("{}")
        }
    }
}

fn heartbeat_event() -> Event {
    Event::default()
        .event(EVENT_HEARTBEAT)
        .data(r#"{"event":"heartbeat"}"#)
}
