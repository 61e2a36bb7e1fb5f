//! The event stream: an in-process ordered publish/subscribe bus.
//!
//! Publishing enqueues the event on an unbounded channel and never blocks; a
//! dispatcher task drains the queue and delivers each event to every
//! currently-subscribed handler in subscription order, one event fully
//! delivered before the next. Two consequences controllers rely on:
//!
//! - a handler is never invoked concurrently with itself or any other
//!   handler, so "strictly one event at a time" holds bus-wide;
//! - a handler (or a step holding a controller lock) may publish without
//!   re-entering itself, because delivery happens on the dispatcher task
//!   after the current event finishes.
//!
//! Delivery is at least once, within-process, with no durability.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::trace;

use crate::error::{ControllerError, Result};
use crate::events::{Event, EventPayload, EventSource};

/// A boxed async subscriber callback.
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Clone)]
struct Subscriber {
    id: String,
    handler: EventHandler,
}

enum BusItem {
    Deliver(Event),
    Flush(oneshot::Sender<()>),
}

/// The ordered event bus shared by a controller tree, external producers
/// and any runtime executing actions.
///
/// Cloning an `EventStream` shares the underlying queue and subscriber
/// list. The dispatcher task exits when every clone has been dropped.
///
/// Must be created within a Tokio runtime.
#[derive(Clone)]
pub struct EventStream {
    tx: mpsc::UnboundedSender<BusItem>,
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
    published: Arc<AtomicU64>,
}

impl EventStream {
    /// Create a new event stream and spawn its dispatcher task.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscribers: Arc<Mutex<Vec<Subscriber>>> = Arc::new(Mutex::new(Vec::new()));

        let dispatch_subs = Arc::clone(&subscribers);
        tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                match item {
                    BusItem::Deliver(event) => {
                        // Snapshot the subscriber list so handlers can
                        // subscribe/unsubscribe while delivery is underway;
                        // new subscribers see the next event.
                        let subs: Vec<Subscriber> = dispatch_subs.lock().await.clone();
                        for sub in subs {
                            trace!(subscriber = %sub.id, "delivering event");
                            (sub.handler)(event.clone()).await;
                        }
                    }
                    BusItem::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self {
            tx,
            subscribers,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Publish an event, stamping it with `source`.
    ///
    /// Never blocks and never invokes handlers inline.
    ///
    /// # Errors
    /// Returns `ControllerError::BusClosed` if the dispatcher is gone.
    pub fn publish(&self, payload: impl Into<EventPayload>, source: EventSource) -> Result<()> {
        let event = Event::new(payload, source);
        self.published.fetch_add(1, Ordering::SeqCst);
        self.tx
            .send(BusItem::Deliver(event))
            .map_err(|_| ControllerError::BusClosed)
    }

    /// Register a handler under `subscriber_id`. A handler already
    /// registered under the same id is replaced.
    pub async fn subscribe(&self, subscriber_id: impl Into<String>, handler: EventHandler) {
        let id = subscriber_id.into();
        let mut subs = self.subscribers.lock().await;
        subs.retain(|s| s.id != id);
        subs.push(Subscriber { id, handler });
    }

    /// Remove the handler registered under `subscriber_id`, if any.
    pub async fn unsubscribe(&self, subscriber_id: &str) {
        self.subscribers
            .lock()
            .await
            .retain(|s| s.id != subscriber_id);
    }

    /// Ids of the current subscribers, in subscription order.
    pub async fn subscriber_ids(&self) -> Vec<String> {
        self.subscribers
            .lock()
            .await
            .iter()
            .map(|s| s.id.clone())
            .collect()
    }

    /// Wait until every event published so far has been delivered,
    /// including events published by handlers during the drain. Intended
    /// for tests and orderly shutdown.
    pub async fn wait_idle(&self) {
        loop {
            let before = self.published.load(Ordering::SeqCst);
            let (done_tx, done_rx) = oneshot::channel();
            if self.tx.send(BusItem::Flush(done_tx)).is_err() {
                return;
            }
            let _ = done_rx.await;
            if self.published.load(Ordering::SeqCst) == before {
                return;
            }
        }
    }
}

impl Default for EventStream {
    fn default() -> Self {
        Self::new()
    }
}
