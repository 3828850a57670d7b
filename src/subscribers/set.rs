//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`], which distributes events to multiple subscribers
//! concurrently without blocking the publisher (a runner thread or the manager).
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!     │    (bounded)         └──────► panic → SubscriberPanicked
//!     ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!     │    (bounded)
//!     └──► [queue N] ──► worker N ──► subscriberN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Isolation**: slow/panicking subscriber doesn't affect others
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//!
//! ## Panic handling
//! Worker tasks use `catch_unwind` to isolate panics:
//! - Panic is caught and converted to `SubscriberPanicked` event
//! - Worker continues processing next event
//! - Other subscribers unaffected
//!
//! **Warning**: `AssertUnwindSafe` is used, which can leave shared state inconsistent
//! if subscriber uses `Arc<Mutex<T>>` and panics while holding the lock.

use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::error::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for multiple event subscribers.
///
/// Manages per-subscriber queues and worker tasks, providing:
/// - **Concurrent delivery**: events sent to all subscribers simultaneously
/// - **Isolation**: each subscriber has dedicated queue and worker
/// - **Panic safety**: panics caught and reported, don't crash runtime
/// - **Overflow handling**: dropped events reported via `SubscriberOverflow`
pub struct SubscriberSet {
    channels: Vec<SubscriberChannel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// ### Per-subscriber setup
    /// - Bounded mpsc queue (capacity from [`Subscribe::queue_capacity`])
    /// - Dedicated worker task (runs until queue closed)
    /// - Panic isolation via `catch_unwind`
    ///
    /// ### Notes
    /// - Workers start immediately and process events until shutdown
    /// - Minimum queue capacity is 1 (enforced)
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let cap = sub.queue_capacity().max(1);
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(cap);
            let s = Arc::clone(&sub);
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = s.on_event(ev.as_ref());

                    if let Err(panic_err) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        let info = panic_message(&*panic_err);
                        bus_for_worker.publish(Event::subscriber_panicked(s.name(), info));
                    }
                }
            });
            channels.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Emits an event to all subscribers (clones the event).
    ///
    /// - Clones event, wraps in `Arc`, calls [`emit_arc`](Self::emit_arc)
    /// - Returns immediately (non-blocking)
    ///
    /// ### Notes
    /// For hot paths, use [`emit_arc`](Self::emit_arc) to avoid cloning.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full: drops event, publishes `SubscriberOverflow`
    /// - On queue closed: publishes `SubscriberOverflow` with reason "closed"
    ///
    /// ### Overflow prevention
    /// Prevents infinite loops: `SubscriberOverflow` events are not re-published if they themselves overflow.
    ///
    /// ### Rules
    /// Preferred over [`emit`](Self::emit) in hot paths (no clone).
    pub fn emit_arc(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "full"));
                    }
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    if !is_overflow_evt {
                        self.bus
                            .publish(Event::subscriber_overflow(channel.name, "closed"));
                    }
                }
            }
        }
    }

    /// Gracefully shuts down all subscriber workers.
    ///
    /// 1. Drops all channel senders (workers see channel closed)
    /// 2. Awaits all worker tasks to finish
    pub async fn shutdown(self) {
        drop(self.channels);

        for h in self.workers {
            let _ = h.await;
        }
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if there are no subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, _ev: &Event) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn name(&self) -> &'static str {
            "counter"
        }
    }

    struct Exploding;

    #[async_trait]
    impl Subscribe for Exploding {
        async fn on_event(&self, _ev: &Event) {
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            "exploding"
        }
    }

    #[tokio::test]
    async fn test_fan_out_and_panic_isolation() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let seen = Arc::new(AtomicUsize::new(0));
        let set = SubscriberSet::new(
            vec![Arc::new(Exploding), Arc::new(Counter(seen.clone()))],
            bus.clone(),
        );
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::RunnerCreated));
        set.emit(&Event::new(EventKind::RunnerStarted));
        set.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 2);
        let ev = rx.recv().await.unwrap();
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }
}
