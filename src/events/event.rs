//! # Runtime events emitted by runners, the module manager and the supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Runner lifecycle**: created, started, stopping, dead
//! - **Module failures**: execute failed, illegal control, reload failed, finalise failed
//! - **Manager events**: unknown module names, application shutdown requests
//! - **Subscriber events**: overflow and panic of event subscribers
//!
//! The [`Event`] struct carries additional metadata such as timestamps, runner
//! and module names, signals, delays and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use modvisor::{Event, EventKind, Signal};
//!
//! let ev = Event::new(EventKind::RunnerDead)
//!     .with_runner("heartbeat-0")
//!     .with_module("heartbeat")
//!     .with_signal(Signal::Kill);
//!
//! assert_eq!(ev.kind, EventKind::RunnerDead);
//! assert_eq!(ev.runner.as_deref(), Some("heartbeat-0"));
//! assert_eq!(ev.signal, Some(Signal::Kill));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::module::Signal;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `runner`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `runner`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Shutdown events ===
    /// OS termination signal observed by the supervisor.
    ShutdownSignalled,

    /// Application shutdown requested through the control plane.
    ///
    /// Sets:
    /// - `runner`: the manager runner that observed the request
    ShutdownRequested,

    /// Every runner stopped within the grace period after an OS signal.
    AllStoppedWithin,

    /// Grace period exceeded; some runners did not stop in time.
    ///
    /// Sets:
    /// - `reason`: names of the runners still alive
    GraceExceeded,

    // === Runner lifecycle events ===
    /// Runner constructed (state `INIT`).
    ///
    /// Sets:
    /// - `runner`, `module`
    RunnerCreated,

    /// Runner thread spawned, about to initialise its module.
    ///
    /// Sets:
    /// - `runner`, `module`
    RunnerStarted,

    /// Runner left its loop and is finalising its module.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `signal`: signal of the terminal control
    RunnerStopping,

    /// Runner finished; its module was dropped.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `signal`: exit signal
    RunnerDead,

    // === Module events ===
    /// `execute` failed or panicked; retried after the retry interval.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `reason`: failure message
    /// - `delay_ms`: retry delay
    ExecuteFailed,

    /// `execute` returned a control with a negative delay.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `delay_ms`: the offending delay
    IllegalControl,

    /// Module re-initialised on a `RELOAD` control.
    ///
    /// Sets:
    /// - `runner`, `module`
    ModuleReloaded,

    /// `initialise` failed (on start or on reload).
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `signal`: `FAILED_INITIALISE` or `FAILED_RELOAD`
    /// - `reason`: failure message
    InitialiseFailed,

    /// `finalise` failed, even after being forced with `KILL`.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `reason`: failure message
    FinaliseFailed,

    // === Manager events ===
    /// A configured, registered or targeted module name is not in the registry.
    ///
    /// Sets:
    /// - `module`: the unknown name
    /// - `reason`: where the name came from
    ModuleUnknown,

    /// Runner shutdown forwarded by the manager.
    ///
    /// Sets:
    /// - `runner`, `module`
    /// - `signal`: forwarded signal
    ShutdownForwarded,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Runner (or subscriber) name, if applicable.
    pub runner: Option<Arc<str>>,
    /// Module name, if applicable.
    pub module: Option<Arc<str>>,
    /// Signal involved, if any.
    pub signal: Option<Signal>,
    /// Delay in milliseconds, possibly negative for illegal controls.
    pub delay_ms: Option<i64>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            runner: None,
            module: None,
            signal: None,
            delay_ms: None,
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a runner name.
    #[inline]
    pub fn with_runner(mut self, runner: impl Into<Arc<str>>) -> Self {
        self.runner = Some(runner.into());
        self
    }

    /// Attaches a module name.
    #[inline]
    pub fn with_module(mut self, module: impl Into<Arc<str>>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Attaches a signal.
    #[inline]
    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attaches a delay in milliseconds.
    #[inline]
    pub fn with_delay_ms(mut self, delay_ms: i64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_runner(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_runner(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::RunnerCreated);
        let b = Event::new(EventKind::RunnerStarted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_subscriber_helpers() {
        let ev = Event::subscriber_overflow("log", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.reason.as_deref(), Some("subscriber=log reason=full"));
        assert!(Event::subscriber_panicked("log", "boom".into()).is_subscriber_panic());
    }
}
