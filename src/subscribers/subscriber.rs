//! # Event subscriber trait.
//!
//! Provides [`Subscribe`], an extension point for plugging custom event handlers into the runtime.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently on the supervisor runtime)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are caught and reported as `EventKind::SubscriberPanicked`)
//!
//! ## Architecture
//! ```text
//! SubscriberSet ──► [bounded queue] ──► worker task ──► subscriber.on_event()
//!                                    └─► panic caught → EventKind::SubscriberPanicked
//! ```
//!
//! ## Rules
//! - A slow subscriber only affects its own queue.
//! - Queue overflow drops the event **for this subscriber only** and publishes
//!   `EventKind::SubscriberOverflow`.
//! - Events are processed sequentially (FIFO) per subscriber.
//! - Subscribers never block runner threads: runners publish and move on.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use modvisor::{Event, EventKind, Subscribe};
//!
//! struct DeadRunners;
//!
//! #[async_trait]
//! impl Subscribe for DeadRunners {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::RunnerDead) {
//!             // page someone, export a metric, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "dead-runners" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Event subscriber for runtime observability.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event.
    ///
    /// Called from a dedicated worker task, not in the publisher context.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in logs and overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose; override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber.
    ///
    /// The runtime clamps capacity to a minimum of 1. Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
