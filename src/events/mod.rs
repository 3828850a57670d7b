//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to runtime events emitted by runners, the module manager,
//! the supervisor and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: runner threads, `ModuleManager` ticks, `Supervisor`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's subscriber listener (fans out to
//!   `SubscriberSet` and updates `AliveTracker`).
//!
//! See `core/mod.rs` for the system-level wiring diagram.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
