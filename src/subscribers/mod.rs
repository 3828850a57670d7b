//! # Event subscribers for the modvisor runtime.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] fan-out
//! and the built-in [`LogWriter`].
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   runner thread ── publish(Event) ──► Bus ──► subscriber_listener (Supervisor)
//!                                                     │
//!                                                     ├──► AliveTracker::update (internal)
//!                                                     │
//!                                                     └──► SubscriberSet::emit
//!                                                              ├──► LogWriter
//!                                                              └──► custom ...
//! ```

mod log;
mod set;
mod subscriber;

pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
