//! # Module abstractions.
//!
//! This module provides the module-related types:
//! - [`Module`] - trait for implementing a unit of recurring work
//! - [`ModuleControl`] / [`Action`] - the scheduling decision returned by `execute`
//! - [`Signal`] / [`SignalFamily`] - termination and error codes
//! - [`ModuleRegistry`] - name → factory table used by the manager

mod contract;
mod control;
mod registry;
mod signal;

pub use contract::{Module, timeout_from_frequency};
pub use control::{Action, ModuleControl};
pub use registry::{ModuleFactory, ModuleRegistry};
pub use signal::{Signal, SignalFamily};
