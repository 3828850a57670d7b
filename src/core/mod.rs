//! Runtime core: runners, the module manager and the host supervisor.
//!
//! ```text
//! Supervisor ──► ModuleRunner("manager-0") ──► ModuleManager (Module)
//!                                                 │  tick
//!                                                 ├──► ModuleRunner("heartbeat-0") ──► Heartbeat
//!                                                 ├──► ModuleRunner("heartbeat-1") ──► Heartbeat
//!                                                 └──► ModuleRunner("notifier-0")  ──► Notifier
//! ```
//!
//! Internal modules:
//! - [`runner`]: thread-per-module state machine with cancellable waits;
//! - [`manager`]: the privileged module creating and stopping the other runners;
//! - [`supervisor`]: hosts the manager, event fan-out and OS-signal shutdown;
//! - [`alive`]: liveness tracking used to report stuck runners;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod alive;
mod builder;
mod config;
mod manager;
mod runner;
mod shutdown;
mod supervisor;

pub use alive::AliveTracker;
pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use manager::{MANAGER_MODULE, ManagerMonitor, ModuleManager, RunnerSnapshot};
pub use runner::{ModuleRunner, RunnerContext, RunnerHandle, RunnerState};
pub use supervisor::Supervisor;
