//! # modvisor
//!
//! **Modvisor** supervises long-running worker modules, one OS thread each,
//! under a self-hosted module manager.
//!
//! Workers share a two-tier key/value [`Environment`] and stop cooperatively:
//! every wait between two `execute` calls can be interrupted, but a running
//! step is never preempted.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  OS signal ──► Supervisor ──shutdown(TERMINATE)──► ModuleRunner("manager-0")
//!                   │                                     │ hosts
//!                   │                                     ▼
//!                   │                               ModuleManager (privileged Module)
//!                   │                                     │ tick: create / start / stop
//!                   │                ┌────────────────────┼────────────────────┐
//!                   │                ▼                    ▼                    ▼
//!                   │      ModuleRunner("a-0")   ModuleRunner("a-1")   ModuleRunner("b-0")
//!                   │                │                    │                    │
//!                   │                └───────── Environment (global + per-module private)
//!                   │                           ManagerApi: register / shutdown requests
//!                   ▼
//!  Bus (broadcast) ──► subscriber_listener ──► AliveTracker + SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Runner lifecycle
//! ```text
//! INIT ──start()──► RUNNING ──────────────► STOP ──► DEAD
//!   │                 │ initialise(args)      ▲
//!   │                 │ loop {                │
//!   │                 │   execute()           │ end / terminate / shutdown(signal)
//!   │                 │   reload?             │ / initialise failure / invalid delay
//!   │                 │   wait(delay)  ───────┘ (wait is woken by shutdown)
//!   │                 │ }
//!   │                 └─► finalise(control), retried once with KILL if rejected
//!   └──shutdown()──────────────────────────────────────► DEAD
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                          |
//! |-------------------|----------------------------------------------------------------|---------------------------------------------|
//! | **Modules**       | Implement a unit of recurring work.                            | [`Module`], [`ModuleControl`], [`Signal`]   |
//! | **Environment**   | Shared global and per-module variables, manager requests.      | [`Environment`], [`EnvHandle`], [`ManagerApi`] |
//! | **Supervision**   | Runners, the module manager and the OS-signal host.            | [`ModuleRunner`], [`ModuleManager`], [`Supervisor`] |
//! | **Subscriber API**| Hook into runner lifecycle events.                             | [`Subscribe`], [`LogWriter`]                |
//! | **Errors**        | Typed errors for modules, environment and runtime.             | [`ModuleError`], [`EnvironmentError`], [`RuntimeError`] |
//! | **Configuration** | TOML file with manager and per-module settings.                | [`AppConfig`], [`ModuleSettings`]           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use modvisor::{
//!     EnvHandle, Environment, Module, ModuleControl, ModuleError, ModuleRunner, RunnerContext,
//!     Signal, Bus,
//! };
//!
//! struct Countdown(u32);
//!
//! impl Module for Countdown {
//!     fn initialise(&mut self, _env: &EnvHandle, _args: &[String]) -> Result<(), ModuleError> {
//!         Ok(())
//!     }
//!     fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
//!         self.0 -= 1;
//!         Ok(if self.0 == 0 {
//!             ModuleControl::end(0, Signal::Success)
//!         } else {
//!             ModuleControl::next(1)
//!         })
//!     }
//!     fn finalise(&mut self, _control: &ModuleControl) -> Result<(), ModuleError> {
//!         Ok(())
//!     }
//! }
//!
//! let ctx = RunnerContext { env: Arc::new(Environment::new()), bus: Bus::new(16), retry_ms: 10 };
//! let runner = ModuleRunner::new("countdown", Box::new(Countdown(3)), vec![], ctx);
//! runner.start().unwrap();
//! assert_eq!(runner.join(), Signal::Success);
//! ```

pub mod config;
mod core;
mod env;
mod error;
mod events;
mod module;
pub mod modules;
mod subscribers;

// ---- Public re-exports ----

pub use config::{AppConfig, ModuleSettings};
pub use core::{
    AliveTracker, MANAGER_MODULE, ManagerMonitor, ModuleManager, ModuleRunner, RunnerContext,
    RunnerHandle, RunnerSnapshot, RunnerState, Supervisor, SupervisorBuilder, SupervisorConfig,
};
pub use env::{EnvHandle, Environment, ManagerApi, Registration, Scope, ShutdownRequest};
pub use error::{ConfigError, EnvironmentError, ModuleError, ParseSignalError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use module::{
    Action, Module, ModuleControl, ModuleFactory, ModuleRegistry, Signal, SignalFamily,
    timeout_from_frequency,
};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
