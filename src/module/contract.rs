//! # Module contract.
//!
//! A [`Module`] is one unit of recurring work. The runner owning it drives the
//! lifecycle below on the module's dedicated thread, so a module never runs two
//! of its methods at the same time:
//!
//! ```text
//! initialise(env, args) ──Ok──► loop { execute() → ModuleControl } ──► finalise(last control)
//!        │                             │ RELOAD → initialise(env, args') again
//!        └─Err──────────────────────────────────────────────────────► finalise(end(0, FAILED_INITIALISE))
//! ```
//!
//! Modules only see the shared [`EnvHandle`]; they never hold a reference to
//! their runner, to the manager, or to other modules.

use crate::env::EnvHandle;
use crate::error::ModuleError;

use super::control::ModuleControl;

/// # Unit of recurring work.
///
/// # Example
/// ```
/// use modvisor::{EnvHandle, Module, ModuleControl, ModuleError};
///
/// #[derive(Default)]
/// struct Counter {
///     env: Option<EnvHandle>,
/// }
///
/// impl Module for Counter {
///     fn initialise(&mut self, env: &EnvHandle, _args: &[String]) -> Result<(), ModuleError> {
///         if !env.find_local("count") {
///             env.declare("count", "0")?;
///         }
///         self.env = Some(env.clone());
///         Ok(())
///     }
///
///     fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
///         let env = self.env.as_ref().ok_or_else(|| ModuleError::failed("not initialised"))?;
///         let count: u64 = env.get("count")?.parse().map_err(ModuleError::failed)?;
///         env.set("count", (count + 1).to_string())?;
///         Ok(ModuleControl::next(1_000))
///     }
///
///     fn finalise(&mut self, _control: &ModuleControl) -> Result<(), ModuleError> {
///         Ok(())
///     }
/// }
/// ```
pub trait Module: Send + 'static {
    /// Prepares the module before its first `execute`, and again on every reload.
    ///
    /// Returning an error stops the runner (`FAILED_INITIALISE` or `FAILED_RELOAD`).
    fn initialise(&mut self, env: &EnvHandle, args: &[String]) -> Result<(), ModuleError>;

    /// Performs one step of work and decides what happens next.
    ///
    /// An error is logged and the step is retried after the retry interval.
    fn execute(&mut self) -> Result<ModuleControl, ModuleError>;

    /// Cleans up after the runner received a termination.
    ///
    /// Called with the last control. A [`ModuleError::Rejected`] is retried once
    /// with `end(0, KILL)`.
    fn finalise(&mut self, control: &ModuleControl) -> Result<(), ModuleError>;
}

/// Converts a frequency (count per minute) into a delay in milliseconds.
///
/// Float-to-int conversion saturates: a zero frequency yields `i64::MAX`.
pub fn timeout_from_frequency(per_minute: f64) -> i64 {
    (60_000.0 / per_minute) as i64
}
