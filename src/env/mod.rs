//! # Shared environment.
//!
//! - [`Environment`] - two-tier (global / private) string store plus the manager control plane
//! - [`Scope`] - caller identity used to resolve private maps and reserved names
//! - [`EnvHandle`] - an environment bound to one scope, handed to modules
//! - [`ManagerApi`] - request queue towards the module manager

mod control;
mod environment;
mod handle;
mod scope;

pub use control::{ManagerApi, Registration, ShutdownRequest};
pub use environment::Environment;
pub use handle::EnvHandle;
pub use scope::Scope;

pub(crate) use scope::MANAGER_SCOPE;
