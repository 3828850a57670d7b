//! # Supervisor configuration.
//!
//! Provides [`SupervisorConfig`], the host-level settings of the runtime:
//! how long to wait for runners after an OS termination signal and how many
//! events the bus buffers.
//!
//! Usually derived from the `[manager]` section of
//! [`AppConfig`](crate::AppConfig):
//!
//! ```
//! use std::time::Duration;
//! use modvisor::{AppConfig, SupervisorConfig};
//!
//! let app = AppConfig::from_toml_str("[manager]\ngrace = \"5s\"\n").unwrap();
//! let cfg = SupervisorConfig::from(&app.manager);
//! assert_eq!(cfg.grace, Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::config::ManagerConfig;

/// Host-level runtime settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Maximum time to wait for the manager runner after an OS termination signal.
    ///
    /// When exceeded, `Supervisor::run` returns `RuntimeError::GraceExceeded`
    /// listing the runners still alive.
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` events skip
    /// the oldest ones. Minimum value is 1 (enforced by Bus).
    pub bus_capacity: usize,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for SupervisorConfig {
    /// `grace = 30s`, `bus_capacity = 1024`.
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}

impl From<&ManagerConfig> for SupervisorConfig {
    fn from(cfg: &ManagerConfig) -> Self {
        Self {
            grace: cfg.grace,
            bus_capacity: cfg.bus_capacity,
        }
    }
}
