//! # Manager control plane.
//!
//! Workers never hold a reference to the module manager. They reach it through
//! the [`ManagerApi`] obtained from the environment, which only records
//! requests; the manager consumes them on its next tick.
//!
//! ```text
//! worker ── register(module, count, args) ──► registrations (FIFO) ──┐
//! worker ── shutdown_module(module, sig) ───► shutdowns     (FIFO) ──┼─► manager tick drains
//! worker ── shutdown() ─────────────────────► flag (first caller wins)┘
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::module::Signal;

/// A pending dynamic runner creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Registered module name.
    pub module: String,
    /// Arguments for `initialise`.
    pub args: Vec<String>,
}

/// A pending targeted shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    /// Module whose runners are stopped.
    pub module: String,
    /// Signal forwarded to each runner.
    pub signal: Signal,
}

#[derive(Debug, Default)]
pub(crate) struct ControlPlane {
    shutdown: AtomicBool,
    registrations: Mutex<VecDeque<Registration>>,
    shutdowns: Mutex<VecDeque<ShutdownRequest>>,
}

impl ControlPlane {
    pub(crate) fn reset(&self) {
        self.shutdown.store(false, Ordering::SeqCst);
    }

    pub(crate) fn drain_registrations(&self) -> Vec<Registration> {
        self.registrations.lock().drain(..).collect()
    }

    pub(crate) fn drain_shutdowns(&self) -> Vec<ShutdownRequest> {
        self.shutdowns.lock().drain(..).collect()
    }
}

/// Handle to the manager control plane.
///
/// Cheap to clone; every clone targets the same environment.
#[derive(Debug, Clone)]
pub struct ManagerApi {
    plane: Arc<ControlPlane>,
}

impl ManagerApi {
    pub(crate) fn new(plane: Arc<ControlPlane>) -> Self {
        Self { plane }
    }

    /// Requests `count` new runners of `module`, each initialised with `args`.
    ///
    /// Returns `false` (and enqueues nothing) once application shutdown was requested.
    pub fn register(&self, module: &str, count: usize, args: Vec<String>) -> bool {
        if self.is_shutdown_requested() {
            return false;
        }
        let mut queue = self.plane.registrations.lock();
        queue.extend((0..count).map(|_| Registration {
            module: module.to_string(),
            args: args.clone(),
        }));
        true
    }

    /// Requests application shutdown.
    ///
    /// Returns `true` for the first caller only.
    pub fn shutdown(&self) -> bool {
        !self.plane.shutdown.swap(true, Ordering::SeqCst)
    }

    /// Asks the manager to stop every runner of `module` with `signal`.
    pub fn shutdown_module(&self, module: &str, signal: Signal) {
        self.plane.shutdowns.lock().push_back(ShutdownRequest {
            module: module.to_string(),
            signal,
        });
    }

    /// True once [`ManagerApi::shutdown`] has been called.
    pub fn is_shutdown_requested(&self) -> bool {
        self.plane.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> (ManagerApi, Arc<ControlPlane>) {
        let plane = Arc::new(ControlPlane::default());
        (ManagerApi::new(plane.clone()), plane)
    }

    #[test]
    fn test_shutdown_first_caller_wins() {
        let (api, plane) = api();
        assert!(!api.is_shutdown_requested());
        assert!(api.shutdown());
        assert!(!api.shutdown());
        assert!(api.clone().is_shutdown_requested());
        plane.reset();
        assert!(api.shutdown());
    }

    #[test]
    fn test_register_enqueues_count_entries_in_order() {
        let (api, plane) = api();
        assert!(api.register("a", 2, vec!["x".into()]));
        assert!(api.register("b", 1, vec![]));
        let drained = plane.drain_registrations();
        let names: Vec<_> = drained.iter().map(|r| r.module.as_str()).collect();
        assert_eq!(names, vec!["a", "a", "b"]);
        assert_eq!(drained[0].args, vec!["x".to_string()]);
        assert!(plane.drain_registrations().is_empty());
    }

    #[test]
    fn test_register_refused_after_shutdown() {
        let (api, plane) = api();
        api.shutdown();
        assert!(!api.register("a", 1, vec![]));
        assert!(plane.drain_registrations().is_empty());
    }

    #[test]
    fn test_shutdown_module_queue() {
        let (api, plane) = api();
        api.shutdown_module("a", Signal::Kill);
        assert_eq!(
            plane.drain_shutdowns(),
            vec![ShutdownRequest {
                module: "a".into(),
                signal: Signal::Kill
            }]
        );
    }
}
