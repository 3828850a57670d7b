//! # Module manager: the self-hosted supervisor.
//!
//! [`ModuleManager`] is itself a [`Module`], run by a privileged
//! [`ModuleRunner`]. Each `execute` is one supervisory tick:
//!
//! ```text
//! tick:
//!   shutdown flag set?          → terminate(0, TERMINATE)
//!   for each configured slot:
//!     empty                     → construct runner (INIT) with args(name, index)
//!     INIT                      → start it
//!   drain registrations         → construct + start immediately
//!   drain shutdown requests     → shutdown(signal) every runner of that module
//!   next(monitor interval)
//!
//! finalise(control):
//!   shutdown(control.signal) every runner, then join every runner
//! ```
//!
//! A configured runner is created on one tick and started on the next, so a
//! fresh manager needs two ticks before its configured modules are running.
//!
//! Workers talk to the manager only through
//! [`ManagerApi`](crate::ManagerApi); the manager drains those queues on its
//! own thread, so the tick is strictly sequential.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::runner::{ModuleRunner, RunnerContext, RunnerState};
use crate::config::ModuleSettings;
use crate::env::{EnvHandle, Environment, MANAGER_SCOPE};
use crate::error::ModuleError;
use crate::events::{Bus, Event, EventKind};
use crate::module::{Module, ModuleControl, ModuleRegistry, Signal};

/// Module name of the manager and prefix of its runner name.
pub const MANAGER_MODULE: &str = "manager";

type Slots = BTreeMap<String, Vec<Option<Arc<ModuleRunner>>>>;

/// Point-in-time view of one runner slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSnapshot {
    /// Registered module name.
    pub module: String,
    /// Runner name, `None` while the slot is empty.
    pub runner: Option<String>,
    /// Runner state, `None` while the slot is empty.
    pub state: Option<RunnerState>,
    /// Arguments of the runner (or of the slot, while empty).
    pub args: Vec<String>,
}

/// Read-only view of a manager's slots, usable after the manager was moved
/// into its runner.
#[derive(Clone)]
pub struct ManagerMonitor {
    slots: Arc<Mutex<Slots>>,
    settings: Arc<dyn ModuleSettings>,
}

impl ManagerMonitor {
    /// One entry per slot, sorted by module name then slot index.
    pub fn snapshot(&self) -> Vec<RunnerSnapshot> {
        snapshot(&self.slots.lock(), self.settings.as_ref())
    }
}

fn snapshot(slots: &Slots, settings: &dyn ModuleSettings) -> Vec<RunnerSnapshot> {
    slots
        .iter()
        .flat_map(|(module, runners)| {
            runners
                .iter()
                .enumerate()
                .map(move |(index, slot)| match slot {
                    Some(runner) => RunnerSnapshot {
                        module: module.clone(),
                        runner: Some(runner.name().to_string()),
                        state: Some(runner.state()),
                        args: runner.args().to_vec(),
                    },
                    None => RunnerSnapshot {
                        module: module.clone(),
                        runner: None,
                        state: None,
                        args: settings.args(module, index),
                    },
                })
        })
        .collect()
}

/// Creates, starts and stops the runners of every other module.
pub struct ModuleManager {
    registry: Arc<ModuleRegistry>,
    settings: Arc<dyn ModuleSettings>,
    bus: Bus,
    slots: Arc<Mutex<Slots>>,
    env: Option<EnvHandle>,
    monitor_ms: i64,
}

impl ModuleManager {
    /// Creates a manager resolving module names through `registry`.
    pub fn new(registry: Arc<ModuleRegistry>, settings: Arc<dyn ModuleSettings>, bus: Bus) -> Self {
        let monitor_ms = settings.monitor_interval();
        Self {
            registry,
            settings,
            bus,
            slots: Arc::new(Mutex::new(Slots::new())),
            env: None,
            monitor_ms,
        }
    }

    /// A monitor sharing this manager's slots.
    pub fn monitor(&self) -> ManagerMonitor {
        ManagerMonitor {
            slots: self.slots.clone(),
            settings: self.settings.clone(),
        }
    }

    /// One entry per slot, sorted by module name then slot index.
    pub fn snapshot(&self) -> Vec<RunnerSnapshot> {
        snapshot(&self.slots.lock(), self.settings.as_ref())
    }

    /// Wraps the manager in its privileged runner.
    pub fn into_runner(self, env: Arc<Environment>) -> ModuleRunner {
        let ctx = RunnerContext {
            env,
            bus: self.bus.clone(),
            retry_ms: self.settings.retry_interval(),
        };
        ModuleRunner::manager(MANAGER_MODULE, Box::new(self), ctx)
    }

    fn handle(&self) -> Result<&EnvHandle, ModuleError> {
        self.env
            .as_ref()
            .ok_or_else(|| ModuleError::failed("module manager is not initialised"))
    }

    fn unknown(&self, module: &str, source: &str) {
        warn!(module, source, "module not found in registry");
        self.bus.publish(
            Event::new(EventKind::ModuleUnknown)
                .with_module(module)
                .with_reason(source),
        );
    }

    fn create(&self, env: &EnvHandle, module: &str, args: Vec<String>) -> Option<ModuleRunner> {
        let Some(instance) = self.registry.create(module) else {
            self.unknown(module, "registration");
            return None;
        };
        let ctx = RunnerContext {
            env: env.environment().clone(),
            bus: self.bus.clone(),
            retry_ms: self.settings.retry_interval(),
        };
        info!(module, "create module runner");
        Some(ModuleRunner::new(module, instance, args, ctx))
    }

    fn start(runner: &ModuleRunner) {
        info!(runner = %runner.name(), "start module runner");
        if let Err(err) = runner.start() {
            error!(runner = %runner.name(), error = %err, "failed to start module runner");
        }
    }
}

impl Module for ModuleManager {
    fn initialise(&mut self, env: &EnvHandle, _args: &[String]) -> Result<(), ModuleError> {
        if env.find_global(MANAGER_SCOPE) {
            let marker = env.get_global(MANAGER_SCOPE)?;
            error!(%marker, "unclean environment");
            return Err(ModuleError::rejected(format!(
                "unclean environment: {marker}"
            )));
        }
        env.declare_global(MANAGER_SCOPE, Uuid::new_v4().simple().to_string())?;
        env.environment().control().reset();
        self.monitor_ms = self.settings.monitor_interval();

        let mut slots = self.slots.lock();
        for name in self.settings.module_names() {
            if !self.settings.is_enabled(&name) {
                continue;
            }
            if !self.registry.contains(&name) {
                self.unknown(&name, "configuration");
                continue;
            }
            let count = self.settings.instance_count(&name);
            let runners = slots.entry(name).or_default();
            runners.resize_with(runners.len().max(count), || None);
        }
        drop(slots);

        self.env = Some(env.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
        let env = self.handle()?;
        let control = env.environment().control();
        if env.manager().is_shutdown_requested() {
            info!("received shutdown request from environment");
            return Ok(ModuleControl::terminate(0, Signal::Terminate));
        }

        let mut slots = self.slots.lock();
        for (name, runners) in slots.iter_mut() {
            for (index, slot) in runners.iter_mut().enumerate() {
                match slot {
                    None => {
                        let args = self.settings.args(name, index);
                        *slot = self.create(env, name, args).map(Arc::new);
                    }
                    Some(runner) if runner.state() == RunnerState::Init => Self::start(runner),
                    Some(_) => {}
                }
            }
        }

        for registration in control.drain_registrations() {
            info!(module = %registration.module, "create module runner dynamically");
            if let Some(runner) = self.create(env, &registration.module, registration.args) {
                Self::start(&runner);
                slots
                    .entry(registration.module)
                    .or_default()
                    .push(Some(Arc::new(runner)));
            }
        }

        for request in control.drain_shutdowns() {
            let Some(runners) = slots.get(&request.module) else {
                self.unknown(&request.module, "shutdown request");
                continue;
            };
            info!(module = %request.module, signal = %request.signal, "send shutdown signal to module");
            for runner in runners.iter().flatten() {
                runner.shutdown(request.signal);
                self.bus.publish(
                    Event::new(EventKind::ShutdownForwarded)
                        .with_runner(runner.name())
                        .with_module(request.module.as_str())
                        .with_signal(request.signal),
                );
            }
        }

        Ok(ModuleControl::next(self.monitor_ms))
    }

    fn finalise(&mut self, control: &ModuleControl) -> Result<(), ModuleError> {
        let signal = control.signal();
        info!(%signal, "shutdown modules before terminating module manager");
        let runners: Vec<Arc<ModuleRunner>> = self
            .slots
            .lock()
            .values()
            .flatten()
            .flatten()
            .cloned()
            .collect();

        for runner in &runners {
            runner.shutdown(signal);
        }
        for runner in &runners {
            let exit = runner.join();
            info!(runner = %runner.name(), signal = %exit, "module runner joined");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::env::Scope;
    use std::time::{Duration, Instant};

    struct Idle;

    impl Module for Idle {
        fn initialise(&mut self, _env: &EnvHandle, _args: &[String]) -> Result<(), ModuleError> {
            Ok(())
        }
        fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
            Ok(ModuleControl::next(60_000))
        }
        fn finalise(&mut self, _control: &ModuleControl) -> Result<(), ModuleError> {
            Ok(())
        }
    }

    fn manager(toml: &str) -> ModuleManager {
        let settings = AppConfig::from_toml_str(toml).unwrap();
        let registry = ModuleRegistry::new()
            .with("mgr-idle", || Idle)
            .with("mgr-other", || Idle);
        ModuleManager::new(Arc::new(registry), Arc::new(settings), Bus::new(64))
    }

    fn privileged(env: &Arc<Environment>) -> EnvHandle {
        EnvHandle::new(env.clone(), Scope::manager())
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_one_tick_creates_runners_with_split_args() {
        let env = Arc::new(Environment::new());
        let mut mm = manager(
            r#"
            [modules.mgr-idle]
            enabled = true
            args = "a;b"
            "#,
        );
        mm.initialise(&privileged(&env), &[]).unwrap();
        assert!(env.find_global("mm"));

        let control = mm.execute().unwrap();
        assert_eq!(control.action(), crate::module::Action::Next);

        let snap = mm.snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!(snap[0].args, vec!["a".to_string()]);
        assert_eq!(snap[1].args, vec!["b".to_string()]);
        assert!(snap.iter().all(|s| s.state == Some(RunnerState::Init)));

        mm.execute().unwrap();
        assert!(mm.snapshot().iter().all(|s| s.state != Some(RunnerState::Init)));

        mm.finalise(&ModuleControl::end(0, Signal::Terminate)).unwrap();
        assert!(mm.snapshot().iter().all(|s| s.state == Some(RunnerState::Dead)));
    }

    #[test]
    fn test_disabled_and_unknown_modules_are_skipped() {
        let env = Arc::new(Environment::new());
        let mut mm = manager(
            r#"
            [modules.mgr-idle]
            enabled = false
            [modules.ghost]
            enabled = true
            "#,
        );
        mm.initialise(&privileged(&env), &[]).unwrap();
        mm.execute().unwrap();
        assert!(mm.snapshot().is_empty());
    }

    #[test]
    fn test_second_manager_on_same_environment_is_rejected() {
        let env = Arc::new(Environment::new());
        let mut first = manager("");
        let mut second = manager("");
        first.initialise(&privileged(&env), &[]).unwrap();
        let err = second.initialise(&privileged(&env), &[]).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_shutdown_flag_makes_next_tick_terminate() {
        let env = Arc::new(Environment::new());
        let mut mm = manager("");
        mm.initialise(&privileged(&env), &[]).unwrap();
        assert!(env.manager().shutdown());

        let control = mm.execute().unwrap();
        assert_eq!(control.action(), crate::module::Action::Terminate);
        assert_eq!(control.signal(), Signal::Terminate);
    }

    #[test]
    fn test_registrations_start_immediately_and_targeted_shutdown() {
        let env = Arc::new(Environment::new());
        let mut mm = manager("");
        mm.initialise(&privileged(&env), &[]).unwrap();

        assert!(env.manager().register("mgr-other", 2, vec!["x".into()]));
        assert!(env.manager().register("ghost", 1, vec![]));
        mm.execute().unwrap();

        let snap = mm.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|s| s.module == "mgr-other" && s.args == ["x"]));
        assert!(snap.iter().all(|s| s.state != Some(RunnerState::Init)));

        env.manager().shutdown_module("mgr-other", Signal::Stop);
        mm.execute().unwrap();
        wait_for(|| {
            mm.snapshot()
                .iter()
                .all(|s| s.state == Some(RunnerState::Dead))
        });
        mm.finalise(&ModuleControl::end(0, Signal::Terminate)).unwrap();
    }
}
