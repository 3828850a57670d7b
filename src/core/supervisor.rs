//! # Supervisor: hosts the module manager, event fan-out and OS-signal shutdown.
//!
//! The [`Supervisor`] owns the shared [`Environment`], the event bus, a
//! [`SubscriberSet`] and an [`AliveTracker`]. [`Supervisor::run`] wraps a
//! [`ModuleManager`] in its privileged runner, starts it and blocks until the
//! manager exits.
//!
//! ## High-level architecture
//! ```text
//! Supervisor::run(manager)                     (run_until with the OS-signal future)
//!   ├─ subscriber_listener(stop): Bus ─► AliveTracker::update + SubscriberSet::emit
//!   ├─ manager.into_runner(env).start()        (thread "manager-<n>")
//!   ├─ select:
//!   │    manager runner stopped ─► Ok(exit signal)
//!   │    shutdown future        ─► Bus.publish(ShutdownSignalled)
//!   │                              manager.shutdown(TERMINATE)
//!   │                              timeout(cfg.grace, stopped):
//!   │                                ├─ stopped → AllStoppedWithin, Ok(signal)
//!   │                                └─ elapsed → GraceExceeded, Err(stuck runners)
//!   └─ stop listener: drain the bus, SubscriberSet::shutdown (both exit paths)
//! ```
//!
//! The manager's own `finalise` shuts down and joins every worker runner, so
//! the manager runner stopping means every runner is `DEAD`.
//!
//! Waiting never parks a tokio thread on a runner: after `GraceExceeded` the
//! stuck runner threads are left detached and do not hold the runtime open.
//!
//! ## Example
//! ```no_run
//! use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use super::alive::AliveTracker;
use super::builder::SupervisorBuilder;
use super::config::SupervisorConfig;
use super::manager::ModuleManager;
use super::runner::ModuleRunner;
use super::shutdown;
use crate::config::ModuleSettings;
use crate::env::Environment;
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::module::{ModuleRegistry, Signal};
use crate::subscribers::SubscriberSet;

/// Hosts one module manager and reacts to OS termination signals.
pub struct Supervisor {
    cfg: SupervisorConfig,
    bus: Bus,
    /// Taken by the first `run`; its listener drains and shuts it down.
    subs: Mutex<Option<SubscriberSet>>,
    alive: Arc<AliveTracker>,
    env: Arc<Environment>,
}

impl Supervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub(super) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subs: SubscriberSet,
        env: Arc<Environment>,
    ) -> Self {
        Self {
            cfg,
            bus,
            subs: Mutex::new(Some(subs)),
            alive: Arc::new(AliveTracker::new()),
            env,
        }
    }

    /// The environment shared by every module.
    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    /// The event bus.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Builds a module manager publishing to this supervisor's bus.
    pub fn manager(
        &self,
        registry: Arc<ModuleRegistry>,
        settings: Arc<dyn ModuleSettings>,
    ) -> ModuleManager {
        ModuleManager::new(registry, settings, self.bus.clone())
    }

    /// Runs `manager` until it exits, or until an OS termination signal.
    ///
    /// Returns the exit signal of the manager runner.
    pub async fn run(&self, manager: ModuleManager) -> Result<Signal, RuntimeError> {
        self.run_until(manager, async {
            if let Err(err) = shutdown::wait_for_shutdown_signal().await {
                warn!(error = %err, "failed to listen for termination signals");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs `manager` until it exits, or until `shutdown` resolves.
    ///
    /// Once `shutdown` resolves the manager gets `TERMINATE` and has
    /// `cfg.grace` to stop. Subscribers have seen every event published up to
    /// the return, on every exit path.
    pub async fn run_until<F>(
        &self,
        manager: ModuleManager,
        shutdown: F,
    ) -> Result<Signal, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let stop = CancellationToken::new();
        let listener = self.subscriber_listener(stop.clone());

        let res = self.supervise(manager, shutdown).await;

        stop.cancel();
        if let Err(err) = listener.await {
            error!(error = %err, "event listener failed");
        }
        res
    }

    async fn supervise<F>(
        &self,
        manager: ModuleManager,
        shutdown: F,
    ) -> Result<Signal, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let runner = manager.into_runner(self.env.clone());
        runner.start()?;
        let handle = runner.handle();
        let stopped = handle.stopped();
        tokio::pin!(stopped);

        tokio::select! {
            _ = &mut stopped => return Ok(reap(runner).await),
            () = shutdown => {}
        }

        self.bus.publish(Event::new(EventKind::ShutdownSignalled));
        handle.shutdown(Signal::Terminate);

        let grace = self.cfg.grace;
        match tokio::time::timeout(grace, stopped).await {
            Ok(_) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(reap(runner).await)
            }
            Err(_) => {
                let stuck = self.alive.snapshot().await;
                self.bus
                    .publish(Event::new(EventKind::GraceExceeded).with_reason(stuck.join(", ")));
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Subscribes to the bus, updates the alive tracker and fans events out.
    ///
    /// Once `stop` fires, delivers what is left on the bus and shuts the
    /// subscriber set down.
    fn subscriber_listener(&self, stop: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let set = self.subs.lock().take();
        let alive = Arc::clone(&self.alive);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    res = rx.recv() => match res {
                        Ok(ev) => deliver(&alive, set.as_ref(), &ev).await,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event listener lagged behind the bus");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = stop.cancelled() => {
                        loop {
                            match rx.try_recv() {
                                Ok(ev) => deliver(&alive, set.as_ref(), &ev).await,
                                Err(TryRecvError::Lagged(skipped)) => {
                                    warn!(skipped, "event listener lagged behind the bus");
                                }
                                Err(_) => break,
                            }
                        }
                        break;
                    }
                }
            }
            if let Some(set) = set {
                set.shutdown().await;
            }
        })
    }
}

async fn deliver(alive: &AliveTracker, set: Option<&SubscriberSet>, ev: &Event) {
    alive.update(ev).await;
    if let Some(set) = set {
        set.emit(ev);
    }
}

/// Joins the thread of a runner already `DEAD`.
async fn reap(runner: ModuleRunner) -> Signal {
    tokio::task::spawn_blocking(move || runner.join())
        .await
        .unwrap_or_else(|err| {
            error!(error = %err, "manager join task failed");
            Signal::FatalMain
        })
}
