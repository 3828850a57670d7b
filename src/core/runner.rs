//! # Module runner: one dedicated thread per module instance.
//!
//! A [`ModuleRunner`] owns exactly one [`Module`] and drives its lifecycle on a
//! named OS thread (`<module>-<sequence>`):
//!
//! ```text
//!             start()                 loop exit / shutdown()            finalise done
//!   INIT ───────────────► RUNNING ─────────────────────────► STOP ─────────────────────► DEAD
//!     │                                                                                   ▲
//!     └──────────────────────────── shutdown() (never started) ──────────────────────────┘
//! ```
//!
//! ## Thread body
//! ```text
//! initialise(env, args) ── Err/panic ──► control = end(0, FAILED_INITIALISE)
//!        │ Ok
//!        ▼
//! loop:
//!   shutdown pending?          → control = end(0, recorded signal), leave
//!   execute()                  Err/panic → next(retry), publish ExecuteFailed
//!   delay < 0                  → end(0, FATAL_CONTROL), publish IllegalControl
//!   RELOAD                     → initialise(env, args' or original) ── Err → end(0, FAILED_RELOAD)
//!   wait(delay)                sleep raced against the cancellation token
//!   shutdown pending?          → control = end(0, recorded signal), leave
//!   action not NEXT/RELOAD     → leave
//! STOP:
//!   finalise(control)          Rejected (signal != KILL) → finalise(end(0, KILL)) once, exit KILL
//!                              still failing             → exit = FAILED_FINALISE
//!   terminal action TERMINATE  → ManagerApi::shutdown()
//! DEAD
//! ```
//!
//! ## Rules
//! - Module methods are only ever called from the runner thread, one at a time.
//! - `shutdown(signal)` is cooperative: a module call in progress completes first;
//!   only the wait is cut short.
//! - Panics inside module methods are caught and treated like errors.
//! - The tokio runtime of the thread is current-thread and only drives the wait.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace};

use crate::env::{EnvHandle, Environment, Scope};
use crate::error::{ModuleError, RuntimeError, panic_message};
use crate::events::{Bus, Event, EventKind};
use crate::module::{Action, Module, ModuleControl, Signal};

/// Per-module sequence numbers used in runner names.
static SEQUENCES: LazyLock<Mutex<HashMap<String, u64>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn next_sequence(module: &str) -> u64 {
    let mut seqs = SEQUENCES.lock();
    let seq = seqs.entry(module.to_string()).or_insert(0);
    let current = *seq;
    *seq += 1;
    current
}

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    /// Constructed, thread not started.
    Init,
    /// Thread running the module loop.
    Running,
    /// Loop left; finalising.
    Stop,
    /// Finished; the module was dropped.
    Dead,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunnerState::Init => "INIT",
            RunnerState::Running => "RUNNING",
            RunnerState::Stop => "STOP",
            RunnerState::Dead => "DEAD",
        })
    }
}

/// Shared resources handed to every runner.
#[derive(Debug, Clone)]
pub struct RunnerContext {
    /// Environment shared by every module.
    pub env: Arc<Environment>,
    /// Event bus.
    pub bus: Bus,
    /// Delay in milliseconds before retrying after a failed `execute`.
    pub retry_ms: i64,
}

#[derive(Debug)]
struct Inner {
    state: RunnerState,
    requested: Option<Signal>,
    exit: Option<Signal>,
}

struct Shared {
    name: Arc<str>,
    module: Arc<str>,
    args: Vec<String>,
    inner: Mutex<Inner>,
    dead: Condvar,
    token: CancellationToken,
    /// Cancelled once `DEAD` and the `RunnerDead` event is published.
    finished: CancellationToken,
    bus: Bus,
}

impl Shared {
    fn publish(&self, ev: Event) {
        self.bus
            .publish(ev.with_runner(self.name.clone()).with_module(self.module.clone()));
    }

    fn requested(&self) -> Option<Signal> {
        self.inner.lock().requested
    }

    fn enter_stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state == RunnerState::Running {
            inner.state = RunnerState::Stop;
        }
    }

    fn finish(&self, exit: Signal) {
        {
            let mut inner = self.inner.lock();
            inner.state = RunnerState::Dead;
            inner.exit = Some(exit);
            self.dead.notify_all();
        }
        self.publish(Event::new(EventKind::RunnerDead).with_signal(exit));
        self.finished.cancel();
    }

    /// Returns `true` if this call stopped the runner.
    fn shutdown(&self, signal: Signal) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            RunnerState::Init => {
                inner.state = RunnerState::Dead;
                inner.exit = Some(signal);
                self.dead.notify_all();
                drop(inner);
                self.publish(Event::new(EventKind::RunnerDead).with_signal(signal));
                self.finished.cancel();
            }
            RunnerState::Running => {
                inner.state = RunnerState::Stop;
                inner.requested = Some(signal);
                drop(inner);
                self.token.cancel();
            }
            RunnerState::Stop | RunnerState::Dead => return false,
        }
        info!(runner = %self.name, %signal, "runner received shutdown signal");
        true
    }

    fn join(&self) -> Signal {
        let mut inner = self.inner.lock();
        while !matches!(inner.state, RunnerState::Dead | RunnerState::Init) {
            self.dead.wait(&mut inner);
        }
        inner.exit.unwrap_or(Signal::Success)
    }
}

/// Owner of one module instance and its thread.
pub struct ModuleRunner {
    shared: Arc<Shared>,
    pending: Mutex<Option<Worker>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleRunner {
    /// Creates a runner in `INIT` for the module registered as `module_name`.
    ///
    /// The module gets the unprivileged scope of `module_name`.
    pub fn new(
        module_name: &str,
        module: Box<dyn Module>,
        args: Vec<String>,
        ctx: RunnerContext,
    ) -> Self {
        Self::with_scope(module_name, Scope::module(module_name), module, args, ctx)
    }

    /// Creates the runner of the module manager (privileged scope).
    pub(crate) fn manager(module_name: &str, module: Box<dyn Module>, ctx: RunnerContext) -> Self {
        Self::with_scope(module_name, Scope::manager(), module, Vec::new(), ctx)
    }

    fn with_scope(
        module_name: &str,
        scope: Scope,
        module: Box<dyn Module>,
        args: Vec<String>,
        ctx: RunnerContext,
    ) -> Self {
        let name: Arc<str> = Arc::from(format!("{module_name}-{}", next_sequence(module_name)));
        let shared = Arc::new(Shared {
            name: name.clone(),
            module: Arc::from(module_name),
            args: args.clone(),
            inner: Mutex::new(Inner {
                state: RunnerState::Init,
                requested: None,
                exit: None,
            }),
            dead: Condvar::new(),
            token: CancellationToken::new(),
            finished: CancellationToken::new(),
            bus: ctx.bus,
        });
        debug!(runner = %name, ?args, "module runner created");
        shared.publish(Event::new(EventKind::RunnerCreated));

        let worker = Worker {
            shared: shared.clone(),
            module,
            env: EnvHandle::new(ctx.env, scope),
            args,
            retry_ms: ctx.retry_ms,
        };
        Self {
            shared,
            pending: Mutex::new(Some(worker)),
            thread: Mutex::new(None),
        }
    }

    /// Runner name, `<module>-<sequence>`.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Registered module name.
    pub fn module(&self) -> &str {
        &self.shared.module
    }

    /// Arguments the runner was created with.
    pub fn args(&self) -> &[String] {
        &self.shared.args
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.shared.inner.lock().state
    }

    /// Exit signal, once `DEAD`.
    pub fn exit_signal(&self) -> Option<Signal> {
        self.shared.inner.lock().exit
    }

    /// Moves `INIT -> RUNNING` and spawns the runner thread.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let worker = {
            let mut inner = self.shared.inner.lock();
            let worker = match inner.state {
                RunnerState::Init => self.pending.lock().take(),
                _ => None,
            };
            let Some(worker) = worker else {
                return Err(RuntimeError::NotStartable {
                    runner: self.name().to_string(),
                });
            };
            inner.state = RunnerState::Running;
            worker
        };

        let spawned = thread::Builder::new()
            .name(self.name().to_string())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                Ok(())
            }
            Err(source) => {
                error!(runner = %self.name(), error = %source, "failed to spawn runner thread");
                self.shared.finish(Signal::FatalMain);
                Err(RuntimeError::Spawn {
                    runner: self.name().to_string(),
                    source,
                })
            }
        }
    }

    /// Asks the runner to stop with `signal`.
    ///
    /// A running runner records the signal and wakes from its wait; a runner
    /// still in `INIT` goes straight to `DEAD`. No effect once stopping.
    pub fn shutdown(&self, signal: Signal) {
        if self.shared.shutdown(signal) && self.state() == RunnerState::Dead {
            self.pending.lock().take();
        }
    }

    /// Blocks until the runner is `DEAD` and returns its exit signal.
    ///
    /// Returns immediately for a runner that was never started.
    pub fn join(&self) -> Signal {
        let signal = self.shared.join();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(runner = %self.name(), "runner thread panicked");
            }
        }
        signal
    }

    /// A cloneable handle observing and controlling this runner.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            shared: self.shared.clone(),
        }
    }
}

impl fmt::Debug for ModuleRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRunner")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

/// Cloneable view of a [`ModuleRunner`] usable from other threads.
#[derive(Clone)]
pub struct RunnerHandle {
    shared: Arc<Shared>,
}

impl RunnerHandle {
    /// Runner name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state.
    pub fn state(&self) -> RunnerState {
        self.shared.inner.lock().state
    }

    /// Exit signal, once `DEAD`.
    pub fn exit_signal(&self) -> Option<Signal> {
        self.shared.inner.lock().exit
    }

    /// Stops the runner; see [`ModuleRunner::shutdown`].
    ///
    /// A runner still in `INIT` becomes `DEAD`; its module is dropped with the runner.
    pub fn shutdown(&self, signal: Signal) {
        self.shared.shutdown(signal);
    }

    /// Blocks until the runner is `DEAD` (or was never started).
    pub fn wait(&self) -> Signal {
        self.shared.join()
    }

    /// Resolves once the runner is `DEAD`, without blocking a thread.
    ///
    /// Unlike [`wait`](Self::wait), never resolves for a runner that stays in
    /// `INIT`. The `RunnerDead` event is already on the bus when it resolves.
    pub async fn stopped(&self) -> Signal {
        self.shared.finished.cancelled().await;
        self.exit_signal().unwrap_or(Signal::Success)
    }
}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("name", &self.shared.name)
            .finish()
    }
}

/// Everything the runner thread owns.
struct Worker {
    shared: Arc<Shared>,
    module: Box<dyn Module>,
    env: EnvHandle,
    args: Vec<String>,
    retry_ms: i64,
}

fn guarded<T>(f: impl FnOnce() -> Result<T, ModuleError>) -> Result<T, ModuleError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(panic) => Err(ModuleError::failed(format!(
            "panicked: {}",
            panic_message(&*panic)
        ))),
    }
}

impl Worker {
    fn run(mut self) {
        let span = info_span!("runner", runner = %self.shared.name);
        let _enter = span.enter();
        debug!("module runner started");
        self.shared.publish(Event::new(EventKind::RunnerStarted));

        let control = match Builder::new_current_thread().enable_time().build() {
            Ok(rt) => self.drive(&rt),
            Err(err) => {
                error!(error = %err, "failed to build runner runtime");
                ModuleControl::end(0, Signal::FatalMain)
            }
        };

        self.shared.enter_stop();
        self.shared
            .publish(Event::new(EventKind::RunnerStopping).with_signal(control.signal()));
        let exit = self.finalise(&control);

        if control.action() == Action::Terminate && self.env.manager().shutdown() {
            self.shared.publish(Event::new(EventKind::ShutdownRequested));
        }
        debug!(signal = %exit, "module runner exited");

        let Worker { shared, module, .. } = self;
        drop(module);
        shared.finish(exit);
    }

    fn drive(&mut self, rt: &Runtime) -> ModuleControl {
        let args = self.args.clone();
        if let Err(err) = self.initialise(&args) {
            self.initialise_failed(Signal::FailedInitialise, &err);
            return ModuleControl::end(0, Signal::FailedInitialise);
        }

        loop {
            if let Some(signal) = self.shared.requested() {
                return ModuleControl::end(0, signal);
            }

            let mut control = self.execute();

            if control.action() == Action::Reload {
                let args = control
                    .args()
                    .map(<[String]>::to_vec)
                    .unwrap_or_else(|| self.args.clone());
                debug!(?args, "reloading module");
                match self.initialise(&args) {
                    Ok(()) => self.shared.publish(Event::new(EventKind::ModuleReloaded)),
                    Err(err) => {
                        self.initialise_failed(Signal::FailedReload, &err);
                        control = ModuleControl::end(0, Signal::FailedReload);
                    }
                }
            }

            if let Some(delay) = control.delay().filter(|d| !d.is_zero()) {
                self.wait(rt, delay);
            }

            if let Some(signal) = self.shared.requested() {
                return ModuleControl::end(0, signal);
            }
            if !control.continues() {
                return control;
            }
        }
    }

    fn initialise(&mut self, args: &[String]) -> Result<(), ModuleError> {
        trace!("initialise");
        let env = &self.env;
        guarded(|| self.module.initialise(env, args))
    }

    fn initialise_failed(&self, signal: Signal, err: &ModuleError) {
        self.shared.publish(
            Event::new(EventKind::InitialiseFailed)
                .with_signal(signal)
                .with_reason(err.to_string()),
        );
    }

    fn execute(&mut self) -> ModuleControl {
        trace!("execute");
        let control = match guarded(|| self.module.execute()) {
            Ok(control) => control,
            Err(err) => {
                self.shared.publish(
                    Event::new(EventKind::ExecuteFailed)
                        .with_reason(err.to_string())
                        .with_delay_ms(self.retry_ms),
                );
                ModuleControl::next(self.retry_ms)
            }
        };
        if control.delay_ms() < 0 {
            self.shared
                .publish(Event::new(EventKind::IllegalControl).with_delay_ms(control.delay_ms()));
            return ModuleControl::end(0, Signal::FatalControl);
        }
        control
    }

    fn wait(&self, rt: &Runtime, delay: Duration) {
        let token = &self.shared.token;
        rt.block_on(async {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => trace!("wait cut short"),
            }
        });
    }

    fn finalise(&mut self, control: &ModuleControl) -> Signal {
        trace!("finalise");
        let outcome = match guarded(|| self.module.finalise(control)) {
            Err(err) if err.is_rejection() && control.signal() != Signal::Kill => {
                debug!(reason = %err, "finalise rejected, forcing with KILL");
                let forced = ModuleControl::end(0, Signal::Kill);
                guarded(|| self.module.finalise(&forced)).map(|()| Signal::Kill)
            }
            other => other.map(|()| control.signal()),
        };
        match outcome {
            Ok(signal) => signal,
            Err(err) => {
                self.shared
                    .publish(Event::new(EventKind::FinaliseFailed).with_reason(err.to_string()));
                Signal::FailedFinalise
            }
        }
    }
}
