use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use modvisor::{
    Bus, EnvHandle, Environment, Module, ModuleControl, ModuleError, ModuleRunner, RunnerContext,
    RunnerState, Signal,
};

/// What a scripted module observed.
#[derive(Default)]
struct Log {
    initialised: Mutex<Vec<Vec<String>>>,
    executed: AtomicUsize,
    finalised: Mutex<Vec<Signal>>,
    threads: Mutex<Vec<Option<String>>>,
}

/// Module whose replies are produced by closures.
struct Scripted {
    log: Arc<Log>,
    init: Box<dyn FnMut(&[String]) -> Result<(), ModuleError> + Send>,
    exec: Box<dyn FnMut(usize) -> Result<ModuleControl, ModuleError> + Send>,
    fin: Box<dyn FnMut(Signal) -> Result<(), ModuleError> + Send>,
}

impl Scripted {
    fn new(log: &Arc<Log>) -> Self {
        Self {
            log: log.clone(),
            init: Box::new(|_: &[String]| Ok(())),
            exec: Box::new(|_| Ok(ModuleControl::next(60_000))),
            fin: Box::new(|_| Ok(())),
        }
    }

    fn on_init(mut self, f: impl FnMut(&[String]) -> Result<(), ModuleError> + Send + 'static) -> Self {
        self.init = Box::new(f);
        self
    }

    fn on_exec(
        mut self,
        f: impl FnMut(usize) -> Result<ModuleControl, ModuleError> + Send + 'static,
    ) -> Self {
        self.exec = Box::new(f);
        self
    }

    fn on_fin(mut self, f: impl FnMut(Signal) -> Result<(), ModuleError> + Send + 'static) -> Self {
        self.fin = Box::new(f);
        self
    }
}

impl Module for Scripted {
    fn initialise(&mut self, _env: &EnvHandle, args: &[String]) -> Result<(), ModuleError> {
        self.log.initialised.lock().push(args.to_vec());
        (self.init)(args)
    }

    fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
        self.log
            .threads
            .lock()
            .push(std::thread::current().name().map(str::to_string));
        let n = self.log.executed.fetch_add(1, Ordering::SeqCst);
        (self.exec)(n)
    }

    fn finalise(&mut self, control: &ModuleControl) -> Result<(), ModuleError> {
        self.log.finalised.lock().push(control.signal());
        (self.fin)(control.signal())
    }
}

fn ctx() -> RunnerContext {
    RunnerContext {
        env: Arc::new(Environment::new()),
        bus: Bus::new(256),
        retry_ms: 5,
    }
}

fn wait_for(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn test_kill_wakes_a_long_wait() {
    let log = Arc::new(Log::default());
    let runner = ModuleRunner::new("it-sleeper", Box::new(Scripted::new(&log)), vec![], ctx());
    runner.start().unwrap();
    wait_for(|| log.executed.load(Ordering::SeqCst) == 1);

    let started = Instant::now();
    runner.shutdown(Signal::Kill);
    assert_eq!(runner.join(), Signal::Kill);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(runner.state(), RunnerState::Dead);
    assert_eq!(*log.finalised.lock(), vec![Signal::Kill]);
}

#[test]
fn test_negative_delay_is_fatal_control() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_exec(|_| Ok(ModuleControl::next(-1)));
    let runner = ModuleRunner::new("it-negative", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::FatalControl);
    assert_eq!(log.executed.load(Ordering::SeqCst), 1);
    assert_eq!(*log.finalised.lock(), vec![Signal::FatalControl]);
}

#[test]
fn test_execute_runs_sequentially_on_the_runner_thread() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_exec(|n| {
        Ok(if n < 20 {
            ModuleControl::next(0)
        } else {
            ModuleControl::end(0, Signal::Success)
        })
    });
    let runner = ModuleRunner::new("it-thread", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::Success);
    assert_eq!(log.executed.load(Ordering::SeqCst), 21);
    let expected = Some(runner.name().to_string());
    assert!(log.threads.lock().iter().all(|name| *name == expected));
}

#[test]
fn test_failed_execute_is_retried() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_exec(|n| match n {
        0 => Err(ModuleError::failed("flaky")),
        1 => panic!("flakier"),
        _ => Ok(ModuleControl::end(0, Signal::Stop)),
    });
    let runner = ModuleRunner::new("it-retry", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::Stop);
    assert_eq!(log.executed.load(Ordering::SeqCst), 3);
}

#[test]
fn test_initialise_failure_skips_execute() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_init(|_| Err(ModuleError::rejected("not today")));
    let runner = ModuleRunner::new("it-init", Box::new(module), vec!["a".into()], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::FailedInitialise);
    assert_eq!(log.executed.load(Ordering::SeqCst), 0);
    assert_eq!(*log.finalised.lock(), vec![Signal::FailedInitialise]);
}

#[test]
fn test_rejected_finalise_is_forced_with_kill() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log)
        .on_exec(|_| Ok(ModuleControl::end(0, Signal::Stop)))
        .on_fin(|signal| match signal {
            Signal::Kill => Ok(()),
            _ => Err(ModuleError::rejected("busy")),
        });
    let runner = ModuleRunner::new("it-finalise", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::Kill);
    assert_eq!(*log.finalised.lock(), vec![Signal::Stop, Signal::Kill]);
}

#[test]
fn test_finalise_failing_twice_is_failed_finalise() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log)
        .on_exec(|_| Ok(ModuleControl::end(0, Signal::Stop)))
        .on_fin(|_| Err(ModuleError::rejected("never")));
    let runner = ModuleRunner::new("it-finalise-twice", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::FailedFinalise);
    assert_eq!(log.finalised.lock().len(), 2);
}

#[test]
fn test_reload_with_and_without_new_args() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_exec(|n| {
        Ok(match n {
            0 => ModuleControl::reload(0, Some(vec!["fresh".into()])),
            1 => ModuleControl::reload(0, None),
            _ => ModuleControl::end(0, Signal::Success),
        })
    });
    let runner = ModuleRunner::new("it-reload", Box::new(module), vec!["orig".into()], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::Success);
    let inits = log.initialised.lock().clone();
    assert_eq!(
        inits,
        vec![
            vec!["orig".to_string()],
            vec!["fresh".to_string()],
            vec!["orig".to_string()],
        ]
    );
}

#[test]
fn test_failed_reload_ends_the_runner() {
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log)
        .on_init(|args| match args.first().map(String::as_str) {
            Some("bad") => Err(ModuleError::failed("bad args")),
            _ => Ok(()),
        })
        .on_exec(|_| Ok(ModuleControl::reload(0, Some(vec!["bad".into()]))));
    let runner = ModuleRunner::new("it-reload-fail", Box::new(module), vec![], ctx());
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::FailedReload);
    assert_eq!(log.executed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_terminate_sets_the_shutdown_flag_before_dead() {
    let ctx = ctx();
    let env = ctx.env.clone();
    let log = Arc::new(Log::default());
    let module = Scripted::new(&log).on_exec(|_| Ok(ModuleControl::terminate(0, Signal::Stop)));
    let runner = ModuleRunner::new("it-terminate", Box::new(module), vec![], ctx);
    runner.start().unwrap();

    assert_eq!(runner.join(), Signal::Stop);
    assert!(env.manager().is_shutdown_requested());
    assert!(!env.manager().register("anything", 1, vec![]));
}

#[test]
fn test_handle_observes_from_another_thread() {
    let log = Arc::new(Log::default());
    let runner = ModuleRunner::new("it-handle", Box::new(Scripted::new(&log)), vec![], ctx());
    let handle = runner.handle();
    runner.start().unwrap();
    wait_for(|| log.executed.load(Ordering::SeqCst) >= 1);
    assert_eq!(handle.state(), RunnerState::Running);

    let waiter = std::thread::spawn(move || handle.wait());
    runner.shutdown(Signal::Interrupted);
    assert_eq!(waiter.join().unwrap(), Signal::Interrupted);
    assert_eq!(runner.join(), Signal::Interrupted);
}
