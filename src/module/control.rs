//! # Scheduling decisions returned by a module.
//!
//! A [`ModuleControl`] is produced once per `execute` step and consumed
//! immediately by the owning runner. It tells the runner what to do next and
//! how long to wait before doing it:
//!
//! ```text
//! next(delay)              → wait, execute again
//! reload(delay, args)      → initialise again (with args, or the original ones), wait, execute again
//! end(delay, signal)       → wait, stop this module with `signal`
//! terminate(delay, signal) → wait, stop this module, then shut down the application
//! ```
//!
//! Delays are milliseconds. They are signed so that a module returning a
//! negative delay can be detected; the runner treats it as a protocol violation.

use std::time::Duration;

use super::signal::Signal;

/// What the runner should do after the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Continue the module execution.
    Next,
    /// Stop the module execution.
    Stop,
    /// Reinitialise the module and continue execution.
    Reload,
    /// Stop the module and shut down the application.
    Terminate,
}

/// Immutable scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleControl {
    action: Action,
    delay_ms: i64,
    signal: Signal,
    args: Option<Vec<String>>,
}

impl ModuleControl {
    /// Continue after `delay_ms`.
    pub fn next(delay_ms: i64) -> Self {
        Self::new(Action::Next, delay_ms, Signal::Success, None)
    }

    /// Stop this module after `delay_ms`, reporting `signal`.
    pub fn end(delay_ms: i64, signal: Signal) -> Self {
        Self::new(Action::Stop, delay_ms, signal, None)
    }

    /// Reinitialise the module, then continue after `delay_ms`.
    ///
    /// `None` reuses the arguments the runner was created with.
    pub fn reload(delay_ms: i64, args: Option<Vec<String>>) -> Self {
        Self::new(Action::Reload, delay_ms, Signal::Success, args)
    }

    /// Stop this module after `delay_ms` and shut down the application.
    pub fn terminate(delay_ms: i64, signal: Signal) -> Self {
        Self::new(Action::Terminate, delay_ms, signal, None)
    }

    fn new(action: Action, delay_ms: i64, signal: Signal, args: Option<Vec<String>>) -> Self {
        Self {
            action,
            delay_ms,
            signal,
            args,
        }
    }

    /// The control action.
    pub fn action(&self) -> Action {
        self.action
    }

    /// Raw delay in milliseconds, possibly negative.
    pub fn delay_ms(&self) -> i64 {
        self.delay_ms
    }

    /// The delay as a [`Duration`], or `None` when it is negative.
    pub fn delay(&self) -> Option<Duration> {
        u64::try_from(self.delay_ms).ok().map(Duration::from_millis)
    }

    /// The signal carried by `end` and `terminate` (`SUCCESS` otherwise).
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Reload arguments, if any were supplied.
    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }

    /// True when the runner keeps executing after this control.
    pub fn continues(&self) -> bool {
        matches!(self.action, Action::Next | Action::Reload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_fix_fields() {
        let next = ModuleControl::next(500);
        assert_eq!(next.action(), Action::Next);
        assert_eq!(next.signal(), Signal::Success);
        assert_eq!(next.delay(), Some(Duration::from_millis(500)));
        assert!(next.args().is_none());

        let end = ModuleControl::end(0, Signal::Kill);
        assert_eq!(end.action(), Action::Stop);
        assert_eq!(end.signal(), Signal::Kill);
        assert!(!end.continues());

        let reload = ModuleControl::reload(10, Some(vec!["x".into()]));
        assert_eq!(reload.args(), Some(&["x".to_string()][..]));
        assert!(reload.continues());

        let terminate = ModuleControl::terminate(0, Signal::Terminate);
        assert_eq!(terminate.action(), Action::Terminate);
    }

    #[test]
    fn test_negative_delay_has_no_duration() {
        let control = ModuleControl::next(-1);
        assert_eq!(control.delay_ms(), -1);
        assert!(control.delay().is_none());
    }
}
