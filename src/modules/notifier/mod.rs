//! Event notifier: polls a detector and forwards detected events.
//!
//! Arguments: `[detector] [notifier] [action] [signal]`, each optional.
//!
//! | argument | values | default |
//! |----------|--------|---------|
//! | detector | `null`, `file:<path>` | `null` |
//! | notifier | `null`, `log` | `null` |
//! | action   | `continue`, `end`, `terminate` | `continue` |
//! | signal   | any signal name | `TERMINATE` |
//!
//! After a delivered notification the module continues polling, ends itself
//! or shuts the application down, depending on `action`. A failed delivery is
//! retried after the retry interval; the detector is only acknowledged (for
//! `file:` the trigger file removed) once delivery succeeded.

mod detector;
mod notify;

pub use detector::{Detector, FileDetector, NullDetector, detector_from_arg};
pub use notify::{LogNotifier, Notifier, NullNotifier, notifier_from_arg};

use tracing::{info, warn};

use crate::env::EnvHandle;
use crate::error::ModuleError;
use crate::module::{Module, ModuleControl, Signal, timeout_from_frequency};

/// Polls a [`Detector`] and reports through a [`Notifier`].
pub struct NotifierModule {
    detect_ms: i64,
    retry_ms: i64,
    detector: Box<dyn Detector>,
    notifier: Box<dyn Notifier>,
    on_detect: ModuleControl,
}

impl NotifierModule {
    /// Creates a notifier polling `per_minute` times a minute.
    pub fn new(per_minute: f64, retry_ms: i64) -> Self {
        Self::with_interval(timeout_from_frequency(per_minute), retry_ms)
    }

    /// Creates a notifier polling every `detect_ms` milliseconds.
    pub fn with_interval(detect_ms: i64, retry_ms: i64) -> Self {
        Self {
            detect_ms,
            retry_ms,
            detector: Box::new(NullDetector),
            notifier: Box::new(NullNotifier),
            on_detect: ModuleControl::next(detect_ms),
        }
    }
}

fn on_detect(action: &str, signal: Signal, detect_ms: i64) -> ModuleControl {
    match action {
        "terminate" => ModuleControl::terminate(0, signal),
        "end" => ModuleControl::end(0, signal),
        "continue" => ModuleControl::next(detect_ms),
        other => {
            warn!(action = other, "unknown notifier action, continuing");
            ModuleControl::next(detect_ms)
        }
    }
}

impl Module for NotifierModule {
    fn initialise(&mut self, _env: &EnvHandle, args: &[String]) -> Result<(), ModuleError> {
        let arg = |index: usize, default: &'static str| {
            args.get(index).map(String::as_str).unwrap_or(default)
        };
        let signal: Signal = arg(3, "TERMINATE")
            .parse()
            .map_err(|err| ModuleError::rejected(format!("{err}")))?;

        self.detector = detector_from_arg(arg(0, "null"))?;
        self.notifier = notifier_from_arg(arg(1, "null"))?;
        self.on_detect = on_detect(arg(2, "continue"), signal, self.detect_ms);
        info!(
            detector = self.detector.name(),
            notifier = self.notifier.name(),
            action = ?self.on_detect.action(),
            "notifier ready"
        );
        Ok(())
    }

    fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
        let Some(message) = self.detector.detect().map_err(ModuleError::failed)? else {
            return Ok(ModuleControl::next(self.detect_ms));
        };
        info!(detector = self.detector.name(), "event detected");
        if self.notifier.notify(&message) {
            if let Err(err) = self.detector.acknowledge() {
                warn!(detector = self.detector.name(), error = %err, "failed to acknowledge event");
            }
            Ok(self.on_detect.clone())
        } else {
            warn!(notifier = self.notifier.name(), "notification failed, will retry");
            Ok(ModuleControl::next(self.retry_ms))
        }
    }

    fn finalise(&mut self, _control: &ModuleControl) -> Result<(), ModuleError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{Environment, Scope};
    use crate::module::Action;
    use std::sync::Arc;

    fn handle() -> EnvHandle {
        EnvHandle::new(Arc::new(Environment::new()), Scope::module("notifier"))
    }

    struct Fires;

    impl Detector for Fires {
        fn name(&self) -> &str {
            "fires"
        }
        fn detect(&mut self) -> std::io::Result<Option<String>> {
            Ok(Some("boom".into()))
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn notify(&mut self, _payload: &str) -> bool {
            false
        }
    }

    /// Fails its first delivery, then succeeds.
    struct FailsOnce {
        calls: usize,
    }

    impl Notifier for FailsOnce {
        fn name(&self) -> &str {
            "fails-once"
        }
        fn notify(&mut self, _payload: &str) -> bool {
            self.calls += 1;
            self.calls > 1
        }
    }

    #[test]
    fn test_defaults_keep_polling() {
        let mut module = NotifierModule::with_interval(100, 500);
        module.initialise(&handle(), &[]).unwrap();
        let control = module.execute().unwrap();
        assert_eq!(control.action(), Action::Next);
        assert_eq!(control.delay_ms(), 100);
    }

    #[test]
    fn test_file_trigger_terminates_with_signal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trigger");
        let args: Vec<String> = vec![
            format!("file:{}", path.display()),
            "log".into(),
            "terminate".into(),
            "stop".into(),
        ];
        let mut module = NotifierModule::with_interval(100, 500);
        module.initialise(&handle(), &args).unwrap();
        assert_eq!(module.execute().unwrap().action(), Action::Next);

        std::fs::write(&path, "lost connection").unwrap();
        let control = module.execute().unwrap();
        assert_eq!(control.action(), Action::Terminate);
        assert_eq!(control.signal(), Signal::Stop);
    }

    #[test]
    fn test_failed_notification_retries() {
        let mut module = NotifierModule::with_interval(100, 500);
        module.detector = Box::new(Fires);
        module.notifier = Box::new(Broken);
        let control = module.execute().unwrap();
        assert_eq!(control.action(), Action::Next);
        assert_eq!(control.delay_ms(), 500);
    }

    #[test]
    fn test_failed_delivery_keeps_the_file_trigger_for_the_retry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trigger");
        let args: Vec<String> = vec![
            format!("file:{}", path.display()),
            "null".into(),
            "terminate".into(),
        ];
        let mut module = NotifierModule::with_interval(100, 500);
        module.initialise(&handle(), &args).unwrap();
        module.notifier = Box::new(FailsOnce { calls: 0 });

        std::fs::write(&path, "lost connection").unwrap();
        let first = module.execute().unwrap();
        assert_eq!(first.action(), Action::Next);
        assert_eq!(first.delay_ms(), 500);
        assert!(path.exists());

        let retry = module.execute().unwrap();
        assert_eq!(retry.action(), Action::Terminate);
        assert_eq!(retry.signal(), Signal::Terminate);
        assert!(!path.exists());

        module.notifier = Box::new(NullNotifier);
        assert_eq!(module.execute().unwrap().delay_ms(), 100);
    }

    #[test]
    fn test_bad_arguments_are_rejected() {
        let mut module = NotifierModule::with_interval(100, 500);
        assert!(module.initialise(&handle(), &["null".into(), "smtp".into()]).is_err());
        assert!(
            module
                .initialise(&handle(), &["null".into(), "null".into(), "end".into(), "nope".into()])
                .unwrap_err()
                .is_rejection()
        );
    }
}
