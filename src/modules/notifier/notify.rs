use tracing::{debug, warn};

use crate::error::ModuleError;

/// Delivers the message of a detected event.
pub trait Notifier: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Returns false when delivery failed and should be retried.
    fn notify(&mut self, payload: &str) -> bool;
}

/// Placeholder: only logs the payload at debug level.
#[derive(Debug, Default)]
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn name(&self) -> &str {
        "null"
    }

    fn notify(&mut self, payload: &str) -> bool {
        warn!("null notifier in use, the event is not delivered anywhere");
        debug!(payload, "null notifier");
        true
    }
}

/// Reports the payload as a warning.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&mut self, payload: &str) -> bool {
        warn!(payload, "event notification");
        true
    }
}

/// Resolves `null` or `log`.
pub fn notifier_from_arg(arg: &str) -> Result<Box<dyn Notifier>, ModuleError> {
    match arg {
        "null" => Ok(Box::new(NullNotifier)),
        "log" => Ok(Box::new(LogNotifier)),
        other => Err(ModuleError::rejected(format!("unknown notifier: {other}"))),
    }
}
