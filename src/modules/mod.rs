//! Built-in worker modules.
//!
//! - `heartbeat`: [`Heartbeat`], a periodic liveness beat;
//! - `notifier`: [`NotifierModule`], detects events and reports them.

mod heartbeat;
pub mod notifier;

pub use heartbeat::{BEATS_VAR, Heartbeat};
pub use notifier::NotifierModule;

use crate::config::{AppConfig, ModuleSettings};
use crate::module::ModuleRegistry;

/// Default heartbeat frequency, per minute.
pub const HEARTBEAT_FREQUENCY: f64 = 12.0;
/// Default notifier polling frequency, per minute.
pub const NOTIFIER_FREQUENCY: f64 = 6.0;

/// Registry of every built-in module, tuned by the module frequencies of `app`.
pub fn builtin_registry(app: &AppConfig) -> ModuleRegistry {
    let heartbeat = app.frequency("heartbeat").unwrap_or(HEARTBEAT_FREQUENCY);
    let notifier = app.frequency("notifier").unwrap_or(NOTIFIER_FREQUENCY);
    let retry_ms = app.retry_interval();
    ModuleRegistry::new()
        .with("heartbeat", move || Heartbeat::new(heartbeat))
        .with("notifier", move || NotifierModule::new(notifier, retry_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_names() {
        let registry = builtin_registry(&AppConfig::default());
        assert_eq!(registry.names().collect::<Vec<_>>(), ["heartbeat", "notifier"]);
    }
}
