//! # Logging subscriber.
//!
//! [`LogWriter`] forwards runtime events to `tracing` with structured fields.
//! Lifecycle noise goes to `debug`, module failures to `warn`, and anything that
//! ends a runner with an error-family signal to `error`.
//!
//! ## Output (fmt layer)
//! ```text
//! INFO  runner=heartbeat-0 module=heartbeat: runner started
//! WARN  runner=notifier-0 module=notifier delay_ms=30000 reason="failed: detector offline": execute failed, retrying
//! ERROR runner=broken-0 module=broken signal=133-FATAL_CONTROL: runner dead
//! ```

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// `tracing` bridge for runtime events.
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let runner = e.runner.as_deref().unwrap_or("-");
        let module = e.module.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let signal = e.signal.map(|s| s.to_string()).unwrap_or_default();

        match e.kind {
            EventKind::RunnerCreated => debug!(runner, module, "runner created"),
            EventKind::RunnerStarted => info!(runner, module, "runner started"),
            EventKind::RunnerStopping => debug!(runner, module, %signal, "runner stopping"),
            EventKind::RunnerDead => match e.signal {
                Some(sig) if sig.is_error() => error!(runner, module, %signal, "runner dead"),
                _ => info!(runner, module, %signal, "runner dead"),
            },
            EventKind::ExecuteFailed => {
                warn!(runner, module, delay_ms = e.delay_ms.unwrap_or_default(), reason, "execute failed, retrying")
            }
            EventKind::IllegalControl => {
                error!(runner, module, delay_ms = e.delay_ms.unwrap_or_default(), "illegal module control")
            }
            EventKind::ModuleReloaded => info!(runner, module, "module reloaded"),
            EventKind::InitialiseFailed => {
                error!(runner, module, %signal, reason, "module initialise failed")
            }
            EventKind::FinaliseFailed => error!(runner, module, reason, "module finalise failed"),
            EventKind::ModuleUnknown => warn!(module, reason, "unknown module"),
            EventKind::ShutdownForwarded => info!(runner, module, %signal, "shutdown forwarded"),
            EventKind::ShutdownRequested => info!(runner, "application shutdown requested"),
            EventKind::ShutdownSignalled => info!("termination signal received"),
            EventKind::AllStoppedWithin => info!("all runners stopped within grace period"),
            EventKind::GraceExceeded => error!(stuck = reason, "grace period exceeded"),
            EventKind::SubscriberOverflow => warn!(subscriber = runner, reason, "subscriber overflow"),
            EventKind::SubscriberPanicked => error!(subscriber = runner, reason, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::Signal;

    #[tokio::test]
    async fn test_handles_every_kind_without_subscriber_installed() {
        let kinds = [
            EventKind::RunnerCreated,
            EventKind::RunnerStarted,
            EventKind::RunnerStopping,
            EventKind::RunnerDead,
            EventKind::ExecuteFailed,
            EventKind::IllegalControl,
            EventKind::GraceExceeded,
            EventKind::SubscriberPanicked,
        ];
        for kind in kinds {
            LogWriter
                .on_event(&Event::new(kind).with_runner("a-0").with_signal(Signal::Kill))
                .await;
        }
    }
}
