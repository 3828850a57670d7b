//! Periodic liveness beat.
//!
//! Arguments: `[label] [limit]`. Every beat increments the private variable
//! `beats`, shared by all heartbeat instances. With a limit, the instance ends
//! with `SUCCESS` after that many of its own beats.

use tracing::info;

use crate::env::EnvHandle;
use crate::error::{EnvironmentError, ModuleError};
use crate::module::{Module, ModuleControl, Signal, timeout_from_frequency};

/// Private variable holding the beat count.
pub const BEATS_VAR: &str = "beats";

/// Logs a beat at a fixed frequency.
pub struct Heartbeat {
    interval_ms: i64,
    env: Option<EnvHandle>,
    label: String,
    limit: Option<u64>,
    beats: u64,
}

impl Heartbeat {
    /// Creates a heartbeat beating `per_minute` times a minute.
    pub fn new(per_minute: f64) -> Self {
        Self::with_interval(timeout_from_frequency(per_minute))
    }

    /// Creates a heartbeat beating every `interval_ms` milliseconds.
    pub fn with_interval(interval_ms: i64) -> Self {
        Self {
            interval_ms,
            env: None,
            label: "heartbeat".to_string(),
            limit: None,
            beats: 0,
        }
    }
}

impl Module for Heartbeat {
    fn initialise(&mut self, env: &EnvHandle, args: &[String]) -> Result<(), ModuleError> {
        if let Some(label) = args.first() {
            self.label = label.clone();
        }
        self.limit = match args.get(1) {
            Some(raw) => Some(
                raw.parse()
                    .map_err(|_| ModuleError::rejected(format!("invalid beat limit: {raw}")))?,
            ),
            None => None,
        };
        match env.declare(BEATS_VAR, "0") {
            Ok(()) | Err(EnvironmentError::DuplicateVariable { .. }) => {}
            Err(err) => return Err(err.into()),
        }
        self.beats = 0;
        self.env = Some(env.clone());
        Ok(())
    }

    fn execute(&mut self) -> Result<ModuleControl, ModuleError> {
        let env = self
            .env
            .as_ref()
            .ok_or_else(|| ModuleError::failed("heartbeat is not initialised"))?;
        let total: u64 = env
            .get(BEATS_VAR)?
            .parse()
            .map_err(|err| ModuleError::failed(format!("corrupt beat counter: {err}")))?;
        env.set(BEATS_VAR, (total + 1).to_string())?;
        self.beats += 1;
        info!(label = %self.label, beats = self.beats, total = total + 1, "beat");

        if self.limit.is_some_and(|limit| self.beats >= limit) {
            return Ok(ModuleControl::end(0, Signal::Success));
        }
        Ok(ModuleControl::next(self.interval_ms))
    }

    fn finalise(&mut self, control: &ModuleControl) -> Result<(), ModuleError> {
        info!(label = %self.label, beats = self.beats, signal = %control.signal(), "heartbeat stopped");
        Ok(())
    }
}
