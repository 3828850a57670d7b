//! Error types used by the modvisor runtime, its environment and its modules.
//!
//! This module defines the error enums of every layer:
//!
//! - [`EnvironmentError`]: access violations against the shared [`Environment`](crate::Environment).
//! - [`ModuleError`]: failures reported by a module lifecycle phase.
//! - [`ConfigError`]: unreadable or invalid configuration.
//! - [`RuntimeError`]: errors raised by the supervisor itself.
//! - [`ParseSignalError`]: unknown signal names.
//!
//! Every type provides `as_label` (a short stable snake_case label for logs).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// # Errors produced by the shared environment.
///
/// Raised synchronously to the caller; the runtime never retries them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvironmentError {
    /// The variable is not declared in the resolved scope.
    #[error("undeclared variable \"{name}\" in scope {scope}")]
    UndeclaredVariable {
        /// Variable name.
        name: String,
        /// Scope the lookup resolved to.
        scope: String,
    },

    /// The variable already exists in the target scope.
    #[error("duplicated variable \"{name}\" in scope {scope}")]
    DuplicateVariable {
        /// Variable name.
        name: String,
        /// Scope the declaration targeted.
        scope: String,
    },

    /// The variable is reserved for the module manager.
    #[error("restricted variable \"{name}\"")]
    RestrictedVariable {
        /// Variable name.
        name: String,
    },
}

impl EnvironmentError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use modvisor::EnvironmentError;
    ///
    /// let err = EnvironmentError::RestrictedVariable { name: "mm".into() };
    /// assert_eq!(err.as_label(), "env_restricted");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            EnvironmentError::UndeclaredVariable { .. } => "env_undeclared",
            EnvironmentError::DuplicateVariable { .. } => "env_duplicate",
            EnvironmentError::RestrictedVariable { .. } => "env_restricted",
        }
    }
}

/// # Errors produced by a module lifecycle phase.
///
/// `Rejected` is the module's own "no" (for example an `initialise` that refuses
/// to run, or a `finalise` that could not clean up). `Failed` and `Environment`
/// are unexpected failures.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ModuleError {
    /// The module declined to proceed.
    #[error("rejected: {reason}")]
    Rejected {
        /// Why the module declined.
        reason: String,
    },

    /// The module failed while doing its work.
    #[error("failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// An environment access failed inside the module.
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl ModuleError {
    /// Shorthand for [`ModuleError::Rejected`].
    pub fn rejected(reason: impl Into<String>) -> Self {
        ModuleError::Rejected {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ModuleError::Failed`].
    pub fn failed(error: impl std::fmt::Display) -> Self {
        ModuleError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ModuleError::Rejected { .. } => "module_rejected",
            ModuleError::Failed { .. } => "module_failed",
            ModuleError::Environment(_) => "module_environment",
        }
    }

    /// True when the module declined rather than failed.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ModuleError::Rejected { .. })
    }
}

/// # Errors produced while loading configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        /// File that could not be read.
        path: PathBuf,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config file '{path}': {source}")]
    ParseToml {
        /// File that could not be parsed.
        path: PathBuf,
        /// Parser cause.
        #[source]
        source: toml::de::Error,
    },

    /// A value is out of range.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue {
        /// Dotted key of the offending value.
        key: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::ReadFile { .. } => "config_read",
            ConfigError::ParseToml { .. } => "config_parse",
            ConfigError::InvalidValue { .. } => "config_invalid",
        }
    }

    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// # Errors produced by the modvisor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The OS refused to spawn a runner thread.
    #[error("failed to spawn runner thread '{runner}': {source}")]
    Spawn {
        /// Runner name.
        runner: String,
        /// I/O cause.
        #[source]
        source: std::io::Error,
    },

    /// The runner was already started or already shut down.
    #[error("runner '{runner}' is not in INIT state")]
    NotStartable {
        /// Runner name.
        runner: String,
    },

    /// Shutdown grace period was exceeded; some runners were still alive.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Runners that had not stopped in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use modvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Spawn { .. } => "runtime_spawn",
            RuntimeError::NotStartable { .. } => "runtime_not_startable",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// Unknown signal name.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown signal \"{0}\"")]
pub struct ParseSignalError(pub String);

/// Extracts the message of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_error_messages() {
        let err = EnvironmentError::UndeclaredVariable {
            name: "x".into(),
            scope: "heartbeat".into(),
        };
        assert_eq!(err.to_string(), "undeclared variable \"x\" in scope heartbeat");
        assert_eq!(err.as_label(), "env_undeclared");
    }

    #[test]
    fn test_module_error_from_environment() {
        let err: ModuleError = EnvironmentError::RestrictedVariable { name: "mm".into() }.into();
        assert_eq!(err.as_label(), "module_environment");
        assert!(!err.is_rejection());
        assert!(ModuleError::rejected("no").is_rejection());
    }
}
