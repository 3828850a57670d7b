//! # Application configuration.
//!
//! [`AppConfig`] is deserialized from a TOML file and drives the module manager
//! through the [`ModuleSettings`] trait.
//!
//! ```toml
//! [log]
//! level = "info"            # EnvFilter directive
//! file = true               # also write <directory>/<epoch>.log
//! directory = "logs"
//!
//! [manager]
//! monitor_frequency = 6.0   # manager ticks per minute
//! retry_frequency = 2.0     # retries per minute after a failed execute
//! grace = "30s"             # shutdown grace after an OS signal
//!
//! [modules.heartbeat]
//! enabled = true
//! args = "first 3; \"second label\" 5"
//! frequency = 12.0
//! ```
//!
//! ## Instance arguments
//! `args` holds one argument set per instance, separated by `;`. Inside a set,
//! words are separated by whitespace; double quotes group words and are
//! removed. The instance count is `count` when given, otherwise
//! `max(number of sets, 1)`; instances beyond the last set get no arguments.
//!
//! After splitting, `${VAR}` in a word is replaced by the environment variable
//! `VAR` (empty when unset) and `${VAR:-fallback}` falls back to `fallback`.
//! Substituted values are never split, so secrets can stay out of the file.
//!
//! # Example
//! ```
//! use modvisor::{AppConfig, ModuleSettings};
//!
//! let cfg = AppConfig::from_toml_str(r#"
//!     [modules.heartbeat]
//!     enabled = true
//!     args = "a;b"
//! "#).unwrap();
//!
//! assert_eq!(cfg.instance_count("heartbeat"), 2);
//! assert_eq!(cfg.args("heartbeat", 1), vec!["b".to_string()]);
//! assert_eq!(cfg.monitor_interval(), 10_000);
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::module::timeout_from_frequency;

/// What the module manager needs to know from configuration.
pub trait ModuleSettings: Send + Sync + 'static {
    /// Every configured module name, enabled or not.
    fn module_names(&self) -> Vec<String>;

    /// True if `name` should be started by the manager.
    fn is_enabled(&self, name: &str) -> bool;

    /// Number of runners to create for `name`.
    fn instance_count(&self, name: &str) -> usize;

    /// Arguments of instance `index` of `name`.
    fn args(&self, name: &str, index: usize) -> Vec<String>;

    /// Delay between two manager ticks, in milliseconds.
    fn monitor_interval(&self) -> i64;

    /// Delay before retrying after a failed `execute`, in milliseconds.
    fn retry_interval(&self) -> i64;
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `modvisor=debug,warn`.
    pub level: String,
    /// Also write logs to a file.
    pub file: bool,
    /// Directory of the log files.
    pub directory: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
            directory: PathBuf::from("logs"),
        }
    }
}

/// `[manager]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ManagerConfig {
    /// Manager ticks per minute.
    pub monitor_frequency: f64,
    /// Retries per minute after a failed `execute`.
    pub retry_frequency: f64,
    /// How long to wait for runners after an OS termination signal.
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
    /// Event bus capacity.
    pub bus_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            monitor_frequency: 6.0,
            retry_frequency: 2.0,
            grace: Duration::from_secs(30),
            bus_capacity: 1024,
        }
    }
}

/// `[modules.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    /// Start this module.
    pub enabled: bool,
    /// Argument sets, see the module docs.
    pub args: String,
    /// Explicit instance count.
    pub count: Option<usize>,
    /// Module specific frequency, per minute.
    pub frequency: Option<f64>,
}

impl ModuleConfig {
    /// Parsed argument sets, environment references expanded.
    pub fn arg_sets(&self) -> Vec<Vec<String>> {
        parse_arg_sets(&self.args)
            .into_iter()
            .map(|set| set.iter().map(|word| expand_env(word)).collect())
            .collect()
    }
}

/// Whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Logging.
    pub log: LogConfig,
    /// Module manager.
    pub manager: ManagerConfig,
    /// Modules by registered name.
    pub modules: BTreeMap<String, ModuleConfig>,
}

impl AppConfig {
    /// Reads and validates `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Like [`AppConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse(content, Path::new("<inline>"))
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let cfg: AppConfig = toml::from_str(content).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_frequency("manager.monitor_frequency", self.manager.monitor_frequency)?;
        check_frequency("manager.retry_frequency", self.manager.retry_frequency)?;
        for (name, module) in &self.modules {
            if let Some(frequency) = module.frequency {
                check_frequency(&format!("modules.{name}.frequency"), frequency)?;
            }
            if module.count == Some(0) {
                return Err(ConfigError::invalid(
                    format!("modules.{name}.count"),
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }

    /// Section of `name`, if configured.
    pub fn module(&self, name: &str) -> Option<&ModuleConfig> {
        self.modules.get(name)
    }

    /// Module specific frequency of `name`, per minute.
    pub fn frequency(&self, name: &str) -> Option<f64> {
        self.module(name).and_then(|m| m.frequency)
    }
}

fn check_frequency(key: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(key, format!("frequency must be positive, got {value}")))
    }
}

impl ModuleSettings for AppConfig {
    fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    fn is_enabled(&self, name: &str) -> bool {
        self.module(name).is_some_and(|m| m.enabled)
    }

    fn instance_count(&self, name: &str) -> usize {
        match self.module(name) {
            Some(ModuleConfig { count: Some(count), .. }) => *count,
            Some(module) => module.arg_sets().len().max(1),
            None => 1,
        }
    }

    fn args(&self, name: &str, index: usize) -> Vec<String> {
        self.module(name)
            .and_then(|m| m.arg_sets().into_iter().nth(index))
            .unwrap_or_default()
    }

    fn monitor_interval(&self) -> i64 {
        timeout_from_frequency(self.manager.monitor_frequency)
    }

    fn retry_interval(&self) -> i64 {
        timeout_from_frequency(self.manager.retry_frequency)
    }
}

/// Splits `raw` into argument sets (`;`) of words (whitespace).
///
/// Double quotes group text, including `;` and whitespace, and are removed.
/// Empty sets are dropped.
pub fn parse_arg_sets(raw: &str) -> Vec<Vec<String>> {
    let mut sets = Vec::new();
    let mut words: Vec<String> = Vec::new();
    let mut word = String::new();
    let mut quoted = false;
    let mut pending = false;

    for ch in raw.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            ';' if !quoted => {
                flush_word(&mut words, &mut word, &mut pending);
                if !words.is_empty() {
                    sets.push(std::mem::take(&mut words));
                }
            }
            c if c.is_whitespace() && !quoted => flush_word(&mut words, &mut word, &mut pending),
            c => {
                word.push(c);
                pending = true;
            }
        }
    }
    flush_word(&mut words, &mut word, &mut pending);
    if !words.is_empty() {
        sets.push(words);
    }
    sets
}

/// Replaces `${VAR}` and `${VAR:-fallback}` with environment values.
///
/// An unset (or non-unicode) variable without fallback expands to nothing. A
/// `$` not followed by a complete `${...}` is kept as is.
pub fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start + 2..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let reference = &rest[start + 2..start + 2 + len];
        let (name, fallback) = match reference.split_once(":-") {
            Some((name, fallback)) => (name, Some(fallback)),
            None => (reference, None),
        };
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => out.push_str(fallback.unwrap_or_default()),
        }
        rest = &rest[start + 2 + len + 1..];
    }
    out.push_str(rest);
    out
}

fn flush_word(words: &mut Vec<String>, word: &mut String, pending: &mut bool) {
    if *pending {
        words.push(std::mem::take(word));
        *pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_parse_arg_sets() {
        assert_eq!(parse_arg_sets("a;b"), vec![strings(&["a"]), strings(&["b"])]);
        assert_eq!(
            parse_arg_sets("  null log  terminate KILL ;; x "),
            vec![strings(&["null", "log", "terminate", "KILL"]), strings(&["x"])]
        );
        assert_eq!(
            parse_arg_sets(r#"file:"/tmp/a b" "x;y" """#),
            vec![strings(&["file:/tmp/a b", "x;y", ""])]
        );
        assert!(parse_arg_sets("").is_empty());
        assert!(parse_arg_sets(" ; ").is_empty());
    }

    #[test]
    fn test_expand_env() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("MODVISOR_TEST_EXPAND_TOKEN", "s3cret value") };
        assert_eq!(expand_env("${MODVISOR_TEST_EXPAND_TOKEN}"), "s3cret value");
        assert_eq!(
            expand_env("key=${MODVISOR_TEST_EXPAND_TOKEN:-none};"),
            "key=s3cret value;"
        );
        assert_eq!(expand_env("${MODVISOR_TEST_EXPAND_UNSET:-fallback}"), "fallback");
        assert_eq!(expand_env("a${MODVISOR_TEST_EXPAND_UNSET}b"), "ab");
        assert_eq!(expand_env("$HOME ${open"), "$HOME ${open");
        assert_eq!(expand_env("plain"), "plain");
    }

    #[test]
    fn test_module_args_expand_environment() {
        // SAFETY: the variable name is unique to this test.
        unsafe { std::env::set_var("MODVISOR_TEST_ARGS_PATH", "/run/trigger file") };
        let cfg = AppConfig::from_toml_str(
            r#"
            [modules.notifier]
            enabled = true
            args = "file:${MODVISOR_TEST_ARGS_PATH} log; ${MODVISOR_TEST_ARGS_MISSING:-null}"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.instance_count("notifier"), 2);
        assert_eq!(cfg.args("notifier", 0), strings(&["file:/run/trigger file", "log"]));
        assert_eq!(cfg.args("notifier", 1), strings(&["null"]));
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_toml_str("").unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.monitor_interval(), 10_000);
        assert_eq!(cfg.retry_interval(), 30_000);
        assert_eq!(cfg.manager.grace, Duration::from_secs(30));
        assert!(!cfg.is_enabled("anything"));
    }

    #[test]
    fn test_module_sections() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [manager]
            grace = "1m 30s"

            [modules.heartbeat]
            enabled = true
            args = "one;two;three"
            frequency = 30.0

            [modules.notifier]
            enabled = true
            args = "null null"
            count = 3
            "#,
        )
        .unwrap();

        assert_eq!(cfg.manager.grace, Duration::from_secs(90));
        assert_eq!(cfg.module_names(), strings(&["heartbeat", "notifier"]));
        assert_eq!(cfg.instance_count("heartbeat"), 3);
        assert_eq!(cfg.args("heartbeat", 2), strings(&["three"]));
        assert_eq!(cfg.frequency("heartbeat"), Some(30.0));
        assert_eq!(cfg.instance_count("notifier"), 3);
        assert_eq!(cfg.args("notifier", 0), strings(&["null", "null"]));
        assert!(cfg.args("notifier", 2).is_empty());
    }

    #[test]
    fn test_module_without_args_has_one_instance() {
        let cfg = AppConfig::from_toml_str("[modules.heartbeat]\nenabled = true\n").unwrap();
        assert_eq!(cfg.instance_count("heartbeat"), 1);
        assert!(cfg.args("heartbeat", 0).is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AppConfig::from_toml_str("[manager]\nmonitor_frequency = 0.0\n").unwrap_err();
        assert_eq!(err.as_label(), "config_invalid");

        let err = AppConfig::from_toml_str("[modules.x]\ncount = 0\n").unwrap_err();
        assert!(err.to_string().contains("modules.x.count"));

        let err = AppConfig::from_toml_str("[manager]\nunknown = 1\n").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modvisor.toml");
        std::fs::write(&path, "[log]\nlevel = \"debug\"\n").unwrap();

        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.log.level, "debug");

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            AppConfig::load(&missing),
            Err(ConfigError::ReadFile { .. })
        ));
        assert_eq!(AppConfig::load_or_default(&missing).unwrap(), AppConfig::default());
    }
}
