//! Tracing setup for the binary: terminal layer plus an optional file layer.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use modvisor::config::LogConfig;

/// Installs the global subscriber.
///
/// `directive` overrides `cfg.level`. With `cfg.file`, logs are also written to
/// `<directory>/<epoch millis>.log`; the returned guard flushes that file on drop.
pub fn init(cfg: &LogConfig, directive: Option<&str>) -> anyhow::Result<Option<WorkerGuard>> {
    let directive = directive.unwrap_or(&cfg.level);
    let filter = || EnvFilter::try_new(directive).with_context(|| format!("invalid log filter {directive:?}"));

    let terminal = fmt::layer().with_target(false).with_filter(filter()?);

    if !cfg.file {
        tracing_subscriber::registry().with(terminal).try_init()?;
        return Ok(None);
    }

    let started = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(started.to_string())
        .filename_suffix("log")
        .build(&cfg.directory)
        .with_context(|| format!("cannot open log directory {}", cfg.directory.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file = fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter()?);

    tracing_subscriber::registry().with(terminal).with(file).try_init()?;
    Ok(Some(guard))
}
