use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use modvisor::modules::builtin_registry;
use modvisor::{AppConfig, LogWriter, ModuleSettings, Subscribe, Supervisor, SupervisorConfig};

mod logging;

/// Upper bound on runtime teardown once the supervisor has returned.
const RUNTIME_TEARDOWN: Duration = Duration::from_secs(1);

/// Runs the configured worker modules under the module manager.
#[derive(Debug, Parser)]
#[command(name = "modvisor", version, about)]
struct Cli {
    /// Configuration file; defaults are used when it does not exist.
    #[arg(short, long, env = "MODVISOR_CONFIG", default_value = "modvisor.toml")]
    config: PathBuf,

    /// Log filter directive, overrides `[log] level`.
    #[arg(long, env = "MODVISOR_LOG")]
    log_level: Option<String>,

    /// Print the registered modules and exit.
    #[arg(long)]
    list_modules: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let app = AppConfig::load_or_default(&cli.config)?;
    let registry = builtin_registry(&app);

    if cli.list_modules {
        for name in registry.names() {
            let state = if app.is_enabled(name) { "enabled" } else { "disabled" };
            println!("{name}\t{state}\t{} instance(s)", app.instance_count(name));
        }
        return Ok(ExitCode::SUCCESS);
    }

    let _guard = logging::init(&app.log, cli.log_level.as_deref())?;
    info!(config = %cli.config.display(), version = env!("CARGO_PKG_VERSION"), "starting modvisor");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let signal = runtime.block_on(async {
        let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
        let sup = Supervisor::builder(SupervisorConfig::from(&app.manager))
            .with_subscribers(subs)
            .build();
        let settings = Arc::new(app.clone());
        let manager = sup.manager(Arc::new(registry), settings);
        sup.run(manager).await
    });

    // Runner threads stuck past the grace period must not delay the exit.
    runtime.shutdown_timeout(RUNTIME_TEARDOWN);

    match signal {
        Ok(signal) => {
            info!(%signal, "modvisor stopped");
            Ok(ExitCode::from(signal.exit_code()))
        }
        Err(err) => {
            error!(error = %err, label = err.as_label(), "modvisor stopped abnormally");
            Err(err.into())
        }
    }
}
