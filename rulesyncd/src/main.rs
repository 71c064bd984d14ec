//! rulesyncd: keeps Mimir ruler tenants in sync with a config directory.
//!
//! # Usage
//!
//! ```bash
//! rulesyncd [--config-dir <path>] [--once] [--log-format text|json]
//! ```
//!
//! # Environment Variables
//!
//! - `RULESYNC_CONFIG_DIR`: config directory (default: `<config dir>/rulesync`)
//! - `RUST_LOG`: log filter (default: `info`)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use rulesync::gitops::ConfigWatcher;
use rulesync::{
    ConfigLoader, ConfigReconciler, DefaultBackendFactory, StatusBoard, SyncScheduler,
};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Reconciles Prometheus rule documents into Mimir ruler tenants
#[derive(Parser, Debug)]
#[command(name = "rulesyncd")]
#[command(version, about)]
struct Args {
    /// Config directory holding settings, tenants and rule documents
    #[arg(short, long, env = "RULESYNC_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Run a single cycle and exit; the exit code is non-zero if a tenant failed
    #[arg(long)]
    once: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_log::LogTracer::init()?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().json()),
        )?,
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(tracing_subscriber::fmt::layer().with_target(true)),
        )?,
    }
    Ok(())
}

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rulesync")
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    let config_dir = args.config_dir.unwrap_or_else(default_config_dir);
    let loader = ConfigLoader::new(&config_dir);

    // Fail fast on a broken config directory; later cycles only log.
    let settings = match loader.load() {
        Ok(config) => config.settings(),
        Err(e) => {
            log::error!("Failed to load {}: {}", config_dir.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let reconciler = Arc::new(ConfigReconciler::new(
        loader,
        Arc::new(DefaultBackendFactory),
        Arc::new(StatusBoard::new()),
    ));

    if args.once {
        return run_once(&reconciler);
    }

    tracing::info!(
        config_dir = %config_dir.display(),
        resync_interval = settings.resync_interval,
        watch = settings.watch,
        backend = %settings.ruler.backend,
        "Starting rulesyncd"
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        if let Err(e) = ctrlc::set_handler(move || {
            log::info!("Shutdown requested");
            shutdown.store(true, Ordering::Release);
        }) {
            log::error!("Failed to install signal handler: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let mut watcher = ConfigWatcher::new(&config_dir);
    let trigger_rx = watcher.subscribe();
    if settings.watch {
        // Without the watch, changes still land on the next interval.
        if let Err(e) = watcher.start() {
            log::warn!("Config watch unavailable: {}", e);
        }
    }

    let scheduler = SyncScheduler::new(
        Arc::clone(&reconciler),
        Duration::from_secs(settings.resync_interval.max(1)),
    )
    .with_shutdown(Arc::clone(&shutdown));
    let handle = scheduler.start(trigger_rx);

    while !shutdown.load(Ordering::Acquire) {
        std::thread::sleep(Duration::from_millis(200));
    }

    scheduler.stop();
    watcher.stop();
    if handle.join().is_err() {
        log::error!("Scheduler thread panicked");
        return ExitCode::FAILURE;
    }

    log::info!("rulesyncd stopped");
    ExitCode::SUCCESS
}

fn run_once(reconciler: &ConfigReconciler) -> ExitCode {
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(reconciler.reconcile()) {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => log::warn!("Failed to render cycle report: {}", e),
            }
            if report.failed() > 0 {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            log::error!("Sync cycle failed: {}", rulesync::RulesyncError::from(e));
            ExitCode::FAILURE
        }
    }
}
