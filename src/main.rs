//! idle-shutdownd - Desktop daemon that shuts down an idle workstation.
//!
//! Watches user input idle time and, after a configurable threshold, warns the
//! user and schedules a delayed system shutdown unless canceled.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use chrono::Local;
use clap::Parser;
use idle_shutdownd::app::App;
use idle_shutdownd::config::Config;
use idle_shutdownd::console::Console;
use idle_shutdownd::control::ControlHandle;
use idle_shutdownd::event_log;
use idle_shutdownd::event_log::EventLog;
use idle_shutdownd::idle;
use idle_shutdownd::idle::IdleBackend;
use idle_shutdownd::idle::IdleSource;
use idle_shutdownd::shutdown::CommandShutdown;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Idle shutdown daemon.
///
/// Schedules a cancelable shutdown once the desktop has been idle for too long.
#[derive(Parser, Debug)]
#[command(name = "idle-shutdownd")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (log shutdown commands instead of running them).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Idle threshold in seconds (overrides config).
    #[arg(short, long)]
    threshold: Option<u64>,

    /// Start with monitoring paused.
    #[arg(long)]
    paused: bool,

    /// Idle backend (overrides config).
    #[arg(long, value_enum)]
    idle_backend: Option<IdleBackend>,

    /// Disable the interactive console on stdin.
    #[arg(long)]
    no_console: bool,

    /// Print idle readings and exit.
    #[arg(long)]
    oneshot: bool,

    /// Number of readings to print in oneshot mode.
    #[arg(long, default_value = "5")]
    oneshot_count: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("idle-shutdownd v{} starting", env!("CARGO_PKG_VERSION"));

    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(threshold) = args.threshold {
        config.idle_threshold_seconds = threshold;
    }
    if args.paused {
        config.start_paused = true;
    }
    if let Some(backend) = args.idle_backend {
        config.idle_backend = backend;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        "Configuration loaded (threshold={}s, dry_run={})",
        config.idle_threshold_seconds, config.dry_run
    );

    let source: Arc<dyn IdleSource> = Arc::from(
        idle::connect(config.idle_backend)
            .await
            .context("Failed to initialize idle source")?,
    );

    if args.oneshot {
        return run_oneshot(source.as_ref(), args.oneshot_count, config.poll_interval()).await;
    }

    run_daemon(&config, source, !args.no_console).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("idle_shutdownd={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    Ok(())
}

/// Print a few idle readings and exit.
async fn run_oneshot(source: &dyn IdleSource, count: usize, interval: Duration) -> Result<()> {
    info!("Running in oneshot mode, reading {} samples", count);

    for n in 1..=count {
        let idle = source.idle_seconds().await;
        println!("[{}] backend={} idle={:.1}s", n, source.name(), idle);
        if n < count {
            tokio::time::sleep(interval).await;
        }
    }

    Ok(())
}

/// Build the event log, removing expired daily files first.
fn open_event_log(config: &Config) -> EventLog {
    let Some(dir) = config.log.resolved_directory() else {
        debug!("Event log files disabled");
        return EventLog::in_memory();
    };

    let removed =
        event_log::cleanup_old_logs(&dir, config.log.retention_days, Local::now().date_naive());
    if removed > 0 {
        info!("Removed {} expired log files from {}", removed, dir.display());
    }

    info!("Writing event log to {}", dir.display());
    EventLog::with_directory(dir)
}

/// Run the daemon until quit.
async fn run_daemon(config: &Config, source: Arc<dyn IdleSource>, console: bool) -> Result<()> {
    let log = open_event_log(config);
    let action = Arc::new(CommandShutdown::from_config(&config.shutdown, config.dry_run));
    let app = App::new(config, source, action, log).context("Failed to start daemon")?;

    let shutdown = app.shutdown_token();
    tokio::spawn(forward_signals(app.handle(), shutdown.clone()));

    if console {
        let console = Console::new(
            app.handle(),
            app.state(),
            app.event_log(),
            app.subscribe_warnings(),
        );
        tokio::spawn(console.run(shutdown.clone()));
    }

    app.run().await?;

    // The stdin reader may still be parked in a blocking read, which would
    // hold up runtime shutdown.
    std::process::exit(0)
}

/// Map process signals onto control commands.
///
/// SIGINT/SIGTERM quit. On Unix, SIGUSR1 toggles pause and SIGUSR2 cancels
/// a pending shutdown.
async fn forward_signals(handle: ControlHandle, shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::SignalKind;
        use tokio::signal::unix::signal;

        let streams = (
            signal(SignalKind::terminate()),
            signal(SignalKind::user_defined1()),
            signal(SignalKind::user_defined2()),
        );
        let (Ok(mut term), Ok(mut usr1), Ok(mut usr2)) = streams else {
            warn!("Failed to install signal handlers");
            return;
        };

        loop {
            let result = tokio::select! {
                () = shutdown.cancelled() => return,
                _ = tokio::signal::ctrl_c() => handle.quit(),
                _ = term.recv() => handle.quit(),
                _ = usr1.recv() => handle.toggle_pause(),
                _ = usr2.recv() => handle.request_cancel_warning(),
            };
            if result.is_err() {
                return;
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            () = shutdown.cancelled() => {}
            _ = tokio::signal::ctrl_c() => {
                let _ = handle.quit();
            }
        }
    }
}
