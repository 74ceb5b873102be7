// # ddnsd - DDNS Daemon
//
// Thin process wrapper around `ddns_core::Updater`:
// 1. Parse the command line and load the configuration file
// 2. Initialize logging (stdout, plus the configured log file)
// 3. Build the updater and start its scheduler
// 4. Run one pass immediately, then wait for SIGINT/SIGTERM and stop
//
// ## Usage
//
// ```bash
// ddnsd --config /etc/ddns/config.toml
// ddnsd --config config.toml --once --log-level debug
// ```
//
// `DDNS_CONFIG` and `DDNS_LOG_LEVEL` may be used instead of the flags.

use anyhow::{Context, Result};
use clap::Parser;
use ddns_core::{DdnsConfig, PassReport, Updater};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{Level, error, info, warn};
use tracing_appender::non_blocking;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected, or a failed `--once` pass)
#[derive(Debug, Clone, Copy)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Template-driven dynamic DNS updater
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "DDNS_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Run a single update pass and exit
    #[arg(long)]
    once: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "DDNS_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level: Level = match args.log_level.parse() {
        Ok(level) => level,
        Err(_) => {
            eprintln!(
                "Log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
                args.log_level
            );
            return DdnsExitCode::ConfigError.into();
        }
    };

    let config = match DdnsConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Held until exit so buffered file lines are flushed
    let _log_guard = match init_logging(log_level, config.log_file()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    info!(config = %args.config.display(), "Starting ddnsd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        // Clients are built inside the runtime
        let updater = match Updater::new(&config) {
            Ok(updater) => updater,
            Err(e) => {
                error!("Configuration error: {}", e);
                return DdnsExitCode::ConfigError;
            }
        };

        let outcome = if args.once {
            run_once(&updater).await
        } else {
            run_daemon(&updater).await
        };

        match outcome {
            Ok(code) => code,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                updater.stop().await;
                DdnsExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Install the global subscriber
///
/// Always logs to stdout; with a log file, the same lines are appended to it
/// through a non-blocking writer whose guard is returned.
fn init_logging(level: Level, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = non_blocking(open_log_file(Path::new(path))?);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(LevelFilter::from_level(level))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("failed to set tracing subscriber")?;

    Ok(guard)
}

fn open_log_file(path: &Path) -> Result<RollingFileAppender> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("log_file {} has no file name", path.display()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// One pass, then exit; any failed family or push is a runtime error
async fn run_once(updater: &Updater) -> Result<DdnsExitCode> {
    let report = updater.update().await;
    updater.stop().await;
    log_report(&report);

    if report.ipv4.is_none() && report.ipv6.is_none() {
        error!("No public address resolved");
        return Ok(DdnsExitCode::RuntimeError);
    }
    if report.failures().next().is_some() {
        return Ok(DdnsExitCode::RuntimeError);
    }
    Ok(DdnsExitCode::CleanShutdown)
}

/// Schedule, push once immediately, and stop on a shutdown signal
async fn run_daemon(updater: &Updater) -> Result<DdnsExitCode> {
    let mut shutdown = ShutdownSignal::new()?;

    updater.run();

    let signal = tokio::select! {
        signal = shutdown.recv() => signal?,
        report = updater.update() => {
            log_report(&report);
            shutdown.recv().await?
        }
    };

    info!("Received shutdown signal: {}", signal);
    info!("Shutting down daemon");
    updater.stop().await;

    Ok(DdnsExitCode::CleanShutdown)
}

fn log_report(report: &PassReport) {
    let failures = report.failures().count();
    if failures > 0 {
        warn!(
            accepted = report.accepted_count(),
            failed = failures,
            "Initial pass finished with failures"
        );
    } else {
        info!(accepted = report.accepted_count(), "Initial pass finished");
    }
}

/// Shutdown signals (SIGTERM, SIGINT), registered up front
#[cfg(unix)]
struct ShutdownSignal {
    sigterm: Signal,
    sigint: Signal,
}

#[cfg(unix)]
impl ShutdownSignal {
    fn new() -> Result<Self> {
        let sigterm = signal(SignalKind::terminate())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
        let sigint = signal(SignalKind::interrupt())
            .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
        Ok(Self { sigterm, sigint })
    }

    /// Name of the signal received
    async fn recv(&mut self) -> Result<&'static str> {
        tokio::select! {
            _ = self.sigterm.recv() => Ok("SIGTERM"),
            _ = self.sigint.recv() => Ok("SIGINT"),
        }
    }
}

/// Fallback for non-Unix platforms (Ctrl-C only)
#[cfg(not(unix))]
struct ShutdownSignal;

#[cfg(not(unix))]
impl ShutdownSignal {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Result<&'static str> {
        tokio::signal::ctrl_c()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
        Ok("SIGINT")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::try_parse_from(["ddnsd"]).unwrap();
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.once);
    }

    #[test]
    fn test_args_flags() {
        let args =
            Args::try_parse_from(["ddnsd", "-c", "/etc/ddns.toml", "--once", "--log-level", "debug"])
                .unwrap();
        assert_eq!(args.config, PathBuf::from("/etc/ddns.toml"));
        assert!(args.once);
        assert_eq!(args.log_level.parse::<Level>().unwrap(), Level::DEBUG);
    }

    #[test]
    fn test_open_log_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ddns.log");

        open_log_file(&path).unwrap();

        assert!(dir.path().join("logs").is_dir());
    }
}
