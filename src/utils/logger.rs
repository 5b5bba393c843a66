//! Logging initialization and configuration.
//!
//! Diagnostics go to a log file, never to the console, so they cannot mix
//! with the command output the shell echoes. Each run gets its own file in
//! the `logs/` directory next to the executable, or in `$RUSTY_SHELL_LOG_DIR`
//! when that is set.
//!
//! # Configuration
//!
//! The log level is taken from `RUST_LOG` (for example `RUST_LOG=debug` or
//! `RUST_LOG=rusty_shell::shell=trace`) and defaults to `info`.

use std::fs;
use std::path::PathBuf;

use chrono::Local;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Overrides the log directory.
pub const LOG_DIR_ENV: &str = "RUSTY_SHELL_LOG_DIR";

/// Directory log files are written to.
pub fn log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(LOG_DIR_ENV) {
        return PathBuf::from(dir);
    }
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.join("logs")))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

/// File name for a run started now, e.g. `rusty-shell.2026-10-18-14-30-25.log`.
fn log_file_name() -> String {
    format!("rusty-shell.{}.log", Local::now().format("%Y-%m-%d-%H-%M-%S"))
}

/// Install the global subscriber. Failing to create the log file only
/// prints a warning; the program keeps running without a log.
pub fn init_logging() {
    let log_dir = log_dir();
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("Warning: Failed to create logs directory {}: {}", log_dir.display(), e);
        return;
    }

    let log_path = log_dir.join(log_file_name());
    let log_file = match fs::File::create(&log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Warning: Failed to create log file: {}", e);
            return;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    // The writer must outlive every log call, including ones made from
    // `process::exit` paths, so the guard is never dropped.
    std::mem::forget(guard);

    tracing::info!("Logging initialized - writing to {}", log_path.display());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_name() {
        let name = log_file_name();
        assert!(name.starts_with("rusty-shell."));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_default_log_dir_is_named_logs() {
        if std::env::var_os(LOG_DIR_ENV).is_none() {
            assert!(log_dir().ends_with("logs"));
        }
    }
}
