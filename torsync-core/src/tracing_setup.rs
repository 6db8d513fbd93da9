//! Tracing setup for sync runs
//!
//! The console shows what the operator asked for; a per-run file under the
//! logs directory keeps every event so a failed sync cycle can be replayed
//! peer by peer afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// File that receives the trace-level log of the most recent run.
pub const RUN_LOG_FILE: &str = "torsync-last-run.log";

/// Initialize tracing with a console layer and a trace-level run log.
///
/// `RUST_LOG`, when set, overrides `console_level` for the console layer
/// only. The run log is truncated at every start.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory or run log cannot be created
pub fn init_tracing(console_level: Level, logs_dir: &Path) -> Result<PathBuf, std::io::Error> {
    create_dir_all(logs_dir)?;
    let run_log_path = logs_dir.join(RUN_LOG_FILE);
    let run_log = File::create(&run_log_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level.to_string()));

    let console_layer = fmt::layer()
        .with_target(false)
        .without_time()
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(run_log)
        .with_filter(EnvFilter::new("trace"));

    // A second initialization (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    tracing::debug!(
        "Tracing initialized: console={}, run_log={}",
        console_level,
        run_log_path.display()
    );

    Ok(run_log_path)
}

/// CLI log levels for user control
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    /// Only error messages
    Error,
    /// Warnings such as unreachable peers
    Warn,
    /// Placement decisions and cycle summaries
    Info,
    /// Cache hits and protocol exchanges
    Debug,
    /// Everything, including wire-level detail
    Trace,
}

impl CliLogLevel {
    /// Converts the CLI log level to a tracing level.
    ///
    /// # Examples
    /// ```
    /// use torsync_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Warn.as_tracing_level(), tracing::Level::WARN);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levels_map_one_to_one() {
        let levels = [
            (CliLogLevel::Error, Level::ERROR),
            (CliLogLevel::Warn, Level::WARN),
            (CliLogLevel::Info, Level::INFO),
            (CliLogLevel::Debug, Level::DEBUG),
            (CliLogLevel::Trace, Level::TRACE),
        ];
        for (cli_level, expected) in levels {
            assert_eq!(cli_level.as_tracing_level(), expected);
        }
    }
}
