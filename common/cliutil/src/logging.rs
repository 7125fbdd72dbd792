use anyhow::{Context, Result};
use itertools::Itertools;
use std::path::PathBuf;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::Layer;

/// If set, logs at `log_file`'s filter are additionally written there.
pub const LOG_FILE_ENV: &str = "XBSTRAP_LOG_FILE";

/// If "0", suppress the console logger entirely.
pub const CONSOLE_LOG_ENV: &str = "XBSTRAP_LOG_CONSOLE";

/// RAII guard; dropping it flushes and detaches the subscriber.
pub struct LogGuard {
 _span_guard: tracing::span::EnteredSpan,
}

/// Logging configuration, built from the environment and an optional
/// verbosity bump from a `-v`/`--verbose` CLI flag.
pub struct LoggingConfig {
 pub log_file: Option<(PathBuf, EnvFilter)>,
 pub console_logger: Option<EnvFilter>,
}

impl LoggingConfig {
 /// Reads [`LOG_FILE_ENV`]/[`CONSOLE_LOG_ENV`]/`RUST_LOG`, raising
 /// `verbosity` extra levels above the default (`info`) on the console
 /// filter for each repetition of `-v`.
 pub fn from_env(verbosity: u8) -> Result<Self> {
 let default_level = match verbosity {
 0 => LevelFilter::INFO,
 1 => LevelFilter::DEBUG,
 _ => LevelFilter::TRACE,
 };

 let console_logger = match std::env::var(CONSOLE_LOG_ENV).ok().as_deref() {
 Some("0") => None,
 _ => Some(
 EnvFilter::builder()
 .with_default_directive(default_level.into())
 .from_env()?,
 ),
 };

 let log_file = match std::env::var_os(LOG_FILE_ENV) {
 Some(path) => Some((
 PathBuf::from(path),
 EnvFilter::builder()
 .with_default_directive(LevelFilter::INFO.into())
 .from_env()?,
 )),
 None => None,
 };

 Ok(Self {
 log_file,
 console_logger,
 })
 }

 /// Installs the tracing subscriber and opens a top-level `main` span.
 pub fn setup(self) -> Result<LogGuard> {
 let mut layers = Vec::new();

 if let Some(filter) = self.console_logger {
 layers.push(
 tracing_subscriber::fmt::layer()
 .with_ansi(true)
 .with_writer(std::io::stderr)
 .with_filter(filter)
 .boxed(),
 );
 }

 if let Some((log_file, filter)) = self.log_file {
 let f = std::fs::File::create(&log_file)
 .with_context(|| format!("failed to open log file {}", log_file.display()))?;
 layers.push(
 tracing_subscriber::fmt::layer()
 .with_ansi(false)
 .with_writer(f)
 .with_filter(filter)
 .boxed(),
 );
 }

 tracing_subscriber::registry().with(layers).try_init().context(
 "failed to start tracing; a subscriber is likely already running in this process",
 )?;

 let args = std::env::args()
 .map(|s| shell_escape::escape(s.into()))
 .join(" ");
 let span_guard = tracing::trace_span!("main", args = args).entered();

 Ok(LogGuard {
 _span_guard: span_guard,
 })
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use fileutil::SafeTempDir;

 #[test]
 fn setup_logging_respects_filters() -> Result<()> {
 const INFO_MESSAGE: &str = "log at level info";
 const DEBUG_MESSAGE: &str = "log at level debug";

 let dir = SafeTempDir::new()?;
 std::env::set_var("RUST_LOG", "INFO");
 let log_file = dir.path().join("out.log");
 std::env::set_var(LOG_FILE_ENV, &log_file);
 std::env::set_var(CONSOLE_LOG_ENV, "0");

 {
 let _guard = LoggingConfig::from_env(0)?.setup()?;
 tracing::info!("{}", INFO_MESSAGE);
 tracing::debug!("{}", DEBUG_MESSAGE);
 }

 let log_content = std::fs::read_to_string(log_file)?;
 assert!(log_content.contains(INFO_MESSAGE));
 assert!(!log_content.contains(DEBUG_MESSAGE));

 std::env::remove_var(LOG_FILE_ENV);
 std::env::remove_var(CONSOLE_LOG_ENV);
 Ok(())
 }
}
