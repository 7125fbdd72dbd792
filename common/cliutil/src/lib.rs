//! Common startup/shutdown plumbing shared by the `xbstrap` binary.

use itertools::Itertools;
use std::{
 ffi::OsStr,
 fmt::Debug,
 process::{ExitCode, Termination},
};

use anyhow::Result;

mod logging;

pub use crate::logging::*;

/// Wraps a CLI main function with the common startup/cleanup logic: installs
/// the tracing subscriber, logs the invoked command line at trace level, and
/// formats any top-level error consistently before choosing the exit code.
pub fn cli_main<F, T, E>(main: F, verbosity: u8) -> ExitCode
where
 F: FnOnce() -> Result<T, E>,
 T: Termination,
 E: Debug,
{
 let _log_guard = match LoggingConfig::from_env(verbosity).and_then(|c| c.setup()) {
 Ok(guard) => Some(guard),
 Err(e) => {
 eprintln!("WARNING: failed to set up logging: {e:?}");
 None
 }
 };
 log_current_command_line();

 handle_top_level_result(main)
}

/// Logs the command line of the current process at trace level.
pub fn log_current_command_line() {
 let escaped_command = std::env::args()
 .map(|s| shell_escape::escape(s.into()))
 .join(" ");
 tracing::trace!("COMMAND: {}", escaped_command);
}

/// Handles the top-level [`Result`], printing a `FATAL:` line on error.
pub fn handle_top_level_result<T: Termination, E: Debug>(result: Result<T, E>) -> ExitCode {
 match result {
 Err(error) => {
 eprintln!("FATAL: {}: {:?}", get_current_process_name(), error);
 ExitCode::FAILURE
 }
 Ok(value) => value.report(),
 }
}

/// Returns the current process name, or `__unknown__` if it failed to get one.
fn get_current_process_name() -> String {
 let current_exe = std::env::current_exe().unwrap_or_default();
 current_exe
 .file_name()
 .unwrap_or(OsStr::new("__unknown__"))
 .to_string_lossy()
 .into_owned()
}
