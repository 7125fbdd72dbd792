use anyhow::{bail, Result};
use nix::sys::signal::Signal;
use signal_hook::{
 consts::signal::{SIGCHLD, SIGINT, SIGTERM},
 iterator::Signals,
};
use std::{
 fs::File,
 os::unix::process::ExitStatusExt,
 process::{Command, ExitCode, ExitStatus, Stdio},
};
use tracing::instrument;

/// Runs a child process, with some special signal handling:
/// - Forwards SIGTERM to the child process.
/// - Ignores SIGINT while the process is running. SIGINT is normally
/// generated by the terminal when Ctrl+C is pressed and sent to the
/// whole foreground process group, so the child already receives it
/// directly unless it moved itself to a different process group, which
/// build steps are not expected to do.
#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run(cmd: &mut Command) -> Result<ExitStatus> {
 // Register the signal handler before spawning the process so we never
 // drop a signal delivered between spawn and the first `forever` poll.
 let mut signals = Signals::new([SIGCHLD, SIGINT, SIGTERM])?;

 let mut child = cmd.spawn()?;

 for signal in signals.forever() {
 match signal {
 SIGCHLD => match &child.try_wait()? {
 Some(status) => return Ok(*status),
 None => continue,
 },
 SIGINT => {}
 SIGTERM => nix::sys::signal::kill(
 nix::unistd::Pid::from_raw(child.id().try_into()?),
 Signal::SIGTERM,
 )?,
 _ => unreachable!(),
 }
 }
 unreachable!()
}

#[instrument(skip_all, fields(command = %cmd.get_program().to_string_lossy()))]
pub fn run_and_check(cmd: &mut Command) -> Result<()> {
 let status = run(cmd)?;
 if !status.success() {
 bail!("command {cmd:?} failed with {status}");
 }
 Ok(())
}

/// Like [`run_and_check`], but redirects the child's stderr to `log_file`
/// instead of inheriting it, for steps run non-interactively.
pub fn run_suppress_stderr(cmd: &mut Command, log_file: &std::path::Path) -> Result<ExitStatus> {
 let log = File::create(log_file)?;
 cmd.stderr(Stdio::from(log));
 run(cmd)
}

/// Converts [`ExitStatus`] to [`ExitCode`] following the POSIX shell
/// convention.
pub fn status_to_exit_code(status: &ExitStatus) -> ExitCode {
 if let Some(code) = status.code() {
 ExitCode::from(code as u8)
 } else if let Some(signal) = status.signal() {
 ExitCode::from(128 + signal as u8)
 } else {
 panic!("ExitStatus does not represent process exit: {:?}", status);
 }
}

#[cfg(test)]
mod tests {
 use super::*;

 #[test]
 fn runs_process() -> Result<()> {
 run_and_check(&mut Command::new("true"))?;
 Ok(())
 }

 #[test]
 fn runs_failed_process() -> Result<()> {
 run(&mut Command::new("false"))?;
 assert!(run_and_check(&mut Command::new("false")).is_err());
 Ok(())
 }
}
