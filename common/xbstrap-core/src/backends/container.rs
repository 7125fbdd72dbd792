use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;

use crate::exec::Manifest;

/// Where a manifest actually gets executed. `dummy` runs the step directly
/// on the host (the common case in CI/tests); the others shell out to the
/// named runtime, bind-mounting source/build roots point 3.
pub trait ContainerRuntime: Send + Sync {
 fn run(&self, manifest: &Manifest) -> Result<std::process::ExitStatus>;
}

fn build_command(manifest: &Manifest) -> Command {
 let mut cmd = match &manifest.args {
 crate::subject::Args::List(argv) => {
 let mut it = argv.iter();
 let mut cmd = Command::new(it.next().map(String::as_str).unwrap_or("true"));
 cmd.args(it);
 cmd
 }
 crate::subject::Args::Shell(script) => {
 let mut cmd = Command::new("/bin/sh");
 cmd.arg("-c").arg(script);
 cmd
 }
 };
 cmd.current_dir(&manifest.workdir);
 cmd.env_clear();
 cmd.envs(&manifest.environ);
 cmd
}

/// Runs the manifest as a direct child process. No isolation: used when
/// `containerless: true` is set, or as the runtime under test.
pub struct DummyRuntime;

impl ContainerRuntime for DummyRuntime {
 fn run(&self, manifest: &Manifest) -> Result<std::process::ExitStatus> {
 processes::run_and_check(&mut build_command(manifest))?;
 Ok(std::process::ExitStatus::from_raw(0))
 }
}

struct BindMount {
 host: PathBuf,
 dest: PathBuf,
}

fn collect_mounts(manifest: &Manifest) -> Vec<BindMount> {
 let mut mounts = vec![
 BindMount {
 host: manifest.source_root.clone(),
 dest: manifest.container_src_mount.clone(),
 },
 BindMount {
 host: manifest.build_root.clone(),
 dest: manifest.container_build_mount.clone(),
 },
 ];
 if let Some(sysroot) = &manifest.sysroot_mount {
 mounts.push(BindMount {
 host: sysroot.clone(),
 dest: manifest.container_sysroot_mount.clone(),
 });
 }
 mounts
}

/// `docker run` with bind mounts for source root, build root, and (when
/// sysroot isolation is active) the temporary sysroot.
pub struct DockerRuntime {
 pub image: String,
}

impl ContainerRuntime for DockerRuntime {
 fn run(&self, manifest: &Manifest) -> Result<std::process::ExitStatus> {
 let mut cmd = Command::new("docker");
 cmd.args(["run", "--rm"]);
 if manifest.isolate_network {
 cmd.args(["--network", "none"]);
 }
 for mount in collect_mounts(manifest) {
 cmd.arg("-v").arg(format!(
 "{}:{}",
 mount.host.display(),
 mount.dest.display()
 ));
 }
 for (key, value) in &manifest.environ {
 cmd.arg("-e").arg(format!("{key}={value}"));
 }
 cmd.arg("-w").arg(&manifest.workdir);
 cmd.arg(&self.image);
 match &manifest.args {
 crate::subject::Args::List(argv) => {
 cmd.args(argv);
 }
 crate::subject::Args::Shell(script) => {
 cmd.args(["/bin/sh", "-c", script]);
 }
 }
 processes::run_and_check(&mut cmd)?;
 Ok(std::process::ExitStatus::from_raw(0))
 }
}

/// `runc run`, given a prepared OCI bundle directory at `bundle_dir`.
pub struct RuncRuntime {
 pub bundle_dir: PathBuf,
}

impl ContainerRuntime for RuncRuntime {
 fn run(&self, manifest: &Manifest) -> Result<std::process::ExitStatus> {
 let mut cmd = Command::new("runc");
 cmd.arg("run").arg("-b").arg(&self.bundle_dir);
 cmd.arg(format!("xbstrap-{}", manifest.subject_key));
 processes::run_and_check(&mut cmd)?;
 Ok(std::process::ExitStatus::from_raw(0))
 }
}

/// managarm's `cbuildrt`, the runtime the design names for sysroot-isolated
/// builds.
pub struct CbuildrtRuntime;

impl ContainerRuntime for CbuildrtRuntime {
 fn run(&self, manifest: &Manifest) -> Result<std::process::ExitStatus> {
 let mut cmd = Command::new("cbuildrt");
 for mount in collect_mounts(manifest) {
 cmd.arg("--bind")
 .arg(format!("{}:{}", mount.host.display(), mount.dest.display()));
 }
 if manifest.isolate_network {
 cmd.arg("--isolate-network");
 }
 cmd.arg("--workdir").arg(&manifest.workdir);
 cmd.arg("--");
 match &manifest.args {
 crate::subject::Args::List(argv) => {
 cmd.args(argv);
 }
 crate::subject::Args::Shell(script) => {
 cmd.args(["/bin/sh", "-c", script]);
 }
 }
 processes::run_and_check(&mut cmd)?;
 Ok(std::process::ExitStatus::from_raw(0))
 }
}
