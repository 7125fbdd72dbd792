use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result};
use xbstrap_version::{split_pkgver, Version};

/// Package metadata carried into `xbps-create`.
#[derive(Clone, Debug, Default)]
pub struct PackMetadata {
 pub summary: Option<String>,
 pub license: Option<String>,
 pub website: Option<String>,
 pub maintainer: Option<String>,
 pub categories: Vec<String>,
 pub replaces: Vec<String>,
 pub architecture: String,
}

/// Queries package install/pack state and repodata versions, and performs
/// the real pack/install/repodata-download side effects the design assigns
/// to the xbps layer (`pack_pkg`, `install_pkg`, `pull_pkg_pack`).
pub trait PackageBackend: Send + Sync {
 fn is_installed(&self, pkg_name: &str, sysroot: &std::path::Path) -> Result<bool>;
 fn is_packed(&self, pkg_name: &str, repo_dir: &std::path::Path) -> Result<bool>;
 fn local_pack_version(&self, pkg_name: &str, repo_dir: &std::path::Path) -> Result<Option<Version>>;
 fn remote_repodata_version(&self, pkg_name: &str, repo_url: &str) -> Result<Option<Version>>;

 /// Runs `xbps-create` over `staging_dir` and (re)indexes `repo_dir`
 ///. `pkgver` is `<name>-<version>_<revision>`.
 fn pack(
 &self,
 pkg_name: &str,
 pkgver: &str,
 staging_dir: &Path,
 repo_dir: &Path,
 metadata: &PackMetadata,
 ) -> Result<()>;

 /// Installs `pkg_name` from `repo_dir` into `sysroot`.
 fn install_into_sysroot(&self, pkg_name: &str, repo_dir: &Path, sysroot: &Path) -> Result<()>;

 /// Downloads the remote repodata for `pkg_name` and indexes the fetched
 /// `.xbps` into the local `dest_repo_dir`.
 fn download_repodata(&self, pkg_name: &str, repo_url: &str, dest_repo_dir: &Path) -> Result<()>;
}

/// Shells out to `xbps-query`, the backend the design names for the pkg
/// management surface.
pub struct XbpsBackend;

fn parse_pkgver(line: &str) -> Option<Version> {
 let line = line.trim();
 let (name_ver, _) = line.split_once('\t').unwrap_or((line, ""));
 split_pkgver(name_ver).ok().map(|(_, v)| v)
}

impl PackageBackend for XbpsBackend {
 fn is_installed(&self, pkg_name: &str, sysroot: &std::path::Path) -> Result<bool> {
 let status = Command::new("xbps-query")
 .arg("-r")
 .arg(sysroot)
 .arg(pkg_name)
 .status()?;
 Ok(status.success())
 }

 fn is_packed(&self, pkg_name: &str, repo_dir: &std::path::Path) -> Result<bool> {
 let output = Command::new("xbps-query")
 .arg("--repository")
 .arg(repo_dir)
 .arg("-R")
 .arg(pkg_name)
 .output()?;
 Ok(output.status.success())
 }

 fn local_pack_version(&self, pkg_name: &str, repo_dir: &std::path::Path) -> Result<Option<Version>> {
 let output = Command::new("xbps-query")
 .arg("--repository")
 .arg(repo_dir)
 .args(["-R", "-p", "pkgver"])
 .arg(pkg_name)
 .output()?;
 if !output.status.success() {
 return Ok(None);
 }
 let text = String::from_utf8_lossy(&output.stdout);
 Ok(parse_pkgver(&text))
 }

 fn remote_repodata_version(&self, pkg_name: &str, repo_url: &str) -> Result<Option<Version>> {
 let output = Command::new("xbps-query")
 .arg("--repository")
 .arg(repo_url)
 .args(["-R", "-p", "pkgver"])
 .arg(pkg_name)
 .output()?;
 if !output.status.success() {
 return Ok(None);
 }
 let text = String::from_utf8_lossy(&output.stdout);
 Ok(parse_pkgver(&text))
 }

 fn pack(
 &self,
 pkg_name: &str,
 pkgver: &str,
 staging_dir: &Path,
 repo_dir: &Path,
 metadata: &PackMetadata,
 ) -> Result<()> {
 std::fs::create_dir_all(repo_dir).with_context(|| format!("failed to create {}", repo_dir.display()))?;
 let mut cmd = Command::new("xbps-create");
 cmd.arg("-A").arg(&metadata.architecture);
 cmd.arg("-n").arg(pkgver);
 if let Some(summary) = &metadata.summary {
 cmd.arg("-s").arg(summary);
 }
 if let Some(license) = &metadata.license {
 cmd.arg("--license").arg(license);
 }
 if let Some(website) = &metadata.website {
 cmd.arg("--homepage").arg(website);
 }
 if let Some(maintainer) = &metadata.maintainer {
 cmd.arg("--maintainer").arg(maintainer);
 }
 for replaces in &metadata.replaces {
 cmd.arg("--replaces").arg(replaces);
 }
 cmd.arg("-o").arg(repo_dir.join(format!("{pkgver}.{}.xbps", metadata.architecture)));
 cmd.arg(staging_dir);
 processes::run_and_check(&mut cmd)?;
 processes::run_and_check(
 Command::new("xbps-rindex").arg("-a").arg(repo_dir.join(format!("{pkgver}.*.xbps"))),
 )?;
 let _ = pkg_name;
 Ok(())
 }

 fn install_into_sysroot(&self, pkg_name: &str, repo_dir: &Path, sysroot: &Path) -> Result<()> {
 std::fs::create_dir_all(sysroot)?;
 processes::run_and_check(
 Command::new("xbps-install")
 .arg("-r")
 .arg(sysroot)
 .arg("--repository")
 .arg(repo_dir)
 .arg("-y")
 .arg(pkg_name),
 )
 }

 fn download_repodata(&self, pkg_name: &str, repo_url: &str, dest_repo_dir: &Path) -> Result<()> {
 std::fs::create_dir_all(dest_repo_dir)?;
 processes::run_and_check(
 Command::new("xbps-install")
 .arg("-r")
 .arg(dest_repo_dir)
 .arg("--repository")
 .arg(repo_url)
 .args(["-d", "-n"])
 .arg(pkg_name),
 )
 }
}

/// In-memory fake used by tests and by `dummy` container-mode dry runs
/// where no real package database exists yet.
#[derive(Default)]
pub struct DummyPackageBackend {
 installed: Mutex<HashMap<String, bool>>,
 packed_versions: Mutex<HashMap<String, Version>>,
}

impl DummyPackageBackend {
 pub fn new() -> Self {
 Self::default()
 }

 pub fn mark_installed(&self, pkg_name: &str) {
 self.installed
 .lock()
 .unwrap()
 .insert(pkg_name.to_owned(), true);
 }

 pub fn mark_packed(&self, pkg_name: &str, version: Version) {
 self.packed_versions
 .lock()
 .unwrap()
 .insert(pkg_name.to_owned(), version);
 }
}

impl PackageBackend for DummyPackageBackend {
 fn is_installed(&self, pkg_name: &str, _sysroot: &std::path::Path) -> Result<bool> {
 Ok(*self.installed.lock().unwrap().get(pkg_name).unwrap_or(&false))
 }

 fn is_packed(&self, pkg_name: &str, _repo_dir: &std::path::Path) -> Result<bool> {
 Ok(self.packed_versions.lock().unwrap().contains_key(pkg_name))
 }

 fn local_pack_version(&self, pkg_name: &str, _repo_dir: &std::path::Path) -> Result<Option<Version>> {
 Ok(self.packed_versions.lock().unwrap().get(pkg_name).cloned())
 }

 fn remote_repodata_version(&self, _pkg_name: &str, _repo_url: &str) -> Result<Option<Version>> {
 Ok(None)
 }

 fn pack(
 &self,
 pkg_name: &str,
 pkgver: &str,
 staging_dir: &Path,
 repo_dir: &Path,
 _metadata: &PackMetadata,
 ) -> Result<()> {
 let dest = repo_dir.join(pkg_name);
 if staging_dir.exists() {
 copy_dir_all(staging_dir, &dest)?;
 } else {
 std::fs::create_dir_all(&dest)?;
 }
 let (_, version) = split_pkgver(pkgver).with_context(|| format!("invalid pkgver {pkgver:?}"))?;
 self.mark_packed(pkg_name, version);
 Ok(())
 }

 fn install_into_sysroot(&self, pkg_name: &str, repo_dir: &Path, sysroot: &Path) -> Result<()> {
 let src = repo_dir.join(pkg_name);
 if src.exists() {
 copy_dir_all(&src, sysroot)?;
 }
 self.mark_installed(pkg_name);
 Ok(())
 }

 fn download_repodata(&self, _pkg_name: &str, _repo_url: &str, _dest_repo_dir: &Path) -> Result<()> {
 Ok(())
 }
}

fn copy_dir_all(src: &Path, dest: &Path) -> Result<()> {
 std::fs::create_dir_all(dest)?;
 for entry in std::fs::read_dir(src)? {
 let entry = entry?;
 let ty = entry.file_type()?;
 let dest_path = dest.join(entry.file_name());
 if ty.is_dir() {
 copy_dir_all(&entry.path(), &dest_path)?;
 } else {
 std::fs::copy(entry.path(), &dest_path)?;
 }
 }
 Ok(())
}
