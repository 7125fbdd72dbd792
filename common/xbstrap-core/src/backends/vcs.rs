use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{bail, Result};

use super::{CheckRemotes, ResetMode};
use crate::subject::VcsDescriptor;

/// Answers "does the local checkout/ref exist" and "has upstream moved" for
/// a [`VcsDescriptor`], and performs the real `fetch`/`checkout`/`patch`/
/// `mirror` side effects the design assigns to the VCS layer. `effective_url`
/// is the URL after `xbstrap_mirror` redirection has already been applied
/// by the caller; the backend itself knows
/// nothing about mirror redirection.
pub trait VcsBackend: Send + Sync {
 fn local_ref_exists(&self, checkout_dir: &Path, vcs: &VcsDescriptor) -> Result<bool>;
 fn remote_has_update(
 &self,
 checkout_dir: &Path,
 vcs: &VcsDescriptor,
 check: CheckRemotes,
 ) -> Result<bool>;

 /// Populates a bare/mirror clone at `clone_dir`.
 fn fetch(&self, clone_dir: &Path, vcs: &VcsDescriptor, effective_url: &str) -> Result<()>;

 /// Materializes a working tree at `checkout_dir` from the fetched
 /// `clone_dir`, honoring `commit|tag|branch` and the reset policy (spec
 /// §4.6 "checkout_src").
 fn checkout(
 &self,
 checkout_dir: &Path,
 clone_dir: &Path,
 vcs: &VcsDescriptor,
 reset: ResetMode,
 ) -> Result<()>;

 /// Applies sorted `*.patch` files via `git am -3`.
 fn apply_patches(
 &self,
 checkout_dir: &Path,
 patches: &[PathBuf],
 author: &str,
 email: &str,
 ) -> Result<()>;

 /// Re-fetches as a bare mirror under `mirror_dir`; the caller holds the directory lock.
 fn mirror(&self, mirror_dir: &Path, vcs: &VcsDescriptor, effective_url: &str) -> Result<()>;
}

/// Shells out to the system `git`, mirroring how other action handlers in
/// this crate invoke external tools via [`processes::run_and_check`].
pub struct GitBackend;

impl VcsBackend for GitBackend {
 fn local_ref_exists(&self, checkout_dir: &Path, vcs: &VcsDescriptor) -> Result<bool> {
 if !matches!(vcs, VcsDescriptor::Git { .. }) {
 return Ok(checkout_dir.exists());
 }
 if !checkout_dir.join(".git").exists() {
 return Ok(false);
 }
 let status = Command::new("git")
 .arg("-C")
 .arg(checkout_dir)
 .args(["rev-parse", "--verify", "-q", "HEAD"])
 .status()?;
 Ok(status.success())
 }

 fn remote_has_update(
 &self,
 checkout_dir: &Path,
 vcs: &VcsDescriptor,
 check: CheckRemotes,
 ) -> Result<bool> {
 let VcsDescriptor::Git { url, branch, tag, commit, .. } = vcs else {
 return Ok(false);
 };
 if check == CheckRemotes::Never || commit.is_some() {
 return Ok(false);
 }
 let refspec = tag
 .as_deref()
 .map(|t| format!("refs/tags/{t}"))
 .or_else(|| branch.as_deref().map(|b| format!("refs/heads/{b}")))
 .unwrap_or_else(|| "HEAD".to_owned());
 if tag.is_some() && check != CheckRemotes::BranchesAndTags {
 return Ok(false);
 }
 let output = Command::new("git")
 .arg("ls-remote")
 .arg(url)
 .arg(&refspec)
 .output()?;
 if !output.status.success() {
 return Ok(false);
 }
 let remote_sha = String::from_utf8_lossy(&output.stdout)
 .split_whitespace()
 .next()
 .map(str::to_owned);
 let Some(remote_sha) = remote_sha else {
 return Ok(false);
 };
 let local = Command::new("git")
 .arg("-C")
 .arg(checkout_dir)
 .args(["rev-parse", "HEAD"])
 .output()?;
 let local_sha = String::from_utf8_lossy(&local.stdout).trim().to_owned();
 Ok(local_sha != remote_sha)
 }

 fn fetch(&self, clone_dir: &Path, vcs: &VcsDescriptor, effective_url: &str) -> Result<()> {
 match vcs {
 VcsDescriptor::Git { .. } => {
 if clone_dir.join(".git").exists() {
 processes::run_and_check(
 Command::new("git").arg("-C").arg(clone_dir).args(["fetch", "--all", "--tags"]),
 )?;
 } else {
 std::fs::create_dir_all(clone_dir)?;
 processes::run_and_check(
 Command::new("git").args(["clone", "--no-checkout", effective_url]).arg(clone_dir),
 )?;
 }
 Ok(())
 }
 VcsDescriptor::Hg { .. } => {
 if !clone_dir.join(".hg").exists() {
 std::fs::create_dir_all(clone_dir.parent().unwrap_or(clone_dir))?;
 processes::run_and_check(Command::new("hg").args(["clone", effective_url]).arg(clone_dir))?;
 } else {
 processes::run_and_check(Command::new("hg").arg("-R").arg(clone_dir).arg("pull"))?;
 }
 Ok(())
 }
 VcsDescriptor::Svn { .. } => {
 bail!("svn sources are not fetched eagerly; checkout performs the initial `svn checkout`")
 }
 VcsDescriptor::Url { .. } => {
 bail!("archive sources are fetched via the archive backend, not VcsBackend")
 }
 }
 }

 fn checkout(
 &self,
 checkout_dir: &Path,
 clone_dir: &Path,
 vcs: &VcsDescriptor,
 reset: ResetMode,
 ) -> Result<()> {
 match vcs {
 VcsDescriptor::Git { branch, tag, commit, submodules, .. } => {
 let refspec = commit
 .as_deref()
 .or(tag.as_deref())
 .or(branch.as_deref())
 .unwrap_or("HEAD");
 if !checkout_dir.join(".git").exists() {
 std::fs::create_dir_all(checkout_dir.parent().unwrap_or(checkout_dir))?;
 processes::run_and_check(
 Command::new("git").args(["clone", "--shared"]).arg(clone_dir).arg(checkout_dir),
 )?;
 }
 processes::run_and_check(
 Command::new("git").arg("-C").arg(checkout_dir).args(["fetch", "origin"]),
 )?;
 match reset {
 ResetMode::Hard => {
 processes::run_and_check(
 Command::new("git").arg("-C").arg(checkout_dir).args(["reset", "--hard", refspec]),
 )?;
 }
 ResetMode::Revert | ResetMode::None => {
 processes::run_and_check(
 Command::new("git").arg("-C").arg(checkout_dir).args(["checkout", refspec]),
 )?;
 }
 }
 if *submodules {
 processes::run_and_check(
 Command::new("git")
 .arg("-C")
 .arg(checkout_dir)
 .args(["submodule", "update", "--init", "--recursive"]),
 )?;
 }
 Ok(())
 }
 VcsDescriptor::Hg { .. } => {
 processes::run_and_check(Command::new("hg").arg("-R").arg(checkout_dir).arg("update"))
 }
 VcsDescriptor::Svn { url, rev } => {
 std::fs::create_dir_all(checkout_dir.parent().unwrap_or(checkout_dir))?;
 let mut cmd = Command::new("svn");
 cmd.arg("checkout");
 if let Some(rev) = rev {
 cmd.arg("-r").arg(rev);
 }
 cmd.arg(url).arg(checkout_dir);
 processes::run_and_check(&mut cmd)
 }
 VcsDescriptor::Url { .. } => {
 bail!("archive sources are extracted by the archive backend, not VcsBackend")
 }
 }
 }

 fn apply_patches(
 &self,
 checkout_dir: &Path,
 patches: &[PathBuf],
 author: &str,
 email: &str,
 ) -> Result<()> {
 for patch in patches {
 processes::run_and_check(
 Command::new("git")
 .arg("-C")
 .arg(checkout_dir)
 .env("GIT_AUTHOR_NAME", author)
 .env("GIT_AUTHOR_EMAIL", email)
 .env("GIT_COMMITTER_NAME", author)
 .env("GIT_COMMITTER_EMAIL", email)
 .args(["am", "-3"])
 .arg(patch),
 )?;
 }
 Ok(())
 }

 fn mirror(&self, mirror_dir: &Path, vcs: &VcsDescriptor, effective_url: &str) -> Result<()> {
 let VcsDescriptor::Git { .. } = vcs else {
 bail!("mirroring is only implemented for git sources");
 };
 if mirror_dir.join("HEAD").exists() {
 processes::run_and_check(
 Command::new("git").arg("--git-dir").arg(mirror_dir).args(["remote", "update"]),
 )
 } else {
 std::fs::create_dir_all(mirror_dir.parent().unwrap_or(mirror_dir))?;
 processes::run_and_check(
 Command::new("git").args(["clone", "--mirror", effective_url]).arg(mirror_dir),
 )
 }
 }
}
