//! `fetch_src` / `checkout_src` / `patch_src` / `regenerate_src` /
//! `mirror_src`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use crate::backends::{archive, ResetMode};
use crate::config::Config;
use crate::error::ConfigError;
use crate::exec::StepContext;
use crate::subject::{SubjectId, VcsDescriptor};

use super::{container_src_root, mark_done, run_steps, ActionContext};

fn get_source<'c>(config: &'c Config, subject: &SubjectId) -> Result<&'c crate::subject::Source> {
 config
 .get_source(&subject.name)
 .with_context(|| format!("unknown source {:?}", subject.name))
}

/// Git URLs are redirected to `<mirror>/git/<name>` when `xbstrap_mirror` is
/// set; other VCS kinds and archives
/// are fetched from their declared URL directly.
fn effective_git_url<'a>(config: &'a Config, name: &str, url: &'a str) -> String {
 match &config.commits.xbstrap_mirror {
 Some(mirror) => format!("{}/git/{}", mirror.trim_end_matches('/'), name),
 None => url.to_owned(),
 }
}

pub fn fetch_src(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let src = get_source(config, subject)?;
 match &src.vcs {
 VcsDescriptor::Git { url, .. } => {
 let clone_dir = config.layout.source_clone_dir(&src.name);
 let effective_url = effective_git_url(config, &src.name, url);
 ctx.vcs.fetch(&clone_dir, &src.vcs, &effective_url)?;
 }
 VcsDescriptor::Hg { url, .. } => {
 let clone_dir = config.layout.source_clone_dir(&src.name);
 ctx.vcs.fetch(&clone_dir, &src.vcs, url)?;
 }
 // svn has no separate bare-clone stage; checkout_src performs the
 // initial `svn checkout` directly.
 VcsDescriptor::Svn { .. } => {}
 VcsDescriptor::Url { url, format, checksum, .. } => {
 if checksum.is_none() && src.mandate_hashes_for_archives {
 bail!(ConfigError::MissingChecksum { name: src.name.clone() });
 }
 let dest = config.layout.source_archive_path(&src.name, format.extension());
 if !dest.exists() {
 archive::download(url, &dest)?;
 }
 if let Some(checksum) = checksum {
 archive::verify_checksum(&dest, checksum)?;
 }
 }
 }
 mark_done(config, "fetched", &subject.marker_key())
}

pub fn checkout_src(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let src = get_source(config, subject)?;
 let checkout_dir = config.layout.source_dir(&src.name, src.subdir.as_deref());
 match &src.vcs {
 VcsDescriptor::Git { .. } | VcsDescriptor::Hg { .. } => {
 let clone_dir = config.layout.source_clone_dir(&src.name);
 ctx.vcs.checkout(&checkout_dir, &clone_dir, &src.vcs, ctx.reset)?;
 }
 VcsDescriptor::Svn { .. } => {
 // No bare clone for svn; pass the checkout dir as both arguments,
 // matching `GitBackend::checkout`'s svn branch which ignores `clone_dir`.
 ctx.vcs.checkout(&checkout_dir, &checkout_dir, &src.vcs, ResetMode::None)?;
 }
 VcsDescriptor::Url { format, extract_path, .. } => {
 let archive_path = config.layout.source_archive_path(&src.name, format.extension());
 archive::extract(&archive_path, *format, &checkout_dir, extract_path.as_deref())?;
 }
 }
 mark_done(config, "checkedout", &subject.marker_key())
}

pub fn patch_src(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let src = get_source(config, subject)?;
 let checkout_dir = config.layout.source_dir(&src.name, src.subdir.as_deref());
 if let (Some(patch_dir), VcsDescriptor::Git { .. }) = (&src.patch_dir, &src.vcs) {
 let dir = config.layout.patch_dir(patch_dir);
 if dir.exists() {
 let mut patches: Vec<PathBuf> = std::fs::read_dir(&dir)
 .with_context(|| format!("failed to read {}", dir.display()))?
 .filter_map(|e| e.ok().map(|e| e.path()))
 .filter(|p| p.extension().is_some_and(|e| e == "patch"))
 .collect();
 patches.sort();
 ctx.vcs.apply_patches(&checkout_dir, &patches, &config.patch_author, &config.patch_email)?;
 }
 }
 mark_done(config, "patched", &subject.marker_key())
}

pub fn regenerate_src(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let src = get_source(config, subject)?;
 let mut default_workdir = container_src_root(ctx.site).join(&src.name);
 if let Some(subdir) = &src.subdir {
 default_workdir = default_workdir.join(subdir);
 }
 run_steps(
 ctx,
 config,
 &src.regenerate,
 StepContext::Source { name: src.name.clone() },
 &src.requirements,
 default_workdir,
 false,
 None,
 )?;
 mark_done(config, "regenerated", &subject.marker_key())
}

/// `mirror_src`: re-fetches
/// git sources as bare mirrors under an exclusive directory lock.
pub fn mirror_src(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 use std::os::fd::AsRawFd;

 let src = get_source(config, subject)?;
 let VcsDescriptor::Git { url, .. } = &src.vcs else {
 return Ok(());
 };
 let lock_path = config.layout.mirror_lock();
 if let Some(parent) = lock_path.parent() {
 std::fs::create_dir_all(parent)?;
 }
 let lock_file = std::fs::OpenOptions::new()
 .create(true)
 .write(true)
 .open(&lock_path)
 .with_context(|| format!("failed to open {}", lock_path.display()))?;
 nix::fcntl::flock(lock_file.as_raw_fd(), nix::fcntl::FlockArg::LockExclusive)
 .with_context(|| format!("failed to lock {}", lock_path.display()))?;

 let effective_url = effective_git_url(config, &src.name, url);
 let mirror_dir = config.layout.mirror_dir.join(&src.name);
 let result = ctx.vcs.mirror(&mirror_dir, &src.vcs, &effective_url);

 nix::fcntl::flock(lock_file.as_raw_fd(), nix::fcntl::FlockArg::Unlock)
 .with_context(|| format!("failed to unlock {}", lock_path.display()))?;
 result
}
