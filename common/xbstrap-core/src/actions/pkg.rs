//! `configure_pkg` / `build_pkg` / `pack_pkg` / `install_pkg` /
//! `archive_pkg` / `pull_pkg_pack`, plus their `reproduce-*`
//! variants.

use std::path::Path;

use anyhow::{bail, Context, Result};
use fileutil::remove_dir_all_with_chmod;

use crate::backends::{archive, PackMetadata};
use crate::config::Config;
use crate::exec::StepContext;
use crate::subject::{Package, SubjectId};

use super::{container_build_root, mark_done, run_steps, ActionContext};

fn get_pkg<'c>(config: &'c Config, subject: &SubjectId) -> Result<&'c Package> {
 config
 .get_pkg(&subject.name)
 .with_context(|| format!("unknown package {:?}", subject.name))
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

/// Sets every regular file's mtime to the Unix epoch so two builds of
/// byte-identical content produce byte-identical trees.
fn touchtree(dir: &Path) -> Result<()> {
 let epoch = filetime::FileTime::from_unix_time(0, 0);
 for entry in walkdir::WalkDir::new(dir) {
 let entry = entry?;
 filetime::set_file_mtime(entry.path(), epoch)
 .with_context(|| format!("failed to touch {}", entry.path().display()))?;
 }
 Ok(())
}

/// Recursively compares two trees by relative path, file type, and byte
/// content.
fn compare_trees(fresh: &Path, accepted: &Path) -> Result<()> {
 let mut fresh_paths = std::collections::BTreeSet::new();
 for entry in walkdir::WalkDir::new(fresh) {
 let entry = entry?;
 let rel = entry.path().strip_prefix(fresh).unwrap().to_path_buf();
 fresh_paths.insert(rel);
 }
 let mut accepted_paths = std::collections::BTreeSet::new();
 for entry in walkdir::WalkDir::new(accepted) {
 let entry = entry?;
 let rel = entry.path().strip_prefix(accepted).unwrap().to_path_buf();
 accepted_paths.insert(rel);
 }
 if fresh_paths != accepted_paths {
 bail!(
 "reproduce mismatch: {} and {} contain different entries",
 fresh.display(),
 accepted.display()
 );
 }
 for rel in &fresh_paths {
 let a = fresh.join(rel);
 let b = accepted.join(rel);
 let a_meta = std::fs::symlink_metadata(&a)?;
 let b_meta = std::fs::symlink_metadata(&b)?;
 if a_meta.file_type().is_dir() != b_meta.file_type().is_dir() {
 bail!("reproduce mismatch: {} changed file type", rel.display());
 }
 if a_meta.file_type().is_file() {
 let a_bytes = std::fs::read(&a)?;
 let b_bytes = std::fs::read(&b)?;
 if a_bytes != b_bytes {
 bail!("reproduce mismatch: {} differs in content", rel.display());
 }
 }
 }
 Ok(())
}

pub fn configure_pkg(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let pkg = get_pkg(config, subject)?;
 let build_dir = config.layout.pkg_build_dir(&pkg.name);
 remove_dir_all_with_chmod(&build_dir)?;
 std::fs::create_dir_all(&build_dir)?;
 let default_workdir = container_build_root(ctx.site).join("pkg-builds").join(&pkg.name);
 run_steps(
 ctx,
 config,
 &pkg.configure,
 StepContext::Package { name: pkg.name.clone() },
 &pkg.requirements,
 default_workdir,
 true,
 Some(config.layout.system_root.clone()),
 )?;
 mark_done(config, "configured", &subject.marker_key())
}

/// `build_pkg`/`reproduce_build_pkg`: a normal build resets `collect_dir`,
/// runs the build, then promotes it to `staging_dir`; a reproduce build
/// rebuilds into `collect_dir` again but leaves the existing `staging_dir`
/// alone, diffing the two instead of promoting.
pub fn build_pkg(ctx: &ActionContext, config: &Config, subject: &SubjectId, reproduce: bool) -> Result<()> {
 let pkg = get_pkg(config, subject)?;
 let collect_dir = config.layout.pkg_collect_dir(&pkg.name);
 let staging_dir = config.layout.pkg_staging_dir(&pkg.name);
 remove_dir_all_with_chmod(&collect_dir)?;
 std::fs::create_dir_all(&collect_dir)?;
 let default_workdir = container_build_root(ctx.site).join("pkg-builds").join(&pkg.name);
 run_steps(
 ctx,
 config,
 &pkg.build,
 StepContext::Package { name: pkg.name.clone() },
 &pkg.requirements,
 default_workdir,
 true,
 Some(config.layout.system_root.clone()),
 )?;
 if reproduce {
 compare_trees(&collect_dir, &staging_dir)?;
 return Ok(());
 }
 remove_dir_all_with_chmod(&staging_dir)?;
 std::fs::rename(&collect_dir, &staging_dir)
 .with_context(|| format!("failed to promote {} to {}", collect_dir.display(), staging_dir.display()))?;
 mark_done(config, "built", &subject.marker_key())
}

fn pkgver_for(config: &Config, pkg: &Package) -> String {
 let version = pkg
 .from_source
 .as_deref()
 .and_then(|src_name| config.get_source(src_name))
 .filter(|src| src.rolling_version)
 .and_then(|src| config.rolling_id(&src.name))
 .map(|id| format!("0.0.0r{id}"))
 .unwrap_or_else(|| "0".to_owned());
 format!("{}-{}_{}", pkg.name, version, pkg.revision)
}

fn pack_metadata(pkg: &Package) -> PackMetadata {
 PackMetadata {
 summary: pkg.metadata.summary.clone(),
 license: pkg.metadata.license.clone(),
 website: pkg.metadata.website.clone(),
 maintainer: pkg.metadata.maintainer.clone(),
 categories: pkg.metadata.categories.clone(),
 replaces: pkg.metadata.replaces.clone(),
 architecture: if pkg.is_noarch() {
 "noarch".to_owned()
 } else {
 pkg.architecture.clone().unwrap_or_else(|| std::env::consts::ARCH.to_owned())
 },
 }
}

/// `pack_pkg`/`reproduce_pack_pkg`: composes the install script
/// from `scripts.post_install`, canonicalizes mtimes, and invokes the
/// package backend. The reproduce variant packs into a scratch repo and
/// compares the resulting `.xbps` byte-for-byte against the accepted one.
pub fn pack_pkg(ctx: &ActionContext, config: &Config, subject: &SubjectId, reproduce: bool) -> Result<()> {
 let pkg = get_pkg(config, subject)?;
 let staging_dir = config.layout.pkg_staging_dir(&pkg.name);
 let default_workdir = container_build_root(ctx.site).join("pkg-builds").join(&pkg.name);
 run_steps(
 ctx,
 config,
 &pkg.post_install,
 StepContext::Package { name: pkg.name.clone() },
 &pkg.requirements,
 default_workdir,
 true,
 Some(config.layout.system_root.clone()),
 )?;
 touchtree(&staging_dir)?;

 let pkgver = pkgver_for(config, pkg);
 let metadata = pack_metadata(pkg);

 if reproduce {
 let scratch = fileutil::SafeTempDir::new()?;
 ctx.package_backend.pack(&pkg.name, &pkgver, &staging_dir, scratch.path(), &metadata)?;
 let accepted = config.layout.xbps_repo.join(format!("{pkgver}.{}.xbps", metadata.architecture));
 let fresh = scratch.path().join(format!("{pkgver}.{}.xbps", metadata.architecture));
 if fresh.exists() && accepted.exists() {
 let fresh_bytes = std::fs::read(&fresh)?;
 let accepted_bytes = std::fs::read(&accepted)?;
 if fresh_bytes != accepted_bytes {
 bail!("reproduce-pack mismatch for {}", pkg.name);
 }
 }
 return Ok(());
 }

 ctx.package_backend.pack(&pkg.name, &pkgver, &staging_dir, &config.layout.xbps_repo, &metadata)?;
 mark_done(config, "packed", &subject.marker_key())
}

pub fn install_pkg(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let pkg = get_pkg(config, subject)?;
 if config.site.pkg_format.is_some() {
 ctx.package_backend
 .install_into_sysroot(&pkg.name, &config.layout.xbps_repo, &config.layout.system_root)?;
 } else {
 let staging_dir = config.layout.pkg_staging_dir(&pkg.name);
 if staging_dir.exists() {
 copy_dir_all(&staging_dir, &config.layout.system_root)?;
 }
 }
 mark_done(config, "installed", &subject.marker_key())
}

/// `archive_pkg`: packs the staged tree into a tarball, the
/// no-package-backend analogue of `pack_pkg`.
pub fn archive_pkg(_ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let pkg = get_pkg(config, subject)?;
 let staging_dir = config.layout.pkg_staging_dir(&pkg.name);
 let dest = config.layout.build_root.join("pkg-archives").join(format!("{}.tar.gz", pkg.name));
 archive::create_tar_gz(&staging_dir, &dest)?;
 mark_done(config, "archived", &subject.marker_key())
}

/// `pull_pkg_pack`: downloads the remote repodata/pack for this
/// package and indexes it locally; no marker, since `probe_pull_pkg_pack`
/// tracks state purely through local/remote version comparison.
pub fn pull_pkg_pack(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let repo_url = config.commits.xbstrap_mirror.as_deref().unwrap_or_default();
 ctx.package_backend
 .download_repodata(&subject.name, repo_url, &config.layout.xbps_repo)?;
 Ok(())
}
