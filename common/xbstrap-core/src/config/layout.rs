//! Output directory layout: every build artifact
//! lives under `build_root`, computed from `directories.{system_root,
//! pkg_builds, tools, packages}` with fixed defaults.

use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Layout {
 pub build_root: PathBuf,
 pub source_root: PathBuf,
 pub system_root: PathBuf,
 pub tool_builds: PathBuf,
 pub pkg_builds: PathBuf,
 pub tools: PathBuf,
 pub packages: PathBuf,
 pub xbps_repo: PathBuf,
 pub mirror_dir: PathBuf,
}

impl Layout {
 pub fn new(build_root: PathBuf, source_root: PathBuf, dirs: &RawDirectories) -> Self {
 let system_root = build_root.join(dirs.system_root.as_deref().unwrap_or("system-root"));
 let tools = build_root.join(dirs.tools.as_deref().unwrap_or("tools"));
 let packages = build_root.join(dirs.packages.as_deref().unwrap_or("packages"));
 let pkg_builds_name = dirs.pkg_builds.as_deref().unwrap_or("pkg-builds");
 Self {
 pkg_builds: build_root.join(pkg_builds_name),
 tool_builds: build_root.join("tool-builds"),
 xbps_repo: build_root.join("xbps-repo"),
 mirror_dir: build_root.join("mirror"),
 system_root,
 tools,
 packages,
 build_root,
 source_root,
 }
 }

 pub fn source_dir(&self, name: &str, subdir: Option<&str>) -> PathBuf {
 let base = self.source_root.join(name);
 match subdir {
 Some(s) => base.join(s),
 None => base,
 }
 }

 /// Bare/mirror clone populated by `fetch_src`, distinct from the working
 /// tree `checkout_src` materializes under [`Self::source_dir`].
 pub fn source_clone_dir(&self, name: &str) -> PathBuf {
 self.build_root.join("source-clones").join(name)
 }

 /// Where `fetch_src`/`checkout_src` cache a downloaded archive for a
 /// `url:`-sourced [`crate::subject::Source`] before extraction.
 pub fn source_archive_path(&self, name: &str, ext: &str) -> PathBuf {
 self.build_root.join("source-archives").join(format!("{name}.{ext}"))
 }

 pub fn patch_dir(&self, source_root: &str) -> PathBuf {
 self.source_root.join("patches").join(source_root)
 }

 pub fn tool_build_dir(&self, tool: &str) -> PathBuf {
 self.tool_builds.join(tool)
 }

 pub fn tool_prefix(&self, tool: &str) -> PathBuf {
 self.tools.join(tool)
 }

 pub fn pkg_build_dir(&self, pkg: &str) -> PathBuf {
 self.pkg_builds.join(pkg)
 }

 pub fn pkg_collect_dir(&self, pkg: &str) -> PathBuf {
 self.pkg_build_dir(pkg).join("collect")
 }

 pub fn pkg_staging_dir(&self, pkg: &str) -> PathBuf {
 self.pkg_build_dir(pkg).join("staging")
 }

 pub fn marker_dir(&self) -> PathBuf {
 self.build_root.join(".xbstrap")
 }

 /// Marker file path for `(action, subject)`, e.g. `fetched-hello` or
 /// `installed-hello-tool@stage1`.
 pub fn marker(&self, action_name: &str, subject_key: &str) -> PathBuf {
 self.marker_dir().join(format!("{action_name}-{subject_key}"))
 }

 pub fn mirror_lock(&self) -> PathBuf {
 self.mirror_dir.join(".xbstrap_lock")
 }
}

/// Raw `directories:` overrides read straight off [`super::raw::RawGeneral`].
#[derive(Debug, Default, Clone, serde::Deserialize)]
#[serde(default)]
pub struct RawDirectories {
 pub system_root: Option<String>,
 pub pkg_builds: Option<String>,
 pub tools: Option<String>,
 pub packages: Option<String>,
}

pub fn resolve_bootstrap_link(build_root: &Path) -> std::io::Result<PathBuf> {
 let link = build_root.join("bootstrap.link");
 let target = std::fs::read_link(&link)?;
 let manifest_path = if target.is_absolute() {
 target
 } else {
 build_root.join(target)
 };
 Ok(manifest_path)
}
