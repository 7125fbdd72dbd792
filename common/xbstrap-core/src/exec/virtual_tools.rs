//! Virtual-bin shims: `pkgconfig-for-host` and
//! `pkgconfig-for-target` are the only two kinds recognized; anything else
//! is a fatal [`crate::error::ExecError::UnknownVirtualTool`].

use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtualTool {
 PkgConfigForHost,
 PkgConfigForTarget,
}

impl VirtualTool {
 fn shim_name(&self) -> &'static str {
 "pkg-config"
 }
}

fn pkg_config_path_for_host(tool_prefixes: &[PathBuf]) -> String {
 let mut entries = Vec::new();
 for prefix in tool_prefixes {
 entries.push(prefix.join("lib/pkgconfig").display().to_string());
 entries.push(prefix.join("share/pkgconfig").display().to_string());
 }
 #[cfg(target_os = "linux")]
 {
 if let Ok(triple) = std::env::var("XBSTRAP_MULTIARCH_TRIPLE") {
 for prefix in tool_prefixes {
 entries.push(prefix.join(format!("lib/{triple}/pkgconfig")).display().to_string());
 }
 }
 }
 entries.join(":")
}

/// Writes one shim script per entry in `tools` into `<scratch_dir>/virtual-bin`,
/// returning that directory so the caller can prepend it to `PATH`.
pub fn write_virtual_bin(
 scratch_dir: &Path,
 tools: &[VirtualTool],
 tool_prefixes: &[PathBuf],
 sysroot_dir: Option<&Path>,
) -> Result<PathBuf> {
 let virtual_bin = scratch_dir.join("virtual-bin");
 fs::create_dir_all(&virtual_bin)
 .with_context(|| format!("failed to create {}", virtual_bin.display()))?;

 for tool in tools {
 let script = match tool {
 VirtualTool::PkgConfigForHost => {
 let pkg_config_path = pkg_config_path_for_host(tool_prefixes);
 format!(
 "#!/bin/sh\nexport PKG_CONFIG_PATH=\"{pkg_config_path}\"\nexec pkg-config \"$@\"\n"
 )
 }
 VirtualTool::PkgConfigForTarget => {
 let sysroot = sysroot_dir
 .map(|p| p.display().to_string())
 .unwrap_or_default();
 format!(
 "#!/bin/sh\nexport PKG_CONFIG_SYSROOT_DIR=\"{sysroot}\"\nexport PKG_CONFIG_LIBDIR=\"{sysroot}/usr/lib/pkgconfig:{sysroot}/usr/share/pkgconfig\"\nexec pkg-config \"$@\"\n"
 )
 }
 };
 let path = virtual_bin.join(tool.shim_name());
 let mut file = fs::File::create(&path)
 .with_context(|| format!("failed to create {}", path.display()))?;
 file.write_all(script.as_bytes())?;
 let mut perms = file.metadata()?.permissions();
 perms.set_mode(0o755);
 fs::set_permissions(&path, perms)?;
 }

 Ok(virtual_bin)
}
