use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use anyhow::{Context, Result};

/// Removes a directory tree, first making every entry writable.
///
/// [`std::fs::remove_dir_all`] fails when it encounters a file or directory
/// without write permission for the owner (e.g. build scripts that produce
/// read-only output trees). This walks the tree bottom-up, chmod'ing
/// everything to be removable, then removes it.
pub fn remove_dir_all_with_chmod(dir: &Path) -> Result<()> {
 if !dir.exists() {
 return Ok(());
 }
 chmod_tree_writable(dir)
 .with_context(|| format!("failed to make {} writable", dir.display()))?;
 fs::remove_dir_all(dir).with_context(|| format!("failed to remove {}", dir.display()))
}

fn chmod_tree_writable(root: &Path) -> Result<()> {
 let metadata = fs::symlink_metadata(root)?;
 if metadata.is_symlink() {
 return Ok(());
 }
 if metadata.is_dir() {
 let mut perms = metadata.permissions();
 perms.set_mode(perms.mode() | 0o700);
 fs::set_permissions(root, perms)?;
 for entry in fs::read_dir(root)? {
 chmod_tree_writable(&entry?.path())?;
 }
 } else {
 let mut perms = metadata.permissions();
 perms.set_mode(perms.mode() | 0o600);
 fs::set_permissions(root, perms)?;
 }
 Ok(())
}
