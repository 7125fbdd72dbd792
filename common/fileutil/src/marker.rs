use std::fs;
use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};

/// Touches a zero-byte marker file, creating its parent directories as
/// needed. The write goes through a sibling temp file plus rename so a
/// crash mid-write can never leave a marker with a stale mtime that is
/// mistaken for "done" (see the monotonicity requirement on marker mtimes).
pub fn touch_marker(path: &Path) -> Result<()> {
 if let Some(parent) = path.parent() {
 fs::create_dir_all(parent)
 .with_context(|| format!("failed to create {}", parent.display()))?;
 }
 let tmp_path = path.with_extension("xbstrap-tmp");
 fs::write(&tmp_path, []).with_context(|| format!("failed to write {}", tmp_path.display()))?;
 fs::rename(&tmp_path, path)
 .with_context(|| format!("failed to rename {} to {}", tmp_path.display(), path.display()))
}

/// Returns the marker's modification time, or `None` if it doesn't exist.
pub fn marker_mtime(path: &Path) -> Result<Option<SystemTime>> {
 match fs::metadata(path) {
 Ok(metadata) => Ok(Some(metadata.modified()?)),
 Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
 Err(e) => Err(e).with_context(|| format!("failed to stat {}", path.display())),
 }
}

/// Removes a marker file if present, used when resetting a subject's state.
pub fn remove_marker(path: &Path) -> Result<()> {
 match fs::remove_file(path) {
 Ok(()) => Ok(()),
 Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
 Err(e) => Err(e).with_context(|| format!("failed to remove {}", path.display())),
 }
}

#[cfg(test)]
mod tests {
 use super::*;
 use tempfile::tempdir;

 #[test]
 fn touch_creates_parents_and_file() -> Result<()> {
 let dir = tempdir()?;
 let marker = dir.path().join("nested/fetched.xbstrap");
 assert!(marker_mtime(&marker)?.is_none());

 touch_marker(&marker)?;

 assert!(marker.try_exists()?);
 assert_eq!(fs::metadata(&marker)?.len(), 0);
 assert!(marker_mtime(&marker)?.is_some());
 Ok(())
 }

 #[test]
 fn touch_updates_mtime() -> Result<()> {
 let dir = tempdir()?;
 let marker = dir.path().join("built.xbstrap");

 touch_marker(&marker)?;
 let first = marker_mtime(&marker)?.unwrap();

 std::thread::sleep(std::time::Duration::from_millis(10));
 touch_marker(&marker)?;
 let second = marker_mtime(&marker)?.unwrap();

 assert!(second >= first);
 Ok(())
 }

 #[test]
 fn remove_marker_is_idempotent() -> Result<()> {
 let dir = tempdir()?;
 let marker = dir.path().join("configured.xbstrap");
 touch_marker(&marker)?;
 remove_marker(&marker)?;
 remove_marker(&marker)?;
 assert!(!marker.try_exists()?);
 Ok(())
 }
}
