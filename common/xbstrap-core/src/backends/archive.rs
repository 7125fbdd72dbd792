//! Download/checksum/extract for `url:`-sourced archives. Not part of [`super::VcsBackend`]: archive
//! sources have no remote-branch concept, just a blob to fetch and unpack.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256, Sha512};

use crate::subject::{ArchiveFormat, Checksum};

/// Downloads `url` to `dest`, via a sibling temp file + rename so a failed
/// download never leaves a partial file mistaken for a complete one.
pub fn download(url: &str, dest: &Path) -> Result<()> {
 if let Some(parent) = dest.parent() {
 std::fs::create_dir_all(parent)?;
 }
 let tmp = dest.with_extension("xbstrap-download-tmp");
 let mut response = reqwest::blocking::get(url).with_context(|| format!("failed to GET {url}"))?;
 if !response.status().is_success() {
 bail!("GET {url} returned {}", response.status());
 }
 let mut file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
 std::io::copy(&mut response, &mut file)?;
 std::fs::rename(&tmp, dest)?;
 Ok(())
}

/// Verifies `path` against a `<kind>:<hex>` [`Checksum`]. Only `sha256` and
/// `sha512` are implemented; any other kind is a hard error rather than a
/// silently skipped check.
pub fn verify_checksum(path: &Path, checksum: &Checksum) -> Result<()> {
 let mut file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
 let mut buf = Vec::new();
 file.read_to_end(&mut buf)?;
 let digest = match checksum.kind.as_str() {
 "sha256" => {
 let mut hasher = Sha256::new();
 hasher.update(&buf);
 hex::encode(hasher.finalize())
 }
 "sha512" => {
 let mut hasher = Sha512::new();
 hasher.update(&buf);
 hex::encode(hasher.finalize())
 }
 other => bail!("unsupported checksum kind {other:?}"),
 };
 if !digest.eq_ignore_ascii_case(&checksum.hex) {
 bail!(
 "checksum mismatch for {}: expected {}:{}, computed {}",
 path.display(),
 checksum.kind,
 checksum.hex,
 digest
 );
 }
 Ok(())
}

/// Extracts `archive` into `dest_dir`, stripping `extract_path` as a path
/// prefix when given.
pub fn extract(archive: &Path, format: ArchiveFormat, dest_dir: &Path, extract_path: Option<&str>) -> Result<()> {
 std::fs::create_dir_all(dest_dir)?;
 match format {
 ArchiveFormat::Zip => extract_zip(archive, dest_dir, extract_path),
 _ => extract_tar(archive, format, dest_dir, extract_path),
 }
}

fn open_tar_reader(archive: &Path, format: ArchiveFormat) -> Result<Box<dyn Read>> {
 let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
 Ok(match format {
 ArchiveFormat::TarGz => Box::new(flate2::read::GzDecoder::new(file)),
 ArchiveFormat::TarBz2 => Box::new(bzip2::read::BzDecoder::new(file)),
 ArchiveFormat::TarXz => Box::new(xz2::read::XzDecoder::new(file)),
 ArchiveFormat::TarZstd => Box::new(zstd::stream::read::Decoder::new(file)?),
 ArchiveFormat::Tar => Box::new(file),
 ArchiveFormat::Zip => unreachable!("zip is handled by extract_zip"),
 })
}

fn extract_tar(archive: &Path, format: ArchiveFormat, dest_dir: &Path, extract_path: Option<&str>) -> Result<()> {
 let reader = open_tar_reader(archive, format)?;
 let mut tar = tar::Archive::new(reader);
 for entry in tar.entries()? {
 let mut entry = entry?;
 let path = entry.path()?.into_owned();
 let relative = match extract_path {
 Some(prefix) => match path.strip_prefix(prefix) {
 Ok(p) => p.to_path_buf(),
 Err(_) => continue,
 },
 None => path,
 };
 if relative.as_os_str().is_empty() {
 continue;
 }
 entry.unpack(dest_dir.join(relative))?;
 }
 Ok(())
}

fn extract_zip(archive: &Path, dest_dir: &Path, extract_path: Option<&str>) -> Result<()> {
 let file = File::open(archive).with_context(|| format!("failed to open {}", archive.display()))?;
 let mut zip = zip::ZipArchive::new(file)?;
 for i in 0..zip.len() {
 let mut entry = zip.by_index(i)?;
 let Some(path) = entry.enclosed_name().map(Path::to_path_buf) else {
 continue;
 };
 let relative = match extract_path {
 Some(prefix) => match path.strip_prefix(prefix) {
 Ok(p) => p.to_path_buf(),
 Err(_) => continue,
 },
 None => path,
 };
 if relative.as_os_str().is_empty() {
 continue;
 }
 let out_path = dest_dir.join(relative);
 if entry.is_dir() {
 std::fs::create_dir_all(&out_path)?;
 continue;
 }
 if let Some(parent) = out_path.parent() {
 std::fs::create_dir_all(parent)?;
 }
 let mut out = File::create(&out_path)?;
 std::io::copy(&mut entry, &mut out)?;
 }
 Ok(())
}

/// Packs `src_dir` into a gzip'd tarball at `dest`, paths relative to `src_dir`.
pub fn create_tar_gz(src_dir: &Path, dest: &Path) -> Result<()> {
 if let Some(parent) = dest.parent() {
 std::fs::create_dir_all(parent)?;
 }
 let file = File::create(dest).with_context(|| format!("failed to create {}", dest.display()))?;
 let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
 let mut builder = tar::Builder::new(encoder);
 builder
 .append_dir_all(".", src_dir)
 .with_context(|| format!("failed to archive {}", src_dir.display()))?;
 builder.into_inner()?.finish()?;
 Ok(())
}

/// Minimal hex encoding so this module doesn't need an extra dependency
/// beyond `sha2`.
mod hex {
 pub fn encode(bytes: impl AsRef<[u8]>) -> String {
 use std::fmt::Write;
 let mut out = String::with_capacity(bytes.as_ref().len() * 2);
 for b in bytes.as_ref() {
 write!(out, "{b:02x}").unwrap();
 }
 out
 }
}
