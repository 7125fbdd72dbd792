//! Raw-schema -> typed [`crate::subject`] conversions: requirement lists,
//! script steps, VCS descriptors, checksums.

use serde_yaml::Value;

use crate::error::ConfigError;
use crate::subject::{
 ArchiveFormat, Args, Checksum, PkgRequirement, ScriptStep, SourceRequirement, TaskRequirement,
 ToolRequirement, VcsDescriptor,
};

use super::raw::{RawArgs, RawRequirement, RawStep, RawVcs};

fn detail_str(map: &std::collections::BTreeMap<String, Value>, key: &str) -> Option<String> {
 map.get(key).and_then(|v| v.as_str()).map(|s| s.to_owned())
}

fn detail_bool(map: &std::collections::BTreeMap<String, Value>, key: &str) -> bool {
 map.get(key).and_then(|v| v.as_bool()).unwrap_or(false)
}

fn detail_bool_default(
 map: &std::collections::BTreeMap<String, Value>,
 key: &str,
 default: bool,
) -> bool {
 map.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

fn detail_str_list(map: &std::collections::BTreeMap<String, Value>, key: &str) -> Option<Vec<String>> {
 let v = map.get(key)?;
 if let Some(s) = v.as_str() {
 return Some(vec![s.to_owned()]);
 }
 v.as_sequence().map(|seq| {
 seq.iter()
 .filter_map(|e| e.as_str().map(|s| s.to_owned()))
 .collect()
 })
}

fn requirement_name(raw: &RawRequirement, name_key: &str) -> String {
 match raw {
 RawRequirement::Name(n) => n.clone(),
 RawRequirement::Detailed(map) => detail_str(map, name_key)
 .or_else(|| detail_str(map, "name"))
 .unwrap_or_default(),
 }
}

pub fn to_source_requirements(raw: &[RawRequirement]) -> Vec<SourceRequirement> {
 raw.iter()
 .map(|r| {
 let name = requirement_name(r, "source");
 let recursive = match r {
 RawRequirement::Detailed(map) => detail_bool(map, "recursive"),
 RawRequirement::Name(_) => false,
 };
 SourceRequirement { name, recursive }
 })
 .collect()
}

pub fn to_tool_requirements(raw: &[RawRequirement]) -> Vec<ToolRequirement> {
 raw.iter()
 .map(|r| {
 let name = requirement_name(r, "tool");
 // `expose` defaults to true: a bare-name requirement, or a
 // detailed one that omits the key, is still exposed on PATH.
 let (stages, recursive, expose, virtual_kind) = match r {
 RawRequirement::Detailed(map) => (
 detail_str_list(map, "stages"),
 detail_bool(map, "recursive"),
 detail_bool_default(map, "expose", true),
 detail_str(map, "virtual"),
 ),
 RawRequirement::Name(_) => (None, false, true, None),
 };
 ToolRequirement {
 name,
 stages,
 recursive,
 expose,
 virtual_kind,
 }
 })
 .collect()
}

pub fn to_pkg_requirements(raw: &[RawRequirement]) -> Vec<PkgRequirement> {
 raw.iter()
 .map(|r| PkgRequirement {
 name: requirement_name(r, "pkg"),
 })
 .collect()
}

pub fn to_task_requirements(raw: &[RawRequirement]) -> Vec<TaskRequirement> {
 raw.iter()
 .map(|r| {
 let name = requirement_name(r, "task");
 let order_only = match r {
 RawRequirement::Detailed(map) => detail_bool(map, "order_only"),
 RawRequirement::Name(_) => false,
 };
 TaskRequirement { name, order_only }
 })
 .collect()
}

pub fn to_args(raw: &Option<RawArgs>) -> Option<Args> {
 raw.as_ref().map(|a| match a {
 RawArgs::List(v) => Args::List(v.clone()),
 RawArgs::Shell(s) => Args::Shell(s.clone()),
 })
}

pub fn to_step(raw: &RawStep) -> ScriptStep {
 ScriptStep {
 args: to_args(&raw.args),
 environ: raw.environ.clone(),
 workdir: raw.workdir.clone(),
 containerless: raw.containerless,
 isolate_network: raw.isolate_network,
 quiet: raw.quiet,
 cargo_home: raw.cargo_home,
 }
}

pub fn to_steps(raw: &[RawStep]) -> Vec<ScriptStep> {
 raw.iter().map(to_step).collect()
}

fn parse_archive_format(raw: &RawVcs) -> Result<ArchiveFormat, ConfigError> {
 let format = raw.format.as_deref();
 let url = raw.url.as_deref().unwrap_or("");
 Ok(match format {
 Some("tar.gz") | Some("tgz") => ArchiveFormat::TarGz,
 Some("tar.xz") => ArchiveFormat::TarXz,
 Some("tar.bz2") => ArchiveFormat::TarBz2,
 Some("tar.zst") => ArchiveFormat::TarZstd,
 Some("tar") => ArchiveFormat::Tar,
 Some("zip") => ArchiveFormat::Zip,
 Some(other) => {
 return Err(ConfigError::UnknownReference {
 referrer: url.to_owned(),
 kind: "archive format",
 name: other.to_owned(),
 })
 }
 None if url.ends_with(".tar.gz") || url.ends_with(".tgz") => ArchiveFormat::TarGz,
 None if url.ends_with(".tar.xz") => ArchiveFormat::TarXz,
 None if url.ends_with(".tar.bz2") => ArchiveFormat::TarBz2,
 None if url.ends_with(".tar.zst") => ArchiveFormat::TarZstd,
 None if url.ends_with(".zip") => ArchiveFormat::Zip,
 None => ArchiveFormat::Tar,
 })
}

/// Converts the flattened `RawVcs` fields (`git`/`hg`/`svn`/`url`) into the
/// tagged [`VcsDescriptor`]. Exactly one of the four source kinds is
/// expected to be set; `git` wins if more than one is present, matching the
/// field-precedence order they're declared in the schema.
pub fn to_vcs(name: &str, raw: &RawVcs) -> Result<VcsDescriptor, ConfigError> {
 if let Some(url) = &raw.git {
 return Ok(VcsDescriptor::Git {
 url: url.clone(),
 branch: raw.branch.clone(),
 tag: raw.tag.clone(),
 commit: raw.commit.clone(),
 submodules: raw.submodules,
 });
 }
 if let Some(url) = &raw.hg {
 return Ok(VcsDescriptor::Hg {
 url: url.clone(),
 branch: raw.branch.clone(),
 });
 }
 if let Some(url) = &raw.svn {
 return Ok(VcsDescriptor::Svn {
 url: url.clone(),
 rev: raw.rev.clone(),
 });
 }
 if let Some(url) = &raw.url {
 let format = parse_archive_format(raw)?;
 let checksum = match &raw.checksum {
 Some(spec) => Some(Checksum::parse(spec).ok_or_else(|| ConfigError::UnknownReference {
 referrer: name.to_owned(),
 kind: "checksum format",
 name: spec.clone(),
 })?),
 None => None,
 };
 return Ok(VcsDescriptor::Url {
 url: url.clone(),
 format,
 checksum,
 extract_path: raw.extract_path.clone(),
 });
 }
 Err(ConfigError::UnknownReference {
 referrer: name.to_owned(),
 kind: "vcs descriptor",
 name: "<none given>".to_owned(),
 })
}
