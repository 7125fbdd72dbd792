//! Serde mirrors of the `bootstrap.yml` / `bootstrap-site.yml` /
//! `bootstrap-commits.yml` schemas. These are intentionally loose (most
//! fields optional with sensible defaults) since the YAML schema itself is
//! out of scope; only enough structure to build the typed [`crate::subject`]
//! graph is represented.

use std::collections::BTreeMap;

use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawManifest {
 pub imports: Vec<RawImport>,
 pub general: RawGeneral,
 pub options: Vec<RawOptionDecl>,
 pub sources: Vec<RawSource>,
 pub tools: Vec<RawTool>,
 pub packages: Vec<RawPackage>,
 pub tasks: Vec<RawTask>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOptionDecl {
 pub name: String,
 #[serde(default)]
 pub default: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawGeneral {
 pub parallelism: Option<u32>,
 pub directories: super::layout::RawDirectories,
 pub patch_author: Option<String>,
 pub patch_email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RawImport {
 File { file: String },
 Root(RawRootImport),
}

#[derive(Debug, Deserialize)]
pub struct RawRootImport {
 pub from: String,
 #[serde(default)]
 pub sources: Option<Vec<String>>,
 #[serde(default)]
 pub all_sources: bool,
 #[serde(default)]
 pub tools: Option<Vec<String>>,
 #[serde(default)]
 pub all_tools: bool,
 #[serde(default)]
 pub packages: Option<Vec<String>>,
 #[serde(default)]
 pub all_packages: bool,
}

/// Either a bare name, or a detailed requirement map.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRequirement {
 Name(String),
 Detailed(BTreeMap<String, serde_yaml::Value>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawArgs {
 List(Vec<String>),
 Shell(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawStep {
 pub args: Option<RawArgs>,
 pub environ: BTreeMap<String, String>,
 pub workdir: Option<String>,
 pub containerless: bool,
 pub isolate_network: bool,
 pub quiet: bool,
 pub cargo_home: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVcs {
 pub git: Option<String>,
 pub hg: Option<String>,
 pub svn: Option<String>,
 pub url: Option<String>,
 pub branch: Option<String>,
 pub tag: Option<String>,
 pub commit: Option<String>,
 pub submodules: bool,
 pub format: Option<String>,
 pub checksum: Option<String>,
 pub extract_path: Option<String>,
 pub rev: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawSource {
 pub name: String,
 pub subdir: Option<String>,
 #[serde(flatten)]
 pub vcs: RawVcs,
 pub patch_path: Option<String>,
 pub regenerate: Vec<RawStep>,
 pub rolling_version: bool,
 pub source_dependencies: Vec<RawRequirement>,
 pub tools_required: Vec<RawRequirement>,
 pub mandate_hashes_for_archives: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawToolStage {
 pub name: Option<String>,
 pub compile: Vec<RawStep>,
 pub install: Vec<RawStep>,
 pub tools_required: Option<Vec<RawRequirement>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTool {
 pub name: String,
 pub architecture: Option<String>,
 pub from_source: Option<String>,
 pub stages: Vec<RawToolStage>,
 #[serde(default)]
 pub compile: Vec<RawStep>,
 #[serde(default)]
 pub install: Vec<RawStep>,
 pub exports_shared_libs: bool,
 pub exports_aclocal: bool,
 pub containerless: bool,
 pub stability_level: Option<String>,
 pub labels: Vec<String>,
 pub tools_required: Vec<RawRequirement>,
 pub pkgs_required: Vec<RawRequirement>,
 pub tasks_required: Vec<RawRequirement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPackageMetadata {
 pub summary: Option<String>,
 pub license: Option<String>,
 pub website: Option<String>,
 pub maintainer: Option<String>,
 pub categories: Vec<String>,
 pub replaces: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPackage {
 pub name: String,
 pub from_source: Option<String>,
 pub architecture: Option<String>,
 pub labels: Vec<String>,
 pub implicit: bool,
 pub configure: Vec<RawStep>,
 pub build: Vec<RawStep>,
 pub source_dependencies: Vec<RawRequirement>,
 pub tools_required: Vec<RawRequirement>,
 pub pkgs_required: Vec<RawRequirement>,
 pub tasks_required: Vec<RawRequirement>,
 pub metadata: RawPackageMetadata,
 pub revision: Option<u32>,
 pub scripts: RawPackageScripts,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawPackageScripts {
 pub post_install: Vec<RawStep>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawArtifactFile {
 pub name: String,
 pub path: String,
 pub architecture: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTask {
 pub name: String,
 pub pkg: Option<String>,
 pub tool: Option<String>,
 #[serde(flatten)]
 pub step: RawStep,
 pub artifact_files: Vec<RawArtifactFile>,
 pub source_dependencies: Vec<RawRequirement>,
 pub tools_required: Vec<RawRequirement>,
 pub pkgs_required: Vec<RawRequirement>,
 pub tasks_required: Vec<RawRequirement>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSiteConfig {
 pub define_options: BTreeMap<String, String>,
 pub labels: RawSiteLabels,
 pub container: RawContainerConfig,
 pub pkg_management: RawPkgManagement,
 pub auto_pull: bool,
 pub build_scope: Vec<String>,
 pub pull_out_of_scope: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawSiteLabels {
 #[serde(rename = "match")]
 pub match_labels: Vec<String>,
 pub ban: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawContainerConfig {
 pub runtime: Option<String>,
 pub image: Option<String>,
 pub src_mount: Option<String>,
 pub build_mount: Option<String>,
 pub rootfs: Option<String>,
 pub allow_containerless: bool,
 pub isolate_sysroots: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPkgManagement {
 pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCommitsConfig {
 pub commits: BTreeMap<String, RawCommitEntry>,
 pub general: RawCommitsGeneral,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCommitEntry {
 pub fixed_commit: Option<String>,
 pub rolling_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawCommitsGeneral {
 pub xbstrap_mirror: Option<String>,
}
