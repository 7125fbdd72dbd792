//! The typed subject graph (C2): sources, tools, tool stages, packages, and
//! tasks, plus the four requirement-resolution projections described in the
//! design's "Subject Graph & Requirement Resolution" section.

use std::collections::BTreeMap;
use std::fmt;

/// The kind half of a [`SubjectId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SubjectKind {
 Source,
 Tool,
 ToolStage,
 Package,
 Task,
}

impl fmt::Display for SubjectKind {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 let s = match self {
 SubjectKind::Source => "source",
 SubjectKind::Tool => "tool",
 SubjectKind::ToolStage => "tool-stage",
 SubjectKind::Package => "pkg",
 SubjectKind::Task => "task",
 };
 f.write_str(s)
 }
}

/// Stable identity of a subject: `(kind, name, stage?, parent?)`.
///
/// `stage` is set only for [`SubjectKind::ToolStage`]; `parent` carries the
/// owning package/tool name for package-bound or tool-bound tasks.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubjectId {
 pub kind: SubjectKind,
 pub name: String,
 pub stage: Option<String>,
 pub parent: Option<String>,
}

impl SubjectId {
 pub fn source(name: impl Into<String>) -> Self {
 Self {
 kind: SubjectKind::Source,
 name: name.into(),
 stage: None,
 parent: None,
 }
 }

 pub fn tool(name: impl Into<String>) -> Self {
 Self {
 kind: SubjectKind::Tool,
 name: name.into(),
 stage: None,
 parent: None,
 }
 }

 pub fn tool_stage(tool: impl Into<String>, stage: Option<String>) -> Self {
 Self {
 kind: SubjectKind::ToolStage,
 name: tool.into(),
 stage,
 parent: None,
 }
 }

 pub fn package(name: impl Into<String>) -> Self {
 Self {
 kind: SubjectKind::Package,
 name: name.into(),
 stage: None,
 parent: None,
 }
 }

 pub fn task(name: impl Into<String>, parent: Option<String>) -> Self {
 Self {
 kind: SubjectKind::Task,
 name: name.into(),
 stage: None,
 parent,
 }
 }

 /// A stable sort key used by the ordering pass.
 pub fn sort_key(&self) -> (SubjectKind, &str, Option<&str>, Option<&str>) {
 (
 self.kind,
 self.name.as_str(),
 self.stage.as_deref(),
 self.parent.as_deref(),
 )
 }

 /// The filesystem-safe key used to name a marker file for this subject
 /// (`layout.marker(action_name, subject.marker_key())`).
 pub fn marker_key(&self) -> String {
 let mut key = self.name.clone();
 if let Some(stage) = &self.stage {
 key.push('@');
 key.push_str(stage);
 }
 if let Some(parent) = &self.parent {
 key.push('.');
 key.push_str(parent);
 }
 key
 }
}

impl fmt::Display for SubjectId {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 write!(f, "{} {}", self.kind, self.name)?;
 if let Some(stage) = &self.stage {
 write!(f, "@{stage}")?;
 }
 if let Some(parent) = &self.parent {
 write!(f, " (of {parent})")?;
 }
 Ok(())
 }
}

/// Either a shell-word list or a single string run through `sh -c`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Args {
 List(Vec<String>),
 Shell(String),
}

/// One build-script invocation: `args`, `environ`, and the handful of
/// per-step toggles the design assigns to `ScriptStep`.
#[derive(Clone, Debug, Default)]
pub struct ScriptStep {
 pub args: Option<Args>,
 pub environ: BTreeMap<String, String>,
 pub workdir: Option<String>,
 pub containerless: bool,
 pub isolate_network: bool,
 pub quiet: bool,
 pub cargo_home: bool,
}

/// A VCS or archive descriptor for a [`Source`].
#[derive(Clone, Debug)]
pub enum VcsDescriptor {
 Git {
 url: String,
 branch: Option<String>,
 tag: Option<String>,
 commit: Option<String>,
 submodules: bool,
 },
 Hg {
 url: String,
 branch: Option<String>,
 },
 Svn {
 url: String,
 rev: Option<String>,
 },
 Url {
 url: String,
 format: ArchiveFormat,
 checksum: Option<Checksum>,
 extract_path: Option<String>,
 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveFormat {
 TarGz,
 TarXz,
 TarBz2,
 TarZstd,
 Tar,
 Zip,
}

impl ArchiveFormat {
 pub fn extension(&self) -> &'static str {
 match self {
 ArchiveFormat::TarGz => "tar.gz",
 ArchiveFormat::TarXz => "tar.xz",
 ArchiveFormat::TarBz2 => "tar.bz2",
 ArchiveFormat::TarZstd => "tar.zst",
 ArchiveFormat::Tar => "tar",
 ArchiveFormat::Zip => "zip",
 }
 }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Checksum {
 pub kind: String,
 pub hex: String,
}

impl Checksum {
 pub fn parse(spec: &str) -> Option<Self> {
 let (kind, hex) = spec.split_once(':')?;
 Some(Self {
 kind: kind.to_owned(),
 hex: hex.to_owned(),
 })
 }
}

/// A `sources_required` entry: `recursive: true` entries transit further
/// source-dependency edges.
#[derive(Clone, Debug)]
pub struct SourceRequirement {
 pub name: String,
 pub recursive: bool,
}

/// A `tools_required` entry.
#[derive(Clone, Debug)]
pub struct ToolRequirement {
 pub name: String,
 /// `None` means "all stages of the tool".
 pub stages: Option<Vec<String>>,
 pub recursive: bool,
 pub expose: bool,
 pub virtual_kind: Option<String>,
}

/// A `pkgs_required` entry (flat, point 3).
#[derive(Clone, Debug)]
pub struct PkgRequirement {
 pub name: String,
}

/// A `tasks_required` entry.
#[derive(Clone, Debug)]
pub struct TaskRequirement {
 pub name: String,
 pub order_only: bool,
}

#[derive(Clone, Debug, Default)]
pub struct Requirements {
 pub sources: Vec<SourceRequirement>,
 pub tools: Vec<ToolRequirement>,
 pub pkgs: Vec<PkgRequirement>,
 pub tasks: Vec<TaskRequirement>,
}

#[derive(Clone, Debug)]
pub struct Source {
 pub name: String,
 pub subdir: Option<String>,
 pub vcs: VcsDescriptor,
 pub patch_dir: Option<String>,
 pub regenerate: Vec<ScriptStep>,
 pub rolling_version: bool,
 pub requirements: Requirements,
 pub mandate_hashes_for_archives: bool,
}

#[derive(Clone, Debug)]
pub struct ToolStage {
 pub tool: String,
 pub stage: Option<String>,
 pub compile: Vec<ScriptStep>,
 pub install: Vec<ScriptStep>,
 pub requirements_override: Option<Requirements>,
}

impl ToolStage {
 pub fn id(&self) -> SubjectId {
 SubjectId::tool_stage(self.tool.clone(), self.stage.clone())
 }
}

#[derive(Clone, Debug)]
pub struct Tool {
 pub name: String,
 pub architecture: Option<String>,
 pub from_source: String,
 pub stages: Vec<ToolStage>,
 pub exports_shared_libs: bool,
 pub exports_aclocal: bool,
 pub containerless: bool,
 pub stability_level: Option<String>,
 pub labels: Vec<String>,
 pub requirements: Requirements,
}

impl Tool {
 pub fn id(&self) -> SubjectId {
 SubjectId::tool(self.name.clone())
 }

 pub fn default_stage_name(&self) -> Option<&str> {
 self.stages.first().and_then(|s| s.stage.as_deref())
 }
}

#[derive(Clone, Debug, Default)]
pub struct PackageMetadata {
 pub summary: Option<String>,
 pub license: Option<String>,
 pub website: Option<String>,
 pub maintainer: Option<String>,
 pub categories: Vec<String>,
 pub replaces: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct Package {
 pub name: String,
 pub from_source: Option<String>,
 pub architecture: Option<String>,
 pub labels: Vec<String>,
 pub implicit: bool,
 pub configure: Vec<ScriptStep>,
 pub build: Vec<ScriptStep>,
 pub post_install: Vec<ScriptStep>,
 pub requirements: Requirements,
 pub metadata: PackageMetadata,
 pub revision: u32,
}

impl Package {
 pub fn id(&self) -> SubjectId {
 SubjectId::package(self.name.clone())
 }

 pub fn is_noarch(&self) -> bool {
 self.architecture.as_deref() == Some("noarch")
 }
}

#[derive(Clone, Debug)]
pub struct ArtifactFile {
 pub name: String,
 pub path: String,
 pub architecture: Option<String>,
}

#[derive(Clone, Debug)]
pub enum TaskContext {
 Free,
 Package(String),
 Tool(String),
}

#[derive(Clone, Debug)]
pub struct Task {
 pub name: String,
 pub context: TaskContext,
 pub step: ScriptStep,
 pub artifact_files: Vec<ArtifactFile>,
 pub requirements: Requirements,
}

impl Task {
 pub fn id(&self) -> SubjectId {
 let parent = match &self.context {
 TaskContext::Free => None,
 TaskContext::Package(p) => Some(p.clone()),
 TaskContext::Tool(t) => Some(t.clone()),
 };
 SubjectId::task(self.name.clone(), parent)
 }
}

/// A typed subject, covering every kind the graph materializes actions over.
#[derive(Clone, Debug)]
pub enum Subject {
 Source(Source),
 Tool(Tool),
 Package(Package),
 Task(Task),
}

impl Subject {
 pub fn labels(&self) -> &[String] {
 match self {
 Subject::Source(_) | Subject::Task(_) => &[],
 Subject::Tool(t) => &t.labels,
 Subject::Package(p) => &p.labels,
 }
 }

 pub fn name(&self) -> &str {
 match self {
 Subject::Source(s) => &s.name,
 Subject::Tool(t) => &t.name,
 Subject::Package(p) => &p.name,
 Subject::Task(t) => &t.name,
 }
 }
}
