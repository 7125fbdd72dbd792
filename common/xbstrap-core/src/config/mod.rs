//! Config Model (C1): loads a rooted configuration tree with imports,
//! resolves options/labels/directory layout, and exposes the typed subject
//! graph by id.

mod convert;
mod layout;
mod raw;
mod vars;

pub use layout::Layout;
pub use vars::replace_at_vars;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::de::Error as _;

use crate::error::ConfigError;
use crate::subject::{
 Package, PackageMetadata, Requirements, Source, SubjectId, SubjectKind, Task, TaskContext,
 Tool, ToolStage,
};

use raw::{RawCommitsConfig, RawManifest, RawSiteConfig};

#[derive(Clone, Debug, Default)]
pub struct ContainerSettings {
 pub runtime: Option<String>,
 pub image: Option<String>,
 pub src_mount: Option<String>,
 pub build_mount: Option<String>,
 pub rootfs: Option<String>,
 pub allow_containerless: bool,
 pub isolate_sysroots: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SiteConfig {
 pub match_labels: Vec<String>,
 pub ban_labels: Vec<String>,
 pub container: ContainerSettings,
 pub pkg_format: Option<String>,
 pub auto_pull: bool,
 pub build_scope: Vec<String>,
 pub pull_out_of_scope: bool,
}

impl SiteConfig {
 /// Conjunctive label filtering (resolved Open Question: `match` entries
 /// are an AND, not an OR): a subject is eligible only if every `match`
 /// label is present and no `ban` label is present.
 pub fn is_eligible(&self, labels: &[String]) -> bool {
 let has = |needle: &str| labels.iter().any(|l| l == needle);
 if self.match_labels.iter().any(|l| !has(l)) {
 return false;
 }
 if self.ban_labels.iter().any(|l| has(l)) {
 return false;
 }
 true
 }
}

#[derive(Clone, Debug, Default)]
pub struct CommitEntry {
 pub fixed_commit: Option<String>,
 pub rolling_id: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct CommitsConfig {
 pub entries: BTreeMap<String, CommitEntry>,
 pub xbstrap_mirror: Option<String>,
}

pub struct Config {
 pub layout: Layout,
 pub options: BTreeMap<String, Option<String>>,
 pub sources: Vec<Source>,
 pub tools: Vec<Tool>,
 pub packages: Vec<Package>,
 pub tasks: Vec<Task>,
 pub site: SiteConfig,
 pub commits: CommitsConfig,
 pub patch_author: String,
 pub patch_email: String,
 source_index: HashMap<String, usize>,
 tool_index: HashMap<String, usize>,
 pkg_index: HashMap<String, usize>,
 task_index: HashMap<(String, Option<String>), usize>,
}

struct Accumulated {
 options: Vec<raw::RawOptionDecl>,
 sources: Vec<raw::RawSource>,
 tools: Vec<raw::RawTool>,
 packages: Vec<raw::RawPackage>,
 tasks: Vec<raw::RawTask>,
 directories: layout::RawDirectories,
}

fn parse_manifest(path: &Path) -> Result<RawManifest, ConfigError> {
 let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
 path: path.to_owned(),
 source: serde_yaml::Error::custom(e.to_string()),
 })?;
 serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
 path: path.to_owned(),
 source: e,
 })
}

fn load_optional<T: Default + serde::de::DeserializeOwned>(
 path: &Path,
) -> Result<T, ConfigError> {
 if !path.exists() {
 return Ok(T::default());
 }
 let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Parse {
 path: path.to_owned(),
 source: serde_yaml::Error::custom(e.to_string()),
 })?;
 serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
 path: path.to_owned(),
 source: e,
 })
}

fn filter_by_allowlist<T>(
 items: Vec<T>,
 name_of: impl Fn(&T) -> &str,
 all: bool,
 allow: &Option<Vec<String>>,
) -> Vec<T> {
 if all {
 return items;
 }
 match allow {
 None => Vec::new(),
 Some(names) => items
 .into_iter()
 .filter(|item| names.iter().any(|n| n == name_of(item)))
 .collect(),
 }
}

fn gather_imports(
 source_root: &Path,
 imports: &[raw::RawImport],
 acc: &mut Accumulated,
) -> Result<(), ConfigError> {
 for import in imports {
 match import {
 raw::RawImport::File { file } => {
 let path = source_root.join(file);
 let fragment = parse_manifest(&path)?;
 if !fragment.imports.is_empty() {
 return Err(ConfigError::NestedImport {
 path: path.clone(),
 nested: source_root.join(&fragment.imports[0].describe()),
 });
 }
 acc.options.extend(fragment.options);
 acc.sources.extend(fragment.sources);
 acc.tools.extend(fragment.tools);
 acc.packages.extend(fragment.packages);
 acc.tasks.extend(fragment.tasks);
 }
 raw::RawImport::Root(root) => {
 let path = source_root.join(&root.from);
 let fragment = parse_manifest(&path)?;
 if !fragment.imports.is_empty() {
 return Err(ConfigError::NestedImport {
 path: path.clone(),
 nested: source_root.join(&fragment.imports[0].describe()),
 });
 }
 acc.sources.extend(filter_by_allowlist(
 fragment.sources,
 |s| s.name.as_str(),
 root.all_sources,
 &root.sources,
 ));
 acc.tools.extend(filter_by_allowlist(
 fragment.tools,
 |t| t.name.as_str(),
 root.all_tools,
 &root.tools,
 ));
 acc.packages.extend(filter_by_allowlist(
 fragment.packages,
 |p| p.name.as_str(),
 root.all_packages,
 &root.packages,
 ));
 acc.tasks.extend(fragment.tasks);
 }
 }
 }
 Ok(())
}

fn build_requirements(
 sources: &[raw::RawRequirement],
 tools: &[raw::RawRequirement],
 pkgs: &[raw::RawRequirement],
 tasks: &[raw::RawRequirement],
) -> Requirements {
 Requirements {
 sources: convert::to_source_requirements(sources),
 tools: convert::to_tool_requirements(tools),
 pkgs: convert::to_pkg_requirements(pkgs),
 tasks: convert::to_task_requirements(tasks),
 }
}

impl Config {
 pub fn load(build_root: &Path) -> Result<Config, ConfigError> {
 let manifest_path =
 layout::resolve_bootstrap_link(build_root).map_err(|e| ConfigError::Parse {
 path: build_root.join("bootstrap.link"),
 source: serde_yaml::Error::custom(e.to_string()),
 })?;
 let source_root = manifest_path
 .parent()
 .map(Path::to_path_buf)
 .unwrap_or_else(|| build_root.to_path_buf());
 let root = parse_manifest(&manifest_path)?;

 let mut acc = Accumulated {
 options: root.options,
 sources: root.sources,
 tools: root.tools,
 packages: root.packages,
 tasks: root.tasks,
 directories: root.general.directories,
 };
 gather_imports(&source_root, &root.imports, &mut acc)?;

 let site: RawSiteConfig = load_optional(&build_root.join("bootstrap-site.yml"))?;
 let commits_raw: RawCommitsConfig =
 load_optional(&build_root.join("bootstrap-commits.yml"))?;

 let mut options: BTreeMap<String, Option<String>> = acc
 .options
 .iter()
 .map(|o| (o.name.clone(), o.default.clone()))
 .collect();
 for (name, value) in &site.define_options {
 options.insert(name.clone(), Some(value.clone()));
 }

 let layout = Layout::new(build_root.to_path_buf(), source_root, &acc.directories);

 let mut sources = Vec::with_capacity(acc.sources.len());
 let mut source_index = HashMap::new();
 for raw_src in &acc.sources {
 if source_index.contains_key(&raw_src.name) {
 return Err(ConfigError::DuplicateSubject {
 kind: "source",
 name: raw_src.name.clone(),
 });
 }
 let vcs = convert::to_vcs(&raw_src.name, &raw_src.vcs)?;
 if raw_src.mandate_hashes_for_archives {
 if let crate::subject::VcsDescriptor::Url { checksum: None, .. } = &vcs {
 return Err(ConfigError::MissingChecksum {
 name: raw_src.name.clone(),
 });
 }
 }
 source_index.insert(raw_src.name.clone(), sources.len());
 sources.push(Source {
 name: raw_src.name.clone(),
 subdir: raw_src.subdir.clone(),
 vcs,
 patch_dir: raw_src.patch_path.clone(),
 regenerate: convert::to_steps(&raw_src.regenerate),
 rolling_version: raw_src.rolling_version,
 requirements: build_requirements(
 &raw_src.source_dependencies,
 &raw_src.tools_required,
 &[],
 &[],
 ),
 mandate_hashes_for_archives: raw_src.mandate_hashes_for_archives,
 });
 }

 let mut tools = Vec::with_capacity(acc.tools.len());
 let mut tool_index = HashMap::new();
 for raw_tool in &acc.tools {
 if tool_index.contains_key(&raw_tool.name) {
 return Err(ConfigError::DuplicateSubject {
 kind: "tool",
 name: raw_tool.name.clone(),
 });
 }
 let from_source = raw_tool.from_source.clone().ok_or_else(|| {
 ConfigError::UnknownReference {
 referrer: raw_tool.name.clone(),
 kind: "source (from_source)",
 name: "<unset>".to_owned(),
 }
 })?;
 let stages: Vec<ToolStage> = if raw_tool.stages.is_empty() {
 vec![ToolStage {
 tool: raw_tool.name.clone(),
 stage: None,
 compile: convert::to_steps(&raw_tool.compile),
 install: convert::to_steps(&raw_tool.install),
 requirements_override: None,
 }]
 } else {
 raw_tool
 .stages
 .iter()
 .map(|s| ToolStage {
 tool: raw_tool.name.clone(),
 stage: s.name.clone(),
 compile: convert::to_steps(&s.compile),
 install: convert::to_steps(&s.install),
 requirements_override: s
 .tools_required
 .as_ref()
 .map(|reqs| build_requirements(&[], reqs, &[], &[])),
 })
 .collect()
 };
 tool_index.insert(raw_tool.name.clone(), tools.len());
 tools.push(Tool {
 name: raw_tool.name.clone(),
 architecture: raw_tool.architecture.clone(),
 from_source,
 stages,
 exports_shared_libs: raw_tool.exports_shared_libs,
 exports_aclocal: raw_tool.exports_aclocal,
 containerless: raw_tool.containerless,
 stability_level: raw_tool.stability_level.clone(),
 labels: raw_tool.labels.clone(),
 requirements: build_requirements(
 &[],
 &raw_tool.tools_required,
 &raw_tool.pkgs_required,
 &raw_tool.tasks_required,
 ),
 });
 }

 let mut packages = Vec::with_capacity(acc.packages.len());
 let mut pkg_index = HashMap::new();
 for raw_pkg in &acc.packages {
 if pkg_index.contains_key(&raw_pkg.name) {
 return Err(ConfigError::DuplicateSubject {
 kind: "pkg",
 name: raw_pkg.name.clone(),
 });
 }
 raw_pkg.from_source.clone().ok_or_else(|| ConfigError::UnknownReference {
 referrer: raw_pkg.name.clone(),
 kind: "source (from_source)",
 name: "<unset>".to_owned(),
 })?;
 let revision = raw_pkg.revision.unwrap_or(1);
 if revision < 1 {
 return Err(ConfigError::InvalidRevision(raw_pkg.name.clone()));
 }
 pkg_index.insert(raw_pkg.name.clone(), packages.len());
 packages.push(Package {
 name: raw_pkg.name.clone(),
 from_source: raw_pkg.from_source.clone(),
 architecture: raw_pkg.architecture.clone(),
 labels: raw_pkg.labels.clone(),
 implicit: raw_pkg.implicit,
 configure: convert::to_steps(&raw_pkg.configure),
 build: convert::to_steps(&raw_pkg.build),
 post_install: convert::to_steps(&raw_pkg.scripts.post_install),
 requirements: build_requirements(
 &raw_pkg.source_dependencies,
 &raw_pkg.tools_required,
 &raw_pkg.pkgs_required,
 &raw_pkg.tasks_required,
 ),
 metadata: PackageMetadata {
 summary: raw_pkg.metadata.summary.clone(),
 license: raw_pkg.metadata.license.clone(),
 website: raw_pkg.metadata.website.clone(),
 maintainer: raw_pkg.metadata.maintainer.clone(),
 categories: raw_pkg.metadata.categories.clone(),
 replaces: raw_pkg.metadata.replaces.clone(),
 },
 revision,
 });
 }

 let mut tasks = Vec::with_capacity(acc.tasks.len());
 let mut task_index = HashMap::new();
 for raw_task in &acc.tasks {
 let context = match (&raw_task.pkg, &raw_task.tool) {
 (Some(p), None) => TaskContext::Package(p.clone()),
 (None, Some(t)) => TaskContext::Tool(t.clone()),
 (None, None) => TaskContext::Free,
 (Some(_), Some(_)) => {
 return Err(ConfigError::UnknownReference {
 referrer: raw_task.name.clone(),
 kind: "task context (pkg and tool both set)",
 name: raw_task.name.clone(),
 })
 }
 };
 let parent = match &context {
 TaskContext::Free => None,
 TaskContext::Package(p) => Some(p.clone()),
 TaskContext::Tool(t) => Some(t.clone()),
 };
 let key = (raw_task.name.clone(), parent);
 if task_index.contains_key(&key) {
 return Err(ConfigError::DuplicateSubject {
 kind: "task",
 name: raw_task.name.clone(),
 });
 }
 task_index.insert(key, tasks.len());
 tasks.push(Task {
 name: raw_task.name.clone(),
 context,
 step: convert::to_step(&raw_task.step),
 artifact_files: raw_task
 .artifact_files
 .iter()
 .map(|a| crate::subject::ArtifactFile {
 name: a.name.clone(),
 path: a.path.clone(),
 architecture: a.architecture.clone(),
 })
 .collect(),
 requirements: build_requirements(
 &raw_task.source_dependencies,
 &raw_task.tools_required,
 &raw_task.pkgs_required,
 &raw_task.tasks_required,
 ),
 });
 }

 let mut entries = BTreeMap::new();
 for (name, raw_entry) in &commits_raw.commits {
 let rolling_id = match &raw_entry.rolling_id {
 None => None,
 Some(s) => Some(
 s.parse::<u64>()
 .map_err(|_| ConfigError::InvalidRollingId(name.clone()))?,
 ),
 };
 entries.insert(
 name.clone(),
 CommitEntry {
 fixed_commit: raw_entry.fixed_commit.clone(),
 rolling_id,
 },
 );
 }

 let config = Config {
 layout,
 options,
 sources,
 tools,
 packages,
 tasks,
 site: SiteConfig {
 match_labels: site.labels.match_labels,
 ban_labels: site.labels.ban,
 container: ContainerSettings {
 runtime: site.container.runtime,
 image: site.container.image,
 src_mount: site.container.src_mount,
 build_mount: site.container.build_mount,
 rootfs: site.container.rootfs,
 allow_containerless: site.container.allow_containerless,
 isolate_sysroots: site.container.isolate_sysroots,
 },
 pkg_format: site.pkg_management.format,
 auto_pull: site.auto_pull,
 build_scope: site.build_scope,
 pull_out_of_scope: site.pull_out_of_scope,
 },
 commits: CommitsConfig {
 entries,
 xbstrap_mirror: commits_raw.general.xbstrap_mirror,
 },
 patch_author: root.general.patch_author.clone().unwrap_or_else(|| "xbstrap".to_owned()),
 patch_email: root
 .general
 .patch_email
 .clone()
 .unwrap_or_else(|| "xbstrap@localhost".to_owned()),
 source_index,
 tool_index,
 pkg_index,
 task_index,
 };

 config.validate_references()?;
 config.validate_build_dag()?;
 Ok(config)
 }

 fn validate_references(&self) -> Result<(), ConfigError> {
 let check_source = |referrer: &str, name: &str| -> Result<(), ConfigError> {
 if self.source_index.contains_key(name) {
 Ok(())
 } else {
 Err(ConfigError::UnknownReference {
 referrer: referrer.to_owned(),
 kind: "source",
 name: name.to_owned(),
 })
 }
 };
 let check_tool = |referrer: &str, name: &str| -> Result<(), ConfigError> {
 if self.tool_index.contains_key(name) {
 Ok(())
 } else {
 Err(ConfigError::UnknownReference {
 referrer: referrer.to_owned(),
 kind: "tool",
 name: name.to_owned(),
 })
 }
 };
 let check_pkg = |referrer: &str, name: &str| -> Result<(), ConfigError> {
 if self.pkg_index.contains_key(name) {
 Ok(())
 } else {
 Err(ConfigError::UnknownReference {
 referrer: referrer.to_owned(),
 kind: "pkg",
 name: name.to_owned(),
 })
 }
 };

 for src in &self.sources {
 for req in &src.requirements.sources {
 check_source(&src.name, &req.name)?;
 }
 for req in &src.requirements.tools {
 check_tool(&src.name, &req.name)?;
 }
 }
 for tool in &self.tools {
 check_source(&tool.name, &tool.from_source)?;
 for req in &tool.requirements.tools {
 check_tool(&tool.name, &req.name)?;
 }
 for req in &tool.requirements.pkgs {
 check_pkg(&tool.name, &req.name)?;
 }
 }
 for pkg in &self.packages {
 if let Some(src) = &pkg.from_source {
 check_source(&pkg.name, src)?;
 }
 for req in &pkg.requirements.sources {
 check_source(&pkg.name, &req.name)?;
 }
 for req in &pkg.requirements.tools {
 check_tool(&pkg.name, &req.name)?;
 }
 for req in &pkg.requirements.pkgs {
 check_pkg(&pkg.name, &req.name)?;
 }
 }
 let check_task = |referrer: &str, name: &str| -> Result<(), ConfigError> {
 if self.find_task(name).is_some() {
 Ok(())
 } else {
 Err(ConfigError::UnknownReference {
 referrer: referrer.to_owned(),
 kind: "task",
 name: name.to_owned(),
 })
 }
 };
 for task in &self.tasks {
 for req in &task.requirements.sources {
 check_source(&task.name, &req.name)?;
 }
 for req in &task.requirements.tools {
 check_tool(&task.name, &req.name)?;
 }
 for req in &task.requirements.pkgs {
 check_pkg(&task.name, &req.name)?;
 }
 for req in &task.requirements.tasks {
 check_task(&task.name, &req.name)?;
 }
 }
 for tool in &self.tools {
 for req in &tool.requirements.tasks {
 check_task(&tool.name, &req.name)?;
 }
 }
 for pkg in &self.packages {
 for req in &pkg.requirements.tasks {
 check_task(&pkg.name, &req.name)?;
 }
 }
 Ok(())
 }

 /// Cycle check over build edges only (tool/pkg -> source, tool -> tool,
 /// pkg -> pkg, pkg -> tool, source -> source): the shape the design calls a
 /// DAG invariant. The actual topological sort used to drive execution
 /// lives in the Plan Engine's ordering pass and re-derives cycles there
 /// too, since materialization can introduce scope-dependent edges this
 /// static pass does not see.
 fn validate_build_dag(&self) -> Result<(), ConfigError> {
 #[derive(Clone, Copy, PartialEq, Eq, Hash)]
 enum Color {
 White,
 Gray,
 Black,
 }

 let mut nodes: HashMap<SubjectId, Vec<SubjectId>> = HashMap::new();
 for src in &self.sources {
 let id = SubjectId::source(src.name.clone());
 let edges = src
 .requirements
 .sources
 .iter()
 .map(|r| SubjectId::source(r.name.clone()))
 .collect();
 nodes.insert(id, edges);
 }
 for tool in &self.tools {
 let id = SubjectId::tool(tool.name.clone());
 let mut edges = vec![SubjectId::source(tool.from_source.clone())];
 edges.extend(tool.requirements.tools.iter().map(|r| SubjectId::tool(r.name.clone())));
 nodes.insert(id, edges);
 }
 for pkg in &self.packages {
 let id = SubjectId::package(pkg.name.clone());
 let mut edges: Vec<SubjectId> = pkg
 .from_source
 .iter()
 .map(|s| SubjectId::source(s.clone()))
 .collect();
 edges.extend(pkg.requirements.tools.iter().map(|r| SubjectId::tool(r.name.clone())));
 edges.extend(pkg.requirements.pkgs.iter().map(|r| SubjectId::package(r.name.clone())));
 nodes.insert(id, edges);
 }

 let mut colors: HashMap<SubjectId, Color> = HashMap::new();
 let mut stack_path: Vec<SubjectId> = Vec::new();

 fn visit(
 id: &SubjectId,
 nodes: &HashMap<SubjectId, Vec<SubjectId>>,
 colors: &mut HashMap<SubjectId, Color>,
 stack_path: &mut Vec<SubjectId>,
 ) -> Result<(), ConfigError> {
 match colors.get(id) {
 Some(Color::Black) => return Ok(()),
 Some(Color::Gray) => {
 let mut path: Vec<String> = stack_path.iter().map(|s| s.to_string()).collect();
 path.push(id.to_string());
 return Err(ConfigError::Cycle(path.join(" -> ")));
 }
 _ => {}
 }
 colors.insert(id.clone(), Color::Gray);
 stack_path.push(id.clone());
 if let Some(edges) = nodes.get(id) {
 for next in edges {
 if nodes.contains_key(next) {
 visit(next, nodes, colors, stack_path)?;
 }
 }
 }
 stack_path.pop();
 colors.insert(id.clone(), Color::Black);
 Ok(())
 }

 let keys: Vec<SubjectId> = nodes.keys().cloned().collect();
 for id in keys {
 visit(&id, &nodes, &mut colors, &mut stack_path)?;
 }
 Ok(())
 }

 pub fn get_source(&self, name: &str) -> Option<&Source> {
 self.source_index.get(name).map(|&i| &self.sources[i])
 }

 pub fn get_tool(&self, name: &str) -> Option<&Tool> {
 let tool = self.tool_index.get(name).map(|&i| &self.tools[i])?;
 self.site.is_eligible(&tool.labels).then_some(tool)
 }

 pub fn get_pkg(&self, name: &str) -> Option<&Package> {
 let pkg = self.pkg_index.get(name).map(|&i| &self.packages[i])?;
 self.site.is_eligible(&pkg.labels).then_some(pkg)
 }

 pub fn get_task(&self, name: &str, parent: Option<&str>) -> Option<&Task> {
 let key = (name.to_owned(), parent.map(str::to_owned));
 self.task_index.get(&key).map(|&i| &self.tasks[i])
 }

 /// Looks a task up by name alone, for `tasks_required` entries (which
 /// carry only a bare name, not the owning package/tool).
 pub fn find_task(&self, name: &str) -> Option<&Task> {
 self.tasks.iter().find(|t| t.name == name)
 }

 pub fn all_tools(&self) -> impl Iterator<Item = &Tool> {
 self.tools.iter().filter(|t| self.site.is_eligible(&t.labels))
 }

 pub fn all_pkgs(&self) -> impl Iterator<Item = &Package> {
 self.packages.iter().filter(|p| self.site.is_eligible(&p.labels))
 }

 pub fn option(&self, name: &str) -> Option<&str> {
 self.options.get(name).and_then(|v| v.as_deref())
 }

 pub fn rolling_id(&self, name: &str) -> Option<u64> {
 self.commits.entries.get(name).and_then(|e| e.rolling_id)
 }

 /// Every name that is a declared subject of the given kind, regardless
 /// of label eligibility — used by dependency validation, which must
 /// reject references to banned subjects rather than silently treating
 /// them as missing.
 pub fn known_names(&self, kind: SubjectKind) -> HashSet<&str> {
 match kind {
 SubjectKind::Source => self.sources.iter().map(|s| s.name.as_str()).collect(),
 SubjectKind::Tool | SubjectKind::ToolStage => {
 self.tools.iter().map(|t| t.name.as_str()).collect()
 }
 SubjectKind::Package => self.packages.iter().map(|p| p.name.as_str()).collect(),
 SubjectKind::Task => self.tasks.iter().map(|t| t.name.as_str()).collect(),
 }
 }
}

impl raw::RawImport {
 fn describe(&self) -> String {
 match self {
 raw::RawImport::File { file } => file.clone(),
 raw::RawImport::Root(r) => r.from.clone(),
 }
 }
}
