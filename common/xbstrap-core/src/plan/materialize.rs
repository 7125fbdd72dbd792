//! Materialization (C4.1): expands a `wanted` set of
//! [`PlanKey`]s into the full dependency-edge graph, recursively
//! materializing every edge's target, following the action edge table.
//! Grounded on `Plan._materialize_item` in `base.py`.

use std::collections::HashSet;

use anyhow::Result;

use crate::config::Config;
use crate::subject::{Requirements, SubjectId, TaskContext, ToolRequirement};

use super::{Action, ItemMap, PlanItem, PlanKey, SysrootId};

/// `determine_sysroot_id`: only `CONFIGURE_PKG`/`BUILD_PKG`/
/// `REPRODUCE_BUILD_PKG` get an isolated sysroot, derived from the sorted,
/// fully flattened `pkgs_required` closure of `pkg_name`; every other action
/// (and any pkg action at all when `site.isolate_sysroots` is off) uses the
/// shared sysroot.
pub fn determine_sysroot_id(config: &Config, pkg_name: &str) -> SysrootId {
 if !config.site.container.isolate_sysroots {
 return None;
 }
 let mut seen = HashSet::new();
 let mut acc: Vec<String> = Vec::new();
 let mut stack = vec![pkg_name.to_owned()];
 while let Some(name) = stack.pop() {
 let Some(pkg) = config.get_pkg(&name) else {
 continue;
 };
 for req in &pkg.requirements.pkgs {
 if seen.insert(req.name.clone()) {
 acc.push(req.name.clone());
 stack.push(req.name.clone());
 }
 }
 }
 acc.sort();
 Some(acc)
}

/// Builds the [`PlanKey`] for `action` against package `name`, attaching the
/// isolated sysroot id when `action` is one of the three that materialize
/// per-sysroot (`ConfigurePkg`/`BuildPkg`/`ReproduceBuildPkg`) and isolation
/// is enabled; every other pkg action shares the default sysroot.
pub fn pkg_plan_key(config: &Config, action: Action, name: &str) -> PlanKey {
 let sysroot = match action {
 Action::ConfigurePkg | Action::BuildPkg | Action::ReproduceBuildPkg => determine_sysroot_id(config, name),
 _ => None,
 };
 PlanKey::with_sysroot(action, SubjectId::package(name.to_owned()), sysroot)
}

/// Which tools/packages are considered in-scope for a cross build (spec
/// §4.4.1 "Tool-stage requirements resolve..." and §4.4.4 auto-scope).
#[derive(Clone, Debug, Default)]
pub struct Scope {
 pub names: HashSet<String>,
 pub restrict: bool,
 pub pull_out_of_scope: bool,
}

impl Scope {
 pub fn from_site(config: &Config) -> Self {
 let names: HashSet<String> = config.site.build_scope.iter().cloned().collect();
 Self {
 restrict: !names.is_empty(),
 names,
 pull_out_of_scope: config.site.pull_out_of_scope,
 }
 }

 /// Builds an explicit scope, used by the auto-scope pass (§4.4.4) once
 /// it has computed its own member set.
 pub fn explicit(names: HashSet<String>, pull_out_of_scope: bool) -> Self {
 Self {
 restrict: true,
 names,
 pull_out_of_scope,
 }
 }

 pub fn in_scope(&self, name: &str) -> bool {
 !self.restrict || self.names.contains(name)
 }
}

/// (build_edges, require_edges, order_after_edges) for one materialized item.
type Edges = (Vec<PlanKey>, Vec<PlanKey>, Vec<PlanKey>);

fn implicit_pkg_names(config: &Config, excluding: &str) -> Vec<String> {
 config
 .all_pkgs()
 .filter(|p| p.implicit && p.name != excluding)
 .map(|p| p.name.clone())
 .collect()
}

/// Resolves `source_dependencies` recursively, transiting only through
/// `recursive: true` entries.
fn resolve_source_deps(config: &Config, req: &Requirements, acc: &mut Vec<String>, seen: &mut HashSet<String>) {
 for r in &req.sources {
 if seen.insert(r.name.clone()) {
 acc.push(r.name.clone());
 if r.recursive {
 if let Some(src) = config.get_source(&r.name) {
 resolve_source_deps(config, &src.requirements, acc, seen);
 }
 }
 }
 }
}

/// Resolves `tools_required` into a set of (tool, stage) pairs, expanding a
/// stage-less entry to every stage of the tool, skipping `virtual:` entries,
/// and transiting `recursive: true` entries through the named tool's own
/// `tools_required`.
fn resolve_tool_stage_deps(
 config: &Config,
 reqs: &[ToolRequirement],
 acc: &mut Vec<(String, Option<String>)>,
 seen: &mut HashSet<(String, Option<String>)>,
) {
 for r in reqs {
 if r.virtual_kind.is_some() {
 continue;
 }
 let Some(tool) = config.get_tool(&r.name) else {
 continue;
 };
 let stage_names: Vec<Option<String>> = match &r.stages {
 Some(list) => list.iter().cloned().map(Some).collect(),
 None => tool.stages.iter().map(|s| s.stage.clone()).collect(),
 };
 for stage in stage_names {
 if seen.insert((r.name.clone(), stage.clone())) {
 acc.push((r.name.clone(), stage));
 }
 }
 if r.recursive {
 resolve_tool_stage_deps(config, &tool.requirements.tools, acc, seen);
 }
 }
}

/// Pre-populates `build_scope` from every wanted configure/build subject plus
/// every tool/package that already has a build directory on disk (spec
/// §4.4.4). Grounded on `Bootstrapper._compute_auto_scope` in `base.py`,
/// where `auto_pull` in site config implies both auto-scope and
/// `pull_out_of_scope`.
pub fn auto_scope(config: &Config, wanted: &[PlanKey]) -> Scope {
 let mut names: HashSet<String> = HashSet::new();
 for key in wanted {
 if matches!(
 key.action,
 Action::ConfigureTool
 | Action::CompileToolStage
 | Action::ConfigurePkg
 | Action::BuildPkg
 | Action::ReproduceBuildPkg
 ) {
 names.insert(key.subject.name.clone());
 }
 }
 if let Ok(entries) = std::fs::read_dir(&config.layout.tool_builds) {
 for entry in entries.flatten() {
 if let Some(name) = entry.file_name().to_str() {
 if config.get_tool(name).is_some() {
 names.insert(name.to_owned());
 }
 }
 }
 }
 if let Ok(entries) = std::fs::read_dir(&config.layout.pkg_builds) {
 for entry in entries.flatten() {
 if let Some(name) = entry.file_name().to_str() {
 if config.get_pkg(name).is_some() {
 names.insert(name.to_owned());
 }
 }
 }
 }
 Scope::explicit(names, config.site.pull_out_of_scope)
}

pub struct Materializer<'a> {
 config: &'a Config,
 scope: &'a Scope,
 items: ItemMap,
}

impl<'a> Materializer<'a> {
 pub fn new(config: &'a Config, scope: &'a Scope) -> Self {
 Self {
 config,
 scope,
 items: ItemMap::new(),
 }
 }

 pub fn materialize(mut self, wanted: &[PlanKey]) -> Result<ItemMap> {
 for key in wanted {
 self.ensure(key.clone())?;
 }
 Ok(self.items)
 }

 fn ensure(&mut self, key: PlanKey) -> Result<()> {
 if self.items.contains_key(&key) {
 return Ok(());
 }
 // Insert a placeholder before recursing so a cyclic edge set
 // terminates here; the ordering pass is the authority on cycle
 // detection/reporting, not materialization.
 self.items.insert(key.clone(), PlanItem::new(key.clone()));

 let (build, require, order_after) = self.edges_for(&key)?;
 for edge in build.iter().chain(require.iter()).chain(order_after.iter()) {
 self.ensure(edge.clone())?;
 }
 if let Some(item) = self.items.get_mut(&key) {
 item.build_edges = build;
 item.require_edges = require;
 item.order_after_edges = order_after;
 }
 Ok(())
 }

 fn want_or_pull_tool(&self, tool: &str, stage: Option<String>) -> PlanKey {
 if self.scope.pull_out_of_scope {
 PlanKey::new(Action::PullArchive, SubjectId::tool(tool))
 } else {
 PlanKey::new(Action::WantTool, SubjectId::tool_stage(tool, stage))
 }
 }

 fn want_or_pull_pkg(&self, pkg: &str) -> PlanKey {
 if self.scope.pull_out_of_scope {
 PlanKey::new(Action::PullPkgPack, SubjectId::package(pkg))
 } else {
 PlanKey::new(Action::WantPkg, SubjectId::package(pkg))
 }
 }

 /// `tools(S)` column: resolved tool-stage requirements, substituting
 /// WANT/PULL sentinels for tools outside `build_scope`.
 fn tool_require_edges(&self, reqs: &[ToolRequirement]) -> Vec<PlanKey> {
 let mut pairs = Vec::new();
 let mut seen = HashSet::new();
 resolve_tool_stage_deps(self.config, reqs, &mut pairs, &mut seen);
 pairs
 .into_iter()
 .map(|(tool, stage)| {
 if self.scope.in_scope(&tool) {
 PlanKey::new(Action::InstallToolStage, SubjectId::tool_stage(tool, stage))
 } else {
 self.want_or_pull_tool(&tool, stage)
 }
 })
 .collect()
 }

 fn pkg_require_edges(&self, names: impl IntoIterator<Item = String>) -> Vec<PlanKey> {
 names
 .into_iter()
 .map(|name| {
 if self.scope.in_scope(&name) {
 PlanKey::new(Action::InstallPkg, SubjectId::package(name))
 } else {
 self.want_or_pull_pkg(&name)
 }
 })
 .collect()
 }

 fn source_require_edges(&self, reqs: &Requirements) -> Vec<PlanKey> {
 let mut names = Vec::new();
 let mut seen = HashSet::new();
 resolve_source_deps(self.config, reqs, &mut names, &mut seen);
 names
 .into_iter()
 .map(|name| PlanKey::new(Action::RegenerateSrc, SubjectId::source(name)))
 .collect()
 }

 fn task_edges(&self, reqs: &Requirements) -> (Vec<PlanKey>, Vec<PlanKey>) {
 let mut require = Vec::new();
 let mut order_after = Vec::new();
 for r in &reqs.tasks {
 let Some(task) = self.config.find_task(&r.name) else {
 continue;
 };
 let parent = match &task.context {
 TaskContext::Free => None,
 TaskContext::Package(p) => Some(p.clone()),
 TaskContext::Tool(t) => Some(t.clone()),
 };
 let key = PlanKey::new(Action::Run, SubjectId::task(task.name.clone(), parent));
 if r.order_only {
 order_after.push(key);
 } else {
 require.push(key);
 }
 }
 (require, order_after)
 }

 /// Full require-edge set for a subject with the "sources, implicit pkgs,
 /// pkgs, tools, tasks" column shape shared by CONFIGURE_TOOL,
 /// CONFIGURE_PKG/BUILD_PKG, and RUN*.
 fn full_requirement_edges(&self, subject_name: &str, reqs: &Requirements, with_sources: bool) -> Edges {
 let mut require = Vec::new();
 if with_sources {
 require.extend(self.source_require_edges(reqs));
 }
 let implicit = implicit_pkg_names(self.config, subject_name);
 let own_pkgs: Vec<String> = reqs.pkgs.iter().map(|r| r.name.clone()).collect();
 require.extend(self.pkg_require_edges(implicit.into_iter().chain(own_pkgs)));
 require.extend(self.tool_require_edges(&reqs.tools));
 let (task_require, order_after) = self.task_edges(reqs);
 require.extend(task_require);
 (Vec::new(), require, order_after)
 }

 fn edges_for(&self, key: &PlanKey) -> Result<Edges> {
 let subject = &key.subject;
 let empty = || (Vec::new(), Vec::new(), Vec::new());
 Ok(match key.action {
 Action::FetchSrc | Action::MirrorSrc | Action::WantTool | Action::WantPkg | Action::Null => empty(),

 Action::CheckoutSrc => (
 vec![PlanKey::new(Action::FetchSrc, subject.clone())],
 Vec::new(),
 Vec::new(),
 ),

 Action::PatchSrc => (
 vec![PlanKey::new(Action::CheckoutSrc, subject.clone())],
 Vec::new(),
 Vec::new(),
 ),

 Action::RegenerateSrc => {
 let build = vec![PlanKey::new(Action::PatchSrc, subject.clone())];
 let Some(src) = self.config.get_source(&subject.name) else {
 return Ok((build, Vec::new(), Vec::new()));
 };
 let mut require = self.source_require_edges(&src.requirements);
 require.extend(self.tool_require_edges(&src.requirements.tools));
 (build, require, Vec::new())
 }

 Action::ConfigureTool => {
 let Some(tool) = self.config.get_tool(&subject.name) else {
 return Ok(empty());
 };
 let build = vec![PlanKey::new(Action::RegenerateSrc, SubjectId::source(tool.from_source.clone()))];
 let (_, require, order_after) = self.full_requirement_edges(&tool.name, &tool.requirements, true);
 (build, require, order_after)
 }

 Action::CompileToolStage => {
 let Some(tool) = self.config.get_tool(&subject.name) else {
 return Ok(empty());
 };
 let stage = tool
 .stages
 .iter()
 .find(|s| s.stage == subject.stage)
 .unwrap_or(&tool.stages[0]);
 let build = vec![PlanKey::new(Action::ConfigureTool, SubjectId::tool(tool.name.clone()))];
 let (_, mut require, order_after) = self.full_requirement_edges(&tool.name, &tool.requirements, true);
 if let Some(overrides) = &stage.requirements_override {
 require.extend(self.tool_require_edges(&overrides.tools));
 }
 (build, require, order_after)
 }

 Action::InstallToolStage => {
 let Some(tool) = self.config.get_tool(&subject.name) else {
 return Ok(empty());
 };
 let stage = tool
 .stages
 .iter()
 .find(|s| s.stage == subject.stage)
 .unwrap_or(&tool.stages[0]);
 let build = vec![PlanKey::new(Action::CompileToolStage, subject.clone())];
 let (_, mut require, order_after) = self.full_requirement_edges(&tool.name, &tool.requirements, false);
 if let Some(overrides) = &stage.requirements_override {
 require.extend(self.tool_require_edges(&overrides.tools));
 }
 (build, require, order_after)
 }

 Action::ConfigurePkg => {
 let Some(pkg) = self.config.get_pkg(&subject.name) else {
 return Ok(empty());
 };
 let src = pkg.from_source.clone().unwrap_or_else(|| pkg.name.clone());
 let build = vec![PlanKey::new(Action::RegenerateSrc, SubjectId::source(src))];
 let (_, require, order_after) = self.full_requirement_edges(&pkg.name, &pkg.requirements, true);
 (build, require, order_after)
 }

 Action::BuildPkg | Action::ReproduceBuildPkg => {
 let Some(pkg) = self.config.get_pkg(&subject.name) else {
 return Ok(empty());
 };
 let build = vec![pkg_plan_key(self.config, Action::ConfigurePkg, &subject.name)];
 let (_, require, order_after) = self.full_requirement_edges(&pkg.name, &pkg.requirements, true);
 (build, require, order_after)
 }

 Action::PackPkg => (
 vec![pkg_plan_key(self.config, Action::BuildPkg, &subject.name)],
 Vec::new(),
 Vec::new(),
 ),
 Action::ReproducePackPkg => (
 vec![pkg_plan_key(self.config, Action::ReproduceBuildPkg, &subject.name)],
 Vec::new(),
 Vec::new(),
 ),

 Action::InstallPkg => {
 let uses_pkg_backend = self.config.site.pkg_format.is_some();
 let mut build = Vec::new();
 if self.scope.in_scope(&subject.name) {
 build.push(if uses_pkg_backend {
 PlanKey::new(Action::PackPkg, subject.clone())
 } else {
 pkg_plan_key(self.config, Action::BuildPkg, &subject.name)
 });
 } else {
 build.push(self.want_or_pull_pkg(&subject.name));
 }
 let require = match self.config.get_pkg(&subject.name) {
 Some(pkg) => {
 let implicit = implicit_pkg_names(self.config, &pkg.name);
 let own: Vec<String> = pkg.requirements.pkgs.iter().map(|r| r.name.clone()).collect();
 self.pkg_require_edges(implicit.into_iter().chain(own))
 }
 None => Vec::new(),
 };
 (build, require, Vec::new())
 }

 Action::ArchiveTool => {
 let Some(tool) = self.config.get_tool(&subject.name) else {
 return Ok(empty());
 };
 let build = tool
 .stages
 .iter()
 .map(|s| PlanKey::new(Action::InstallToolStage, s.id()))
 .collect();
 (build, Vec::new(), Vec::new())
 }

 Action::ArchivePkg => (
 vec![pkg_plan_key(self.config, Action::BuildPkg, &subject.name)],
 Vec::new(),
 Vec::new(),
 ),

 Action::PullPkgPack | Action::PullArchive => empty(),

 Action::Run => {
 let task = self
 .config
 .get_task(&subject.name, subject.parent.as_deref())
 .or_else(|| self.config.find_task(&subject.name));
 let Some(task) = task else {
 return Ok(empty());
 };
 let mut build = Vec::new();
 match &task.context {
 TaskContext::Package(pkg) => build.push(pkg_plan_key(self.config, Action::BuildPkg, pkg)),
 TaskContext::Tool(tool) => {
 if let Some(t) = self.config.get_tool(tool) {
 build.extend(
 t.stages
 .iter()
 .map(|s| PlanKey::new(Action::CompileToolStage, s.id())),
 );
 }
 }
 TaskContext::Free => {}
 }
 let (_, require, order_after) = self.full_requirement_edges(&task.name, &task.requirements, true);
 (build, require, order_after)
 }

 // RUN_PKG/RUN_TOOL are the pkg-/tool-scoped flavors of RUN,
 // sharing the same edge shape keyed off the owning subject.
 Action::RunPkg => (
 vec![pkg_plan_key(self.config, Action::BuildPkg, &subject.name)],
 Vec::new(),
 Vec::new(),
 ),
 Action::RunTool => {
 let build = match self.config.get_tool(&subject.name) {
 Some(tool) => tool
 .stages
 .iter()
 .map(|s| PlanKey::new(Action::CompileToolStage, s.id()))
 .collect(),
 None => Vec::new(),
 };
 (build, Vec::new(), Vec::new())
 }
 })
 }
}
