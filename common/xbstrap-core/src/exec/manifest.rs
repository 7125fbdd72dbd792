//! Manifest assembly: folds a subject's resolved
//! tool closure, virtual tool shims, and environment overlay into a
//! self-contained [`Manifest`] a [`crate::backends::ContainerRuntime`] can
//! run without any further knowledge of the config model.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::process::Command;

use crate::config::{replace_at_vars, Config, SiteConfig};
use crate::error::ConfigError;
use crate::subject::{Args, Requirements, ScriptStep, ToolRequirement, VcsDescriptor};

use super::virtual_tools::{write_virtual_bin, VirtualTool};

#[derive(Clone, Debug)]
pub enum StepContext {
 Source { name: String },
 ToolStage { tool: String, stage: Option<String> },
 Package { name: String },
 Task { name: String },
}

#[derive(Clone, Debug)]
pub struct Manifest {
 pub context: StepContext,
 pub subject_key: String,
 pub args: Args,
 pub workdir: PathBuf,
 pub environ: BTreeMap<String, String>,
 pub source_root: PathBuf,
 pub build_root: PathBuf,
 pub container_src_mount: PathBuf,
 pub container_build_mount: PathBuf,
 pub sysroot_mount: Option<PathBuf>,
 pub container_sysroot_mount: PathBuf,
 pub isolate_network: bool,
 pub quiet: bool,
 pub cargo_home: bool,
 pub source_date_epoch: Option<i64>,
}

struct ResolvedTool {
 name: String,
 prefix: PathBuf,
 exports_shared_libs: bool,
 exports_aclocal: bool,
}

fn tool_closure(config: &Config, requirements: &[ToolRequirement]) -> Vec<ResolvedTool> {
 let mut seen = HashSet::new();
 let mut order = Vec::new();
 let mut queue: VecDeque<(String, bool)> = requirements
 .iter()
 .map(|r| (r.name.clone(), r.recursive))
 .collect();
 while let Some((name, recursive)) = queue.pop_front() {
 if !seen.insert(name.clone()) {
 continue;
 }
 order.push(name.clone());
 if recursive {
 if let Some(tool) = config.get_tool(&name) {
 for req in &tool.requirements.tools {
 queue.push_back((req.name.clone(), req.recursive));
 }
 }
 }
 }
 order
 .into_iter()
 .filter_map(|name| config.get_tool(&name))
 .map(|tool| ResolvedTool {
 name: tool.name.clone(),
 prefix: config.layout.tool_prefix(&tool.name),
 exports_shared_libs: tool.exports_shared_libs,
 exports_aclocal: tool.exports_aclocal,
 })
 .collect()
}

/// Commit time (Unix seconds) of a git-backed source's checkout, or `0` for
/// any other source kind"). Returns `0` if the source can't be resolved or
/// git fails, e.g. the checkout hasn't happened yet.
fn source_date_epoch(config: &Config, context: &StepContext) -> i64 {
 let source_name = match context {
 StepContext::Source { name } => Some(name.clone()),
 StepContext::Package { name } => config.get_pkg(name).and_then(|p| p.from_source.clone()),
 StepContext::ToolStage { tool, .. } => config.get_tool(tool).map(|t| t.from_source.clone()),
 StepContext::Task { .. } => None,
 };
 let Some(source_name) = source_name else {
 return 0;
 };
 let Some(source) = config.get_source(&source_name) else {
 return 0;
 };
 if !matches!(source.vcs, VcsDescriptor::Git { .. }) {
 return 0;
 }
 let checkout_dir = config.layout.source_dir(&source.name, source.subdir.as_deref());
 let output = Command::new("git")
 .arg("-C")
 .arg(&checkout_dir)
 .args(["log", "-1", "--format=%ct"])
 .output();
 match output {
 Ok(out) if out.status.success() => {
 String::from_utf8_lossy(&out.stdout).trim().parse::<i64>().unwrap_or(0)
 }
 _ => 0,
 }
}

pub struct ManifestBuilder<'a> {
 config: &'a Config,
 site: &'a SiteConfig,
}

impl<'a> ManifestBuilder<'a> {
 pub fn new(config: &'a Config, site: &'a SiteConfig) -> Self {
 Self { config, site }
 }

 fn resolve_var(
 &self,
 name: &str,
 context: &StepContext,
 prefix: Option<&PathBuf>,
 ) -> Option<String> {
 if let Some(option_name) = name.strip_prefix("OPTION:") {
 return self.config.option(option_name).map(str::to_owned);
 }
 match name {
 "SOURCE_ROOT" => Some(self.config.layout.source_root.display().to_string()),
 "BUILD_ROOT" => Some(self.config.layout.build_root.display().to_string()),
 "PREFIX" => prefix.map(|p| p.display().to_string()),
 "PARALLELISM" => Some(
 std::thread::available_parallelism()
 .map(|n| n.get())
 .unwrap_or(1)
 .to_string(),
 ),
 "THIS_COLLECT_DIR" => match context {
 StepContext::Package { name } => {
 Some(self.config.layout.pkg_collect_dir(name).display().to_string())
 }
 _ => None,
 },
 "THIS_STAGING_DIR" => match context {
 StepContext::Package { name } => {
 Some(self.config.layout.pkg_staging_dir(name).display().to_string())
 }
 _ => None,
 },
 "ROLLING_ID" => match context {
 StepContext::Source { name } => self.config.rolling_id(name).map(|id| id.to_string()),
 _ => None,
 },
 _ => None,
 }
 }

 fn substitute(
 &self,
 text: &str,
 context: &StepContext,
 prefix: Option<&PathBuf>,
 ) -> Result<String, ConfigError> {
 replace_at_vars(text, |name| self.resolve_var(name, context, prefix))
 }

 /// Builds the manifest for one step. `tool_requirements` is the
 /// subject's resolved `tools[]`/`virtual_tools[]` source.
 pub fn build(
 &self,
 step: &ScriptStep,
 context: StepContext,
 requirements: &Requirements,
 default_workdir: PathBuf,
 for_package: bool,
 sysroot_dir: Option<PathBuf>,
 scratch_dir: &std::path::Path,
 ) -> Result<Manifest, ConfigError> {
 // `resolve_tool_deps(exposed_only=true)`: only entries
 // with `expose: true` (the default) contribute to the PATH/env set;
 // virtual entries never resolve against the real tool graph.
 let real_tool_reqs: Vec<ToolRequirement> = requirements
 .tools
 .iter()
 .filter(|r| r.virtual_kind.is_none() && r.expose)
 .cloned()
 .collect();
 let virtual_kinds: Vec<&ToolRequirement> = requirements
 .tools
 .iter()
 .filter(|r| r.virtual_kind.is_some())
 .collect();

 let resolved = tool_closure(self.config, &real_tool_reqs);

 let prefix = match &context {
 StepContext::ToolStage { tool, .. } => Some(self.config.layout.tool_prefix(tool)),
 _ => None,
 };

 let mut virtual_tools = Vec::new();
 for req in &virtual_kinds {
 let kind = req.virtual_kind.as_deref().unwrap_or_default();
 let tool = match kind {
 "pkgconfig-for-host" => VirtualTool::PkgConfigForHost,
 "pkgconfig-for-target" => VirtualTool::PkgConfigForTarget,
 other => {
 return Err(ConfigError::UnknownReference {
 referrer: req.name.clone(),
 kind: "virtual tool",
 name: other.to_owned(),
 })
 }
 };
 virtual_tools.push(tool);
 }

 let tool_prefixes: Vec<PathBuf> = resolved.iter().map(|t| t.prefix.clone()).collect();
 let virtual_bin = write_virtual_bin(scratch_dir, &virtual_tools, &tool_prefixes, sysroot_dir.as_deref())
 .map_err(|_| ConfigError::UnknownVariable("virtual-bin".to_owned()))?;

 let mut path_entries = vec![virtual_bin.display().to_string()];
 let mut ld_library_path = Vec::new();
 let mut aclocal_path = Vec::new();
 for tool in &resolved {
 path_entries.push(tool.prefix.join("bin").display().to_string());
 if tool.exports_shared_libs {
 ld_library_path.push(tool.prefix.join("lib").display().to_string());
 }
 if tool.exports_aclocal {
 aclocal_path.push(tool.prefix.join("share/aclocal").display().to_string());
 }
 }
 if let Ok(existing) = std::env::var("PATH") {
 path_entries.push(existing);
 }

 let mut environ = BTreeMap::new();
 environ.insert("PATH".to_owned(), path_entries.join(":"));
 if !ld_library_path.is_empty() {
 environ.insert("LD_LIBRARY_PATH".to_owned(), ld_library_path.join(":"));
 }
 if !aclocal_path.is_empty() {
 environ.insert("ACLOCAL_PATH".to_owned(), aclocal_path.join(":"));
 }
 environ.insert(
 "XBSTRAP_SOURCE_ROOT".to_owned(),
 self.config.layout.source_root.display().to_string(),
 );
 environ.insert(
 "XBSTRAP_BUILD_ROOT".to_owned(),
 self.config.layout.build_root.display().to_string(),
 );
 if let Some(sysroot) = &sysroot_dir {
 environ.insert(
 "XBSTRAP_SYSROOT_DIR".to_owned(),
 sysroot.display().to_string(),
 );
 }
 if for_package && virtual_tools.is_empty() {
 if let Some(sysroot) = &sysroot_dir {
 environ.remove("PKG_CONFIG_PATH");
 environ.insert(
 "PKG_CONFIG_SYSROOT_DIR".to_owned(),
 sysroot.display().to_string(),
 );
 environ.insert(
 "PKG_CONFIG_LIBDIR".to_owned(),
 format!(
 "{}:{}",
 sysroot.join("usr/lib/pkgconfig").display(),
 sysroot.join("usr/share/pkgconfig").display()
 ),
 );
 }
 }
 if step.cargo_home {
 environ.insert(
 "CARGO_HOME".to_owned(),
 self.config.layout.build_root.join("cargo-home").display().to_string(),
 );
 }
 for (key, value) in &step.environ {
 let substituted = self.substitute(value, &context, prefix.as_ref())?;
 environ.insert(key.clone(), substituted);
 }

 let source_date_epoch = source_date_epoch(self.config, &context);
 environ.insert("SOURCE_DATE_EPOCH".to_owned(), source_date_epoch.to_string());

 let args = match &step.args {
 Some(Args::List(argv)) => {
 let mut out = Vec::with_capacity(argv.len());
 for a in argv {
 out.push(self.substitute(a, &context, prefix.as_ref())?);
 }
 Args::List(out)
 }
 Some(Args::Shell(script)) => {
 Args::Shell(self.substitute(script, &context, prefix.as_ref())?)
 }
 None => Args::List(vec!["true".to_owned()]),
 };

 let workdir = match &step.workdir {
 Some(w) => PathBuf::from(self.substitute(w, &context, prefix.as_ref())?),
 None => default_workdir,
 };

 let subject_key = match &context {
 StepContext::Source { name } => format!("source-{name}"),
 StepContext::ToolStage { tool, stage } => {
 format!("tool-{tool}{}", stage.as_deref().map(|s| format!("@{s}")).unwrap_or_default())
 }
 StepContext::Package { name } => format!("pkg-{name}"),
 StepContext::Task { name } => format!("task-{name}"),
 };

 Ok(Manifest {
 context,
 subject_key,
 args,
 workdir,
 environ,
 source_root: self.config.layout.source_root.clone(),
 build_root: self.config.layout.build_root.clone(),
 container_src_mount: self
 .site
 .container
 .src_mount
 .as_deref()
 .map(PathBuf::from)
 .unwrap_or_else(|| PathBuf::from("/source-root")),
 container_build_mount: self
 .site
 .container
 .build_mount
 .as_deref()
 .map(PathBuf::from)
 .unwrap_or_else(|| PathBuf::from("/build-root")),
 sysroot_mount: sysroot_dir,
 container_sysroot_mount: PathBuf::from("/sysroot"),
 isolate_network: step.isolate_network,
 quiet: step.quiet,
 cargo_home: step.cargo_home,
 source_date_epoch: Some(source_date_epoch),
 })
 }
}
