//! `xbstrap`: drives the Plan Engine end to end from the command line
//!. Grounded on `portage/bin/install_deps/src/main.rs`'s
//! `cli_main` wrapper and on `examples/original_source/xbstrap/__init__.py`'s
//! subcommand set, re-expressed as `clap` subcommands.

mod cli;

use std::fs::File;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use cliutil::cli_main;
use xbstrap_core::actions::ActionContext;
use xbstrap_core::backends::{
 CbuildrtRuntime, CheckRemotes, ContainerRuntime, DockerRuntime, DummyPackageBackend,
 DummyRuntime, GitBackend, PackageBackend, ResetMode, RuncRuntime, VcsBackend, XbpsBackend,
};
use xbstrap_core::config::Config;
use xbstrap_core::plan::probe::{ItemSettings, ProbeContext};
use xbstrap_core::plan::{pkg_plan_key, Action, ActivationPolicy, Plan, PlanKey, Scope};
use xbstrap_core::subject::{Args as StepArgs, ScriptStep, SubjectId};

use cli::{Cli, Command, PkgSelector, PlanArgs, SrcSelector, ToolSelector};

fn main() -> ExitCode {
 let cli = Cli::parse();
 let verbosity = cli.verbose;
 cli_main(move || do_main(cli), verbosity)
}

fn do_main(cli: Cli) -> Result<()> {
 let config = Config::load(&cli.build_root)?;

 match cli.command {
 Command::Fetch { plan, select } => {
 run_src_plan(&config, Action::FetchSrc, &select, &plan)
 }
 Command::Checkout { plan, select } => {
 run_src_plan(&config, Action::CheckoutSrc, &select, &plan)
 }
 Command::Patch { plan, select } => {
 run_src_plan(&config, Action::PatchSrc, &select, &plan)
 }
 Command::Regenerate { plan, select } => {
 run_src_plan(&config, Action::RegenerateSrc, &select, &plan)
 }
 Command::Mirror { plan, select } => {
 run_src_plan(&config, Action::MirrorSrc, &select, &plan)
 }

 Command::ConfigureTool { plan, select } => {
 run_tool_plan(&config, Action::ConfigureTool, &select, &plan)
 }
 Command::CompileTool { plan, select, reconfigure } => {
 let mut wanted = Vec::new();
 for tool in selected_tools(&config, &select) {
 if reconfigure {
 wanted.push(PlanKey::new(Action::ConfigureTool, SubjectId::tool(tool.name.clone())));
 }
 for stage in &tool.stages {
 wanted.push(PlanKey::new(
 Action::CompileToolStage,
 SubjectId::tool_stage(tool.name.clone(), stage.stage.clone()),
 ));
 }
 }
 execute_plan(&config, wanted, &plan, None)
 }
 Command::InstallTool {
 plan,
 select,
 reconfigure,
 recompile,
 } => {
 let mut wanted = Vec::new();
 for tool in selected_tools(&config, &select) {
 if reconfigure {
 wanted.push(PlanKey::new(Action::ConfigureTool, SubjectId::tool(tool.name.clone())));
 }
 if reconfigure || recompile {
 for stage in &tool.stages {
 wanted.push(PlanKey::new(
 Action::CompileToolStage,
 SubjectId::tool_stage(tool.name.clone(), stage.stage.clone()),
 ));
 }
 }
 for stage in &tool.stages {
 wanted.push(PlanKey::new(
 Action::InstallToolStage,
 SubjectId::tool_stage(tool.name.clone(), stage.stage.clone()),
 ));
 }
 }
 execute_plan(&config, wanted, &plan, None)
 }
 Command::ArchiveTool { plan, select } => {
 run_tool_plan(&config, Action::ArchiveTool, &select, &plan)
 }
 Command::PullArchive { plan, select } => {
 run_tool_plan(&config, Action::PullArchive, &select, &plan)
 }

 Command::ConfigurePkg { plan, select } => {
 run_pkg_plan(&config, Action::ConfigurePkg, &select, &plan)
 }
 Command::Build {
 plan,
 select,
 reconfigure,
 reproduce,
 } => {
 let action = if reproduce { Action::ReproduceBuildPkg } else { Action::BuildPkg };
 let mut wanted = Vec::new();
 for pkg in selected_pkgs(&config, &select) {
 if reconfigure {
 wanted.push(pkg_plan_key(&config, Action::ConfigurePkg, &pkg.name));
 }
 wanted.push(pkg_plan_key(&config, action, &pkg.name));
 }
 execute_plan(&config, wanted, &plan, None)
 }
 Command::Pack { plan, select, reproduce } => {
 let action = if reproduce { Action::ReproducePackPkg } else { Action::PackPkg };
 run_pkg_plan(&config, action, &select, &plan)
 }
 Command::Install {
 plan,
 select,
 reconfigure,
 rebuild,
 } => {
 let mut wanted = Vec::new();
 for pkg in selected_pkgs(&config, &select) {
 if reconfigure {
 wanted.push(pkg_plan_key(&config, Action::ConfigurePkg, &pkg.name));
 }
 if reconfigure || rebuild {
 wanted.push(pkg_plan_key(&config, Action::BuildPkg, &pkg.name));
 }
 wanted.push(PlanKey::new(Action::InstallPkg, SubjectId::package(pkg.name.clone())));
 }
 execute_plan(&config, wanted, &plan, None)
 }
 Command::Archive { plan, select } => {
 run_pkg_plan(&config, Action::ArchivePkg, &select, &plan)
 }
 Command::PullPack { plan, select } => {
 run_pkg_plan(&config, Action::PullPkgPack, &select, &plan)
 }

 Command::Run { plan, pkg, tool, task } => {
 let parent = pkg.clone().or_else(|| tool.clone());
 let wanted = task
 .iter()
 .map(|name| PlanKey::new(Action::Run, SubjectId::task(name.clone(), parent.clone())))
 .collect();
 execute_plan(&config, wanted, &plan, None)
 }
 Command::RunPkg { plan, pkg, command } => {
 let step = ad_hoc_step(command);
 let wanted = vec![PlanKey::new(Action::RunPkg, SubjectId::package(pkg))];
 execute_plan(&config, wanted, &plan, Some(step))
 }
 Command::RunTool { plan, tools, command } => {
 let step = ad_hoc_step(command);
 let wanted = tools
 .iter()
 .map(|name| PlanKey::new(Action::RunTool, SubjectId::tool(name.clone())))
 .collect();
 execute_plan(&config, wanted, &plan, Some(step))
 }

 Command::ListSrcs => {
 for name in config.known_names(xbstrap_core::subject::SubjectKind::Source) {
 println!("{name}");
 }
 Ok(())
 }
 Command::ListTools => {
 for tool in config.all_tools() {
 println!("{}", tool.name);
 }
 Ok(())
 }
 Command::ListPkgs => {
 for pkg in config.all_pkgs() {
 println!("{}", pkg.name);
 }
 Ok(())
 }
 }
}

fn ad_hoc_step(command: Vec<String>) -> ScriptStep {
 ScriptStep {
 args: Some(StepArgs::List(command)),
 ..ScriptStep::default()
 }
}

fn selected_tools<'a>(config: &'a Config, select: &ToolSelector) -> Vec<&'a xbstrap_core::subject::Tool> {
 if select.all {
 config.all_tools().collect()
 } else {
 select.tools.iter().filter_map(|n| config.get_tool(n)).collect()
 }
}

fn selected_pkgs<'a>(config: &'a Config, select: &PkgSelector) -> Vec<&'a xbstrap_core::subject::Package> {
 if select.all {
 config.all_pkgs().collect()
 } else {
 select.packages.iter().filter_map(|n| config.get_pkg(n)).collect()
 }
}

fn selected_sources(config: &Config, select: &SrcSelector) -> Vec<String> {
 if select.all {
 config
 .known_names(xbstrap_core::subject::SubjectKind::Source)
 .into_iter()
 .map(str::to_owned)
 .collect()
 } else {
 select.sources.clone()
 }
}

fn tool_wanted(config: &Config, select: &ToolSelector, action: Action, with_stage: bool) -> Vec<PlanKey> {
 let mut wanted = Vec::new();
 for tool in selected_tools(config, select) {
 if with_stage {
 for stage in &tool.stages {
 wanted.push(PlanKey::new(action, SubjectId::tool_stage(tool.name.clone(), stage.stage.clone())));
 }
 } else {
 wanted.push(PlanKey::new(action, SubjectId::tool(tool.name.clone())));
 }
 }
 wanted
}

fn run_tool_plan(config: &Config, action: Action, select: &ToolSelector, plan: &PlanArgs) -> Result<()> {
 let with_stage = matches!(action, Action::CompileToolStage | Action::InstallToolStage);
 let wanted = tool_wanted(config, select, action, with_stage);
 execute_plan(config, wanted, plan, None)
}

fn run_pkg_plan(config: &Config, action: Action, select: &PkgSelector, plan: &PlanArgs) -> Result<()> {
 let wanted = selected_pkgs(config, select)
 .into_iter()
 .map(|pkg| pkg_plan_key(config, action, &pkg.name))
 .collect();
 execute_plan(config, wanted, plan, None)
}

fn run_src_plan(config: &Config, action: Action, select: &SrcSelector, plan: &PlanArgs) -> Result<()> {
 let wanted = selected_sources(config, select)
 .into_iter()
 .map(|name| PlanKey::new(action, SubjectId::source(name)))
 .collect();
 execute_plan(config, wanted, plan, None)
}

/// Resolves the `--reset`/`--hard-reset` flags into the probe's [`ResetMode`],
/// grounded on `handle_plan_args`' mutually-informative `--reset`/`--hard-reset`
/// pair in `examples/original_source/xbstrap/__init__.py`.
fn reset_mode(plan: &PlanArgs) -> ResetMode {
 if plan.hard_reset {
 ResetMode::Hard
 } else if plan.reset {
 ResetMode::Revert
 } else {
 ResetMode::None
 }
}

fn check_remotes(plan: &PlanArgs) -> CheckRemotes {
 if !plan.update {
 CheckRemotes::Never
 } else if plan.paranoid {
 CheckRemotes::BranchesAndTags
 } else {
 CheckRemotes::BranchesOnly
 }
}

fn make_package_backend(config: &Config) -> Box<dyn PackageBackend> {
 match config.site.pkg_format.as_deref() {
 Some("xbps") => Box::new(XbpsBackend),
 _ => Box::new(DummyPackageBackend::new()),
 }
}

fn make_container_runtime(config: &Config) -> Box<dyn ContainerRuntime> {
 match config.site.container.runtime.as_deref() {
 Some("docker") => Box::new(DockerRuntime {
 image: config.site.container.image.clone().unwrap_or_default(),
 }),
 Some("runc") => Box::new(RuncRuntime {
 bundle_dir: config
 .site
 .container
 .rootfs
 .clone()
 .map(std::path::PathBuf::from)
 .unwrap_or_default(),
 }),
 Some("cbuildrt") => Box::new(CbuildrtRuntime),
 _ => Box::new(DummyRuntime),
 }
}

/// Builds, activates, and (unless `--dry-run`/`--explain`) executes the plan
/// for `wanted`, wiring every backend the way `do_main`'s per-subcommand
/// handlers in `examples/original_source/xbstrap/__init__.py` wire
/// `Bootstrapper`/`Plan` before calling `execute_for_wanted`.
fn execute_plan(
 config: &Config,
 wanted: Vec<PlanKey>,
 plan_args: &PlanArgs,
 ad_hoc_command: Option<ScriptStep>,
) -> Result<()> {
 let vcs = GitBackend;
 let package_backend = make_package_backend(config);
 let container = make_container_runtime(config);

 let settings = ItemSettings {
 check_remotes: check_remotes(plan_args),
 reset: reset_mode(plan_args),
 };
 let probe = ProbeContext {
 config,
 vcs: &vcs,
 package_backend: package_backend.as_ref(),
 settings,
 };

 let scope = if plan_args.auto_scope || config.site.auto_pull {
 xbstrap_core::plan::auto_scope(config, &wanted)
 } else {
 Scope::from_site(config)
 };

 let policy = ActivationPolicy {
 check: plan_args.check,
 update: plan_args.update,
 recursive: plan_args.recursive,
 restrict_updates: false,
 only_wanted: plan_args.only_wanted,
 };

 let mut plan = Plan::compute(config, wanted, &scope, &probe, policy, None)?;

 if plan_args.explain {
 print!("{}", plan.explain());
 return Ok(());
 }
 if plan_args.dry_run {
 println!("{} step(s) would run", plan.active_order().len());
 return Ok(());
 }

 let ctx = ActionContext {
 vcs: &vcs,
 package_backend: package_backend.as_ref(),
 container: container.as_ref(),
 site: &config.site,
 reset: settings.reset,
 ad_hoc_command,
 };

 let mut progress_file = plan_args
 .progress_file
 .as_ref()
 .map(File::create)
 .transpose()?;
 let progress: Option<&mut dyn std::io::Write> = match &mut progress_file {
 Some(f) => Some(f),
 None => None,
 };

 xbstrap_core::plan::run_plan(&mut plan, plan_args.keep_going, progress, |config, key| {
 ctx.execute(config, key)
 })
}
