//! Command line surface: one subcommand per action family,
//! grounded on `xbstrap/__init__.py`'s argparse subcommands from
//! `examples/original_source` (`fetch`, `configure-tool`, `install`,
//! `run`, ...), re-expressed with `clap`'s derive API the way the teacher
//! uses it throughout `portage/bin/*`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "xbstrap", author, version, about = "Distribution bootstrap orchestrator")]
pub struct Cli {
 /// Increase logging verbosity; may be repeated.
 #[arg(short, long, action = clap::ArgAction::Count, global = true)]
 pub verbose: u8,

 /// Root directory holding `bootstrap.link` (defaults to the current directory).
 #[arg(long, global = true, default_value = ".")]
 pub build_root: PathBuf,

 #[command(subcommand)]
 pub command: Command,
}

/// Flags shared by every plan-driving subcommand, mirroring
/// `handle_plan_args` in `examples/original_source/xbstrap/__init__.py`.
#[derive(Args, Debug, Clone, Default)]
pub struct PlanArgs {
 /// Compute a plan but do not execute it.
 #[arg(short = 'n', long)]
 pub dry_run: bool,

 /// Skip items that are already fetched/built/installed/etc.
 #[arg(short, long)]
 pub check: bool,

 /// Check for updates (remote branches/tags, outdated build edges).
 #[arg(short, long)]
 pub update: bool,

 /// When updating, also update requirements (propagate through require edges).
 #[arg(long)]
 pub recursive: bool,

 /// Also consider unlikely updates, e.g. changes of git tags.
 #[arg(long)]
 pub paranoid: bool,

 /// Reset repository state; risks loss of local commits.
 #[arg(long)]
 pub reset: bool,

 /// Clean and reset repository state; risks loss of local changes and commits.
 #[arg(long)]
 pub hard_reset: bool,

 /// Fail steps that are not explicitly wanted.
 #[arg(long)]
 pub only_wanted: bool,

 /// Continue running even if some build steps fail.
 #[arg(long)]
 pub keep_going: bool,

 /// File that receives machine-readable progress notifications.
 #[arg(long)]
 pub progress_file: Option<PathBuf>,

 /// Print the numbered plan instead of executing it.
 #[arg(long)]
 pub explain: bool,

 /// Pre-populate build scope from wanted subjects and existing build dirs.
 #[arg(long)]
 pub auto_scope: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ToolSelector {
 /// Select every declared tool.
 #[arg(long)]
 pub all: bool,

 pub tools: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct PkgSelector {
 /// Select every declared package.
 #[arg(long)]
 pub all: bool,

 pub packages: Vec<String>,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SrcSelector {
 /// Select every declared source.
 #[arg(long)]
 pub all: bool,

 pub sources: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
 /// Fetch one or more sources.
 Fetch {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: SrcSelector,
 },
 /// Check out one or more sources.
 Checkout {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: SrcSelector,
 },
 /// Apply patches to one or more sources.
 Patch {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: SrcSelector,
 },
 /// Run the regenerate steps of one or more sources.
 Regenerate {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: SrcSelector,
 },
 /// Re-fetch git sources as bare mirrors under the mirror directory.
 Mirror {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: SrcSelector,
 },

 /// Configure one or more host tools.
 ConfigureTool {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: ToolSelector,
 },
 /// Compile one or more host tools.
 CompileTool {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: ToolSelector,
 /// Reconfigure before compiling.
 #[arg(long)]
 reconfigure: bool,
 },
 /// Install one or more host tools into their prefixes.
 InstallTool {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: ToolSelector,
 #[arg(long)]
 reconfigure: bool,
 #[arg(long)]
 recompile: bool,
 },
 /// Archive one or more host tools into tarballs.
 ArchiveTool {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: ToolSelector,
 },
 /// Download a tool's prebuilt archive instead of building it.
 PullArchive {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: ToolSelector,
 },

 /// Configure one or more target packages.
 ConfigurePkg {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 },
 /// Build one or more target packages.
 Build {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 /// Reconfigure before building.
 #[arg(long)]
 reconfigure: bool,
 /// Re-probe and diff the build's collect dir against the staged set
 /// instead of accepting it.
 #[arg(long)]
 reproduce: bool,
 },
 /// Pack one or more built packages into the local repository.
 Pack {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 /// Byte-for-byte compare against the previously packed archive.
 #[arg(long)]
 reproduce: bool,
 },
 /// Install one or more packages into the system root.
 Install {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 #[arg(long)]
 reconfigure: bool,
 #[arg(long)]
 rebuild: bool,
 },
 /// Archive one or more built packages into tarballs.
 Archive {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 },
 /// Download prebuilt packs for out-of-scope packages.
 PullPack {
 #[command(flatten)]
 plan: PlanArgs,
 #[command(flatten)]
 select: PkgSelector,
 },

 /// Run a declared task, optionally scoped to a package or tool.
 Run {
 #[command(flatten)]
 plan: PlanArgs,
 #[arg(long, conflicts_with = "tool")]
 pkg: Option<String>,
 #[arg(long, conflicts_with = "pkg")]
 tool: Option<String>,
 task: Vec<String>,
 },
 /// Run an ad-hoc command inside a built package's environment.
 RunPkg {
 #[command(flatten)]
 plan: PlanArgs,
 /// Package whose environment the command runs in.
 pkg: String,
 /// Command and arguments, separated from `pkg` by `--`.
 #[arg(last = true, required = true)]
 command: Vec<String>,
 },
 /// Run an ad-hoc command inside one or more built tools' environment.
 RunTool {
 #[command(flatten)]
 plan: PlanArgs,
 /// Tools whose environment (PATH, LD_LIBRARY_PATH, ...) is composed.
 #[arg(required = true)]
 tools: Vec<String>,
 /// Command and arguments, separated from `tools` by `--`.
 #[arg(last = true, required = true)]
 command: Vec<String>,
 },

 /// List every declared source.
 ListSrcs,
 /// List every declared tool.
 ListTools,
 /// List every declared package.
 ListPkgs,
}
