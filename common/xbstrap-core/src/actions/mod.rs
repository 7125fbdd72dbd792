//! Action Handlers (C6): one function per [`Action`] variant,
//! each a pure function of `Config` + subject + settings that performs the
//! side effect and marks completion with the matching marker file (exact
//! names per `plan::probe`, so a handler's marker write and its own probe
//! never disagree about "done").

mod pkg;
mod source;
mod task;
mod tool;

use std::path::PathBuf;

use anyhow::{bail, Result};
use fileutil::touch_marker;
use tracing::instrument;

use crate::backends::{ContainerRuntime, PackageBackend, ResetMode, VcsBackend};
use crate::config::{Config, SiteConfig};
use crate::exec::{Manifest, ManifestBuilder, StepContext};
use crate::plan::{Action, PlanKey};
use crate::subject::{Requirements, ScriptStep};

/// The backends and run-level settings every handler needs. Borrowed for
/// the lifetime of one `run_plan` invocation.
pub struct ActionContext<'a> {
 pub vcs: &'a dyn VcsBackend,
 pub package_backend: &'a dyn PackageBackend,
 pub container: &'a dyn ContainerRuntime,
 pub site: &'a SiteConfig,
 pub reset: ResetMode,
 /// The command a `run-pkg`/`run-tool` CLI invocation wants executed
 /// inside the target's built environment. `None` outside of those two
 /// ad-hoc entry points.
 pub ad_hoc_command: Option<ScriptStep>,
}

impl<'a> ActionContext<'a> {
 /// Matches [`crate::plan::run_plan`]'s `execute: FnMut(&Config, &PlanKey) -> Result<()>`
 /// closure shape; the caller wires `|config, key| ctx.execute(config, key)` in.
 #[instrument(skip_all, fields(action = ?key.action, subject = %key.subject))]
 pub fn execute(&self, config: &Config, key: &PlanKey) -> Result<()> {
 let subject = &key.subject;
 match key.action {
 Action::FetchSrc => source::fetch_src(self, config, subject),
 Action::CheckoutSrc => source::checkout_src(self, config, subject),
 Action::PatchSrc => source::patch_src(self, config, subject),
 Action::RegenerateSrc => source::regenerate_src(self, config, subject),
 Action::MirrorSrc => source::mirror_src(self, config, subject),

 Action::ConfigureTool => tool::configure_tool(self, config, subject),
 Action::CompileToolStage => tool::compile_tool_stage(self, config, subject),
 Action::InstallToolStage => tool::install_tool_stage(self, config, subject),
 Action::ArchiveTool => tool::archive_tool(self, config, subject),
 Action::PullArchive => tool::pull_archive(self, config, subject),

 Action::ConfigurePkg => pkg::configure_pkg(self, config, subject),
 Action::BuildPkg => pkg::build_pkg(self, config, subject, false),
 Action::ReproduceBuildPkg => pkg::build_pkg(self, config, subject, true),
 Action::PackPkg => pkg::pack_pkg(self, config, subject, false),
 Action::ReproducePackPkg => pkg::pack_pkg(self, config, subject, true),
 Action::InstallPkg => pkg::install_pkg(self, config, subject),
 Action::ArchivePkg => pkg::archive_pkg(self, config, subject),
 Action::PullPkgPack => pkg::pull_pkg_pack(self, config, subject),

 Action::Run => task::run(self, config, subject),
 Action::RunPkg => task::run_pkg(self, config, subject),
 Action::RunTool => task::run_tool(self, config, subject),

 // `WANT_*` sentinels are never invoked by `run_plan` (spec
 // §4.7 last bullet); `NULL` carries no work.
 Action::WantTool | Action::WantPkg => {
 bail!("{} is needed but out of build scope", subject)
 }
 Action::Null => Ok(()),
 }
 }
}

/// The container-side mount root for the source tree, mirroring what
/// [`ManifestBuilder::build`] computes internally for `Manifest::container_src_mount`.
pub(crate) fn container_src_root(site: &SiteConfig) -> PathBuf {
 site.container
 .src_mount
 .as_deref()
 .map(PathBuf::from)
 .unwrap_or_else(|| PathBuf::from("/source-root"))
}

pub(crate) fn container_build_root(site: &SiteConfig) -> PathBuf {
 site.container
 .build_mount
 .as_deref()
 .map(PathBuf::from)
 .unwrap_or_else(|| PathBuf::from("/build-root"))
}

/// Runs every step in `steps` through a freshly built manifest, bypassing
/// `ctx.container` in favor of the host-direct [`crate::backends::DummyRuntime`]
/// for `containerless: true` steps.
pub(crate) fn run_steps(
 ctx: &ActionContext,
 config: &Config,
 steps: &[ScriptStep],
 context: StepContext,
 requirements: &Requirements,
 default_workdir: PathBuf,
 for_package: bool,
 sysroot_dir: Option<PathBuf>,
) -> Result<()> {
 if steps.is_empty() {
 return Ok(());
 }
 let any_containerless = steps.iter().any(|s| s.containerless);
 let any_containerful = steps.iter().any(|s| !s.containerless);
 if any_containerless && any_containerful {
 return Err(crate::error::ExecError::MixedContainerMode.into());
 }
 if any_containerless && !ctx.site.container.allow_containerless {
 return Err(crate::error::ExecError::ContainerlessNotAllowed.into());
 }
 let builder = ManifestBuilder::new(config, ctx.site);
 for step in steps {
 let scratch = fileutil::SafeTempDir::new()?;
 let manifest: Manifest = builder.build(
 step,
 context.clone(),
 requirements,
 default_workdir.clone(),
 for_package,
 sysroot_dir.clone(),
 scratch.path(),
 )?;
 if step.containerless {
 crate::backends::DummyRuntime.run(&manifest)?;
 } else {
 ctx.container.run(&manifest)?;
 }
 }
 Ok(())
}

/// Touches the marker for `(action_name, subject_key)`.
pub(crate) fn mark_done(config: &Config, action_name: &str, subject_key: &str) -> Result<()> {
 touch_marker(&config.layout.marker(action_name, subject_key))
}
