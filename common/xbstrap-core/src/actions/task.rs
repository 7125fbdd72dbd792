//! `run` / `run_pkg` / `run_tool`: executes a declared [`Task`]'s
//! script, or an ad-hoc command inside a built package/tool's environment.
//! All three are `always_rerun` per `plan::probe`, so none of these write a
//! marker file.

use anyhow::Result;

use crate::config::Config;
use crate::exec::StepContext;
use crate::subject::{Requirements, SubjectId, TaskContext};

use super::{container_build_root, run_steps, ActionContext};

pub fn run(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let Some(task) = config
 .get_task(&subject.name, subject.parent.as_deref())
 .or_else(|| config.find_task(&subject.name))
 else {
 return Ok(());
 };
 let (step_context, default_workdir, for_package, sysroot_dir) = match &task.context {
 TaskContext::Free => (StepContext::Task { name: task.name.clone() }, config.layout.build_root.clone(), false, None),
 TaskContext::Package(pkg) => (
 StepContext::Package { name: pkg.clone() },
 container_build_root(ctx.site).join("pkg-builds").join(pkg),
 true,
 Some(config.layout.system_root.clone()),
 ),
 TaskContext::Tool(tool) => (
 StepContext::ToolStage { tool: tool.clone(), stage: None },
 container_build_root(ctx.site).join("tool-builds").join(tool),
 false,
 None,
 ),
 };
 run_steps(
 ctx,
 config,
 std::slice::from_ref(&task.step),
 step_context,
 &task.requirements,
 default_workdir,
 for_package,
 sysroot_dir,
 )
}

/// `run_pkg`/`run_tool` are ad-hoc, CLI-driven "open a shell in this
/// package's/tool's built environment and run a command" actions: the
/// command text comes from the invoking command line, not from anything
/// stored in the config, so there is nothing to execute here when no
/// command has been attached to the context.
pub fn run_pkg(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let Some(step) = &ctx.ad_hoc_command else {
 return Ok(());
 };
 let default_workdir = container_build_root(ctx.site).join("pkg-builds").join(&subject.name);
 run_steps(
 ctx,
 config,
 std::slice::from_ref(step),
 StepContext::Package { name: subject.name.clone() },
 &Requirements::default(),
 default_workdir,
 true,
 Some(config.layout.system_root.clone()),
 )
}

pub fn run_tool(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let Some(step) = &ctx.ad_hoc_command else {
 return Ok(());
 };
 let default_workdir = container_build_root(ctx.site).join("tool-builds").join(&subject.name);
 run_steps(
 ctx,
 config,
 std::slice::from_ref(step),
 StepContext::ToolStage { tool: subject.name.clone(), stage: None },
 &Requirements::default(),
 default_workdir,
 false,
 None,
 )
}
