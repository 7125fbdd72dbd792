//! `configure_tool` / `compile_tool_stage` / `install_tool_stage` /
//! `archive_tool` / `pull_archive`.

use anyhow::{bail, Context, Result};
use fileutil::remove_dir_all_with_chmod;

use crate::backends::archive;
use crate::config::Config;
use crate::exec::StepContext;
use crate::subject::{SubjectId, Tool, ToolStage};

use super::{container_build_root, mark_done, run_steps, ActionContext};

fn get_tool<'c>(config: &'c Config, subject: &SubjectId) -> Result<&'c Tool> {
 config
 .get_tool(&subject.name)
 .with_context(|| format!("unknown tool {:?}", subject.name))
}

fn get_stage<'c>(tool: &'c Tool, subject: &SubjectId) -> Result<&'c ToolStage> {
 tool.stages
 .iter()
 .find(|s| s.stage == subject.stage)
 .or_else(|| tool.stages.first())
 .with_context(|| format!("tool {:?} has no stage {:?}", tool.name, subject.stage))
}

/// `configure_tool`: removes & recreates the tool's build directory (spec
/// §4.6 "configure_tool / build_pkg" bullet). Tools have no standalone
/// configure script in this schema; compiling is what consumes the freshly
/// reset directory.
pub fn configure_tool(_ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let tool = get_tool(config, subject)?;
 let build_dir = config.layout.tool_build_dir(&tool.name);
 remove_dir_all_with_chmod(&build_dir)?;
 std::fs::create_dir_all(&build_dir)?;
 mark_done(config, "configured", &subject.marker_key())
}

pub fn compile_tool_stage(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let tool = get_tool(config, subject)?;
 let stage = get_stage(tool, subject)?;
 let default_workdir = container_build_root(ctx.site).join("tool-builds").join(&tool.name);
 let requirements = stage.requirements_override.as_ref().unwrap_or(&tool.requirements);
 run_steps(
 ctx,
 config,
 &stage.compile,
 StepContext::ToolStage { tool: tool.name.clone(), stage: stage.stage.clone() },
 requirements,
 default_workdir,
 false,
 None,
 )?;
 mark_done(config, "built", &subject.marker_key())
}

pub fn install_tool_stage(ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let tool = get_tool(config, subject)?;
 let stage = get_stage(tool, subject)?;
 let default_workdir = container_build_root(ctx.site).join("tool-builds").join(&tool.name);
 let requirements = stage.requirements_override.as_ref().unwrap_or(&tool.requirements);
 std::fs::create_dir_all(config.layout.tool_prefix(&tool.name))?;
 run_steps(
 ctx,
 config,
 &stage.install,
 StepContext::ToolStage { tool: tool.name.clone(), stage: stage.stage.clone() },
 requirements,
 default_workdir,
 false,
 None,
 )?;
 mark_done(config, "installed", &subject.marker_key())
}

/// Packs every stage's installed prefix into a single tarball under
/// `build_root/tool-archives/<tool>.tar.gz`.
pub fn archive_tool(_ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let tool = get_tool(config, subject)?;
 let prefix = config.layout.tool_prefix(&tool.name);
 let dest = config.layout.build_root.join("tool-archives").join(format!("{}.tar.gz", tool.name));
 archive::create_tar_gz(&prefix, &dest)?;
 mark_done(config, "archived", &subject.marker_key())
}

/// Downloads a prebuilt `<tool>.tar.gz` from the mirror and extracts it
/// directly into the tool's prefix.
pub fn pull_archive(_ctx: &ActionContext, config: &Config, subject: &SubjectId) -> Result<()> {
 let Some(mirror) = &config.commits.xbstrap_mirror else {
 bail!("pull_archive requires general.xbstrap_mirror to be configured");
 };
 let url = format!("{}/archives/{}.tar.gz", mirror.trim_end_matches('/'), subject.name);
 let dest = config.layout.build_root.join("tool-archives").join(format!("{}.tar.gz", subject.name));
 archive::download(&url, &dest)?;
 let prefix = config.layout.tool_prefix(&subject.name);
 archive::extract(&dest, crate::subject::ArchiveFormat::TarGz, &prefix, None)?;
 Ok(())
}
