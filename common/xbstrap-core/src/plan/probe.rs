//! State Probe (C3): for every materialized item, answers
//! `{missing, updatable, timestamp}` from filesystem marker mtimes, VCS
//! remote queries, and package-backend lookups. Grounded on `base.py`'s
//! per-action `check_if_fulfilled`/`check_pkg_updatable` methods.

use std::time::SystemTime;

use anyhow::Result;

use crate::backends::{CheckRemotes, PackageBackend, ResetMode, VcsBackend};
use crate::config::Config;
use crate::subject::{SubjectId, VcsDescriptor};
use fileutil::marker_mtime;
use xbstrap_version::is_update;

use super::{Action, PlanKey};

/// Per-plan probing knobs threaded down from the `Plan`.
#[derive(Clone, Copy, Debug)]
pub struct ItemSettings {
 pub check_remotes: CheckRemotes,
 pub reset: ResetMode,
}

impl Default for ItemSettings {
 fn default() -> Self {
 Self {
 check_remotes: CheckRemotes::Never,
 reset: ResetMode::None,
 }
 }
}

/// The result of probing one [`PlanKey`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ItemState {
 pub missing: bool,
 pub updatable: bool,
 pub timestamp: Option<SystemTime>,
}

impl ItemState {
 fn present(timestamp: Option<SystemTime>) -> Self {
 Self {
 missing: false,
 updatable: false,
 timestamp,
 }
 }

 fn absent() -> Self {
 Self {
 missing: true,
 updatable: false,
 timestamp: None,
 }
 }

 /// Actions without meaningful idempotence:
 /// always reported missing so an active plan always re-runs them.
 fn always_rerun() -> Self {
 Self::absent()
 }
}

pub struct ProbeContext<'a> {
 pub config: &'a Config,
 pub vcs: &'a dyn VcsBackend,
 pub package_backend: &'a dyn PackageBackend,
 pub settings: ItemSettings,
}

impl<'a> ProbeContext<'a> {
 fn marker_state(&self, action_name: &str, subject: &SubjectId) -> Result<ItemState> {
 let path = self.config.layout.marker(action_name, &subject.marker_key());
 match marker_mtime(&path)? {
 Some(ts) => Ok(ItemState::present(Some(ts))),
 None => Ok(ItemState::absent()),
 }
 }

 fn probe_fetch(&self, subject: &SubjectId) -> Result<ItemState> {
 let Some(src) = self.config.get_source(&subject.name) else {
 return Ok(ItemState::absent());
 };
 let checkout_dir = self.config.layout.source_dir(&src.name, src.subdir.as_deref());
 let base = self.marker_state("fetched", subject)?;
 if base.missing {
 return Ok(base);
 }
 // A fetched archive/mirror never goes stale on its own; only a VCS
 // source with remote-checking enabled can report `updatable` here
 // (mirrors are refreshed by MIRROR_SRC, not by re-fetching).
 if matches!(src.vcs, VcsDescriptor::Git { .. }) {
 let updatable = self
 .vcs
 .remote_has_update(&checkout_dir, &src.vcs, self.settings.check_remotes)?;
 return Ok(ItemState {
 updatable,
 ..base
 });
 }
 Ok(base)
 }

 fn probe_checkout(&self, subject: &SubjectId) -> Result<ItemState> {
 let Some(src) = self.config.get_source(&subject.name) else {
 return Ok(ItemState::absent());
 };
 let checkout_dir = self.config.layout.source_dir(&src.name, src.subdir.as_deref());
 if !self.vcs.local_ref_exists(&checkout_dir, &src.vcs)? {
 return Ok(ItemState::absent());
 }
 self.marker_state("checkedout", subject)
 }

 fn probe_pack(&self, subject: &SubjectId) -> Result<ItemState> {
 if self
 .package_backend
 .is_packed(&subject.name, &self.config.layout.xbps_repo)?
 {
 return self.marker_state("packed", subject);
 }
 Ok(ItemState::absent())
 }

 fn probe_install(&self, subject: &SubjectId) -> Result<ItemState> {
 if self
 .package_backend
 .is_installed(&subject.name, &self.config.layout.system_root)?
 {
 return self.marker_state("installed", subject);
 }
 Ok(ItemState::absent())
 }

 /// `PULL_PKG_PACK` is updatable when the remote repodata version compares
 /// greater than the local one.
 fn probe_pull_pkg_pack(&self, subject: &SubjectId) -> Result<ItemState> {
 let local = self
 .package_backend
 .local_pack_version(&subject.name, &self.config.layout.xbps_repo)?;
 let Some(local) = local else {
 return Ok(ItemState::absent());
 };
 let remote_url = self
 .config
 .commits
 .xbstrap_mirror
 .as_deref()
 .unwrap_or_default();
 let remote = self
 .package_backend
 .remote_repodata_version(&subject.name, remote_url)?;
 let updatable = match remote {
 Some(remote) => is_update(&local, &remote),
 None => false,
 };
 Ok(ItemState {
 missing: false,
 updatable,
 timestamp: None,
 })
 }

 pub fn probe(&self, key: &PlanKey) -> Result<ItemState> {
 let subject = &key.subject;
 match key.action {
 Action::FetchSrc => self.probe_fetch(subject),
 Action::CheckoutSrc => self.probe_checkout(subject),
 Action::PatchSrc => self.marker_state("patched", subject),
 Action::RegenerateSrc => self.marker_state("regenerated", subject),
 Action::ConfigureTool => self.marker_state("configured", subject),
 Action::CompileToolStage => self.marker_state("built", subject),
 Action::InstallToolStage => self.marker_state("installed", subject),
 Action::ConfigurePkg => self.marker_state("configured", subject),
 Action::BuildPkg => self.marker_state("built", subject),
 Action::PackPkg => self.probe_pack(subject),
 Action::InstallPkg => self.probe_install(subject),
 Action::ArchiveTool | Action::ArchivePkg => self.marker_state("archived", subject),
 Action::PullPkgPack => self.probe_pull_pkg_pack(subject),
 Action::ReproduceBuildPkg
 | Action::ReproducePackPkg
 | Action::Run
 | Action::RunPkg
 | Action::RunTool
 | Action::PullArchive => Ok(ItemState::always_rerun()),
 Action::WantTool | Action::WantPkg | Action::MirrorSrc | Action::Null => {
 Ok(ItemState::default())
 }
 }
 }
}
