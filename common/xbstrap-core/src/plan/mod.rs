//! The Plan Engine (C4): materialization, deterministic ordering, and
//! selective activation of the multi-action dependency graph.

mod activate;
mod engine;
mod materialize;
mod order;
pub mod probe;

pub use activate::*;
pub use engine::*;
pub use materialize::*;
pub use order::*;

use std::collections::BTreeMap;
use std::fmt;

use crate::subject::SubjectId;

/// The 24 actions the engine can materialize, plus the `NULL` sentinel used
/// for edges that carry no real work (e.g. a subject with no regenerate
/// steps still gets a `REGENERATE_SRC` node to hang ordering off of).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
 FetchSrc,
 CheckoutSrc,
 PatchSrc,
 RegenerateSrc,
 ConfigureTool,
 CompileToolStage,
 InstallToolStage,
 ConfigurePkg,
 BuildPkg,
 ReproduceBuildPkg,
 PackPkg,
 ReproducePackPkg,
 InstallPkg,
 ArchiveTool,
 ArchivePkg,
 PullPkgPack,
 PullArchive,
 Run,
 RunPkg,
 RunTool,
 WantTool,
 WantPkg,
 MirrorSrc,
 Null,
}

impl Action {
 /// The ordering priority bucket from the design: `WANT_*`/`PULL_PKG_PACK`
 /// sort first, `INSTALL_PKG` sorts last, everything else is neutral.
 pub fn ordering_priority(&self) -> i32 {
 match self {
 Action::WantTool => -2,
 Action::WantPkg | Action::PullPkgPack => -1,
 Action::InstallPkg => 2,
 _ => 0,
 }
 }

 pub fn display_name(&self) -> &'static str {
 match self {
 Action::FetchSrc => "fetch",
 Action::CheckoutSrc => "checkout",
 Action::PatchSrc => "patch",
 Action::RegenerateSrc => "regenerate",
 Action::ConfigureTool => "configure-tool",
 Action::CompileToolStage => "compile-tool",
 Action::InstallToolStage => "install-tool",
 Action::ConfigurePkg => "configure-pkg",
 Action::BuildPkg => "build-pkg",
 Action::ReproduceBuildPkg => "reproduce-build-pkg",
 Action::PackPkg => "pack-pkg",
 Action::ReproducePackPkg => "reproduce-pack-pkg",
 Action::InstallPkg => "install-pkg",
 Action::ArchiveTool => "archive-tool",
 Action::ArchivePkg => "archive-pkg",
 Action::PullPkgPack => "pull-pkg-pack",
 Action::PullArchive => "pull-archive",
 Action::Run => "run",
 Action::RunPkg => "run-pkg",
 Action::RunTool => "run-tool",
 Action::WantTool => "want-tool",
 Action::WantPkg => "want-pkg",
 Action::MirrorSrc => "mirror",
 Action::Null => "null",
 }
 }
}

impl fmt::Display for Action {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 f.write_str(self.display_name())
 }
}

/// Identifies a target sysroot when sysroot isolation is enabled: the sorted
/// tuple of the requester's flattened package-dependency set. `None` means
/// the shared sysroot.
pub type SysrootId = Option<Vec<String>>;

/// `(action, subject, target_sysroot_id?)` — the stable key of a [`PlanItem`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlanKey {
 pub action: Action,
 pub subject: SubjectId,
 pub sysroot: SysrootId,
}

impl PlanKey {
 pub fn new(action: Action, subject: SubjectId) -> Self {
 Self {
 action,
 subject,
 sysroot: None,
 }
 }

 pub fn with_sysroot(action: Action, subject: SubjectId, sysroot: SysrootId) -> Self {
 Self {
 action,
 subject,
 sysroot,
 }
 }
}

impl fmt::Display for PlanKey {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 write!(f, "{}({})", self.action, self.subject)?;
 if let Some(sysroot) = &self.sysroot {
 write!(f, "[sysroot={}]", sysroot.join(","))?;
 }
 Ok(())
 }
}

/// Per-item terminal status after `run_plan`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
 Null,
 Success,
 StepFailed,
 PrereqsFailed,
 NotWanted,
}

/// DFS coloring used by the topological sort (§4.4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanState {
 Null,
 Expanding,
 Ordered,
}

/// A materialized node in the plan graph.
#[derive(Clone, Debug)]
pub struct PlanItem {
 pub key: PlanKey,
 /// Must occur before this item in the order, and forces this item's
 /// activation when active.
 pub build_edges: Vec<PlanKey>,
 /// Must occur before this item if active; forces activation only when
 /// this item is reachable on the build span.
 pub require_edges: Vec<PlanKey>,
 /// Ordering only; never affects activation.
 pub order_before_edges: Vec<PlanKey>,
 pub order_after_edges: Vec<PlanKey>,
 pub active: bool,
 pub build_span: bool,
 pub status: ExecutionStatus,
 pub state: PlanState,
}

impl PlanItem {
 pub fn new(key: PlanKey) -> Self {
 Self {
 key,
 build_edges: Vec::new(),
 require_edges: Vec::new(),
 order_before_edges: Vec::new(),
 order_after_edges: Vec::new(),
 active: false,
 build_span: false,
 status: ExecutionStatus::Null,
 state: PlanState::Null,
 }
 }

 pub fn all_dependency_edges(&self) -> impl Iterator<Item = &PlanKey> {
 self.build_edges.iter().chain(self.require_edges.iter())
 }
}

/// The materialized item set, keyed by [`PlanKey`]; insertion order is not
/// meaningful, only `BTreeMap`'s deterministic key order is relied upon
/// before the explicit ordering pass runs.
pub type ItemMap = BTreeMap<PlanKey, PlanItem>;
