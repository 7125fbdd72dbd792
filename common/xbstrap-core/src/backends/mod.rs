//! Pluggable backends the Plan Engine and Step Executor delegate to: VCS
//! probing, the package manager, and the container runtime. Kept as trait
//! objects so tests can swap in fakes without touching `git`/`xbps-query`/a
//! container daemon.

pub mod archive;
mod container;
mod package;
mod vcs;

pub use container::{CbuildrtRuntime, ContainerRuntime, DockerRuntime, DummyRuntime, RuncRuntime};
pub use package::{DummyPackageBackend, PackMetadata, PackageBackend, XbpsBackend};
pub use vcs::{GitBackend, VcsBackend};

use std::fmt;

/// How hard a probe is allowed to look for upstream changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckRemotes {
 Never,
 BranchesOnly,
 BranchesAndTags,
}

impl CheckRemotes {
 pub fn from_level(level: u8) -> Self {
 match level {
 0 => CheckRemotes::Never,
 1 => CheckRemotes::BranchesOnly,
 _ => CheckRemotes::BranchesAndTags,
 }
 }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetMode {
 None,
 Hard,
 Revert,
}

impl fmt::Display for ResetMode {
 fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
 let s = match self {
 ResetMode::None => "none",
 ResetMode::Hard => "hard",
 ResetMode::Revert => "revert",
 };
 f.write_str(s)
 }
}
