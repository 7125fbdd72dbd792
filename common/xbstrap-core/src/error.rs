use std::path::PathBuf;

use thiserror::Error;

use crate::plan::{Action, SubjectId};

/// Configuration-load-time failures: schema violations, unresolved
/// references, and the handful of static constraints §3 of the design
/// places on subjects before a plan can even be built.
#[derive(Debug, Error)]
pub enum ConfigError {
 #[error("failed to parse {path}: {source}")]
 Parse {
 path: PathBuf,
 #[source]
 source: serde_yaml::Error,
 },
 #[error("imports may not be nested: {path} imports {nested}")]
 NestedImport { path: PathBuf, nested: PathBuf },
 #[error("duplicate {kind} named {name:?}")]
 DuplicateSubject { kind: &'static str, name: String },
 #[error("{referrer} references unknown {kind} {name:?}")]
 UnknownReference {
 referrer: String,
 kind: &'static str,
 name: String,
 },
 #[error("label {label:?} is banned for {subject}")]
 ForbiddenLabel { subject: String, label: String },
 #[error("archive source {name:?} has no checksum and mandate_hashes_for_archives is set")]
 MissingChecksum { name: String },
 #[error("unknown substitution variable {0:?}")]
 UnknownVariable(String),
 #[error("rolling_id for {0:?} does not parse as a non-negative integer")]
 InvalidRollingId(String),
 #[error("package {0:?} has a revision less than 1")]
 InvalidRevision(String),
 #[error("dependency graph has a cycle at load time: {0}")]
 Cycle(String),
}

/// Plan-computation failures: §4.4 ordering/activation problems.
#[derive(Debug, Error)]
pub enum PlanError {
 #[error("dependency cycle detected: {}", .path.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(" -> "))]
 Cycle { path: Vec<crate::plan::PlanKey> },
 #[error("{subject} is required but out of build scope (want-sentinel for {action:?})")]
 Unsatisfied { action: Action, subject: SubjectId },
 #[error("only_wanted violated: {0} was activated but not in the wanted set")]
 OnlyWantedViolation(crate::plan::PlanKey),
 #[error("plan execution failed: {0} item(s) did not succeed")]
 Failed(usize),
}

/// Step-execution failures: §4.7 / §7.
#[derive(Debug, Error)]
pub enum ExecError {
 #[error("program failed for {subject} during {action:?}: {detail}")]
 ProgramFailure {
 action: Action,
 subject: SubjectId,
 detail: String,
 },
 #[error("{0:?} is needed but out of scope")]
 Wanted(SubjectId),
 #[error("@ROLLING_ID@ requested for {0:?} but no commit-yml entry is present")]
 RollingIdUnavailable(String),
 #[error("mixing containerless and containerful tools in a single step is not allowed")]
 MixedContainerMode,
 #[error("containerless execution is requested but site.container.allow_containerless is not set")]
 ContainerlessNotAllowed,
 #[error("unknown virtual tool kind {0:?}")]
 UnknownVirtualTool(String),
 #[error(transparent)]
 Io(#[from] std::io::Error),
}

/// Wraps an [`ExecError`] (or any lower-level I/O/network failure) with the
/// step and subject it occurred under, mirroring `ExecutionFailure(step,
/// subject)` from the design's error taxonomy.
#[derive(Debug, Error)]
#[error("executing {action:?} for {subject} failed: {source}")]
pub struct ExecutionFailure {
 pub action: Action,
 pub subject: SubjectId,
 #[source]
 pub source: anyhow::Error,
}
