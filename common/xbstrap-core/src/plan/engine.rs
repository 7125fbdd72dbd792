//! The Plan Engine façade (ties C4.1-C4.4 together) and the `run_plan`
//! driver. Grounded on `Plan.fill` /
//! `Plan.execute_for_wanted` in `base.py`.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

use crate::config::Config;
use crate::error::PlanError;

use super::materialize::{Materializer, Scope};
use super::order::order_items;
use super::probe::ProbeContext;
use super::{activate, Action, ActivationPolicy, ExecutionStatus, ItemMap, PlanItem, PlanKey};

/// A fully materialized, ordered, and activated plan (C4 end-to-end).
pub struct Plan<'a> {
 pub config: &'a Config,
 pub items: ItemMap,
 pub order: Vec<PlanKey>,
 pub wanted: Vec<PlanKey>,
}

impl<'a> Plan<'a> {
 /// `compute_plan`: materialize -> order -> activate, in that order.
 /// Recomputing against an unchanged filesystem state yields a
 /// byte-identical plan (testable property 3), since every step here is a
 /// pure function of `config`/`wanted`/`scope`/`policy` plus the probe's
 /// (also pure, read-only) filesystem observations.
 pub fn compute(
 config: &'a Config,
 wanted: Vec<PlanKey>,
 scope: &Scope,
 probe: &ProbeContext,
 policy: ActivationPolicy,
 shuffle_seed: Option<u64>,
 ) -> Result<Plan<'a>> {
 let mut items = Materializer::new(config, scope).materialize(&wanted)?;
 let order = order_items(&mut items, shuffle_seed)?;
 activate(&mut items, &order, &wanted, probe, policy)?;
 Ok(Plan {
 config,
 items,
 order,
 wanted,
 })
 }

 /// The emitted order restricted to active items — what `run_plan`/
 /// `explain` actually walk.
 pub fn active_order(&self) -> Vec<&PlanKey> {
 self.order
 .iter()
 .filter(|k| self.items[*k].active)
 .collect()
 }

 /// Testable property 5: nothing left to do.
 pub fn is_empty(&self) -> bool {
 self.active_order().is_empty()
 }

 /// A numbered, human-readable plan dump with "required by: #n, #n"
 /// back-references, the shape `xbstrap plan --explain` prints.
 pub fn explain(&self) -> String {
 use std::collections::HashMap;

 let active = self.active_order();
 let numbers: HashMap<&PlanKey, usize> = active
 .iter()
 .enumerate()
 .map(|(i, key)| (*key, i + 1))
 .collect();

 let mut required_by: HashMap<&PlanKey, Vec<usize>> = HashMap::new();
 for key in &active {
 let item = &self.items[*key];
 let consumer_no = numbers[key];
 for edge in item.all_dependency_edges() {
 if numbers.contains_key(edge) {
 required_by.entry(edge).or_default().push(consumer_no);
 }
 }
 }

 let mut out = String::new();
 for key in &active {
 let n = numbers[key];
 let refs = required_by.get(key).cloned().unwrap_or_default();
 if refs.is_empty() {
 out.push_str(&format!("#{n} {key}\n"));
 } else {
 let refs: Vec<String> = refs.iter().map(|r| format!("#{r}")).collect();
 out.push_str(&format!("#{n} {key} (required by: {})\n", refs.join(", ")));
 }
 }
 out
 }
}

/// One line of the optional progress-file stream.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
 pub n_this: usize,
 pub n_all: usize,
 pub status: &'static str,
 pub action: String,
 pub subject: String,
 pub architecture: Option<String>,
 pub artifact_files: Option<Vec<String>>,
}

fn status_name(status: ExecutionStatus) -> &'static str {
 match status {
 ExecutionStatus::Success => "success",
 ExecutionStatus::StepFailed => "failure",
 ExecutionStatus::PrereqsFailed => "prereqs-failed",
 ExecutionStatus::NotWanted => "not-wanted",
 ExecutionStatus::Null => "success",
 }
}

fn prereqs_satisfied(item: &PlanItem, items: &ItemMap) -> bool {
 item.all_dependency_edges().all(|edge| {
 matches!(
 items.get(edge).map(|i| i.status),
 None | Some(ExecutionStatus::Success) | Some(ExecutionStatus::Null) | Some(ExecutionStatus::NotWanted)
 )
 })
}

/// Runs every active item in emitted order, invoking `execute` for real
/// work. `WANT_TOOL`/`WANT_PKG` sentinels are never invoked — the design
/// says they always fail, meaning "needed but out of scope". Without
/// `keep_going` the first failure aborts immediately; with it, every
/// downstream item whose edges include a non-success result is skipped as
/// `PREREQS_FAILED` rather than attempted (invariant 9: no item is left in
/// `NULL` once the loop is done).
pub fn run_plan<F>(
 plan: &mut Plan,
 keep_going: bool,
 mut progress: Option<&mut dyn Write>,
 mut execute: F,
) -> Result<()>
where
 F: FnMut(&Config, &PlanKey) -> Result<()>,
{
 let active: Vec<PlanKey> = plan.active_order().into_iter().cloned().collect();
 let n_all = active.len();
 let mut failures = 0usize;

 for (i, key) in active.iter().enumerate() {
 let item = plan.items.get(key).expect("active key must be materialized");
 let status = if !prereqs_satisfied(item, &plan.items) {
 ExecutionStatus::PrereqsFailed
 } else if matches!(key.action, Action::WantTool | Action::WantPkg) {
 ExecutionStatus::StepFailed
 } else {
 match execute(plan.config, key) {
 Ok(()) => ExecutionStatus::Success,
 Err(_) => ExecutionStatus::StepFailed,
 }
 };

 if matches!(status, ExecutionStatus::StepFailed | ExecutionStatus::PrereqsFailed) {
 failures += 1;
 }
 plan.items.get_mut(key).unwrap().status = status;

 if let Some(writer) = progress.as_deref_mut() {
 let record = ProgressRecord {
 n_this: i + 1,
 n_all,
 status: status_name(status),
 action: key.action.display_name().to_owned(),
 subject: key.subject.to_string(),
 architecture: None,
 artifact_files: None,
 };
 writeln!(writer, "---")?;
 serde_yaml::to_writer(&mut *writer, &record)?;
 writeln!(writer)?;
 }

 if !keep_going && matches!(status, ExecutionStatus::StepFailed | ExecutionStatus::PrereqsFailed) {
 return Err(PlanError::Failed(failures).into());
 }
 }

 if failures > 0 {
 return Err(PlanError::Failed(failures).into());
 }
 Ok(())
}

#[cfg(test)]
mod tests {
 use super::*;
 use crate::plan::{ExecutionStatus, PlanItem};
 use crate::subject::SubjectId;
 use std::os::unix::fs::symlink;

 /// A `Config` only `run_plan` needs to exist, never inspects its content:
 /// the test below exercises pure `ItemMap` bookkeeping.
 fn minimal_config(dir: &std::path::Path) -> Config {
 const YAML: &str = "sources:\n  - name: s\n    git: https://example.invalid/s.git\npackages:\n  - name: p\n    from_source: s\n";
 std::fs::write(dir.join("bootstrap.yml"), YAML).unwrap();
 symlink(dir.join("bootstrap.yml"), dir.join("bootstrap.link")).unwrap();
 Config::load(dir).unwrap()
 }

 /// Two independent goals: `goal1`'s one step fails, `goal2`'s one step
 /// succeeds. `keep_going` must run both to completion (invariant 9: every
 /// active item ends in `Success`/`StepFailed`/`PrereqsFailed`, never left
 /// `Null`) and the overall run must still report failure.
 #[test]
 fn keep_going_settles_every_active_item_and_reports_failure() {
 let dir = tempfile::tempdir().unwrap();
 let config = minimal_config(dir.path());

 let goal1 = PlanKey::new(Action::BuildPkg, SubjectId::package("goal1"));
 let dependent1 = PlanKey::new(Action::InstallPkg, SubjectId::package("goal1"));
 let goal2 = PlanKey::new(Action::BuildPkg, SubjectId::package("goal2"));

 let mut items = ItemMap::new();
 items.insert(goal1.clone(), PlanItem::new(goal1.clone()));
 let mut dependent_item = PlanItem::new(dependent1.clone());
 dependent_item.build_edges.push(goal1.clone());
 items.insert(dependent1.clone(), dependent_item);
 items.insert(goal2.clone(), PlanItem::new(goal2.clone()));
 for item in items.values_mut() {
 item.active = true;
 }

 let order = vec![goal1.clone(), dependent1.clone(), goal2.clone()];
 let mut plan = Plan {
 config: &config,
 items,
 order,
 wanted: vec![goal1.clone(), dependent1.clone(), goal2.clone()],
 };

 let result = run_plan(&mut plan, true, None, |_config, key| {
 if key.subject.name == "goal1" {
 anyhow::bail!("goal1 deliberately fails")
 }
 Ok(())
 });

 assert!(result.is_err(), "a failure under keep_going must still surface as an error");
 assert_eq!(plan.items[&goal1].status, ExecutionStatus::StepFailed);
 assert_eq!(plan.items[&dependent1].status, ExecutionStatus::PrereqsFailed);
 assert_eq!(plan.items[&goal2].status, ExecutionStatus::Success);
 assert!(
 plan.items.values().all(|i| i.status != ExecutionStatus::Null),
 "no active item may be left unsettled"
 );
 }
}
