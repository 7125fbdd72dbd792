//! Selective activation (C4.3/C4.4): marks the minimal
//! active subset of the materialized graph needed to satisfy `wanted` under
//! the chosen policy. Grounded on `Plan.activate`/`Plan._check_updatable` in
//! `base.py`.

use std::collections::{HashMap, HashSet};

use anyhow::Result;

use crate::error::PlanError;

use super::probe::{ItemState, ProbeContext};
use super::{ItemMap, PlanKey};

/// The `compute_plan` flags from the design
#[derive(Clone, Copy, Debug, Default)]
pub struct ActivationPolicy {
 /// Activate a wanted item only when its own state is missing.
 pub check: bool,
 /// Additionally activate items that are updatable, or whose build edges
 /// are active or outdated.
 pub update: bool,
 /// When set together with `update`, outdatedness also propagates
 /// through require edges.
 pub recursive: bool,
 /// When set, update consideration (rule 4) is limited to items already
 /// on the build span.
 pub restrict_updates: bool,
 /// Any active item outside `wanted` is a plan error rather than a
 /// silent extra build.
 pub only_wanted: bool,
}

fn probe_all(order: &[PlanKey], probe: &ProbeContext) -> Result<HashMap<PlanKey, ItemState>> {
 order.iter().map(|k| Ok((k.clone(), probe.probe(k)?))).collect()
}

fn propagate_build_span(items: &mut ItemMap) {
 let mut changed = true;
 while changed {
 changed = false;
 let edges: Vec<PlanKey> = items
 .values()
 .filter(|item| item.build_span)
 .flat_map(|item| item.build_edges.iter().cloned())
 .collect();
 for edge in edges {
 if let Some(item) = items.get_mut(&edge) {
 if !item.build_span {
 item.build_span = true;
 changed = true;
 }
 }
 }
 }
}

/// Rule 3: for active items, transitively activate every build/require edge
/// whose probed state is missing.
fn activate_missing_dependencies(items: &mut ItemMap, states: &HashMap<PlanKey, ItemState>) {
 let mut changed = true;
 while changed {
 changed = false;
 let edges: Vec<PlanKey> = items
 .values()
 .filter(|item| item.active)
 .flat_map(|item| item.all_dependency_edges().cloned().collect::<Vec<_>>())
 .collect();
 for edge in edges {
 let missing = states.get(&edge).map(|s| s.missing).unwrap_or(true);
 if missing {
 if let Some(item) = items.get_mut(&edge) {
 if !item.active {
 item.active = true;
 changed = true;
 }
 }
 }
 }
 }
}

/// Rule 4: update propagation. An item becomes active if it is directly
/// updatable, or if a build edge is active/outdated; under `recursive`, the
/// same test additionally runs over require edges.
fn activate_updates(items: &mut ItemMap, states: &HashMap<PlanKey, ItemState>, policy: ActivationPolicy) {
 let outdated = |items: &ItemMap, key: &PlanKey, edges: &[PlanKey]| -> bool {
 let self_ts = states.get(key).and_then(|s| s.timestamp);
 edges.iter().any(|edge| {
 if items.get(edge).map(|i| i.active).unwrap_or(false) {
 return true;
 }
 match (states.get(edge).and_then(|s| s.timestamp), self_ts) {
 (Some(dep_ts), Some(self_ts)) => dep_ts > self_ts,
 _ => false,
 }
 })
 };

 let mut changed = true;
 while changed {
 changed = false;
 let candidates: Vec<PlanKey> = items
 .iter()
 .filter(|(_, item)| !item.active && (!policy.restrict_updates || item.build_span))
 .map(|(k, _)| k.clone())
 .collect();
 for key in candidates {
 let updatable = states.get(&key).map(|s| s.updatable).unwrap_or(false);
 let build_edges = items[&key].build_edges.clone();
 let mut should_activate = updatable || outdated(items, &key, &build_edges);
 if !should_activate && policy.recursive {
 let require_edges = items[&key].require_edges.clone();
 should_activate = outdated(items, &key, &require_edges);
 }
 if should_activate {
 items.get_mut(&key).unwrap().active = true;
 changed = true;
 }
 }
 }
}

/// Runs the full activation pass (rules 1–5 of the design) over an already
/// materialized and ordered item set.
pub fn activate(
 items: &mut ItemMap,
 order: &[PlanKey],
 wanted: &[PlanKey],
 probe: &ProbeContext,
 policy: ActivationPolicy,
) -> Result<()> {
 let states = probe_all(order, probe)?;

 for key in wanted {
 if let Some(item) = items.get_mut(key) {
 item.build_span = true;
 let missing = states.get(key).map(|s| s.missing).unwrap_or(true);
 if !policy.check || missing {
 item.active = true;
 }
 }
 }

 propagate_build_span(items);
 activate_missing_dependencies(items, &states);

 if policy.update {
 activate_updates(items, &states, policy);
 // Activating items for update can surface new missing edges (e.g. a
 // newly activated build step whose own dependency was never probed
 // as part of the original wanted set); settle those too.
 activate_missing_dependencies(items, &states);
 }

 if policy.only_wanted {
 let wanted_set: HashSet<&PlanKey> = wanted.iter().collect();
 for (key, item) in items.iter() {
 if item.active && !wanted_set.contains(key) {
 return Err(PlanError::OnlyWantedViolation(key.clone()).into());
 }
 }
 }

 Ok(())
}
