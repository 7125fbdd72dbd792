//! Deterministic ordering (C4.2): a DFS topological sort over
//! the materialized item set with a fully deterministic tie-break key, plus
//! an optional post-sort PRNG shuffle for stress-testing the engine's
//! indifference to input order. Grounded on `Plan._order_items`/
//! `PlanItem.get_ordering_key` in `base.py`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::PlanError;
use crate::subject::SubjectKind;

use super::{Action, ItemMap, PlanKey, PlanState};

fn sysroot_tuple(key: &PlanKey) -> (u8, &[String]) {
 match &key.sysroot {
 Some(tuple) => (0, tuple.as_slice()),
 None => (1, &[]),
 }
}

type OrderingKey<'a> = (
 i32,
 (SubjectKind, &'a str, Option<&'a str>, Option<&'a str>),
 Action,
 (u8, &'a [String]),
);

/// The deterministic tie-break key from the design: action-priority bucket
/// first (`WANT_*`/`PULL_PKG_PACK` sort early, `INSTALL_PKG` sorts late),
/// then the subject's stable id, then the action's own ordinal, then the
/// sysroot tuple (an isolated sysroot sorts before the shared one).
fn ordering_key(key: &PlanKey) -> OrderingKey<'_> {
 (
 key.action.ordering_priority(),
 key.subject.sort_key(),
 key.action,
 sysroot_tuple(key),
 )
}

/// Sorts `items` by the deterministic key, optionally shuffles with a seeded
/// PRNG, then performs a DFS three-color topological sort. A gray node
/// revisited mid-DFS is a cycle, reported as the stack path leading to it
/// (testable property 2).
pub fn order_items(items: &mut ItemMap, shuffle_seed: Option<u64>) -> Result<Vec<PlanKey>, PlanError> {
 let mut keys: Vec<PlanKey> = items.keys().cloned().collect();
 keys.sort_by(|a, b| ordering_key(a).cmp(&ordering_key(b)));

 if let Some(seed) = shuffle_seed {
 let mut rng = StdRng::seed_from_u64(seed);
 keys.shuffle(&mut rng);
 }

 for item in items.values_mut() {
 item.state = PlanState::Null;
 }

 let mut result = Vec::with_capacity(keys.len());
 let mut stack: Vec<PlanKey> = Vec::new();
 for key in keys {
 visit(&key, items, &mut result, &mut stack)?;
 }
 Ok(result)
}

fn visit(
 key: &PlanKey,
 items: &mut ItemMap,
 result: &mut Vec<PlanKey>,
 stack: &mut Vec<PlanKey>,
) -> Result<(), PlanError> {
 match items.get(key).map(|i| i.state) {
 Some(PlanState::Ordered) | None => return Ok(()),
 Some(PlanState::Expanding) => {
 let mut path: Vec<PlanKey> = stack.clone();
 path.push(key.clone());
 return Err(PlanError::Cycle { path });
 }
 Some(PlanState::Null) => {}
 }

 items.get_mut(key).unwrap().state = PlanState::Expanding;
 stack.push(key.clone());

 let edges: Vec<PlanKey> = {
 let item = &items[key];
 item.build_edges
 .iter()
 .chain(item.require_edges.iter())
 .chain(item.order_before_edges.iter())
 .chain(item.order_after_edges.iter())
 .cloned()
 .collect()
 };
 for edge in &edges {
 visit(edge, items, result, stack)?;
 }

 stack.pop();
 items.get_mut(key).unwrap().state = PlanState::Ordered;
 result.push(key.clone());
 Ok(())
}

#[cfg(test)]
mod tests {
 use super::*;
 use crate::subject::SubjectId;
 use std::collections::BTreeSet;

 fn key(action: Action, name: &str) -> PlanKey {
 PlanKey::new(action, SubjectId::package(name))
 }

 /// Wires `consumer`'s build edge to `dependency` in both directions: the
 /// map entry and the edge list.
 fn link(items: &mut ItemMap, consumer: &PlanKey, dependency: &PlanKey) {
 items.get_mut(consumer).unwrap().build_edges.push(dependency.clone());
 }

 #[test]
 fn order_is_a_cycle_free_permutation_respecting_build_edges() {
 let a = key(Action::ConfigurePkg, "a");
 let b = key(Action::BuildPkg, "a");
 let c = key(Action::InstallPkg, "a");
 let mut items = ItemMap::new();
 for k in [&a, &b, &c] {
 items.insert(k.clone(), PlanItem::new(k.clone()));
 }
 link(&mut items, &b, &a);
 link(&mut items, &c, &b);

 let order = order_items(&mut items, None).unwrap();

 let as_set: BTreeSet<_> = order.iter().cloned().collect();
 let expected: BTreeSet<_> = [a.clone(), b.clone(), c.clone()].into_iter().collect();
 assert_eq!(as_set, expected, "order must be a permutation of the materialized keys");

 let pos = |k: &PlanKey| order.iter().position(|x| x == k).unwrap();
 assert!(pos(&a) < pos(&b), "dependency must precede its consumer");
 assert!(pos(&b) < pos(&c), "dependency must precede its consumer");
 }

 #[test]
 fn a_shared_dependency_is_visited_once_under_a_diamond_shape() {
 // top depends on (left, right), both of which depend on bottom.
 let top = key(Action::InstallPkg, "top");
 let left = key(Action::ConfigurePkg, "left");
 let right = key(Action::BuildPkg, "right");
 let bottom = key(Action::FetchSrc, "bottom");
 let mut items = ItemMap::new();
 for k in [&top, &left, &right, &bottom] {
 items.insert(k.clone(), PlanItem::new(k.clone()));
 }
 link(&mut items, &top, &left);
 link(&mut items, &top, &right);
 link(&mut items, &left, &bottom);
 link(&mut items, &right, &bottom);

 let order = order_items(&mut items, None).unwrap();

 assert_eq!(order.len(), 4, "the shared dependency must appear exactly once");
 let pos = |k: &PlanKey| order.iter().position(|x| x == k).unwrap();
 assert!(pos(&bottom) < pos(&left));
 assert!(pos(&bottom) < pos(&right));
 assert!(pos(&left) < pos(&top));
 assert!(pos(&right) < pos(&top));
 }

 #[test]
 fn order_is_deterministic_given_the_same_seed() {
 let a = key(Action::ConfigurePkg, "a");
 let b = key(Action::BuildPkg, "b");
 let c = key(Action::InstallPkg, "c");
 let mut items = ItemMap::new();
 for k in [&a, &b, &c] {
 items.insert(k.clone(), PlanItem::new(k.clone()));
 }

 let order1 = order_items(&mut items.clone(), None).unwrap();
 let order2 = order_items(&mut items.clone(), None).unwrap();
 assert_eq!(order1, order2, "no shuffle seed must always yield the same order");

 let shuffled1 = order_items(&mut items.clone(), Some(42)).unwrap();
 let shuffled2 = order_items(&mut items, Some(42)).unwrap();
 assert_eq!(shuffled1, shuffled2, "the same shuffle seed must reproduce the same order");
 }

 #[test]
 fn cycle_is_reported_with_both_subjects_on_the_path() {
 let a = key(Action::BuildPkg, "a");
 let b = key(Action::BuildPkg, "b");
 let mut items = ItemMap::new();
 items.insert(a.clone(), PlanItem::new(a.clone()));
 items.insert(b.clone(), PlanItem::new(b.clone()));
 link(&mut items, &a, &b);
 link(&mut items, &b, &a);

 let err = order_items(&mut items, None).unwrap_err();
 match err {
 PlanError::Cycle { path } => {
 assert!(path.contains(&a), "cycle path must mention {a}");
 assert!(path.contains(&b), "cycle path must mention {b}");
 }
 other => panic!("expected PlanError::Cycle, got {other:?}"),
 }
 }
}
