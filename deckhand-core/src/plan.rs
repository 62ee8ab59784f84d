//! The residency diff engine.
//!
//! Compares the target working set against the resident index and emits
//! the two-sided reconciliation plan, in this fixed order:
//!
//! 1. evict = resident − working − protection − hold
//! 2. fetch = working − resident − protection
//!
//! Space is reclaimed before anything is fetched; that is a correctness
//! requirement on a near-full cache, not an optimization. Within each
//! phase operations are in lexical path order (the sets are B-trees), so
//! identical frozen inputs always yield a byte-identical plan.

use crate::protect::ProtectionSet;
use crate::state::ResidentIndex;
use deckhand_model::{MoveOp, MovePlan};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::debug;

/// Everything the diff needs, all immutable.
#[derive(Debug)]
pub struct PlanInputs<'a> {
    /// Translated physical paths that must be cache-resident.
    pub working_set: &'a BTreeSet<PathBuf>,
    /// What is currently believed resident.
    pub resident: &'a ResidentIndex,
    /// Currently-playing paths; excluded from both sides.
    pub protection: &'a ProtectionSet,
    /// Paths shielded from eviction because their instance was
    /// unreachable this cycle (absence of data is not "not needed").
    pub hold: &'a BTreeSet<PathBuf>,
}

pub fn build_plan(inputs: &PlanInputs<'_>) -> MovePlan {
    let mut evictions = Vec::new();
    for path in inputs.resident.paths() {
        if inputs.working_set.contains(path) {
            continue;
        }
        if inputs.protection.contains(path) {
            debug!(path = %path.display(), "keeping: currently playing");
            continue;
        }
        if inputs.hold.contains(path) {
            debug!(path = %path.display(), "keeping: owning instance unreachable");
            continue;
        }
        debug!(path = %path.display(), "evict: no longer on deck");
        evictions.push(MoveOp::Evict {
            path: path.clone(),
            origin: inputs.resident.origin_of(path).map(String::from),
        });
    }

    let mut fetches = Vec::new();
    for path in inputs.working_set {
        if inputs.resident.contains(path) {
            continue;
        }
        if inputs.protection.contains(path) {
            // A playing file is already being served from wherever it
            // lives; it does not need fetching urgently.
            debug!(path = %path.display(), "not fetching: currently playing");
            continue;
        }
        debug!(path = %path.display(), "fetch: on deck, not resident");
        fetches.push(MoveOp::Fetch { path: path.clone() });
    }

    MovePlan::new(evictions, fetches)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(raw: &[&str]) -> BTreeSet<PathBuf> {
        raw.iter().map(PathBuf::from).collect()
    }

    fn resident(raw: &[&str]) -> ResidentIndex {
        let mut index = ResidentIndex::default();
        for path in raw {
            index.insert(PathBuf::from(path), None);
        }
        index
    }

    fn plan_paths(ops: &[MoveOp]) -> BTreeSet<PathBuf> {
        ops.iter().map(|op| op.path().to_path_buf()).collect()
    }

    #[test]
    fn plan_exactly_reconciles_resident_toward_working_set() {
        let working = paths(&["/mnt/user/a.mkv", "/mnt/user/b.mkv"]);
        let index = resident(&["/mnt/user/b.mkv", "/mnt/user/c.mkv"]);
        let protection = ProtectionSet::default();
        let hold = BTreeSet::new();

        let plan = build_plan(&PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &protection,
            hold: &hold,
        });

        let evicted = plan_paths(&plan.evictions);
        let fetched = plan_paths(&plan.fetches);
        assert_eq!(evicted, paths(&["/mnt/user/c.mkv"]));
        assert_eq!(fetched, paths(&["/mnt/user/a.mkv"]));
        // Disjoint, and applying the plan lands exactly on the target.
        assert!(evicted.is_disjoint(&fetched));
        let after: BTreeSet<PathBuf> = index
            .as_set()
            .difference(&evicted)
            .cloned()
            .collect::<BTreeSet<_>>()
            .union(&fetched)
            .cloned()
            .collect();
        assert_eq!(after, working);
    }

    #[test]
    fn protection_wins_over_both_sides() {
        // Stale on cache AND playing -> plan omits it entirely; wanted
        // but playing -> no fetch either.
        let working = paths(&["/mnt/user/wanted.mkv"]);
        let index = resident(&["/mnt/user/stale.mkv"]);
        let protection = ProtectionSet::from_paths(paths(&[
            "/mnt/user/stale.mkv",
            "/mnt/user/wanted.mkv",
        ]));
        let hold = BTreeSet::new();

        let plan = build_plan(&PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &protection,
            hold: &hold,
        });
        assert!(plan.is_empty());

        // Next cycle, playback stopped: the stale file is evicted.
        let plan = build_plan(&PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &ProtectionSet::default(),
            hold: &hold,
        });
        assert_eq!(plan_paths(&plan.evictions), paths(&["/mnt/user/stale.mkv"]));
    }

    #[test]
    fn held_paths_are_not_evicted_but_do_not_trigger_fetches() {
        let working = BTreeSet::new();
        let index = resident(&["/mnt/user/ferienhaus.mkv", "/mnt/user/stale.mkv"]);
        let protection = ProtectionSet::default();
        let hold = paths(&["/mnt/user/ferienhaus.mkv", "/mnt/user/not-resident.mkv"]);

        let plan = build_plan(&PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &protection,
            hold: &hold,
        });
        assert_eq!(plan_paths(&plan.evictions), paths(&["/mnt/user/stale.mkv"]));
        assert!(plan.fetches.is_empty());
    }

    #[test]
    fn evictions_carry_origin_hints() {
        let mut index = ResidentIndex::default();
        index.insert(PathBuf::from("/mnt/user/a.mkv"), Some("disk3".into()));
        index.insert(PathBuf::from("/mnt/user/b.mkv"), None);

        let plan = build_plan(&PlanInputs {
            working_set: &BTreeSet::new(),
            resident: &index,
            protection: &ProtectionSet::default(),
            hold: &BTreeSet::new(),
        });
        assert_eq!(
            plan.evictions,
            vec![
                MoveOp::Evict {
                    path: PathBuf::from("/mnt/user/a.mkv"),
                    origin: Some("disk3".into()),
                },
                MoveOp::Evict {
                    path: PathBuf::from("/mnt/user/b.mkv"),
                    origin: None,
                },
            ]
        );
    }

    #[test]
    fn identical_inputs_yield_byte_identical_plans() {
        let working = paths(&["/mnt/user/z.mkv", "/mnt/user/a.mkv", "/mnt/user/m.mkv"]);
        let index = resident(&["/mnt/user/y.mkv", "/mnt/user/b.mkv"]);
        let inputs = PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &ProtectionSet::default(),
            hold: &BTreeSet::new(),
        };

        let first = serde_json::to_string(&build_plan(&inputs)).unwrap();
        let second = serde_json::to_string(&build_plan(&inputs)).unwrap();
        assert_eq!(first, second);

        // And ordering inside each phase is lexical.
        let plan = build_plan(&inputs);
        let fetch_order: Vec<&str> = plan
            .fetches
            .iter()
            .map(|op| op.path().to_str().unwrap())
            .collect();
        assert_eq!(
            fetch_order,
            vec!["/mnt/user/a.mkv", "/mnt/user/m.mkv", "/mnt/user/z.mkv"]
        );
    }

    #[test]
    fn reconciled_state_plans_nothing() {
        let working = paths(&["/mnt/user/a.mkv", "/mnt/user/b.mkv"]);
        let index = resident(&["/mnt/user/a.mkv", "/mnt/user/b.mkv"]);
        let plan = build_plan(&PlanInputs {
            working_set: &working,
            resident: &index,
            protection: &ProtectionSet::default(),
            hold: &BTreeSet::new(),
        });
        assert!(plan.is_empty());
    }
}
