//! Alternate-path search.
//!
//! Breadth-first search over the status graph implied by each status's `on`
//! table. Only transitions whose guard holds for the current data are
//! followed. The search is bounded by [`PlannerConfig::bfs_budget`]
//! expansions so catalogs with typos or cycles still terminate.
//!
//! [`PlannerConfig::bfs_budget`]: super::PlannerConfig::bfs_budget

use super::analysis::{Fetched, PlanOptions, Planner};
use crate::result::PrecursorResult;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

/// One edge of a found route.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hop {
    /// Source status
    pub from: String,
    /// Destination status
    pub to: String,
    /// Event taken
    pub event: String,
}

impl Planner<'_> {
    /// Search a guard-satisfied route from `start` to `goal`.
    ///
    /// `avoid_first_hop_to` excludes a direct first step into a known-blocked
    /// successor. Returning to `start` after at least one hop is accepted
    /// when `start` has a satisfied transition straight to `goal`.
    ///
    /// Returns `Ok(None)` when no route exists within the budget.
    ///
    /// # Errors
    /// Only descriptor errors.
    pub fn find_alternate_path(
        &self,
        start: &str,
        goal: &str,
        avoid_first_hop_to: Option<&str>,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Option<Vec<Hop>>> {
        if start == goal {
            return Ok(Some(Vec::new()));
        }
        let ctx = self.context(snapshot, options);
        let mut queue: VecDeque<(String, Vec<Hop>)> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        queue.push_back((start.to_string(), Vec::new()));
        seen.insert(start.to_string());
        let mut expansions = 0;

        while let Some((status, path)) = queue.pop_front() {
            if expansions >= self.config.bfs_budget {
                tracing::debug!(
                    "Path search {} -> {} gave up after {} expansions",
                    start,
                    goal,
                    expansions
                );
                return Ok(None);
            }
            expansions += 1;

            let Fetched::Loaded(implication) = self.fetch(&status)? else {
                continue;
            };
            for (event, config) in implication.transitions() {
                if path.is_empty() && avoid_first_hop_to.is_some_and(|avoid| config.reaches(avoid)) {
                    continue;
                }
                if !config.guard().evaluate(&ctx).met {
                    continue;
                }
                let hop = Hop {
                    from: status.clone(),
                    to: config.target.clone(),
                    event: event.to_string(),
                };

                if config.reaches(goal) {
                    let mut route = path.clone();
                    route.push(Hop {
                        to: goal.to_string(),
                        ..hop
                    });
                    return Ok(Some(route));
                }

                if config.target == start {
                    if let Some(forward) = self.direct_hop(start, goal, options, snapshot)? {
                        let mut route = path.clone();
                        route.push(hop);
                        route.push(forward);
                        return Ok(Some(route));
                    }
                    continue;
                }

                if seen.insert(config.target.clone()) {
                    let mut route = path.clone();
                    route.push(hop);
                    queue.push_back((config.target.clone(), route));
                }
            }
        }
        Ok(None)
    }

    /// A satisfied transition straight from `from` to `to`.
    fn direct_hop(
        &self,
        from: &str,
        to: &str,
        options: &PlanOptions,
        snapshot: &Snapshot,
    ) -> PrecursorResult<Option<Hop>> {
        let Fetched::Loaded(implication) = self.fetch(from)? else {
            return Ok(None);
        };
        let ctx = self.context(snapshot, options);
        Ok(implication
            .transitions_to(to)
            .into_iter()
            .find(|(_, config)| config.guard().evaluate(&ctx).met)
            .map(|(event, _)| Hop {
                from: from.to_string(),
                to: to.to_string(),
                event: event.to_string(),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implication::{Implication, MemoryLoader, MemoryRegistry};
    use crate::planner::PlannerConfig;
    use serde_json::json;

    fn catalog(descriptors: &[(&str, &str)]) -> (MemoryRegistry, MemoryLoader) {
        let loader = MemoryLoader::new();
        for (id, yaml) in descriptors {
            loader.insert(Implication::from_yaml(*id, yaml).unwrap());
        }
        (loader.registry(), loader)
    }

    fn events(hops: &[Hop]) -> Vec<&str> {
        hops.iter().map(|h| h.event.as_str()).collect()
    }

    #[test]
    fn test_finds_shortest_satisfied_route() {
        let (registry, loader) = catalog(&[
            ("A", "targetStatus: a\non:\n  TO_B: b\n  TO_C: c\n"),
            ("B", "targetStatus: b\non:\n  TO_D: d\n"),
            ("C", "targetStatus: c\non:\n  TO_X: x\n"),
            ("X", "targetStatus: x\non:\n  TO_D: d\n"),
            ("D", "targetStatus: d\n"),
        ]);
        let planner = Planner::new(&registry, &loader);
        let hops = planner
            .find_alternate_path("a", "d", None, &Snapshot::default(), &PlanOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(events(&hops), vec!["TO_B", "TO_D"]);
        assert_eq!(hops[0].from, "a");
        assert_eq!(hops[1].to, "d");
    }

    #[test]
    fn test_guard_failed_edges_are_not_followed() {
        let (registry, loader) = catalog(&[
            (
                "A",
                "targetStatus: a\non:\n  TO_B:\n    target: b\n    requires: { ok: true }\n  TO_C: c\n",
            ),
            ("B", "targetStatus: b\non:\n  TO_D: d\n"),
            ("C", "targetStatus: c\non:\n  TO_D: d\n"),
            ("D", "targetStatus: d\n"),
        ]);
        let planner = Planner::new(&registry, &loader);
        let hops = planner
            .find_alternate_path("a", "d", None, &Snapshot::new(json!({"ok": false})), &PlanOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(events(&hops), vec!["TO_C", "TO_D"]);
    }

    #[test]
    fn test_avoid_first_hop() {
        let (registry, loader) = catalog(&[
            ("A", "targetStatus: a\non:\n  DIRECT: d\n  DETOUR: b\n"),
            ("B", "targetStatus: b\non:\n  FINISH: d\n"),
            ("D", "targetStatus: d\n"),
        ]);
        let planner = Planner::new(&registry, &loader);
        let hops = planner
            .find_alternate_path("a", "d", Some("d"), &Snapshot::default(), &PlanOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(events(&hops), vec!["DETOUR", "FINISH"]);
    }

    #[test]
    fn test_loop_back_then_forward() {
        let (registry, loader) = catalog(&[
            ("A", "targetStatus: a\non:\n  GO: d\n  AWAY: b\n"),
            ("B", "targetStatus: b\non:\n  BACK: a\n"),
            ("D", "targetStatus: d\n"),
        ]);
        let planner = Planner::new(&registry, &loader);
        let hops = planner
            .find_alternate_path("a", "d", Some("d"), &Snapshot::default(), &PlanOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(events(&hops), vec!["AWAY", "BACK", "GO"]);
    }

    #[test]
    fn test_no_route_and_budget() {
        let (registry, loader) = catalog(&[
            ("A", "targetStatus: a\non:\n  NEXT: b\n"),
            ("B", "targetStatus: b\non:\n  NEXT: a\n"),
            ("Z", "targetStatus: z\n"),
        ]);
        let planner = Planner::new(&registry, &loader);
        let none = planner
            .find_alternate_path("a", "z", None, &Snapshot::default(), &PlanOptions::new())
            .unwrap();
        assert!(none.is_none());

        let (registry, loader) = catalog(&[
            ("A", "targetStatus: a\non:\n  NEXT: b\n"),
            ("B", "targetStatus: b\non:\n  NEXT: c\n"),
            ("C", "targetStatus: c\n"),
        ]);
        let planner = Planner::new(&registry, &loader).with_config(PlannerConfig::default().with_bfs_budget(1));
        let found = planner
            .find_alternate_path("a", "c", None, &Snapshot::default(), &PlanOptions::new())
            .unwrap();
        assert!(found.is_none());
    }
}
