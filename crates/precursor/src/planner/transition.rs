//! Transition selection between two statuses.

use crate::condition::{ConditionContext, FieldMismatch};
use crate::implication::{Implication, Platform, TransitionConfig};

/// A chosen outgoing transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransitionChoice<'i> {
    /// Event name in the `on` table
    pub event: &'i str,
    /// The transition itself
    pub config: &'i TransitionConfig,
}

/// Preferences for breaking ties between transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransitionQuery<'q> {
    /// Event the caller wants, if any
    pub explicit_event: Option<&'q str>,
    /// Platform the caller runs on
    pub current_platform: Option<&'q Platform>,
    /// Whether a platform match counts as a tie-breaker
    pub prefer_same_platform: bool,
}

/// Whether a declared transition can be taken right now.
#[derive(Debug, Clone, PartialEq)]
pub enum TransitionUsability<'i> {
    /// The source declares no transition to the target
    Undeclared,
    /// At least one declared transition is open or its guard holds
    Usable(TransitionChoice<'i>),
    /// Every declared transition is guard-blocked
    Blocked(Vec<FieldMismatch>),
}

/// Pick the transition from `source` to `target_status`.
///
/// A single candidate is returned without looking at its guard; whether it
/// can be taken is [`transition_usability`]'s concern.
#[must_use]
pub fn select_transition<'i>(
    source: &'i Implication,
    target_status: &str,
    query: &TransitionQuery<'_>,
    ctx: &ConditionContext<'_>,
) -> Option<TransitionChoice<'i>> {
    let candidates: Vec<TransitionChoice<'i>> = source
        .transitions_to(target_status)
        .into_iter()
        .map(|(event, config)| TransitionChoice { event, config })
        .collect();

    match candidates.as_slice() {
        [] => return None,
        [only] => return Some(*only),
        _ => {}
    }

    if let Some(event) = query.explicit_event {
        if let Some(choice) = candidates.iter().find(|c| c.event == event) {
            return Some(*choice);
        }
    }

    let guarded_match = candidates.iter().find(|c| {
        let guard = c.config.guard();
        !guard.is_open() && guard.evaluate(ctx).met
    });
    if let Some(choice) = guarded_match {
        return Some(*choice);
    }

    if let Some(choice) = candidates.iter().find(|c| c.config.guard().is_open()) {
        return Some(*choice);
    }

    if let Some(choice) = candidates.iter().find(|c| c.config.is_default) {
        return Some(*choice);
    }

    if query.prefer_same_platform {
        if let Some(platform) = query.current_platform {
            if let Some(choice) = candidates.iter().find(|c| c.config.platforms.contains(platform)) {
                return Some(*choice);
            }
        }
    }

    let first = candidates.first().copied();
    if let Some(choice) = first {
        tracing::warn!(
            "{}: {} transitions reach '{}' and none is preferred; using '{}'",
            source.id,
            candidates.len(),
            target_status,
            choice.event
        );
    }
    first
}

/// Check whether any declared transition from `source` to `target_status`
/// can currently be taken.
#[must_use]
pub fn transition_usability<'i>(
    source: &'i Implication,
    target_status: &str,
    query: &TransitionQuery<'_>,
    ctx: &ConditionContext<'_>,
) -> TransitionUsability<'i> {
    let candidates = source.transitions_to(target_status);
    if candidates.is_empty() {
        return TransitionUsability::Undeclared;
    }

    let mut mismatches = Vec::new();
    let mut open = Vec::new();
    for (event, config) in candidates {
        let outcome = config.guard().evaluate(ctx);
        if outcome.met {
            open.push(event);
        } else {
            mismatches.extend(outcome.mismatches);
        }
    }
    if open.is_empty() {
        return TransitionUsability::Blocked(mismatches);
    }

    let preferred = select_transition(source, target_status, query, ctx)
        .filter(|choice| open.contains(&choice.event) && choice.config.guard().evaluate(ctx).met);
    let choice = preferred.or_else(|| {
        source
            .transitions_to(target_status)
            .into_iter()
            .find(|(_, config)| config.guard().evaluate(ctx).met)
            .map(|(event, config)| TransitionChoice { event, config })
    });
    match choice {
        Some(choice) => TransitionUsability::Usable(choice),
        None => TransitionUsability::Blocked(mismatches),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::PredicateRegistry;
    use crate::snapshot::Snapshot;
    use serde_json::{json, Map, Value};

    const BASIC: &str = r"
targetStatus: basic
on:
  UPGRADE_PRO:
    target: upgraded
    requires: { plan: pro }
  UPGRADE:
    target: upgraded
    isDefault: true
";

    fn with_ctx<R>(data: Value, f: impl FnOnce(&ConditionContext<'_>) -> R) -> R {
        let snapshot = Snapshot::new(data);
        let stored = Map::new();
        let predicates = PredicateRegistry::new();
        let ctx = ConditionContext {
            snapshot: &snapshot,
            stored: &stored,
            predicates: &predicates,
        };
        f(&ctx)
    }

    #[test]
    fn test_guarded_candidate_wins_when_met() {
        let imp = Implication::from_yaml("Basic", BASIC).unwrap();
        let event = with_ctx(json!({"plan": "pro"}), |ctx| {
            select_transition(&imp, "upgraded", &TransitionQuery::default(), ctx)
                .unwrap()
                .event
        });
        assert_eq!(event, "UPGRADE_PRO");
    }

    #[test]
    fn test_unguarded_candidate_otherwise() {
        let imp = Implication::from_yaml("Basic", BASIC).unwrap();
        let event = with_ctx(json!({"plan": "free"}), |ctx| {
            select_transition(&imp, "upgraded", &TransitionQuery::default(), ctx)
                .unwrap()
                .event
        });
        assert_eq!(event, "UPGRADE");
    }

    #[test]
    fn test_explicit_event_first() {
        let imp = Implication::from_yaml("Basic", BASIC).unwrap();
        let query = TransitionQuery {
            explicit_event: Some("UPGRADE"),
            ..TransitionQuery::default()
        };
        let event = with_ctx(json!({"plan": "pro"}), |ctx| {
            select_transition(&imp, "upgraded", &query, ctx).unwrap().event
        });
        assert_eq!(event, "UPGRADE");
    }

    #[test]
    fn test_single_candidate_ignores_guard() {
        let imp = Implication::from_yaml(
            "Cart",
            "targetStatus: cart\non:\n  CHECKOUT:\n    target: checkout\n    requires: { items_count: { greaterThan: 0 } }\n",
        )
        .unwrap();
        with_ctx(json!({"items_count": 0}), |ctx| {
            let query = TransitionQuery::default();
            assert_eq!(
                select_transition(&imp, "checkout", &query, ctx).unwrap().event,
                "CHECKOUT"
            );
            match transition_usability(&imp, "checkout", &query, ctx) {
                TransitionUsability::Blocked(mismatches) => {
                    assert_eq!(mismatches[0].field, "items_count");
                }
                other => panic!("expected blocked, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_default_then_platform_then_first_declared() {
        let imp = Implication::from_yaml(
            "Src",
            r"
targetStatus: src
on:
  ZETA: { target: dst, requires: { x: 1 } }
  MIDDLE: { target: dst, requires: { x: 2 }, platforms: [dancer] }
  ALPHA: { target: dst, requires: { x: 3 }, isDefault: true }
",
        )
        .unwrap();
        let dancer = Platform::Dancer;
        let query = TransitionQuery {
            explicit_event: None,
            current_platform: Some(&dancer),
            prefer_same_platform: true,
        };
        with_ctx(json!({"x": 9}), |ctx| {
            assert_eq!(select_transition(&imp, "dst", &query, ctx).unwrap().event, "ALPHA");
        });

        let no_default = Implication::from_yaml(
            "Src",
            r"
targetStatus: src
on:
  ZETA: { target: dst, requires: { x: 1 } }
  MIDDLE: { target: dst, requires: { x: 2 }, platforms: [dancer] }
  ALPHA: { target: dst, requires: { x: 3 } }
",
        )
        .unwrap();
        with_ctx(json!({"x": 9}), |ctx| {
            assert_eq!(select_transition(&no_default, "dst", &query, ctx).unwrap().event, "MIDDLE");
            assert_eq!(
                select_transition(&no_default, "dst", &TransitionQuery::default(), ctx)
                    .unwrap()
                    .event,
                "ZETA"
            );
        });
    }

    #[test]
    fn test_first_declared_met_guard_wins() {
        let imp = Implication::from_yaml(
            "Src",
            r"
targetStatus: src
on:
  ZETA: { target: dst, requires: { tier: { exists: true } } }
  ALPHA: { target: dst, requires: { tier: gold } }
",
        )
        .unwrap();
        with_ctx(json!({"tier": "gold"}), |ctx| {
            let query = TransitionQuery::default();
            assert_eq!(select_transition(&imp, "dst", &query, ctx).unwrap().event, "ZETA");
            match transition_usability(&imp, "dst", &query, ctx) {
                TransitionUsability::Usable(choice) => assert_eq!(choice.event, "ZETA"),
                other => panic!("expected usable, got {other:?}"),
            }
        });
    }

    #[test]
    fn test_suffix_target_and_undeclared() {
        let imp = Implication::from_yaml(
            "Src",
            "targetStatus: src\non:\n  ARCHIVE: club_archived\n",
        )
        .unwrap();
        with_ctx(json!({}), |ctx| {
            let query = TransitionQuery::default();
            assert!(select_transition(&imp, "archived", &query, ctx).is_some());
            assert_eq!(
                transition_usability(&imp, "elsewhere", &query, ctx),
                TransitionUsability::Undeclared
            );
            assert!(matches!(
                transition_usability(&imp, "archived", &query, ctx),
                TransitionUsability::Usable(_)
            ));
        });
    }
}
