//! Condition evaluation.
//!
//! Two authoring forms describe when a transition or setup entry applies:
//! legacy `requires` maps ([`predicate`]) and block-based condition trees
//! ([`block`]). Both evaluate through the same [`operator`] semantics.
//! [`Guard`] picks the one that governs a given transition or entry.

pub mod block;
pub mod custom;
pub mod operator;
pub mod predicate;

pub use block::{
    strip_template, BlockResult, Check, CheckResult, ConditionBlock, ConditionContext,
    ConditionEvaluation, ConditionTree, MatchMode, ValueType,
};
pub use custom::{CustomPredicateFn, PredicateRegistry};
pub use operator::Operator;
pub use predicate::{
    evaluate_requirement, evaluate_requires, FieldMismatch, Predicate, RequirementKey,
    RequiresMap, RequiresOutcome, PREVIOUS_STATUS_KEY,
};

/// The condition that governs a transition or setup entry.
///
/// `conditions` wins when present; otherwise the legacy `requires` map.
/// An empty map or a tree with no enabled blocks is no guard at all.
#[derive(Debug, Clone, Copy)]
pub enum Guard<'a> {
    /// Nothing to check
    Open,
    /// Block-based tree
    Conditions(&'a ConditionTree),
    /// Legacy requires map
    Requires(&'a RequiresMap),
}

/// Result of evaluating a guard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuardOutcome {
    /// Whether the guard holds
    pub met: bool,
    /// Diagnostics for failed parts
    pub mismatches: Vec<FieldMismatch>,
}

impl<'a> Guard<'a> {
    /// Select the governing guard.
    #[must_use]
    pub fn select(conditions: Option<&'a ConditionTree>, requires: Option<&'a RequiresMap>) -> Self {
        if let Some(tree) = conditions.filter(|t| !t.is_empty()) {
            return Self::Conditions(tree);
        }
        match requires.filter(|r| r.keys().any(|k| k != PREVIOUS_STATUS_KEY)) {
            Some(map) => Self::Requires(map),
            None => Self::Open,
        }
    }

    /// Whether there is nothing to check
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }

    /// Evaluate against the context.
    #[must_use]
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> GuardOutcome {
        match self {
            Self::Open => GuardOutcome {
                met: true,
                mismatches: Vec::new(),
            },
            Self::Conditions(tree) => {
                let evaluation = tree.evaluate(ctx);
                GuardOutcome {
                    met: evaluation.met,
                    mismatches: evaluation.mismatches(),
                }
            }
            Self::Requires(map) => {
                let outcome = evaluate_requires(map, ctx);
                GuardOutcome {
                    met: outcome.met,
                    mismatches: outcome.mismatches,
                }
            }
        }
    }
}
