//! Block-based condition trees.
//!
//! ```yaml
//! conditions:
//!   mode: all
//!   blocks:
//!     - type: condition-check
//!       mode: any
//!       checks:
//!         - { field: "plan", operator: "equals", value: "pro" }
//!         - { field: "{{trial}}.active", operator: "truthy" }
//!     - type: custom-code
//!       predicate: has_payment_method
//! ```
//!
//! Disabled blocks and checks (`enabled: false`) are dropped before
//! evaluation. A tree, or a block, with nothing left to evaluate is met.

use super::custom::PredicateRegistry;
use super::operator::{as_text, is_truthy, to_number, Operator};
use super::predicate::FieldMismatch;
use crate::snapshot::{lookup_path, Snapshot};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// How the members of a group combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Every member must hold
    #[default]
    All,
    /// At least one member must hold
    Any,
}

impl MatchMode {
    fn combine(self, mut results: impl Iterator<Item = bool>) -> bool {
        match self {
            Self::All => results.all(|r| r),
            Self::Any => results.any(|r| r),
        }
    }
}

/// Root of a condition tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionTree {
    /// How blocks combine
    #[serde(default)]
    pub mode: MatchMode,
    /// Condition blocks
    #[serde(default)]
    pub blocks: Vec<ConditionBlock>,
}

/// One block of a condition tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ConditionBlock {
    /// Field checks combined with their own mode
    ConditionCheck {
        /// How checks combine
        #[serde(default)]
        mode: MatchMode,
        /// Field checks
        #[serde(default)]
        checks: Vec<Check>,
        /// `false` disables the block
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },
    /// Registered predicate referenced by name
    CustomCode {
        /// Name in the [`PredicateRegistry`]
        predicate: String,
        /// `false` disables the block
        #[serde(default, skip_serializing_if = "Option::is_none")]
        enabled: Option<bool>,
    },
}

impl ConditionBlock {
    /// Whether the block takes part in evaluation
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::ConditionCheck { enabled, .. } | Self::CustomCode { enabled, .. } => {
                *enabled != Some(false)
            }
        }
    }
}

/// How a check's `value` is interpreted before comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Compare as text
    String,
    /// Compare as a number
    Number,
    /// Compare as a boolean
    Boolean,
    /// `value` names another field or stored variable
    Variable,
}

/// Single field check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    /// Dotted field path, optionally wrapped as `{{name}}`
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Expected operand
    #[serde(default)]
    pub value: Value,
    /// Operand interpretation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    /// `false` disables the check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl Check {
    /// Whether the check takes part in evaluation
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled != Some(false)
    }
}

/// Everything a condition needs to see.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Test data
    pub snapshot: &'a Snapshot,
    /// Named stored values, consulted before the snapshot
    pub stored: &'a Map<String, Value>,
    /// Custom predicates
    pub predicates: &'a PredicateRegistry,
}

impl<'a> ConditionContext<'a> {
    /// Resolve a field: stored variables first, then the snapshot.
    #[must_use]
    pub fn resolve(&self, field: &str) -> Option<&'a Value> {
        let stripped = strip_template(field);
        let name: &str = &stripped;
        let from_stored = match name.split_once('.') {
            Some((head, rest)) => self.stored.get(head).and_then(|v| lookup_path(v, rest)),
            None => self.stored.get(name),
        };
        from_stored.or_else(|| self.snapshot.get(name))
    }
}

/// Strip the `{{name}}` wrapper from a field or its leading segment:
/// `{{booking}}` is `booking`, `{{trial}}.active` is `trial.active`.
#[must_use]
pub fn strip_template(field: &str) -> Cow<'_, str> {
    let trimmed = field.trim();
    let Some(inner) = trimmed.strip_prefix("{{") else {
        return Cow::Borrowed(trimmed);
    };
    match inner.split_once("}}") {
        Some((name, "")) => Cow::Borrowed(name.trim()),
        Some((name, rest)) if rest.starts_with('.') => Cow::Owned(format!("{}{rest}", name.trim())),
        _ => Cow::Borrowed(trimmed),
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Field as written
    pub field: String,
    /// Operator name
    pub operator: String,
    /// Operand after interpretation
    pub expected: Value,
    /// Resolved field value
    pub actual: Option<Value>,
    /// Whether the check held
    pub met: bool,
}

/// Outcome of one block.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResult {
    /// Position among the tree's blocks
    pub index: usize,
    /// Predicate name for custom-code blocks
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
    /// Whether the block held
    pub met: bool,
    /// Per-check outcomes
    pub checks: Vec<CheckResult>,
}

/// Outcome of a whole tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionEvaluation {
    /// Whether the tree holds
    pub met: bool,
    /// Per-block outcomes
    pub details: Vec<BlockResult>,
}

impl ConditionEvaluation {
    /// Failing checks and predicates as field diagnostics.
    #[must_use]
    pub fn mismatches(&self) -> Vec<FieldMismatch> {
        let mut out = Vec::new();
        for block in self.details.iter().filter(|b| !b.met) {
            if let Some(name) = &block.predicate {
                out.push(FieldMismatch {
                    field: format!("custom:{name}"),
                    expected: Value::Bool(true),
                    actual: Some(Value::Bool(false)),
                    negated: false,
                });
                continue;
            }
            for check in block.checks.iter().filter(|c| !c.met) {
                let mut expected = Map::new();
                expected.insert(check.operator.clone(), check.expected.clone());
                out.push(FieldMismatch {
                    field: check.field.clone(),
                    expected: Value::Object(expected),
                    actual: check.actual.clone(),
                    negated: false,
                });
            }
        }
        out
    }
}

impl ConditionTree {
    /// Whether no enabled block remains.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.blocks.iter().any(ConditionBlock::is_enabled)
    }

    /// Evaluate the tree.
    #[must_use]
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> ConditionEvaluation {
        let details: Vec<BlockResult> = self
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.is_enabled())
            .map(|(index, block)| evaluate_block(index, block, ctx))
            .collect();
        let met = details.is_empty() || self.mode.combine(details.iter().map(|b| b.met));
        ConditionEvaluation { met, details }
    }
}

fn evaluate_block(index: usize, block: &ConditionBlock, ctx: &ConditionContext<'_>) -> BlockResult {
    match block {
        ConditionBlock::ConditionCheck { mode, checks, .. } => {
            let checks: Vec<CheckResult> = checks
                .iter()
                .filter(|c| c.is_enabled())
                .map(|c| evaluate_check(c, ctx))
                .collect();
            let met = checks.is_empty() || mode.combine(checks.iter().map(|c| c.met));
            BlockResult {
                index,
                predicate: None,
                met,
                checks,
            }
        }
        ConditionBlock::CustomCode { predicate, .. } => BlockResult {
            index,
            predicate: Some(predicate.clone()),
            met: ctx
                .predicates
                .evaluate(predicate, ctx.snapshot.flattened(), ctx.stored),
            checks: Vec::new(),
        },
    }
}

fn evaluate_check(check: &Check, ctx: &ConditionContext<'_>) -> CheckResult {
    let actual = ctx.resolve(&check.field);
    let expected = interpret_value(&check.value, check.value_type, ctx);
    CheckResult {
        field: check.field.clone(),
        operator: check.operator.name().to_string(),
        met: check.operator.apply(actual, &expected),
        actual: actual.cloned(),
        expected,
    }
}

fn interpret_value(value: &Value, value_type: Option<ValueType>, ctx: &ConditionContext<'_>) -> Value {
    match value_type {
        None => value.clone(),
        Some(ValueType::String) => as_text(value).map_or_else(|| value.clone(), Value::String),
        Some(ValueType::Number) => to_number(value)
            .and_then(serde_json::Number::from_f64)
            .map_or_else(|| value.clone(), Value::Number),
        Some(ValueType::Boolean) => match value {
            Value::String(s) => Value::Bool(s.trim().eq_ignore_ascii_case("true")),
            other => Value::Bool(is_truthy(Some(other))),
        },
        Some(ValueType::Variable) => value
            .as_str()
            .and_then(|name| ctx.resolve(name))
            .cloned()
            .unwrap_or(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn tree(v: Value) -> ConditionTree {
        serde_json::from_value(v).unwrap()
    }

    fn eval(t: &ConditionTree, snapshot: Value) -> ConditionEvaluation {
        let snap = Snapshot::new(snapshot);
        let stored = Map::new();
        let predicates = PredicateRegistry::new();
        t.evaluate(&ConditionContext {
            snapshot: &snap,
            stored: &stored,
            predicates: &predicates,
        })
    }

    #[test]
    fn test_all_mode_requires_every_block() {
        let t = tree(json!({
            "mode": "all",
            "blocks": [
                {"type": "condition-check", "checks": [{"field": "plan", "operator": "equals", "value": "pro"}]},
                {"type": "condition-check", "checks": [{"field": "seats", "operator": "greaterThan", "value": 1}]}
            ]
        }));
        assert!(eval(&t, json!({"plan": "pro", "seats": 3})).met);
        let failed = eval(&t, json!({"plan": "pro", "seats": 1}));
        assert!(!failed.met);
        assert_eq!(failed.mismatches().len(), 1);
        assert_eq!(failed.mismatches()[0].field, "seats");
    }

    #[test]
    fn test_any_mode_inside_block() {
        let t = tree(json!({
            "blocks": [{
                "type": "condition-check",
                "mode": "any",
                "checks": [
                    {"field": "role", "operator": "equals", "value": "admin"},
                    {"field": "role", "operator": "equals", "value": "owner"}
                ]
            }]
        }));
        assert!(eval(&t, json!({"role": "owner"})).met);
        assert!(!eval(&t, json!({"role": "guest"})).met);
    }

    #[test]
    fn test_disabled_blocks_and_checks_are_ignored() {
        let t = tree(json!({
            "blocks": [
                {"type": "condition-check", "enabled": false,
                 "checks": [{"field": "x", "operator": "exists"}]},
                {"type": "condition-check",
                 "checks": [{"field": "y", "operator": "exists", "enabled": false}]}
            ]
        }));
        let result = eval(&t, json!({}));
        assert!(result.met);
        assert_eq!(result.details.len(), 1);
        assert!(t.blocks[1].is_enabled());
        assert!(!t.is_empty());
    }

    #[test]
    fn test_empty_tree_is_met() {
        let t = ConditionTree::default();
        assert!(t.is_empty());
        assert!(eval(&t, json!({})).met);
    }

    #[test]
    fn test_custom_code_block_uses_registry() {
        let t = tree(json!({"blocks": [{"type": "custom-code", "predicate": "vip"}]}));
        let snap = Snapshot::new(json!({"tier": "gold"}));
        let stored = Map::new();
        let predicates = PredicateRegistry::new().with("vip", |s, _| Ok(s["tier"] == json!("gold")));
        let ctx = ConditionContext {
            snapshot: &snap,
            stored: &stored,
            predicates: &predicates,
        };
        assert!(t.evaluate(&ctx).met);

        let missing = PredicateRegistry::new();
        let ctx = ConditionContext {
            predicates: &missing,
            ..ctx
        };
        let result = t.evaluate(&ctx);
        assert!(!result.met);
        assert_eq!(result.mismatches()[0].field, "custom:vip");
    }

    #[test]
    fn test_stored_vars_resolve_before_snapshot() {
        let snap = Snapshot::new(json!({"user": {"name": "from-snapshot"}}));
        let mut stored = Map::new();
        stored.insert("user".to_string(), json!({"name": "from-stored"}));
        let predicates = PredicateRegistry::new();
        let ctx = ConditionContext {
            snapshot: &snap,
            stored: &stored,
            predicates: &predicates,
        };
        assert_eq!(ctx.resolve("{{user}}.name"), Some(&json!("from-stored")));
        assert_eq!(ctx.resolve("{{ user.name }}"), Some(&json!("from-stored")));
        assert_eq!(ctx.resolve("user.name"), Some(&json!("from-stored")));
        assert_eq!(strip_template("{{booking}}"), "booking");
    }

    #[test]
    fn test_template_prefix_resolves_nested_field() {
        let t = tree(json!({
            "blocks": [{"type": "condition-check", "checks": [
                {"field": "{{trial}}.active", "operator": "truthy"}
            ]}]
        }));
        let snap = Snapshot::default();
        let mut stored = Map::new();
        stored.insert("trial".to_string(), json!({"active": true}));
        let predicates = PredicateRegistry::new();
        let ctx = ConditionContext {
            snapshot: &snap,
            stored: &stored,
            predicates: &predicates,
        };
        assert!(t.evaluate(&ctx).met);
        assert_eq!(strip_template("{{ trial }}.active"), "trial.active");
        assert_eq!(strip_template("{{broken"), "{{broken");
        assert!(!eval(&t, json!({})).met);
    }

    #[test]
    fn test_value_types() {
        let t = tree(json!({
            "blocks": [{"type": "condition-check", "checks": [
                {"field": "count", "operator": "equals", "value": "2", "valueType": "number"},
                {"field": "active", "operator": "equals", "value": "TRUE", "valueType": "boolean"},
                {"field": "owner", "operator": "equals", "value": "{{creator}}", "valueType": "variable"}
            ]}]
        }));
        assert!(eval(&t, json!({"count": 2, "active": true, "owner": "ana", "creator": "ana"})).met);
        assert!(!eval(&t, json!({"count": 2, "active": true, "owner": "ana", "creator": "bo"})).met);
    }

    #[test]
    fn test_unknown_operator_fails_check() {
        let t = tree(json!({
            "blocks": [{"type": "condition-check", "checks": [
                {"field": "x", "operator": "isAbout", "value": 1}
            ]}]
        }));
        assert!(!eval(&t, json!({"x": 1})).met);
    }

    proptest! {
        #[test]
        fn prop_fully_disabled_tree_is_met(n in 0usize..6, field in "[a-z]{1,8}") {
            let blocks: Vec<ConditionBlock> = (0..n)
                .map(|_| ConditionBlock::ConditionCheck {
                    mode: MatchMode::All,
                    checks: vec![Check {
                        field: field.clone(),
                        operator: Operator::Exists,
                        value: Value::Null,
                        value_type: None,
                        enabled: None,
                    }],
                    enabled: Some(false),
                })
                .collect();
            let t = ConditionTree { mode: MatchMode::All, blocks };
            let ctx = json!({});
            prop_assert!(eval(&t, ctx).met);
        }
    }
}
