//! Legacy `requires` maps.
//!
//! A `requires` map pairs a dotted field path with an expected value:
//!
//! ```yaml
//! requires:
//!   plan: pro                       # literal equality
//!   items_count: { greaterThan: 0 } # structured predicate
//!   "!banned": true                 # leading '!' negates the whole predicate
//! ```
//!
//! Structured predicates go through the same [`Operator`] logic as condition
//! blocks, and fields resolve through [`ConditionContext::resolve`], so
//! stored variables and `{{name}}` templates work in both authoring forms.

use super::block::ConditionContext;
use super::operator::Operator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Field path to expected value, in declaration order.
pub type RequiresMap = IndexMap<String, Value>;

/// Key naming a structural prerequisite rather than data
pub const PREVIOUS_STATUS_KEY: &str = "previousStatus";

/// Parsed expectation for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Plain value compared with loose equality
    Literal(Value),
    /// All `(operator, operand)` pairs must hold
    Structured(Vec<(Operator, Value)>),
}

impl Predicate {
    /// Interpret an expected value.
    ///
    /// An object whose keys are all predicate names (`exists`, `oneOf`,
    /// `contains`, `greaterThan`, ... or any operator name) is structured;
    /// anything else is a literal.
    #[must_use]
    pub fn parse(expected: &Value) -> Self {
        if let Value::Object(map) = expected {
            if !map.is_empty() && map.keys().all(|k| predicate_operator(k, &Value::Null).is_some())
            {
                let parts = map
                    .iter()
                    .filter_map(|(k, v)| predicate_operator(k, v).map(|op| (op, v.clone())))
                    .collect();
                return Self::Structured(parts);
            }
        }
        Self::Literal(expected.clone())
    }

    /// Evaluate against a possibly-missing field value.
    #[must_use]
    pub fn evaluate(&self, actual: Option<&Value>) -> bool {
        match self {
            Self::Literal(expected) => Operator::Equals.apply(actual, expected),
            Self::Structured(parts) => parts.iter().all(|(op, operand)| op.apply(actual, operand)),
        }
    }
}

/// Map a structured-predicate key to its operator.
fn predicate_operator(key: &str, operand: &Value) -> Option<Operator> {
    let op = match key {
        "exists" => {
            if operand.as_bool() == Some(false) {
                Operator::NotExists
            } else {
                Operator::Exists
            }
        }
        "oneOf" => Operator::In,
        other => Operator::from(other),
    };
    match op {
        Operator::Unknown(_) => None,
        op => Some(op),
    }
}

/// A `requires` key split into field path and negation flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequirementKey<'a> {
    /// Dotted field path
    pub field: &'a str,
    /// Whether the key carried a leading `!`
    pub negated: bool,
}

impl<'a> RequirementKey<'a> {
    /// Parse a raw key.
    #[must_use]
    pub fn parse(raw: &'a str) -> Self {
        match raw.strip_prefix('!') {
            Some(field) => Self {
                field,
                negated: true,
            },
            None => Self {
                field: raw,
                negated: false,
            },
        }
    }

    /// `entity` and `field` of a dotted key, when it has exactly one dot.
    #[must_use]
    pub fn entity_field(&self) -> Option<(&'a str, &'a str)> {
        let (entity, field) = self.field.split_once('.')?;
        if entity.is_empty() || field.is_empty() || field.contains('.') {
            return None;
        }
        Some((entity, field))
    }
}

/// A requirement that did not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMismatch {
    /// Dotted field path
    pub field: String,
    /// Expected value or predicate as written
    pub expected: Value,
    /// Value found in stored variables or the snapshot
    pub actual: Option<Value>,
    /// Whether the requirement was negated
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actual = self
            .actual
            .as_ref()
            .map_or_else(|| "<missing>".to_string(), Value::to_string);
        if self.negated {
            write!(f, "{}: expected NOT {}, actual {}", self.field, self.expected, actual)
        } else {
            write!(f, "{}: expected {}, actual {}", self.field, self.expected, actual)
        }
    }
}

/// Result of evaluating a `requires` map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiresOutcome {
    /// Whether every requirement holds
    pub met: bool,
    /// Requirements that failed
    pub mismatches: Vec<FieldMismatch>,
}

/// Evaluate one requirement entry. Returns the mismatch when it fails.
#[must_use]
pub fn evaluate_requirement(
    key: &str,
    expected: &Value,
    ctx: &ConditionContext<'_>,
) -> Option<FieldMismatch> {
    let key = RequirementKey::parse(key);
    let actual = ctx.resolve(key.field);
    let holds = Predicate::parse(expected).evaluate(actual);
    if holds == key.negated {
        Some(FieldMismatch {
            field: key.field.to_string(),
            expected: expected.clone(),
            actual: actual.cloned(),
            negated: key.negated,
        })
    } else {
        None
    }
}

/// Evaluate a whole `requires` map. The structural `previousStatus` key is
/// not data and is skipped.
#[must_use]
pub fn evaluate_requires(requires: &RequiresMap, ctx: &ConditionContext<'_>) -> RequiresOutcome {
    let mismatches: Vec<FieldMismatch> = requires
        .iter()
        .filter(|(key, _)| key.as_str() != PREVIOUS_STATUS_KEY)
        .filter_map(|(key, expected)| evaluate_requirement(key, expected, ctx))
        .collect();
    RequiresOutcome {
        met: mismatches.is_empty(),
        mismatches,
    }
}
