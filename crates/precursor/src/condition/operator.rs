//! Field-level comparison operators.
//!
//! Every operator is total: a missing field (`None`) is a valid operand and
//! produces a defined result, usually `false`. Numeric comparisons coerce
//! both sides to numbers; an invalid `matches` pattern is simply a miss.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator used by condition checks.
///
/// Deserializes from the camelCase operator name. Names outside the known set
/// are kept as [`Operator::Unknown`] and always evaluate to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Matches,
    In,
    NotIn,
    Exists,
    NotExists,
    Truthy,
    Falsy,
    /// Unrecognized operator name
    Unknown(String),
}

impl Operator {
    /// Every supported operator.
    pub const SUPPORTED: [Self; 17] = [
        Self::Equals,
        Self::NotEquals,
        Self::GreaterThan,
        Self::GreaterThanOrEqual,
        Self::LessThan,
        Self::LessThanOrEqual,
        Self::Contains,
        Self::NotContains,
        Self::StartsWith,
        Self::EndsWith,
        Self::Matches,
        Self::In,
        Self::NotIn,
        Self::Exists,
        Self::NotExists,
        Self::Truthy,
        Self::Falsy,
    ];

    /// Operator name as written in descriptors.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "notEquals",
            Self::GreaterThan => "greaterThan",
            Self::GreaterThanOrEqual => "greaterThanOrEqual",
            Self::LessThan => "lessThan",
            Self::LessThanOrEqual => "lessThanOrEqual",
            Self::Contains => "contains",
            Self::NotContains => "notContains",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Matches => "matches",
            Self::In => "in",
            Self::NotIn => "notIn",
            Self::Exists => "exists",
            Self::NotExists => "notExists",
            Self::Truthy => "truthy",
            Self::Falsy => "falsy",
            Self::Unknown(name) => name,
        }
    }

    /// Whether the operator ignores its expected value.
    #[must_use]
    pub const fn is_unary(&self) -> bool {
        matches!(
            self,
            Self::Exists | Self::NotExists | Self::Truthy | Self::Falsy
        )
    }

    /// Evaluate `actual <op> expected`.
    #[must_use]
    pub fn apply(&self, actual: Option<&Value>, expected: &Value) -> bool {
        match self {
            Self::Equals => equals(actual, expected),
            Self::NotEquals => !equals(actual, expected),
            Self::GreaterThan => compare(actual, expected, |a, b| a > b),
            Self::GreaterThanOrEqual => compare(actual, expected, |a, b| a >= b),
            Self::LessThan => compare(actual, expected, |a, b| a < b),
            Self::LessThanOrEqual => compare(actual, expected, |a, b| a <= b),
            Self::Contains => contains(actual, expected),
            Self::NotContains => !contains(actual, expected),
            Self::StartsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.starts_with(&e)),
            Self::EndsWith => text_pair(actual, expected).is_some_and(|(a, e)| a.ends_with(&e)),
            Self::Matches => matches_pattern(actual, expected),
            Self::In => member_of(actual, expected),
            Self::NotIn => !member_of(actual, expected),
            Self::Exists => actual.is_some_and(|v| !v.is_null()),
            Self::NotExists => !actual.is_some_and(|v| !v.is_null()),
            Self::Truthy => is_truthy(actual),
            Self::Falsy => !is_truthy(actual),
            Self::Unknown(name) => {
                tracing::warn!("Unknown condition operator '{}' evaluates to false", name);
                false
            }
        }
    }
}

impl From<&str> for Operator {
    fn from(name: &str) -> Self {
        Self::SUPPORTED
            .iter()
            .find(|op| op.name() == name)
            .cloned()
            .unwrap_or_else(|| Self::Unknown(name.to_string()))
    }
}

impl From<String> for Operator {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.name().to_string()
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Loose equality: numbers compare numerically, numeric and boolean strings
/// compare against their parsed form.
#[must_use]
pub fn loose_eq(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => s
            .trim()
            .parse::<f64>()
            .is_ok_and(|parsed| Some(parsed) == n.as_f64()),
        (Value::Bool(b), Value::String(s)) | (Value::String(s), Value::Bool(b)) => {
            s.as_str() == if *b { "true" } else { "false" }
        }
        _ => false,
    }
}

/// Numeric coercion. Objects, arrays and unparsable strings have no number.
#[must_use]
pub fn to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::Null => Some(0.0),
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Scalar text form used by string operators.
#[must_use]
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Truthiness of a possibly-missing value.
#[must_use]
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(value) => loose_eq(value, expected),
        None => expected.is_null(),
    }
}

fn compare(actual: Option<&Value>, expected: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match (to_number(actual), to_number(expected)) {
        (Some(a), Some(b)) if !a.is_nan() && !b.is_nan() => cmp(a, b),
        _ => false,
    }
}

fn contains(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::String(s)) => as_text(expected).is_some_and(|needle| s.contains(&needle)),
        Some(Value::Array(items)) => items.iter().any(|item| loose_eq(item, expected)),
        Some(Value::Object(map)) => expected.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}

fn text_pair(actual: Option<&Value>, expected: &Value) -> Option<(String, String)> {
    Some((as_text(actual?)?, as_text(expected)?))
}

fn matches_pattern(actual: Option<&Value>, expected: &Value) -> bool {
    let Some((text, pattern)) = text_pair(actual, expected) else {
        return false;
    };
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(&text),
        Err(e) => {
            tracing::warn!("Invalid regex '{}' in matches condition: {}", pattern, e);
            false
        }
    }
}

fn member_of(actual: Option<&Value>, expected: &Value) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    match expected {
        Value::Array(options) => options.iter().any(|option| loose_eq(actual, option)),
        Value::String(list) => as_text(actual)
            .is_some_and(|text| list.split(',').any(|option| option.trim() == text)),
        _ => false,
    }
}
