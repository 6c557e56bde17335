//! Test data snapshots.
//!
//! A snapshot is the recorded state of the system under test: a nested JSON
//! object with an optional top-level `status` and per-entity `status` fields
//! (`dancer.status`). Snapshots written by long-running suites may instead be
//! an append-only log:
//!
//! ```json
//! {
//!   "_original": { "status": "initial" },
//!   "_changeLog": [
//!     { "label": "login", "delta": { "status": "logged_in", "user.name": "ana" } }
//!   ]
//! }
//! ```
//!
//! The planner always reads the flattened view: `_original` with every delta
//! applied in order, later deltas overriding earlier ones and dotted keys
//! merging into nested objects.

use crate::result::{PrecursorError, PrecursorResult};
use serde_json::{Map, Value};

/// Key holding the base document of a change-logged snapshot
pub const ORIGINAL_KEY: &str = "_original";
/// Key holding the ordered `{label, delta}` entries
pub const CHANGE_LOG_KEY: &str = "_changeLog";

/// Snapshot of test data with its materialized (flattened) view.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    raw: Value,
    flat: Value,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(Value::Object(Map::new()))
    }
}

impl Snapshot {
    /// Wrap a raw document, flattening any change log.
    #[must_use]
    pub fn new(raw: Value) -> Self {
        let flat = flatten(&raw);
        Self { raw, flat }
    }

    /// Parse a snapshot from JSON text. The document must be an object.
    pub fn from_json(json: &str) -> PrecursorResult<Self> {
        let raw: Value = serde_json::from_str(json)?;
        if !raw.is_object() {
            return Err(PrecursorError::invalid_snapshot(
                "snapshot document must be a JSON object",
            ));
        }
        Ok(Self::new(raw))
    }

    /// The document as stored (change log intact).
    #[must_use]
    pub const fn raw(&self) -> &Value {
        &self.raw
    }

    /// The materialized view the planner reads.
    #[must_use]
    pub const fn flattened(&self) -> &Value {
        &self.flat
    }

    /// Consume the snapshot, returning the stored document.
    #[must_use]
    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// Global status.
    #[must_use]
    pub fn status(&self) -> Option<&str> {
        self.flat.get("status").and_then(Value::as_str)
    }

    /// Status tracked for an entity (`<entity>.status`).
    #[must_use]
    pub fn entity_status(&self, entity: &str) -> Option<&str> {
        self.flat
            .get(entity)
            .and_then(|e| e.get("status"))
            .and_then(Value::as_str)
    }

    /// Status for an optional entity scope.
    #[must_use]
    pub fn status_for(&self, entity: Option<&str>) -> Option<&str> {
        match entity {
            Some(e) => self.entity_status(e),
            None => self.status(),
        }
    }

    /// Resolve a dotted path against the flattened view.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup_path(&self.flat, path)
    }

    /// Whether the document is an `_original` + `_changeLog` pair.
    #[must_use]
    pub fn has_change_log(&self) -> bool {
        self.raw.get(ORIGINAL_KEY).is_some() || self.raw.get(CHANGE_LOG_KEY).is_some()
    }

    /// Merge the result of an executed step.
    ///
    /// Change-logged snapshots get a new `{label, delta}` entry; plain
    /// snapshots have the delta applied in place.
    pub fn merge(&mut self, label: &str, delta: &Value) {
        if self.has_change_log() {
            if let Value::Object(root) = &mut self.raw {
                let log = root
                    .entry(CHANGE_LOG_KEY)
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !log.is_array() {
                    *log = Value::Array(Vec::new());
                }
                if let Value::Array(entries) = log {
                    let mut entry = Map::new();
                    entry.insert("label".to_string(), Value::String(label.to_string()));
                    entry.insert("delta".to_string(), delta.clone());
                    entries.push(Value::Object(entry));
                }
            }
        } else {
            apply_delta(&mut self.raw, delta);
        }
        self.flat = flatten(&self.raw);
    }
}

/// Resolve a dotted path (`a.b.0.c`) inside a JSON value.
///
/// Numeric segments index into arrays. Missing segments yield `None`.
#[must_use]
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Materialize a raw snapshot document.
#[must_use]
pub fn flatten(raw: &Value) -> Value {
    let Value::Object(root) = raw else {
        return raw.clone();
    };
    if !root.contains_key(ORIGINAL_KEY) && !root.contains_key(CHANGE_LOG_KEY) {
        return raw.clone();
    }

    let mut view = match root.get(ORIGINAL_KEY) {
        Some(original @ Value::Object(_)) => original.clone(),
        _ => {
            let rest: Map<String, Value> = root
                .iter()
                .filter(|(k, _)| k.as_str() != ORIGINAL_KEY && k.as_str() != CHANGE_LOG_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Value::Object(rest)
        }
    };

    if let Some(Value::Array(entries)) = root.get(CHANGE_LOG_KEY) {
        for entry in entries {
            if let Some(delta) = entry.get("delta") {
                apply_delta(&mut view, delta);
            }
        }
    }
    view
}

/// Apply one delta: plain keys replace, dotted keys write into nested objects.
fn apply_delta(target: &mut Value, delta: &Value) {
    let Value::Object(changes) = delta else {
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    let Value::Object(map) = target else {
        return;
    };
    for (key, value) in changes {
        if key.contains('.') {
            set_path(map, key, value.clone());
        } else {
            map.insert(key.clone(), value.clone());
        }
    }
}

fn set_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut current = map;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            current.insert(segment.to_string(), value);
            return;
        }
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plain_snapshot_is_its_own_view() {
        let snap = Snapshot::new(json!({"status": "cart", "items_count": 2}));
        assert_eq!(snap.status(), Some("cart"));
        assert_eq!(snap.get("items_count"), Some(&json!(2)));
        assert!(!snap.has_change_log());
    }

    #[test]
    fn test_change_log_later_deltas_override() {
        let snap = Snapshot::new(json!({
            "_original": {"status": "initial", "plan": "free"},
            "_changeLog": [
                {"label": "a", "delta": {"status": "logged_in"}},
                {"label": "b", "delta": {"status": "upgraded", "plan": "pro"}}
            ]
        }));
        assert_eq!(snap.status(), Some("upgraded"));
        assert_eq!(snap.get("plan"), Some(&json!("pro")));
        assert!(snap.flattened().get(CHANGE_LOG_KEY).is_none());
    }

    #[test]
    fn test_dotted_delta_keys_merge_nested() {
        let snap = Snapshot::new(json!({
            "_original": {"dancer": {"status": "initial", "name": "ana"}},
            "_changeLog": [
                {"label": "login", "delta": {"dancer.status": "logged_in", "dancer.loggedIn": true}}
            ]
        }));
        assert_eq!(snap.entity_status("dancer"), Some("logged_in"));
        assert_eq!(snap.get("dancer.name"), Some(&json!("ana")));
        assert_eq!(snap.get("dancer.loggedIn"), Some(&json!(true)));
    }

    #[test]
    fn test_lookup_path_indexes_arrays() {
        let v = json!({"items": [{"sku": "a"}, {"sku": "b"}]});
        assert_eq!(lookup_path(&v, "items.1.sku"), Some(&json!("b")));
        assert_eq!(lookup_path(&v, "items.9.sku"), None);
        assert_eq!(lookup_path(&v, "missing.path"), None);
        assert_eq!(lookup_path(&v, ""), None);
    }

    #[test]
    fn test_status_for_entity_scope() {
        let snap = Snapshot::new(json!({"status": "club_ready", "dancer": {"status": "logged_in"}}));
        assert_eq!(snap.status_for(None), Some("club_ready"));
        assert_eq!(snap.status_for(Some("dancer")), Some("logged_in"));
        assert_eq!(snap.status_for(Some("manager")), None);
    }

    #[test]
    fn test_merge_appends_to_change_log() {
        let mut snap = Snapshot::new(json!({"_original": {"status": "initial"}, "_changeLog": []}));
        snap.merge("booking_requested", &json!({"status": "booking_requested"}));
        assert_eq!(snap.status(), Some("booking_requested"));
        let log = snap.raw().get(CHANGE_LOG_KEY).and_then(Value::as_array).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0]["label"], json!("booking_requested"));
    }

    #[test]
    fn test_merge_plain_applies_in_place() {
        let mut snap = Snapshot::new(json!({"status": "initial"}));
        snap.merge("step", &json!({"status": "cart", "cart.items_count": 1}));
        assert_eq!(snap.status(), Some("cart"));
        assert_eq!(snap.raw()["cart"]["items_count"], json!(1));
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(Snapshot::from_json("[1, 2]").is_err());
        assert!(Snapshot::from_json("{\"status\": \"x\"}").is_ok());
    }
}
