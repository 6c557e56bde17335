//! Named custom predicates.
//!
//! Descriptors never embed source code. A `custom-code` block names a
//! predicate that the embedding application registered ahead of time.
//! Evaluation fails closed: an unregistered name, an `Err`, or a panic inside
//! the predicate all count as "not met" and are logged.

use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Signature of a custom predicate: `(snapshot, stored_vars) -> met`.
pub type CustomPredicateFn =
    dyn Fn(&Value, &Map<String, Value>) -> Result<bool, String> + Send + Sync;

/// Registry of named custom predicates.
#[derive(Clone, Default)]
pub struct PredicateRegistry {
    predicates: HashMap<String, Arc<CustomPredicateFn>>,
}

impl fmt::Debug for PredicateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.predicates.keys().collect();
        names.sort();
        f.debug_struct("PredicateRegistry")
            .field("predicates", &names)
            .finish()
    }
}

impl PredicateRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a predicate, replacing any previous one with the same name.
    pub fn register<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Value, &Map<String, Value>) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    /// Builder-style registration
    #[must_use]
    pub fn with<F>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Value, &Map<String, Value>) -> Result<bool, String> + Send + Sync + 'static,
    {
        self.register(name, predicate);
        self
    }

    /// Whether a predicate is registered under `name`
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    /// Evaluate a named predicate, failing closed.
    #[must_use]
    pub fn evaluate(&self, name: &str, snapshot: &Value, stored: &Map<String, Value>) -> bool {
        let Some(predicate) = self.predicates.get(name) else {
            tracing::warn!("Custom predicate '{}' is not registered; treating as not met", name);
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| predicate(snapshot, stored))) {
            Ok(Ok(met)) => met,
            Ok(Err(message)) => {
                tracing::warn!("Custom predicate '{}' failed: {}", name, message);
                false
            }
            Err(_) => {
                tracing::warn!("Custom predicate '{}' panicked; treating as not met", name);
                false
            }
        }
    }
}
