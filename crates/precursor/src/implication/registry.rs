//! State registry and discovery cache.
//!
//! The registry answers "which implication produces this status?". The
//! discovery cache is an optional precomputed table of direct transitions
//! between statuses that the planner consults before walking descriptors.

use super::schema::{Implication, ImplicationId};
use std::collections::BTreeMap;

/// Maps status names to implication identifiers.
pub trait StateRegistry {
    /// Implication producing `status`.
    fn lookup(&self, status: &str) -> Option<ImplicationId>;

    /// Every registered status, sorted.
    fn statuses(&self) -> Vec<String>;
}

/// A transition found in the discovery cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectTransition {
    /// Event that performs the transition
    pub event: String,
}

/// Precomputed direct transitions between statuses.
pub trait DiscoveryCache {
    /// Direct transition `from -> to`, if one was discovered.
    fn find_direct_transition(&self, from: &str, to: &str) -> Option<DirectTransition>;
}

/// In-memory registry and discovery cache.
#[derive(Debug, Clone, Default)]
pub struct MemoryRegistry {
    statuses: BTreeMap<String, ImplicationId>,
    transitions: BTreeMap<(String, String), String>,
}

impl MemoryRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from descriptors: every `targetStatus` maps to its
    /// implication and every declared transition is recorded.
    #[must_use]
    pub fn from_implications<'a>(implications: impl IntoIterator<Item = &'a Implication>) -> Self {
        let mut registry = Self::new();
        for implication in implications {
            registry.register(implication.target_status.clone(), implication.id.clone());
            for (event, config) in implication.transitions() {
                registry
                    .transitions
                    .entry((implication.target_status.clone(), config.target.clone()))
                    .or_insert_with(|| event.to_string());
            }
        }
        registry
    }

    /// Register a status.
    pub fn register(&mut self, status: impl Into<String>, id: impl Into<ImplicationId>) {
        let status = status.into();
        let id = id.into();
        if let Some(previous) = self.statuses.get(&status) {
            if previous != &id {
                tracing::warn!(
                    "Status '{}' registered by both {} and {}; keeping {}",
                    status,
                    previous,
                    id,
                    id
                );
            }
        }
        self.statuses.insert(status, id);
    }

    /// Builder-style registration
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>, id: impl Into<ImplicationId>) -> Self {
        self.register(status, id);
        self
    }

    /// Record a direct transition.
    pub fn register_transition(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        event: impl Into<String>,
    ) {
        self.transitions.insert((from.into(), to.into()), event.into());
    }

    /// Number of registered statuses
    #[must_use]
    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    /// Whether no status is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

impl StateRegistry for MemoryRegistry {
    fn lookup(&self, status: &str) -> Option<ImplicationId> {
        self.statuses.get(status).cloned()
    }

    fn statuses(&self) -> Vec<String> {
        self.statuses.keys().cloned().collect()
    }
}

impl DiscoveryCache for MemoryRegistry {
    fn find_direct_transition(&self, from: &str, to: &str) -> Option<DirectTransition> {
        self.transitions
            .get(&(from.to_string(), to.to_string()))
            .map(|event| DirectTransition {
                event: event.clone(),
            })
    }
}
