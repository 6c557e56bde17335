//! Catalog validation and graph export.
//!
//! Checks a whole catalog of implications for references the planner could
//! not resolve and transitions it could not choose between, and renders the
//! status graph in DOT format.

use crate::condition::Guard;
use crate::implication::{Implication, ImplicationId, ImplicationLoader, StateRegistry};
use indexmap::IndexMap;
use std::fmt;

/// Severity levels for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueSeverity {
    /// Informational
    Info,
    /// The planner may pick an unexpected path
    Warning,
    /// The planner cannot resolve a reference
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => f.write_str("info"),
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Types of validation issues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    /// A setup entry starts from a status nothing produces
    UnknownPreviousStatus {
        /// Implication declaring the entry
        implication: ImplicationId,
        /// Unregistered status
        status: String,
    },
    /// A transition leads to a status nothing produces
    UnknownTransitionTarget {
        /// Implication declaring the transition
        implication: ImplicationId,
        /// Event name
        event: String,
        /// Unregistered target status
        target: String,
    },
    /// The registry points at a descriptor that cannot be loaded
    UnloadableDescriptor {
        /// Registered status
        status: String,
        /// Load error
        message: String,
    },
    /// The implication has no way to be set up
    NoSetupEntries {
        /// Implication without setup entries
        implication: ImplicationId,
    },
    /// Several transitions reach one target with nothing to pick between them
    AmbiguousTransitions {
        /// Implication declaring the transitions
        implication: ImplicationId,
        /// Shared target status
        target: String,
        /// Competing events, in declaration order
        events: Vec<String>,
    },
    /// Transition back to its own status without a guard
    UnguardedSelfLoop {
        /// Implication declaring the transition
        implication: ImplicationId,
        /// Event name
        event: String,
    },
}

impl ValidationIssue {
    /// Get the severity of this issue.
    #[must_use]
    pub const fn severity(&self) -> IssueSeverity {
        match self {
            Self::UnknownPreviousStatus { .. } | Self::UnloadableDescriptor { .. } => {
                IssueSeverity::Error
            }
            Self::UnknownTransitionTarget { .. }
            | Self::NoSetupEntries { .. }
            | Self::AmbiguousTransitions { .. }
            | Self::UnguardedSelfLoop { .. } => IssueSeverity::Warning,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownPreviousStatus {
                implication,
                status,
            } => write!(f, "{implication}: previousStatus '{status}' is not registered"),
            Self::UnknownTransitionTarget {
                implication,
                event,
                target,
            } => write!(f, "{implication}: on.{event} targets unregistered status '{target}'"),
            Self::UnloadableDescriptor { status, message } => {
                write!(f, "status '{status}': {message}")
            }
            Self::NoSetupEntries { implication } => {
                write!(f, "{implication}: no setup entries")
            }
            Self::AmbiguousTransitions {
                implication,
                target,
                events,
            } => write!(
                f,
                "{implication}: events {} all reach '{target}' with no default",
                events.join(", ")
            ),
            Self::UnguardedSelfLoop { implication, event } => {
                write!(f, "{implication}: on.{event} loops back without a guard")
            }
        }
    }
}

/// Result of catalog validation.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// No error-level issue was found
    pub is_valid: bool,
    /// Detected issues
    pub issues: Vec<ValidationIssue>,
    /// Number of registered statuses checked
    pub statuses: usize,
}

impl ValidationResult {
    /// Issues at or above `severity`
    #[must_use]
    pub fn at_least(&self, severity: IssueSeverity) -> Vec<&ValidationIssue> {
        self.issues.iter().filter(|i| i.severity() >= severity).collect()
    }
}

/// Catalog validator.
pub struct CatalogValidator<'a> {
    registry: &'a dyn StateRegistry,
    loader: &'a dyn ImplicationLoader,
}

impl fmt::Debug for CatalogValidator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogValidator").finish_non_exhaustive()
    }
}

impl<'a> CatalogValidator<'a> {
    /// Create a validator over a registry and loader.
    #[must_use]
    pub fn new(registry: &'a dyn StateRegistry, loader: &'a dyn ImplicationLoader) -> Self {
        Self { registry, loader }
    }

    /// Validate every registered implication.
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        let statuses = self.registry.statuses();
        let mut issues = Vec::new();

        for status in &statuses {
            let Some(id) = self.registry.lookup(status) else {
                continue;
            };
            self.loader.invalidate(&id);
            match self.loader.load(&id) {
                Ok(implication) => self.check_implication(&implication, &mut issues),
                Err(e) => issues.push(ValidationIssue::UnloadableDescriptor {
                    status: status.clone(),
                    message: e.to_string(),
                }),
            }
        }

        let is_valid = !issues.iter().any(|i| i.severity() == IssueSeverity::Error);
        ValidationResult {
            is_valid,
            issues,
            statuses: statuses.len(),
        }
    }

    fn check_implication(&self, implication: &Implication, issues: &mut Vec<ValidationIssue>) {
        let id = &implication.id;
        if implication.setup.is_empty() {
            issues.push(ValidationIssue::NoSetupEntries {
                implication: id.clone(),
            });
        }

        let mut seen_previous = Vec::new();
        for previous in implication.previous_statuses() {
            if seen_previous.contains(&previous) {
                continue;
            }
            seen_previous.push(previous);
            if self.registry.lookup(previous).is_none() {
                issues.push(ValidationIssue::UnknownPreviousStatus {
                    implication: id.clone(),
                    status: previous.to_string(),
                });
            }
        }

        let mut by_target: IndexMap<&str, Vec<(&str, bool, bool)>> = IndexMap::new();
        for (event, config) in implication.transitions() {
            if self.registry.lookup(&config.target).is_none() {
                issues.push(ValidationIssue::UnknownTransitionTarget {
                    implication: id.clone(),
                    event: event.to_string(),
                    target: config.target.clone(),
                });
            }
            let unguarded = config.guard().is_open();
            if unguarded && config.target == implication.target_status {
                issues.push(ValidationIssue::UnguardedSelfLoop {
                    implication: id.clone(),
                    event: event.to_string(),
                });
            }
            by_target
                .entry(config.target.as_str())
                .or_default()
                .push((event, unguarded, config.is_default));
        }

        for (target, candidates) in by_target {
            let has_default = candidates.iter().any(|(_, _, is_default)| *is_default);
            let unguarded = candidates.iter().filter(|(_, open, _)| *open).count();
            if candidates.len() > 1 && !has_default && unguarded > 1 {
                issues.push(ValidationIssue::AmbiguousTransitions {
                    implication: id.clone(),
                    target: target.to_string(),
                    events: candidates.iter().map(|(e, _, _)| (*e).to_string()).collect(),
                });
            }
        }
    }
}

fn guard_summary(guard: Guard<'_>) -> Option<String> {
    match guard {
        Guard::Open => None,
        Guard::Requires(map) => Some(
            map.keys()
                .filter(|k| k.as_str() != crate::condition::PREVIOUS_STATUS_KEY)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        ),
        Guard::Conditions(tree) => Some(format!("{} block(s)", tree.blocks.len())),
    }
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Generate the status graph in DOT format.
///
/// Nodes are statuses. Dashed edges are `previousStatus` links, labelled
/// with the setup entry's test file; solid edges are `on` transitions,
/// labelled with the event and a guard summary.
#[must_use]
pub fn to_dot<'a>(implications: impl IntoIterator<Item = &'a Implication>) -> String {
    let implications: Vec<&Implication> = implications.into_iter().collect();
    let mut dot = String::new();
    dot.push_str("digraph Implications {\n");
    dot.push_str("  rankdir=LR;\n");
    dot.push_str("  node [shape=ellipse];\n");

    for implication in &implications {
        let shape = if implication.setup.iter().all(|e| e.previous_status.is_none()) {
            "box"
        } else {
            "ellipse"
        };
        let label = match &implication.entity {
            Some(entity) => format!("{}\\n({})", escape(&implication.target_status), escape(entity)),
            None => escape(&implication.target_status),
        };
        dot.push_str(&format!(
            "  \"{}\" [shape={}, label=\"{}\"];\n",
            escape(&implication.target_status),
            shape,
            label
        ));
    }

    for implication in &implications {
        for entry in &implication.setup {
            if let Some(previous) = &entry.previous_status {
                dot.push_str(&format!(
                    "  \"{}\" -> \"{}\" [style=dashed, label=\"{}\"];\n",
                    escape(previous),
                    escape(&implication.target_status),
                    escape(entry.test_file_basename())
                ));
            }
        }
        for (event, config) in implication.transitions() {
            let label = match guard_summary(config.guard()) {
                Some(guard) => format!("{event} [{guard}]"),
                None => event.to_string(),
            };
            dot.push_str(&format!(
                "  \"{}\" -> \"{}\" [label=\"{}\"];\n",
                escape(&implication.target_status),
                escape(&config.target),
                escape(&label)
            ));
        }
    }

    dot.push_str("}\n");
    dot
}
