//! Precursor: prerequisite-chain planner for end-to-end test suites
//!
//! Tests are modeled as states of an implicit state machine. Each test's
//! implication declares the status it produces, the status it starts from
//! and the data it needs. Before a test runs, Precursor works out whether the
//! recorded test data already satisfies those preconditions and, if not,
//! which tests must run first, on which platform, in which order.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    PRECURSOR Architecture                        │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Registry + │    │ Chain      │    │ Readiness  │            │
//! │   │ Loader     │───►│ Builder    │───►│ Segments   │            │
//! │   │ (catalog)  │    │ (+ BFS)    │    │ Next step  │            │
//! │   └────────────┘    └─────┬──────┘    └─────┬──────┘            │
//! │                           │                 │                   │
//! │                     ┌─────▼──────┐    ┌─────▼──────┐            │
//! │                     │ Condition  │    │ Preflight  │            │
//! │                     │ Evaluator  │    │ (runner)   │            │
//! │                     └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use precursor::{Implication, MemoryLoader, PlanOptions, Planner, Snapshot};
//! use serde_json::json;
//!
//! let loader = MemoryLoader::new()
//!     .with(Implication::from_yaml("Requested", "targetStatus: booking_requested\nsetup:\n  - testFile: request.spec.js\n").unwrap())
//!     .with(Implication::from_yaml("Confirmed", "targetStatus: booking_confirmed\nsetup:\n  - testFile: confirm.spec.js\n    previousStatus: booking_requested\n").unwrap());
//! let registry = loader.registry();
//! let planner = Planner::new(&registry, &loader);
//!
//! let snapshot = Snapshot::new(json!({"status": "initial"}));
//! let analysis = planner.analyze_status("booking_confirmed", &snapshot, &PlanOptions::new()).unwrap();
//! assert!(!analysis.ready);
//! assert_eq!(analysis.next_step.unwrap().status, "booking_requested");
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

pub mod catalog;
pub mod condition;
pub mod implication;
pub mod orchestrator;
pub mod planner;
mod result;
pub mod snapshot;

pub use catalog::{to_dot, CatalogValidator, IssueSeverity, ValidationIssue, ValidationResult};
pub use condition::{
    ConditionContext, ConditionEvaluation, ConditionTree, FieldMismatch, Guard, Operator,
    PredicateRegistry, RequiresMap,
};
pub use implication::{
    DescriptorCache, DirectTransition, DirectoryLoader, DiscoveryCache, Implication,
    ImplicationId, ImplicationLoader, MemoryLoader, MemoryRegistry, Platform, SetupEntry,
    SetupMode, StateRegistry, TransitionConfig,
};
pub use orchestrator::{
    ExecutionContext, JsonFileStore, MemoryStore, Preflight, PreflightReport, SnapshotStore,
    StepRunner,
};
pub use planner::{
    format_blocked, format_chain, format_cross_platform_message, format_not_ready,
    missing_fields, not_ready_error, Analysis, ChainStep, PlanOptions, Planner, PlannerConfig,
    PlatformSegment, FILE_NOT_FOUND, NOT_IN_REGISTRY,
};
pub use result::{PrecursorError, PrecursorResult};
pub use snapshot::Snapshot;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reexports_compose() {
        let loader = MemoryLoader::new().with(
            Implication::from_yaml("Home", "targetStatus: home\nsetup:\n  - testFile: home.spec.js\n")
                .unwrap(),
        );
        let registry = loader.registry();
        let planner = Planner::new(&registry, &loader).with_config(PlannerConfig::default());
        let analysis = planner
            .analyze_status("home", &Snapshot::new(json!({"status": "home"})), &PlanOptions::new())
            .unwrap();
        assert!(analysis.ready);
        assert!(CatalogValidator::new(&registry, &loader).validate().is_valid);
    }
}
