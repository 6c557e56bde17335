//! Prerequisite chain planner.
//!
//! Given a target implication and a snapshot, the planner works out which
//! tests must run first:
//!
//! ```text
//! analyze ─► select setup entry ─► build chain ─┬─► previousStatus (recursive)
//!                                               ├─► status / entity requirements
//!                                               └─► BFS reroute when guards block
//!         ─► readiness, next step, platform segments
//! ```

pub mod analysis;
pub mod chain;
pub mod readiness;
pub mod report;
pub mod search;
pub mod setup;
pub mod transition;

pub use analysis::{
    missing_fields, not_ready_error, Analysis, PlanOptions, Planner, PlannerConfig,
    DEFAULT_BFS_BUDGET, DEFAULT_MAX_LINEAGE_DEPTH, DEFAULT_STATUS,
};
pub use chain::{ChainStep, Revisit, Visited, FILE_NOT_FOUND, NOT_IN_REGISTRY};
pub use readiness::{find_next_step, group_by_platform, is_ready, PlatformSegment};
pub use report::{format_blocked, format_chain, format_cross_platform_message, format_not_ready};
pub use search::Hop;
pub use setup::{normalize_token, select_setup_entry, SetupHints};
pub use transition::{
    select_transition, transition_usability, TransitionChoice, TransitionQuery,
    TransitionUsability,
};
