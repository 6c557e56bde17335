//! Planner entry points: `analyze` and `check`.

use super::chain::{ChainStep, Visited};
use super::readiness::{find_next_step, group_by_platform, is_ready, PlatformSegment};
use super::setup::{select_setup_entry, SetupHints};
use super::transition::{select_transition, TransitionQuery};
use crate::condition::{
    evaluate_requirement, ConditionContext, FieldMismatch, PredicateRegistry, RequirementKey,
    PREVIOUS_STATUS_KEY,
};
use crate::implication::{
    DiscoveryCache, Implication, ImplicationId, ImplicationLoader, Platform, SetupEntry,
    StateRegistry,
};
use crate::result::{PrecursorError, PrecursorResult};
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

/// Default BFS expansion budget
pub const DEFAULT_BFS_BUDGET: usize = 200;
/// Default bound on `previousStatus` lineage walks
pub const DEFAULT_MAX_LINEAGE_DEPTH: usize = 32;
/// Status assumed when the snapshot records none
pub const DEFAULT_STATUS: &str = "initial";

/// Planner tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlannerConfig {
    /// Maximum states expanded by one alternate-path search
    pub bfs_budget: usize,
    /// Maximum depth when walking `previousStatus` lineages
    pub max_lineage_depth: usize,
    /// Status used when the snapshot carries none
    pub default_status: String,
    /// Break transition ties by platform
    pub prefer_same_platform: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            bfs_budget: DEFAULT_BFS_BUDGET,
            max_lineage_depth: DEFAULT_MAX_LINEAGE_DEPTH,
            default_status: DEFAULT_STATUS.to_string(),
            prefer_same_platform: true,
        }
    }
}

impl PlannerConfig {
    /// Set the BFS budget
    #[must_use]
    pub const fn with_bfs_budget(mut self, budget: usize) -> Self {
        self.bfs_budget = budget;
        self
    }

    /// Set the lineage depth bound
    #[must_use]
    pub const fn with_max_lineage_depth(mut self, depth: usize) -> Self {
        self.max_lineage_depth = depth;
        self
    }

    /// Set the default status
    #[must_use]
    pub fn with_default_status(mut self, status: impl Into<String>) -> Self {
        self.default_status = status.into();
        self
    }

    /// Enable or disable platform tie-breaking
    #[must_use]
    pub const fn with_prefer_same_platform(mut self, prefer: bool) -> Self {
        self.prefer_same_platform = prefer;
        self
    }
}

/// Per-call planning options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanOptions {
    /// Event expected to lead into the target
    pub explicit_event: Option<String>,
    /// Test file currently executing
    pub current_test_file: Option<String>,
    /// Status allowed to be revisited once as a loop pass-through
    pub loop_target: Option<String>,
    /// Named stored values visible to conditions
    pub stored_vars: Map<String, Value>,
    /// Platform the caller runs on
    pub platform: Option<Platform>,
}

impl PlanOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the event hint
    #[must_use]
    pub fn with_explicit_event(mut self, event: impl Into<String>) -> Self {
        self.explicit_event = Some(event.into());
        self
    }

    /// Set the running test file
    #[must_use]
    pub fn with_current_test_file(mut self, file: impl Into<String>) -> Self {
        self.current_test_file = Some(file.into());
        self
    }

    /// Arm the loop pass-through
    #[must_use]
    pub fn with_loop_target(mut self, status: impl Into<String>) -> Self {
        self.loop_target = Some(status.into());
        self
    }

    /// Add a stored variable
    #[must_use]
    pub fn with_stored_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.stored_vars.insert(name.into(), value);
        self
    }

    /// Set the caller's platform
    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Same options with a different event hint.
    #[must_use]
    pub fn for_event(&self, event: Option<&str>) -> Self {
        Self {
            explicit_event: event.map(str::to_string),
            ..self.clone()
        }
    }

    pub(crate) fn setup_hints(&self) -> SetupHints<'_> {
        SetupHints {
            current_test_file: self.current_test_file.as_deref(),
            explicit_event: self.explicit_event.as_deref(),
        }
    }
}

/// Result of planning one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    /// Implication that was analyzed
    pub implication: ImplicationId,
    /// Entity scope, if the implication tracks one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Whether the target test can run now
    pub ready: bool,
    /// Status read from the snapshot
    pub current_status: String,
    /// Status the test produces
    pub target_status: String,
    /// Status the selected setup entry starts from
    pub previous_status: Option<String>,
    /// Target equals current but requires a detour
    pub is_loop_transition: bool,
    /// Data requirements that do not hold
    pub missing_fields: Vec<FieldMismatch>,
    /// Steps from the current status to the target
    pub chain: Vec<ChainStep>,
    /// First step to execute
    pub next_step: Option<ChainStep>,
    /// Incomplete steps
    pub steps_remaining: usize,
    /// Chain grouped by platform
    pub segments: Vec<PlatformSegment>,
}

impl Analysis {
    /// First blocked step, if any
    #[must_use]
    pub fn blocked_step(&self) -> Option<&ChainStep> {
        self.chain.iter().find(|s| s.blocked)
    }

    /// Whether some step cannot be reached
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.blocked_step().is_some()
    }
}

/// Outcome of fetching the implication behind a status.
#[derive(Debug, Clone)]
pub(crate) enum Fetched {
    Loaded(Arc<Implication>),
    NotInRegistry,
    FileNotFound(ImplicationId),
}

/// The prerequisite chain planner.
///
/// Borrows its collaborators; every descriptor read goes through
/// `invalidate` then `load`.
pub struct Planner<'a> {
    pub(crate) registry: &'a dyn StateRegistry,
    pub(crate) loader: &'a dyn ImplicationLoader,
    pub(crate) discovery: Option<&'a dyn DiscoveryCache>,
    pub(crate) predicates: PredicateRegistry,
    pub(crate) config: PlannerConfig,
}

impl fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Planner")
            .field("discovery", &self.discovery.is_some())
            .field("predicates", &self.predicates)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<'a> Planner<'a> {
    /// Create a planner over a registry and loader
    #[must_use]
    pub fn new(registry: &'a dyn StateRegistry, loader: &'a dyn ImplicationLoader) -> Self {
        Self {
            registry,
            loader,
            discovery: None,
            predicates: PredicateRegistry::new(),
            config: PlannerConfig::default(),
        }
    }

    /// Consult a discovery cache for direct transitions
    #[must_use]
    pub fn with_discovery(mut self, discovery: &'a dyn DiscoveryCache) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Use these custom predicates
    #[must_use]
    pub fn with_predicates(mut self, predicates: PredicateRegistry) -> Self {
        self.predicates = predicates;
        self
    }

    /// Use this configuration
    #[must_use]
    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// Planner configuration
    #[must_use]
    pub const fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub(crate) fn context<'c>(
        &'c self,
        snapshot: &'c Snapshot,
        options: &'c PlanOptions,
    ) -> ConditionContext<'c> {
        ConditionContext {
            snapshot,
            stored: &options.stored_vars,
            predicates: &self.predicates,
        }
    }

    pub(crate) fn transition_query<'q>(
        &self,
        options: &'q PlanOptions,
        platform: Option<&'q Platform>,
    ) -> TransitionQuery<'q> {
        TransitionQuery {
            explicit_event: options.explicit_event.as_deref(),
            current_platform: platform.or(options.platform.as_ref()),
            prefer_same_platform: self.config.prefer_same_platform,
        }
    }

    /// Freshly load the implication producing `status`.
    pub(crate) fn fetch(&self, status: &str) -> PrecursorResult<Fetched> {
        let Some(id) = self.registry.lookup(status) else {
            return Ok(Fetched::NotInRegistry);
        };
        self.loader.invalidate(&id);
        match self.loader.load(&id) {
            Ok(implication) => Ok(Fetched::Loaded(implication)),
            Err(e) if e.is_not_found() => Ok(Fetched::FileNotFound(id)),
            Err(e) => Err(e),
        }
    }

    /// Load the implication producing `status`.
    ///
    /// # Errors
    /// `UnknownStatus` when the registry has no entry; loader errors otherwise.
    pub fn implication_for(&self, status: &str) -> PrecursorResult<Arc<Implication>> {
        let id = self
            .registry
            .lookup(status)
            .ok_or_else(|| PrecursorError::UnknownStatus {
                status: status.to_string(),
            })?;
        self.loader.invalidate(&id);
        self.loader.load(&id)
    }

    /// Current status in the implication's scope.
    pub(crate) fn current_status<'s>(&'s self, snapshot: &'s Snapshot, entity: Option<&str>) -> &'s str {
        snapshot
            .status_for(entity)
            .unwrap_or(self.config.default_status.as_str())
    }

    /// Plan the path from the snapshot's status to `implication`'s target.
    ///
    /// # Errors
    /// Only descriptor errors (malformed or unreadable descriptors).
    /// Not-ready, blocked and circular outcomes are reported in the result.
    pub fn analyze(
        &self,
        implication: &Implication,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Analysis> {
        let current = self
            .current_status(snapshot, implication.entity.as_deref())
            .to_string();
        let target = implication.target_status.clone();
        let ctx = self.context(snapshot, options);
        let entry = select_setup_entry(implication, &options.setup_hints(), &ctx);
        let previous = entry.and_then(|e| e.previous_status.clone());
        let is_loop = current == target && previous.as_deref().is_some_and(|p| p != current);
        let missing_fields = missing_fields(implication, &ctx);

        let chain = if is_loop {
            let previous = previous.as_deref().unwrap_or_default();
            self.loop_chain(implication, entry, &current, previous, snapshot, options)?
        } else if current == target {
            let mut step = ChainStep::for_entry(&target, implication, entry);
            step.is_current = true;
            step.is_target = true;
            step.complete = true;
            vec![step]
        } else {
            let mut visited = Visited::new(options.loop_target.clone());
            self.build_prerequisite_chain(
                implication,
                &current,
                &target,
                &mut visited,
                true,
                snapshot,
                options,
            )?
        };

        let ready = is_ready(&chain, &current, is_loop) && missing_fields.is_empty();
        let next_step = find_next_step(&chain).cloned();
        let steps_remaining = chain.iter().filter(|s| !s.complete).count();
        let segments = group_by_platform(&chain, implication, &ctx);
        tracing::debug!(
            "Analyzed {}: {} -> {}, {} step(s), ready={}",
            implication.id,
            current,
            target,
            chain.len(),
            ready
        );

        Ok(Analysis {
            implication: implication.id.clone(),
            entity: implication.entity.clone(),
            ready,
            current_status: current,
            target_status: target,
            previous_status: previous,
            is_loop_transition: is_loop,
            missing_fields,
            chain,
            next_step,
            steps_remaining,
            segments,
        })
    }

    /// Look up the implication for `status` and analyze it.
    ///
    /// # Errors
    /// `UnknownStatus` for an unregistered status, plus [`Planner::analyze`]'s errors.
    pub fn analyze_status(
        &self,
        status: &str,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Analysis> {
        let implication = self.implication_for(status)?;
        self.analyze(&implication, snapshot, options)
    }

    /// Analyze and fail unless the target can run now.
    ///
    /// # Errors
    /// `Blocked` when a step cannot be reached, `NotReady` otherwise.
    pub fn check(
        &self,
        implication: &Implication,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Analysis> {
        let analysis = self.analyze(implication, snapshot, options)?;
        if analysis.ready {
            return Ok(analysis);
        }
        Err(not_ready_error(&analysis))
    }

    /// Loop transition: detour from the current status back through
    /// `previous` before re-reaching the target.
    fn loop_chain(
        &self,
        implication: &Implication,
        entry: Option<&SetupEntry>,
        current: &str,
        previous: &str,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Vec<ChainStep>> {
        if let Some(hops) = self.find_alternate_path(current, previous, None, snapshot, options)? {
            if !hops.is_empty() {
                let mut chain = vec![ChainStep::loop_prerequisite(current, implication, entry, current)];
                chain.extend(self.detour_steps(&hops, None, snapshot, options)?);

                let ctx = self.context(snapshot, options);
                let event = match self.fetch(previous)? {
                    Fetched::Loaded(source) => select_transition(
                        &source,
                        &implication.target_status,
                        &self.transition_query(options, entry.map(|e| &e.platform)),
                        &ctx,
                    )
                    .map(|c| c.event.to_string()),
                    _ => None,
                };
                let mut step = ChainStep::for_entry(&implication.target_status, implication, entry);
                step.is_target = true;
                step.event = event;
                chain.push(step);
                return Ok(chain);
            }
        }

        let options = options.clone().with_loop_target(current);
        let mut visited = Visited::new(options.loop_target.clone());
        self.build_prerequisite_chain(
            implication,
            current,
            &implication.target_status,
            &mut visited,
            true,
            snapshot,
            &options,
        )
    }
}

/// Data requirements that do not hold. Structural keys (`status`,
/// `previousStatus`, `<entity>.status`) are resolved by the chain instead.
#[must_use]
pub fn missing_fields(implication: &Implication, ctx: &ConditionContext<'_>) -> Vec<FieldMismatch> {
    implication
        .requires
        .iter()
        .filter(|(key, _)| {
            let field = RequirementKey::parse(key).field;
            field != PREVIOUS_STATUS_KEY && field != "status" && !field.ends_with(".status")
        })
        .filter_map(|(key, expected)| evaluate_requirement(key, expected, ctx))
        .collect()
}

/// Error `check` raises for a non-ready analysis.
#[must_use]
pub fn not_ready_error(analysis: &Analysis) -> PrecursorError {
    if let Some(step) = analysis.blocked_step() {
        return PrecursorError::Blocked {
            status: step.status.clone(),
            reason: step
                .blocked_reason
                .clone()
                .unwrap_or_else(|| "no known path".to_string()),
        };
    }
    PrecursorError::NotReady {
        target: analysis.target_status.clone(),
        current: analysis.current_status.clone(),
        remaining: analysis.steps_remaining,
    }
}
