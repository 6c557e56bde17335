//! Prerequisite chain building.
//!
//! The builder walks `previousStatus` links backwards from the target,
//! loading each predecessor's implication on demand, and emits the steps in
//! execution order. Along the way it:
//!
//! - checks that some transition from the predecessor into each status can
//!   actually be taken with the current data, rerouting (alternate setup
//!   entry, then BFS) or emitting a `blocked` step when none can
//! - expands `status`, `<entity>.status` and boolean `<entity>.<field>`
//!   requirements into sub-chains
//! - bounds recursion with a [`Visited`] set that allows a single loop
//!   pass-through
//!
//! Registry misses and circular dependencies never fail the build; they
//! show up as placeholder steps or a warning and a shorter chain.

use super::analysis::{Fetched, PlanOptions, Planner};
use super::search::Hop;
use super::setup::select_setup_entry;
use super::transition::{transition_usability, TransitionUsability};
use crate::condition::{
    evaluate_requirement, ConditionContext, FieldMismatch, RequirementKey, PREVIOUS_STATUS_KEY,
};
use crate::implication::{Implication, ImplicationId, Platform, SetupEntry, SetupMode};
use crate::result::PrecursorResult;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Action name of a step whose status is not registered
pub const NOT_IN_REGISTRY: &str = "NOT_IN_REGISTRY";
/// Action name of a step whose descriptor could not be found
pub const FILE_NOT_FOUND: &str = "FILE_NOT_FOUND";

/// One step of a prerequisite chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStep {
    /// Status this step produces
    pub status: String,
    /// Implication describing the step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implication: Option<ImplicationId>,
    /// Action inside the test file
    pub action_name: String,
    /// Test file to execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    /// Platform the step runs on
    #[serde(default)]
    pub platform: Platform,
    /// Already satisfied
    pub complete: bool,
    /// The status the snapshot is in
    pub is_current: bool,
    /// The status being planned for
    pub is_target: bool,
    /// Entity whose status this step changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Status the step starts from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
    /// No known route reaches this step
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub blocked: bool,
    /// Why the step is blocked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<String>,
    /// Field diagnostics behind the block
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocking_fields: Vec<FieldMismatch>,
    /// Re-entry of a loop target
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_loop_prerequisite: bool,
    /// Part of a route found by alternate-path search
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_detour: bool,
    /// Event leading into this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    /// Source of a known direct transition into this step
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direct_from: Option<String>,
    /// Verify/observer mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SetupMode>,
}

impl ChainStep {
    /// Step for `status` described by `implication` and its selected entry.
    #[must_use]
    pub fn for_entry(status: &str, implication: &Implication, entry: Option<&SetupEntry>) -> Self {
        let mut step = Self {
            status: status.to_string(),
            implication: Some(implication.id.clone()),
            entity: implication.entity.clone(),
            ..Self::default()
        };
        if let Some(entry) = entry {
            step.action_name.clone_from(&entry.action_name);
            step.test_file = Some(entry.test_file.clone());
            step.platform = entry.platform.clone();
            step.previous_status.clone_from(&entry.previous_status);
            step.mode = entry.mode;
        }
        step
    }

    /// Placeholder for a status that could not be resolved.
    #[must_use]
    pub fn placeholder(status: &str, action: &str, implication: Option<ImplicationId>) -> Self {
        Self {
            status: status.to_string(),
            implication,
            action_name: action.to_string(),
            ..Self::default()
        }
    }

    /// Re-entry of the loop target.
    #[must_use]
    pub fn loop_prerequisite(
        status: &str,
        implication: &Implication,
        entry: Option<&SetupEntry>,
        current_status: &str,
    ) -> Self {
        let mut step = Self::for_entry(status, implication, entry);
        step.is_loop_prerequisite = true;
        step.is_current = status == current_status;
        step.complete = step.is_current;
        step
    }

    /// Terminal step no known route reaches.
    #[must_use]
    pub fn blocked(
        status: &str,
        implication: &Implication,
        entry: Option<&SetupEntry>,
        from: &str,
        fields: Vec<FieldMismatch>,
    ) -> Self {
        let mut step = Self::for_entry(status, implication, entry);
        let summary: Vec<String> = fields.iter().map(ToString::to_string).collect();
        step.blocked = true;
        step.blocked_reason = Some(if summary.is_empty() {
            format!("every transition from '{from}' to '{status}' is blocked")
        } else {
            format!(
                "every transition from '{from}' to '{status}' is blocked: {}",
                summary.join("; ")
            )
        });
        step.blocking_fields = fields;
        step
    }

    /// Whether the step is a placeholder for an unresolved status
    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.action_name == NOT_IN_REGISTRY || self.action_name == FILE_NOT_FOUND
    }

    fn key(&self) -> (Option<&str>, &str) {
        (self.entity.as_deref(), self.status.as_str())
    }
}

/// How a status was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revisit {
    /// First visit
    Fresh,
    /// The armed loop target, seen again for the first time
    LoopReentry,
    /// Any other repeat visit
    Circular,
}

/// Statuses already entered by one chain build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Visited {
    seen: BTreeSet<String>,
    root: Option<String>,
    loop_target: Option<String>,
    loop_used: bool,
}

impl Visited {
    /// Create an empty set, optionally arming a loop pass-through
    #[must_use]
    pub fn new(loop_target: Option<String>) -> Self {
        Self {
            loop_target,
            ..Self::default()
        }
    }

    /// Enter `status`.
    pub fn enter(&mut self, status: &str) -> Revisit {
        if self.seen.insert(status.to_string()) {
            if self.root.is_none() {
                self.root = Some(status.to_string());
            }
            return Revisit::Fresh;
        }
        if !self.loop_used && self.loop_target.as_deref() == Some(status) {
            self.loop_used = true;
            return Revisit::LoopReentry;
        }
        Revisit::Circular
    }

    /// Whether `status` was entered
    #[must_use]
    pub fn contains(&self, status: &str) -> bool {
        self.seen.contains(status)
    }

    /// First status entered
    #[must_use]
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }
}

/// Steps leading into a status, plus any change to how the status itself
/// is reached.
#[derive(Debug, Default)]
struct Lead<'i> {
    steps: Vec<ChainStep>,
    entry: Option<&'i SetupEntry>,
    event: Option<String>,
    terminal: Option<ChainStep>,
}

impl Planner<'_> {
    /// Build the steps leading from `current_status` to `target_status`.
    ///
    /// `is_original_target` marks the root call: only it sets `is_target`
    /// on its own step and back-marks completion.
    ///
    /// # Errors
    /// Only descriptor errors (malformed or unreadable descriptors).
    #[allow(clippy::too_many_arguments)]
    pub fn build_prerequisite_chain(
        &self,
        implication: &Implication,
        current_status: &str,
        target_status: &str,
        visited: &mut Visited,
        is_original_target: bool,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Vec<ChainStep>> {
        let ctx = self.context(snapshot, options);
        let entry = select_setup_entry(implication, &options.setup_hints(), &ctx);

        match visited.enter(target_status) {
            Revisit::Fresh => {}
            Revisit::LoopReentry => {
                return Ok(vec![ChainStep::loop_prerequisite(
                    target_status,
                    implication,
                    entry,
                    current_status,
                )]);
            }
            Revisit::Circular => {
                tracing::warn!(
                    "Circular dependency: '{}' is already part of the chain ({})",
                    target_status,
                    implication.id
                );
                return Ok(Vec::new());
            }
        }

        let is_loop = options.loop_target.is_some();
        let at_current = target_status == current_status && !is_loop;

        let mut lead = Lead {
            entry,
            ..Lead::default()
        };
        if let Some(previous) = entry.and_then(|e| e.previous_status.as_deref()) {
            if !at_current {
                lead = self.lead_into(
                    implication,
                    entry,
                    previous,
                    current_status,
                    target_status,
                    visited,
                    snapshot,
                    options,
                )?;
            }
        }
        if let Some(mut blocked) = lead.terminal.take() {
            blocked.is_target = is_original_target;
            let mut chain = lead.steps;
            chain.push(blocked);
            return Ok(chain);
        }

        let mut chain = lead.steps;
        if !at_current {
            let expansions =
                self.expand_requirements(implication, &chain, visited, snapshot, options)?;
            for step in expansions {
                if !chain.iter().any(|s| s.key() == step.key()) {
                    chain.push(step);
                }
            }
        }

        let entry = lead.entry;
        let mut step = ChainStep::for_entry(target_status, implication, entry);
        step.is_target = is_original_target;
        step.is_current = target_status == current_status && !(is_loop && is_original_target);
        let global = snapshot.status();
        step.complete = step.is_current || (!is_loop && global == Some(target_status));
        step.event = lead.event;
        if let (Some(discovery), Some(previous)) =
            (self.discovery, entry.and_then(|e| e.previous_status.as_deref()))
        {
            if let Some(direct) = discovery.find_direct_transition(previous, target_status) {
                step.direct_from = Some(previous.to_string());
                step.event.get_or_insert(direct.event);
            }
        }
        chain.push(step);

        if is_original_target && !is_loop {
            back_mark(&mut chain, current_status, implication.entity.is_some(), global);
        }
        Ok(chain)
    }

    /// Resolve the steps leading into `target_status` from `previous`.
    #[allow(clippy::too_many_arguments)]
    fn lead_into<'i>(
        &self,
        implication: &'i Implication,
        entry: Option<&'i SetupEntry>,
        previous: &str,
        current_status: &str,
        target_status: &str,
        visited: &mut Visited,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Lead<'i>> {
        let source = match self.fetch(previous)? {
            Fetched::Loaded(source) => source,
            Fetched::NotInRegistry => {
                tracing::warn!("Status '{}' is not in the state registry", previous);
                return Ok(Lead {
                    steps: vec![ChainStep::placeholder(previous, NOT_IN_REGISTRY, None)],
                    entry,
                    ..Lead::default()
                });
            }
            Fetched::FileNotFound(id) => {
                tracing::warn!("Descriptor {} for status '{}' was not found", id, previous);
                return Ok(Lead {
                    steps: vec![ChainStep::placeholder(previous, FILE_NOT_FOUND, Some(id))],
                    entry,
                    ..Lead::default()
                });
            }
        };

        let ctx = self.context(snapshot, options);
        let query = self.transition_query(options, entry.map(|e| &e.platform));
        let event = match transition_usability(&source, target_status, &query, &ctx) {
            TransitionUsability::Undeclared => None,
            TransitionUsability::Usable(choice) => Some(choice.event.to_string()),
            TransitionUsability::Blocked(fields) => {
                tracing::debug!(
                    "Every transition {} -> {} is blocked, looking for another route",
                    previous,
                    target_status
                );
                return self.reroute(
                    implication,
                    entry,
                    previous,
                    fields,
                    current_status,
                    target_status,
                    visited,
                    snapshot,
                    options,
                );
            }
        };

        let steps = self.build_prerequisite_chain(
            &source,
            current_status,
            previous,
            visited,
            false,
            snapshot,
            &options.for_event(event.as_deref()),
        )?;
        if steps.iter().any(|s| s.blocked) {
            if let Some(hops) =
                self.find_alternate_path(current_status, target_status, None, snapshot, options)?
            {
                let event = hops.last().map(|h| h.event.clone());
                return Ok(Lead {
                    steps: self.detour_steps(&hops, Some(target_status), snapshot, options)?,
                    entry,
                    event,
                    terminal: None,
                });
            }
        }
        Ok(Lead {
            steps,
            entry,
            event,
            terminal: None,
        })
    }

    /// Find a way around a blocked `previous -> target` edge: another setup
    /// entry, then a BFS route, else a terminal blocked step.
    #[allow(clippy::too_many_arguments)]
    fn reroute<'i>(
        &self,
        implication: &'i Implication,
        entry: Option<&'i SetupEntry>,
        previous: &str,
        fields: Vec<FieldMismatch>,
        current_status: &str,
        target_status: &str,
        visited: &mut Visited,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Lead<'i>> {
        let root = visited.root().unwrap_or(target_status).to_string();
        for alternate in &implication.setup {
            let Some(alt_previous) = alternate.previous_status.as_deref() else {
                continue;
            };
            if alt_previous == previous || visited.contains(alt_previous) {
                continue;
            }
            if self.lineage_passes_through(alt_previous, &root, snapshot, options)? {
                continue;
            }
            let Fetched::Loaded(source) = self.fetch(alt_previous)? else {
                continue;
            };
            let ctx = self.context(snapshot, options);
            let query = self.transition_query(options, Some(&alternate.platform));
            let event = match transition_usability(&source, target_status, &query, &ctx) {
                TransitionUsability::Blocked(_) => continue,
                TransitionUsability::Undeclared => None,
                TransitionUsability::Usable(choice) => Some(choice.event.to_string()),
            };
            tracing::debug!(
                "Using setup entry {} via '{}' instead of '{}'",
                alternate.test_file,
                alt_previous,
                previous
            );
            let mut trial = visited.clone();
            let steps = self.build_prerequisite_chain(
                &source,
                current_status,
                alt_previous,
                &mut trial,
                false,
                snapshot,
                &options.for_event(event.as_deref()),
            )?;
            if steps.iter().any(|s| s.blocked) {
                continue;
            }
            *visited = trial;
            return Ok(Lead {
                steps,
                entry: Some(alternate),
                event,
                terminal: None,
            });
        }

        if let Some(hops) =
            self.find_alternate_path(current_status, target_status, None, snapshot, options)?
        {
            let event = hops.last().map(|h| h.event.clone());
            return Ok(Lead {
                steps: self.detour_steps(&hops, Some(target_status), snapshot, options)?,
                entry,
                event,
                terminal: None,
            });
        }

        if previous != current_status {
            if let Some(hops) = self.find_alternate_path(
                previous,
                target_status,
                Some(target_status),
                snapshot,
                options,
            )? {
                if let Fetched::Loaded(source) = self.fetch(previous)? {
                    let mut trial = visited.clone();
                    let mut steps = self.build_prerequisite_chain(
                        &source,
                        current_status,
                        previous,
                        &mut trial,
                        false,
                        snapshot,
                        &options.for_event(None),
                    )?;
                    if !steps.iter().any(|s| s.blocked) {
                        *visited = trial;
                        let event = hops.last().map(|h| h.event.clone());
                        steps.extend(self.detour_steps(&hops, Some(target_status), snapshot, options)?);
                        return Ok(Lead {
                            steps,
                            entry,
                            event,
                            terminal: None,
                        });
                    }
                }
            }
        }

        tracing::warn!(
            "No route to '{}': every transition from '{}' is blocked",
            target_status,
            previous
        );
        Ok(Lead {
            steps: Vec::new(),
            entry,
            event: None,
            terminal: Some(ChainStep::blocked(
                target_status,
                implication,
                entry,
                previous,
                fields,
            )),
        })
    }

    /// Whether walking `previousStatus` links from `start` reaches `status`.
    fn lineage_passes_through(
        &self,
        start: &str,
        status: &str,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<bool> {
        let ctx = self.context(snapshot, options);
        let mut seen = BTreeSet::new();
        let mut cursor = start.to_string();
        for _ in 0..self.config.max_lineage_depth {
            if cursor == status {
                return Ok(true);
            }
            if !seen.insert(cursor.clone()) {
                return Ok(false);
            }
            let Fetched::Loaded(implication) = self.fetch(&cursor)? else {
                return Ok(false);
            };
            let hints = options.for_event(None);
            let next = select_setup_entry(&implication, &hints.setup_hints(), &ctx)
                .and_then(|e| e.previous_status.clone());
            match next {
                Some(next) => cursor = next,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// Sub-chains for `status`, `<entity>.status` and boolean
    /// `<entity>.<field>` requirements that do not hold yet.
    fn expand_requirements(
        &self,
        implication: &Implication,
        existing: &[ChainStep],
        visited: &Visited,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Vec<ChainStep>> {
        let mut out = Vec::new();
        let ctx = self.context(snapshot, options);
        for (raw_key, expected) in &implication.requires {
            let key = RequirementKey::parse(raw_key);
            if key.negated || key.field == PREVIOUS_STATUS_KEY {
                continue;
            }

            let expansion = if key.field == "status" {
                expected.as_str().and_then(|required| {
                    let current = self.current_status(snapshot, None);
                    (current != required && self.registry.lookup(required).is_some())
                        .then(|| (None, current.to_string(), required.to_string()))
                })
            } else if let Some((entity, field)) = key.entity_field() {
                self.entity_expansion(raw_key, entity, field, expected, &ctx)
            } else {
                None
            };
            let Some((entity, current, required)) = expansion else {
                continue;
            };
            if existing.iter().chain(&out).any(|s| s.status == required) {
                continue;
            }

            let mut steps = match self.fetch(&required)? {
                Fetched::Loaded(sub) => {
                    let mut branch = visited.clone();
                    self.build_prerequisite_chain(
                        &sub,
                        &current,
                        &required,
                        &mut branch,
                        false,
                        snapshot,
                        &options.for_event(None),
                    )?
                }
                Fetched::NotInRegistry => {
                    vec![ChainStep::placeholder(&required, NOT_IN_REGISTRY, None)]
                }
                Fetched::FileNotFound(id) => {
                    vec![ChainStep::placeholder(&required, FILE_NOT_FOUND, Some(id))]
                }
            };
            if let Some(entity) = entity {
                for step in &mut steps {
                    step.entity.get_or_insert_with(|| entity.clone());
                }
            }
            out.extend(steps);
        }
        Ok(out)
    }

    /// `(entity, entity's current status, registry key)` for an unmet
    /// `<entity>.status` or boolean `<entity>.<field>` requirement.
    fn entity_expansion(
        &self,
        raw_key: &str,
        entity: &str,
        field: &str,
        expected: &Value,
        ctx: &ConditionContext<'_>,
    ) -> Option<(Option<String>, String, String)> {
        let current = self.current_status(ctx.snapshot, Some(entity)).to_string();
        let required = if field == "status" {
            let required = expected.as_str()?;
            if current == required {
                return None;
            }
            let composite = format!("{entity}_{required}");
            if self.registry.lookup(&composite).is_some() {
                composite
            } else if self.registry.lookup(required).is_some() {
                required.to_string()
            } else {
                tracing::debug!("No implication produces {}.status = {}", entity, required);
                return None;
            }
        } else {
            if expected.as_bool() != Some(true) {
                return None;
            }
            evaluate_requirement(raw_key, expected, ctx)?;
            let composite = format!("{entity}_{field}");
            self.registry.lookup(&composite)?;
            composite
        };
        Some((Some(entity.to_string()), current, required))
    }

    /// Chain steps for the statuses a BFS route passes through, skipping
    /// `goal` (whose own step the caller adds).
    pub(crate) fn detour_steps(
        &self,
        hops: &[Hop],
        goal: Option<&str>,
        snapshot: &Snapshot,
        options: &PlanOptions,
    ) -> PrecursorResult<Vec<ChainStep>> {
        let mut steps = Vec::new();
        for hop in hops.iter().filter(|h| Some(h.to.as_str()) != goal) {
            let mut step = match self.fetch(&hop.to)? {
                Fetched::Loaded(implication) => {
                    let hop_options = options.for_event(Some(&hop.event));
                    let ctx = self.context(snapshot, &hop_options);
                    let entry = select_setup_entry(&implication, &hop_options.setup_hints(), &ctx);
                    ChainStep::for_entry(&hop.to, &implication, entry)
                }
                Fetched::NotInRegistry => ChainStep::placeholder(&hop.to, NOT_IN_REGISTRY, None),
                Fetched::FileNotFound(id) => ChainStep::placeholder(&hop.to, FILE_NOT_FOUND, Some(id)),
            };
            step.is_detour = true;
            step.previous_status = Some(hop.from.clone());
            step.event = Some(hop.event.clone());
            steps.push(step);
        }
        Ok(steps)
    }
}

/// Mark every step up to the last one at `current_status` complete. For
/// entity-scoped chains, also mark steps up to the global status.
fn back_mark(chain: &mut [ChainStep], current_status: &str, entity_scoped: bool, global: Option<&str>) {
    if let Some(index) = chain.iter().rposition(|s| s.status == current_status) {
        chain[index].is_current = true;
        for step in &mut chain[..=index] {
            step.complete = true;
        }
    }
    if entity_scoped {
        if let Some(index) = global.and_then(|g| chain.iter().rposition(|s| s.status == g)) {
            for step in &mut chain[..=index] {
                step.complete = true;
            }
        }
    }
}
