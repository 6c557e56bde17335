//! Preflight: plan, execute prerequisites, re-plan.
//!
//! Implements:
//! - Strictly sequential step execution (load → run → merge → persist)
//! - Session hand-off when the next step runs on a different platform
//! - Cross-platform short-circuit when prerequisites belong elsewhere
//! - Abort on the first failed step, on a step that makes no progress, and
//!   when the execution budget runs out

use crate::planner::{
    format_cross_platform_message, not_ready_error, Analysis, ChainStep, PlanOptions, Planner,
    FILE_NOT_FOUND, NOT_IN_REGISTRY,
};
use crate::implication::Platform;
use crate::result::{PrecursorError, PrecursorResult};
use crate::snapshot::Snapshot;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Default bound on executed prerequisites per preflight
pub const DEFAULT_MAX_EXECUTIONS: usize = 25;

/// Execution-mode flags, passed explicitly to every preflight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    /// This run is itself a prerequisite of another test
    pub is_prerequisite_execution: bool,
    /// Stop instead of executing steps on another platform
    pub skip_platform_prereq: bool,
    /// Execute missing prerequisites automatically
    pub auto_execute: bool,
    /// Platform the target test runs on
    pub current_platform: Platform,
    /// Maximum number of steps one preflight may execute
    pub max_executions: usize,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self {
            is_prerequisite_execution: false,
            skip_platform_prereq: false,
            auto_execute: true,
            current_platform: Platform::Web,
            max_executions: DEFAULT_MAX_EXECUTIONS,
        }
    }
}

impl ExecutionContext {
    /// Create the default context for `platform`
    #[must_use]
    pub fn new(platform: Platform) -> Self {
        Self {
            current_platform: platform,
            ..Self::default()
        }
    }

    /// Mark this run as a prerequisite execution
    #[must_use]
    pub const fn as_prerequisite(mut self) -> Self {
        self.is_prerequisite_execution = true;
        self
    }

    /// Stop at platform boundaries
    #[must_use]
    pub const fn with_skip_platform_prereq(mut self, skip: bool) -> Self {
        self.skip_platform_prereq = skip;
        self
    }

    /// Enable or disable automatic execution
    #[must_use]
    pub const fn with_auto_execute(mut self, auto: bool) -> Self {
        self.auto_execute = auto;
        self
    }

    /// Bound the number of executed steps
    #[must_use]
    pub const fn with_max_executions(mut self, max: usize) -> Self {
        self.max_executions = max;
        self
    }
}

/// Executes chain steps against a live automation session.
pub trait StepRunner {
    /// Run one step and return the data it changed, as a delta to merge
    /// into the snapshot.
    ///
    /// # Errors
    /// Any error aborts the preflight.
    fn run(&mut self, step: &ChainStep, snapshot: &Snapshot) -> PrecursorResult<Value>;

    /// Terminate the session for `platform`.
    ///
    /// # Errors
    /// Any error aborts the preflight.
    fn end_session(&mut self, platform: &Platform) -> PrecursorResult<()>;
}

/// Single-writer store for the snapshot.
pub trait SnapshotStore {
    /// Read the current snapshot.
    ///
    /// # Errors
    /// I/O or format errors.
    fn load(&mut self) -> PrecursorResult<Snapshot>;

    /// Write the snapshot back.
    ///
    /// # Errors
    /// I/O or format errors.
    fn persist(&mut self, snapshot: &Snapshot) -> PrecursorResult<()>;
}

/// Snapshot stored as a JSON file. A missing file reads as an empty
/// snapshot.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Create a store backed by `path`
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&mut self) -> PrecursorResult<Snapshot> {
        if !self.path.exists() {
            return Ok(Snapshot::default());
        }
        Snapshot::from_json(&fs::read_to_string(&self.path)?)
    }

    fn persist(&mut self, snapshot: &Snapshot) -> PrecursorResult<()> {
        let text = serde_json::to_string_pretty(snapshot.raw())?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Snapshot held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshot: Snapshot,
    writes: usize,
}

impl MemoryStore {
    /// Create a store holding `snapshot`
    #[must_use]
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            writes: 0,
        }
    }

    /// Current snapshot
    #[must_use]
    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Number of persists
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.writes
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&mut self) -> PrecursorResult<Snapshot> {
        Ok(self.snapshot.clone())
    }

    fn persist(&mut self, snapshot: &Snapshot) -> PrecursorResult<()> {
        self.snapshot = snapshot.clone();
        self.writes += 1;
        Ok(())
    }
}

/// Result of a preflight that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub struct PreflightReport {
    /// Final analysis
    pub analysis: Analysis,
    /// Steps executed, in order
    pub executed: Vec<ChainStep>,
    /// Set when the preflight stopped at a platform boundary
    pub cross_platform: Option<String>,
}

impl PreflightReport {
    /// Whether the target test can run now
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.analysis.ready
    }
}

/// Preflight driver over a planner, a step runner and a snapshot store.
#[derive(Debug)]
pub struct Preflight<'p, R: StepRunner, S: SnapshotStore> {
    planner: &'p Planner<'p>,
    runner: R,
    store: S,
}

impl<'p, R: StepRunner, S: SnapshotStore> Preflight<'p, R, S> {
    /// Create a preflight driver.
    pub fn new(planner: &'p Planner<'p>, runner: R, store: S) -> Self {
        Self {
            planner,
            runner,
            store,
        }
    }

    /// Release the runner and store.
    pub fn into_parts(self) -> (R, S) {
        (self.runner, self.store)
    }

    /// Bring the snapshot to a state where the test producing `status` can
    /// run, executing prerequisite steps as needed.
    ///
    /// # Errors
    /// `Blocked` when no route exists, `NotReady` when execution is not
    /// allowed or the budget runs out, `NoProgress` when a step leaves the
    /// plan unchanged, `StepFailed` when a step fails, plus descriptor and
    /// store errors.
    pub fn run(
        &mut self,
        status: &str,
        ctx: &ExecutionContext,
        options: &PlanOptions,
    ) -> PrecursorResult<PreflightReport> {
        let mut executed: Vec<ChainStep> = Vec::new();
        let mut active_platform: Option<Platform> = None;

        loop {
            let mut snapshot = self.store.load()?;
            let analysis = self.planner.analyze_status(status, &snapshot, options)?;

            if analysis.ready {
                if let Some(platform) = active_platform.filter(|p| p != &ctx.current_platform) {
                    self.runner.end_session(&platform)?;
                }
                tracing::info!(
                    "Preflight for '{}' ready after {} step(s)",
                    status,
                    executed.len()
                );
                return Ok(PreflightReport {
                    analysis,
                    executed,
                    cross_platform: None,
                });
            }
            if analysis.is_blocked() || ctx.is_prerequisite_execution || !ctx.auto_execute {
                return Err(not_ready_error(&analysis));
            }
            let Some(next) = analysis.next_step.clone() else {
                return Err(not_ready_error(&analysis));
            };
            match next.action_name.as_str() {
                NOT_IN_REGISTRY => {
                    return Err(PrecursorError::UnknownStatus {
                        status: next.status,
                    })
                }
                FILE_NOT_FOUND => {
                    let id = next.implication.map_or(next.status, |id| id.to_string());
                    return Err(PrecursorError::not_found(id));
                }
                _ => {}
            }

            if ctx.skip_platform_prereq && next.platform != ctx.current_platform {
                let message = format_cross_platform_message(&analysis, &ctx.current_platform);
                return Ok(PreflightReport {
                    analysis,
                    executed,
                    cross_platform: Some(message),
                });
            }
            if executed.last().is_some_and(|last| last.status == next.status) {
                return Err(PrecursorError::NoProgress {
                    status: next.status,
                });
            }
            if executed.len() >= ctx.max_executions {
                tracing::warn!(
                    "Preflight for '{}' stopped after {} executions",
                    status,
                    executed.len()
                );
                return Err(not_ready_error(&analysis));
            }

            if let Some(platform) = active_platform.as_ref().filter(|p| *p != &next.platform) {
                self.runner.end_session(platform)?;
            }
            active_platform = Some(next.platform.clone());

            tracing::info!(
                "Executing prerequisite '{}' ({}) on {}",
                next.status,
                next.test_file.as_deref().unwrap_or("-"),
                next.platform
            );
            let delta = self
                .runner
                .run(&next, &snapshot)
                .map_err(|e| step_failure(&next, e))?;
            snapshot.merge(&next.status, &completion_delta(&next, delta));
            self.store.persist(&snapshot)?;
            executed.push(next);
        }
    }
}

fn step_failure(step: &ChainStep, error: PrecursorError) -> PrecursorError {
    match error {
        PrecursorError::StepFailed { .. } => error,
        other => PrecursorError::StepFailed {
            status: step.status.clone(),
            test_file: step.test_file.clone().unwrap_or_default(),
            message: other.to_string(),
        },
    }
}

/// Verify and observer steps do not change status themselves; record the
/// status they confirmed so the plan moves on.
fn completion_delta(step: &ChainStep, delta: Value) -> Value {
    if step.mode.is_none() {
        return delta;
    }
    let key = match &step.entity {
        Some(entity) => format!("{entity}.status"),
        None => "status".to_string(),
    };
    let mut map = match delta {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.entry(key)
        .or_insert_with(|| Value::String(step.status.clone()));
    Value::Object(map)
}
