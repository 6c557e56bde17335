//! Command handlers.
//!
//! Each handler opens the catalog, runs one library operation and renders
//! the result. Rendering is split from printing so it can be tested.

use crate::commands::{GraphArgs, OutputFormat, PlanArgs, ValidateArgs};
use crate::config::{CliConfig, CATALOG_ENV};
use crate::error::{CliError, CliResult};
use console::style;
use precursor::{
    format_not_ready, not_ready_error, to_dot, Analysis, CatalogValidator, DirectoryLoader,
    Implication, ImplicationId, IssueSeverity, JsonFileStore, MemoryRegistry, PlanOptions,
    Planner, Platform, PrecursorError, Snapshot, SnapshotStore, ValidationIssue,
    ValidationResult,
};
use serde_json::json;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// A directory catalog with its registry.
#[derive(Debug)]
pub struct Catalog {
    loader: DirectoryLoader,
    registry: MemoryRegistry,
    /// Descriptors that failed to load, with the reason
    pub failures: Vec<(ImplicationId, PrecursorError)>,
}

impl Catalog {
    /// Open the catalog directory named by the configuration.
    ///
    /// Descriptors that fail to load are kept in `failures` instead of
    /// aborting, so `validate` can report all of them.
    pub fn open(config: &CliConfig) -> CliResult<Self> {
        let dir = config.catalog.as_deref().ok_or_else(|| {
            CliError::config(format!(
                "no catalog directory; pass --catalog or set {CATALOG_ENV}"
            ))
        })?;
        Self::open_dir(dir)
    }

    /// Open a catalog directory.
    pub fn open_dir(dir: &Path) -> CliResult<Self> {
        if !dir.is_dir() {
            return Err(CliError::config(format!(
                "catalog directory not found: {}",
                dir.display()
            )));
        }
        let loader = DirectoryLoader::new(dir);
        let mut loaded: Vec<Arc<Implication>> = Vec::new();
        let mut failures = Vec::new();
        for id in loader.ids()? {
            match precursor::ImplicationLoader::load(&loader, &id) {
                Ok(implication) => loaded.push(implication),
                Err(e) => {
                    tracing::warn!("Skipping descriptor {}: {}", id, e);
                    failures.push((id, e));
                }
            }
        }
        tracing::debug!(
            "Opened catalog {} with {} descriptor(s)",
            dir.display(),
            loaded.len()
        );
        let registry = MemoryRegistry::from_implications(loaded.iter().map(AsRef::as_ref));
        Ok(Self {
            loader,
            registry,
            failures,
        })
    }

    /// Planner over this catalog
    #[must_use]
    pub fn planner(&self) -> Planner<'_> {
        Planner::new(&self.registry, &self.loader).with_discovery(&self.registry)
    }

    /// Every loadable descriptor, sorted by identifier
    pub fn implications(&self) -> CliResult<Vec<Arc<Implication>>> {
        let mut out = Vec::new();
        for id in self.loader.ids()? {
            if self.failures.iter().any(|(failed, _)| failed == &id) {
                continue;
            }
            out.push(precursor::ImplicationLoader::load(&self.loader, &id)?);
        }
        Ok(out)
    }

    /// Validate the loadable descriptors
    #[must_use]
    pub fn validate(&self) -> ValidationResult {
        CatalogValidator::new(&self.registry, &self.loader).validate()
    }
}

fn plan_options(args: &PlanArgs) -> PlanOptions {
    let mut options = PlanOptions::new().with_platform(Platform::parse(&args.platform));
    if let Some(event) = &args.event {
        options = options.with_explicit_event(event.clone());
    }
    if let Some(file) = &args.test_file {
        options = options.with_current_test_file(file.clone());
    }
    options
}

fn load_snapshot(args: &PlanArgs) -> CliResult<Snapshot> {
    match &args.snapshot {
        Some(path) => Ok(JsonFileStore::new(path).load()?),
        None => Ok(Snapshot::default()),
    }
}

fn plan(config: &CliConfig, args: &PlanArgs) -> CliResult<Analysis> {
    let catalog = Catalog::open(config)?;
    let snapshot = load_snapshot(args)?;
    let analysis = catalog
        .planner()
        .analyze_status(&args.status, &snapshot, &plan_options(args))?;
    Ok(analysis)
}

/// Render an analysis
pub fn render_analysis(analysis: &Analysis, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(analysis)?),
        OutputFormat::Text if analysis.ready => Ok(format!(
            "{} {} ({}) can run now\n",
            style("Ready:").green().bold(),
            analysis.target_status,
            analysis.implication
        )),
        OutputFormat::Text => Ok(format_not_ready(analysis)),
    }
}

/// Run the `analyze` command
pub fn run_analyze(config: &CliConfig, args: &PlanArgs) -> CliResult<()> {
    let analysis = plan(config, args)?;
    if !config.verbosity.is_quiet() || args.format == OutputFormat::Json {
        print!("{}", render_analysis(&analysis, args.format)?);
    }
    Ok(())
}

/// Run the `check` command. Fails unless the target can run now.
pub fn run_check(config: &CliConfig, args: &PlanArgs) -> CliResult<()> {
    let analysis = plan(config, args)?;
    if !config.verbosity.is_quiet() || args.format == OutputFormat::Json {
        print!("{}", render_analysis(&analysis, args.format)?);
    }
    if analysis.ready {
        Ok(())
    } else {
        Err(not_ready_error(&analysis).into())
    }
}

fn severity_label(severity: IssueSeverity) -> String {
    match severity {
        IssueSeverity::Error => style("error").red().bold().to_string(),
        IssueSeverity::Warning => style("warning").yellow().to_string(),
        IssueSeverity::Info => style("info").dim().to_string(),
    }
}

/// Render a validation result together with descriptors that failed to load
pub fn render_validation(
    result: &ValidationResult,
    failures: &[(ImplicationId, PrecursorError)],
    format: OutputFormat,
) -> CliResult<String> {
    match format {
        OutputFormat::Json => {
            let mut issues: Vec<serde_json::Value> = failures
                .iter()
                .map(|(id, e)| {
                    json!({
                        "severity": IssueSeverity::Error.to_string(),
                        "message": format!("{id}: {e}"),
                    })
                })
                .collect();
            issues.extend(result.issues.iter().map(|issue| {
                json!({
                    "severity": issue.severity().to_string(),
                    "message": issue.to_string(),
                })
            }));
            let doc = json!({
                "valid": result.is_valid && failures.is_empty(),
                "statuses": result.statuses,
                "issues": issues,
            });
            Ok(serde_json::to_string_pretty(&doc)?)
        }
        OutputFormat::Text => {
            let mut out = format!("Checked {} status(es)\n", result.statuses);
            for (id, e) in failures {
                out.push_str(&format!(
                    "  {}: {id}: {e}\n",
                    severity_label(IssueSeverity::Error)
                ));
            }
            for issue in &result.issues {
                out.push_str(&format!("  {}: {issue}\n", severity_label(issue.severity())));
            }
            if result.issues.is_empty() && failures.is_empty() {
                out.push_str(&format!("{}\n", style("No issues found").green()));
            }
            Ok(out)
        }
    }
}

/// Count of failing issues: errors, plus warnings under `strict`
#[must_use]
pub fn failing_issues(result: &ValidationResult, failures: usize, strict: bool) -> usize {
    let floor = if strict {
        IssueSeverity::Warning
    } else {
        IssueSeverity::Error
    };
    failures + result.at_least(floor).len()
}

/// Run the `validate` command
pub fn run_validate(config: &CliConfig, args: &ValidateArgs) -> CliResult<()> {
    let catalog = Catalog::open(config)?;
    let result = catalog.validate();
    if !config.verbosity.is_quiet() || args.format == OutputFormat::Json {
        println!(
            "{}",
            render_validation(&result, &catalog.failures, args.format)?.trim_end()
        );
    }
    let failing = failing_issues(&result, catalog.failures.len(), args.strict);
    if failing > 0 {
        return Err(CliError::validation(format!("{failing} failing issue(s)")));
    }
    Ok(())
}

/// Run the `graph` command
pub fn run_graph(config: &CliConfig, args: &GraphArgs) -> CliResult<()> {
    let catalog = Catalog::open(config)?;
    let implications = catalog.implications()?;
    let dot = to_dot(implications.iter().map(AsRef::as_ref));
    match &args.output {
        Some(path) => {
            fs::write(path, &dot)?;
            if config.verbosity.is_verbose() {
                println!("Wrote {}", path.display());
            }
        }
        None => print!("{dot}"),
    }
    Ok(())
}

/// Issues that only concern a single descriptor
#[must_use]
pub fn issues_for<'r>(result: &'r ValidationResult, id: &ImplicationId) -> Vec<&'r ValidationIssue> {
    result
        .issues
        .iter()
        .filter(|issue| match issue {
            ValidationIssue::UnknownPreviousStatus { implication, .. }
            | ValidationIssue::UnknownTransitionTarget { implication, .. }
            | ValidationIssue::NoSetupEntries { implication }
            | ValidationIssue::AmbiguousTransitions { implication, .. }
            | ValidationIssue::UnguardedSelfLoop { implication, .. } => implication == id,
            ValidationIssue::UnloadableDescriptor { .. } => false,
        })
        .collect()
}
