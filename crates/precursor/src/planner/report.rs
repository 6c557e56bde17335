//! Human-readable diagnostics for an [`Analysis`].
//!
//! Pure formatting; callers decide where the text goes.

use super::analysis::Analysis;
use super::chain::ChainStep;
use crate::implication::Platform;

fn marker(step: &ChainStep) -> &'static str {
    if step.blocked {
        "[x]"
    } else if step.complete {
        "[✓]"
    } else if step.is_target {
        "[→]"
    } else {
        "[ ]"
    }
}

fn describe_step(index: usize, step: &ChainStep) -> String {
    let mut line = format!("  {} {}. {}", marker(step), index + 1, step.status);
    if let Some(entity) = &step.entity {
        line.push_str(&format!(" ({entity})"));
    }
    line.push_str(&format!(" [{}]", step.platform));
    if !step.action_name.is_empty() {
        line.push_str(&format!(" {}", step.action_name));
    }
    if let Some(file) = &step.test_file {
        line.push_str(&format!(" - {file}"));
    }
    let mut tags = Vec::new();
    if step.is_current {
        tags.push("current");
    }
    if step.is_target {
        tags.push("target");
    }
    if step.is_loop_prerequisite {
        tags.push("loop");
    }
    if step.is_detour {
        tags.push("detour");
    }
    if step.mode.is_some() {
        tags.push("verify");
    }
    if !tags.is_empty() {
        line.push_str(&format!(" <{}>", tags.join(", ")));
    }
    line
}

/// Step list, one line per step.
#[must_use]
pub fn format_chain(chain: &[ChainStep]) -> String {
    let mut out = String::new();
    for (i, step) in chain.iter().enumerate() {
        out.push_str(&describe_step(i, step));
        out.push('\n');
    }
    out
}

/// Explain why the target cannot run yet and what to run first.
#[must_use]
pub fn format_not_ready(analysis: &Analysis) -> String {
    let mut out = format!(
        "Not ready: {} ({})\n  current status: {}\n  target status:  {}\n",
        analysis.target_status, analysis.implication, analysis.current_status, analysis.target_status
    );
    if analysis.is_loop_transition {
        if let Some(previous) = &analysis.previous_status {
            out.push_str(&format!(
                "  loop transition: must pass through '{previous}' before returning\n"
            ));
        }
    }
    out.push_str(&format!(
        "\nPath to target ({} step(s) remaining):\n",
        analysis.steps_remaining
    ));
    out.push_str(&format_chain(&analysis.chain));

    if !analysis.missing_fields.is_empty() {
        out.push_str("\nMissing data:\n");
        for mismatch in &analysis.missing_fields {
            out.push_str(&format!("  - {mismatch}\n"));
        }
    }

    if analysis.is_blocked() {
        out.push('\n');
        out.push_str(&format_blocked(analysis));
    } else if let Some(next) = &analysis.next_step {
        out.push_str(&format!("\nNext: {}", next.status));
        if let Some(file) = &next.test_file {
            out.push_str(&format!(" - run {file}"));
        }
        out.push('\n');
    }
    out
}

/// Field-level diagnostics for every blocked step.
#[must_use]
pub fn format_blocked(analysis: &Analysis) -> String {
    let mut out = String::new();
    for step in analysis.chain.iter().filter(|s| s.blocked) {
        out.push_str(&format!("Blocked: {}\n", step.status));
        if let Some(reason) = &step.blocked_reason {
            out.push_str(&format!("  {reason}\n"));
        }
        for field in &step.blocking_fields {
            out.push_str(&format!("  - {field}\n"));
        }
    }
    out
}

/// Message for a next step that must run on a different platform.
#[must_use]
pub fn format_cross_platform_message(analysis: &Analysis, current_platform: &Platform) -> String {
    let mut out = format!(
        "Prerequisites for '{}' run on other platforms (current: {}).\n",
        analysis.target_status, current_platform
    );
    for segment in analysis.segments.iter().filter(|s| !s.complete) {
        let statuses: Vec<&str> = segment
            .steps
            .iter()
            .filter(|s| !s.complete)
            .map(|s| s.status.as_str())
            .collect();
        if statuses.is_empty() {
            continue;
        }
        out.push_str(&format!("  {}: {}\n", segment.platform, statuses.join(" → ")));
    }
    if let Some(next) = &analysis.next_step {
        if &next.platform != current_platform {
            out.push_str(&format!(
                "Run '{}' on {}",
                next.status, next.platform
            ));
            if let Some(file) = &next.test_file {
                out.push_str(&format!(" ({file})"));
            }
            out.push_str(", then re-run this test.\n");
        }
    }
    out
}
