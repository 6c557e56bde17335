//! Setup-entry selection.
//!
//! An implication may list several ways to reach its status. Exactly one is
//! used per plan, picked in this order:
//!
//! 1. the entry whose test file is the one currently running
//! 2. guarded entries whose guard holds (ties broken by the event hint)
//! 3. unguarded entries, the default path
//! 4. the event hint matched against test file names, else the first entry

use crate::condition::{ConditionContext, FieldMismatch};
use crate::implication::{basename, Implication, SetupEntry};

/// Hints for choosing a setup entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetupHints<'h> {
    /// Test file being executed right now
    pub current_test_file: Option<&'h str>,
    /// Event expected to lead into the status
    pub explicit_event: Option<&'h str>,
}

/// Lowercase and drop `_` and `-` so `CONFIRM_BOOKING` matches
/// `confirm-booking.spec.js`.
#[must_use]
pub fn normalize_token(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '_' | '-'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn mentions_event(entry: &SetupEntry, event: Option<&str>) -> bool {
    let Some(event) = event.map(normalize_token).filter(|e| !e.is_empty()) else {
        return false;
    };
    normalize_token(&entry.test_file).contains(&event)
}

fn prefer_event<'i>(candidates: &[&'i SetupEntry], event: Option<&str>) -> Option<&'i SetupEntry> {
    candidates
        .iter()
        .find(|entry| mentions_event(entry, event))
        .or_else(|| candidates.first())
        .copied()
}

/// Pick the setup entry that applies to the current data.
///
/// Returns `None` only when the implication declares no setup entries.
#[must_use]
pub fn select_setup_entry<'i>(
    implication: &'i Implication,
    hints: &SetupHints<'_>,
    ctx: &ConditionContext<'_>,
) -> Option<&'i SetupEntry> {
    let entries = &implication.setup;
    if entries.is_empty() {
        return None;
    }

    if let Some(current) = hints.current_test_file.map(basename) {
        if let Some(entry) = entries.iter().find(|e| e.test_file_basename() == current) {
            return Some(entry);
        }
    }

    if entries.iter().any(SetupEntry::is_guarded) {
        let matching: Vec<&SetupEntry> = entries
            .iter()
            .filter(|e| e.is_guarded() && e.guard().evaluate(ctx).met)
            .collect();
        if matching.len() == 1 {
            return matching.first().copied();
        }
        if !matching.is_empty() {
            return prefer_event(&matching, hints.explicit_event);
        }

        let defaults: Vec<&SetupEntry> = entries.iter().filter(|e| !e.is_guarded()).collect();
        if !defaults.is_empty() {
            return prefer_event(&defaults, hints.explicit_event);
        }

        warn_unmet_entries(implication, ctx);
        return entries.first();
    }

    entries
        .iter()
        .find(|e| mentions_event(e, hints.explicit_event))
        .or_else(|| entries.first())
}

fn warn_unmet_entries(implication: &Implication, ctx: &ConditionContext<'_>) {
    tracing::warn!(
        "{}: no setup entry matches the current data and none is unguarded; using the first entry",
        implication.id
    );
    for (i, entry) in implication.setup.iter().enumerate() {
        let mismatches: Vec<FieldMismatch> = entry.guard().evaluate(ctx).mismatches;
        for mismatch in mismatches {
            tracing::warn!("  setup[{}] ({}): {}", i, entry.test_file, mismatch);
        }
    }
}
