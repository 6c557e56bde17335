//! Readiness, next step, and platform segmentation.

use super::chain::ChainStep;
use crate::condition::{evaluate_requirement, ConditionContext, RequirementKey};
use crate::implication::{Implication, Platform};
use serde::{Deserialize, Serialize};

/// Contiguous run of chain steps on one platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformSegment {
    /// Platform shared by every step
    pub platform: Platform,
    /// Steps in chain order
    pub steps: Vec<ChainStep>,
    /// Every step is complete and no outstanding entity requirement applies
    pub complete: bool,
}

/// Whether the target test can run now.
///
/// Never ready with a blocked step. A loop transition is ready only when
/// its target is the sole incomplete step and the current status is the
/// target's `previousStatus`. Otherwise the target must be the sole
/// incomplete step, reached directly from the current status when a direct
/// transition is known.
#[must_use]
pub fn is_ready(chain: &[ChainStep], current_status: &str, is_loop: bool) -> bool {
    if chain.iter().any(|s| s.blocked) {
        return false;
    }
    let incomplete: Vec<&ChainStep> = chain.iter().filter(|s| !s.complete).collect();
    match incomplete.as_slice() {
        [] => true,
        [only] if only.is_target => {
            if is_loop {
                only.previous_status.as_deref() == Some(current_status)
            } else {
                only.direct_from
                    .as_deref()
                    .map_or(true, |from| from == current_status)
            }
        }
        _ => false,
    }
}

/// First incomplete step that is not the target.
#[must_use]
pub fn find_next_step(chain: &[ChainStep]) -> Option<&ChainStep> {
    chain.iter().find(|s| !s.complete && !s.is_target)
}

/// Split the chain into maximal same-platform runs.
///
/// A structurally complete segment is re-validated against the
/// implication's `<entity>.<field>` requirements: when one of them does not
/// hold and the entity has a step in the segment, the segment stays
/// incomplete.
#[must_use]
pub fn group_by_platform(
    chain: &[ChainStep],
    implication: &Implication,
    ctx: &ConditionContext<'_>,
) -> Vec<PlatformSegment> {
    let mut segments: Vec<PlatformSegment> = Vec::new();
    for step in chain {
        match segments.last_mut() {
            Some(segment) if segment.platform == step.platform => {
                segment.steps.push(step.clone());
                continue;
            }
            _ => {}
        }
        segments.push(PlatformSegment {
            platform: step.platform.clone(),
            steps: vec![step.clone()],
            complete: false,
        });
    }

    let outstanding: Vec<&str> = implication
        .requires
        .iter()
        .filter_map(|(key, expected)| {
            let (entity, _) = RequirementKey::parse(key).entity_field()?;
            evaluate_requirement(key, expected, ctx).map(|_| entity)
        })
        .collect();

    for segment in &mut segments {
        let structurally_complete = segment.steps.iter().all(|s| s.complete);
        let has_outstanding = segment.steps.iter().any(|s| {
            s.entity
                .as_deref()
                .is_some_and(|entity| outstanding.contains(&entity))
        });
        segment.complete = structurally_complete && !has_outstanding;
    }
    segments
}
