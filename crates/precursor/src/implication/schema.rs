//! Implication descriptor schema.
//!
//! An implication describes one test as a state-machine transition: the
//! status it produces, the ways to set it up, the data it needs, and where
//! its status can go next.
//!
//! ```yaml
//! id: BookingConfirmedImplications
//! targetStatus: booking_confirmed
//! setup:
//!   - previousStatus: booking_requested
//!     testFile: tests/club/confirm_booking.spec.js
//!     actionName: confirmBooking
//!     platform: clubApp
//! requires:
//!   dancer.loggedIn: true
//! on:
//!   CANCEL: booking_cancelled
//!   UPGRADE:
//!     - { target: upgraded, requires: { plan: pro } }
//!     - { target: upgraded, isDefault: true }
//! ```

use crate::condition::{ConditionTree, Guard, RequiresMap};
use crate::result::{PrecursorError, PrecursorResult};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Identifier of an implication descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImplicationId(String);

impl ImplicationId {
    /// Wrap an identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Identifier text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identifier is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ImplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ImplicationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ImplicationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Execution platform of a test.
///
/// Parsing is case-insensitive and ignores `-`, `_` and spaces, so
/// `club-app`, `ClubApp` and `club_app` are the same platform.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Platform {
    /// Browser
    #[default]
    Web,
    /// Dancer mobile app
    Dancer,
    /// Club mobile app
    ClubApp,
    /// Any other platform, by normalized name
    Other(String),
}

impl Platform {
    /// Parse a platform name or alias.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let normalized: String = name
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "" | "web" | "browser" | "playwright" | "desktop" => Self::Web,
            "dancer" | "dancerapp" | "dancers" => Self::Dancer,
            "clubapp" | "club" | "clubs" | "manager" | "managerapp" => Self::ClubApp,
            _ => Self::Other(normalized),
        }
    }

    /// Canonical name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Web => "web",
            Self::Dancer => "dancer",
            Self::ClubApp => "clubApp",
            Self::Other(name) => name,
        }
    }

    /// Whether tests on this platform drive a mobile app
    #[must_use]
    pub const fn is_mobile(&self) -> bool {
        matches!(self, Self::Dancer | Self::ClubApp)
    }
}

impl From<String> for Platform {
    fn from(name: String) -> Self {
        Self::parse(&name)
    }
}

impl From<&str> for Platform {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.name().to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Setup entry mode. Absent means the entry changes state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetupMode {
    /// Verifies a state without changing it
    Verify,
    /// Observes another actor's state change
    Observer,
}

/// One alternative way to reach an implication's status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupEntry {
    /// Status this entry starts from (`None` for a root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_status: Option<String>,
    /// Data requirements selecting this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RequiresMap>,
    /// Block-based requirements selecting this entry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionTree>,
    /// Test file to execute
    pub test_file: String,
    /// Action inside the test file
    #[serde(default)]
    pub action_name: String,
    /// Platform the test runs on
    #[serde(default)]
    pub platform: Platform,
    /// Non-state-changing mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<SetupMode>,
}

impl SetupEntry {
    /// The guard that selects this entry
    #[must_use]
    pub fn guard(&self) -> Guard<'_> {
        Guard::select(self.conditions.as_ref(), self.requires.as_ref())
    }

    /// Whether the entry carries any requirement
    #[must_use]
    pub fn is_guarded(&self) -> bool {
        !self.guard().is_open()
    }

    /// Whether the entry only verifies or observes
    #[must_use]
    pub const fn is_non_mutating(&self) -> bool {
        self.mode.is_some()
    }

    /// File name without directories
    #[must_use]
    pub fn test_file_basename(&self) -> &str {
        basename(&self.test_file)
    }
}

/// Outgoing transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionConfig {
    /// Status the transition leads to
    pub target: String,
    /// Legacy guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<RequiresMap>,
    /// Block-based guard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<ConditionTree>,
    /// Platforms the transition is performed on
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub platforms: Vec<Platform>,
    /// Preferred when several transitions reach the same target
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_default: bool,
}

impl TransitionConfig {
    /// Unguarded transition to `target`
    #[must_use]
    pub fn to(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            requires: None,
            conditions: None,
            platforms: Vec::new(),
            is_default: false,
        }
    }

    /// The guard on this transition
    #[must_use]
    pub fn guard(&self) -> Guard<'_> {
        Guard::select(self.conditions.as_ref(), self.requires.as_ref())
    }

    /// Whether this transition reaches `status` (exactly, or as a
    /// `<namespace>_<status>` suffix).
    #[must_use]
    pub fn reaches(&self, status: &str) -> bool {
        self.target == status
            || self
                .target
                .strip_suffix(status)
                .is_some_and(|prefix| prefix.ends_with('_'))
    }
}

/// Accepted shapes of one `on` entry.
#[derive(Deserialize)]
#[serde(untagged)]
enum TransitionSpec {
    Target(String),
    One(TransitionConfig),
    Many(Vec<TransitionConfig>),
}

fn deserialize_transitions<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, Vec<TransitionConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = IndexMap::<String, TransitionSpec>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(event, spec)| {
            let configs = match spec {
                TransitionSpec::Target(target) => vec![TransitionConfig::to(target)],
                TransitionSpec::One(config) => vec![config],
                TransitionSpec::Many(configs) => configs,
            };
            (event, configs)
        })
        .collect())
}

/// Declarative descriptor of one test's pre- and postconditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implication {
    /// Identifier (defaults to the descriptor's file stem)
    #[serde(default)]
    pub id: ImplicationId,
    /// Status this test produces
    pub target_status: String,
    /// Sub-subject whose own status this implication tracks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    /// Alternative setups, in priority order
    #[serde(default)]
    pub setup: Vec<SetupEntry>,
    /// Data and structural requirements
    #[serde(default, skip_serializing_if = "RequiresMap::is_empty")]
    pub requires: RequiresMap,
    /// Outgoing transitions by event, in declaration order
    #[serde(
        default,
        deserialize_with = "deserialize_transitions",
        skip_serializing_if = "IndexMap::is_empty"
    )]
    pub on: IndexMap<String, Vec<TransitionConfig>>,
    /// Free-form description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl Implication {
    /// Parse a YAML descriptor.
    ///
    /// # Errors
    /// Returns error if YAML is invalid or the descriptor shape is malformed.
    pub fn from_yaml(id: impl Into<ImplicationId>, yaml: &str) -> PrecursorResult<Self> {
        let id = id.into();
        let parsed: Self = serde_yaml_ng::from_str(yaml).map_err(|e| {
            PrecursorError::DescriptorParse {
                id: id.to_string(),
                message: e.to_string(),
            }
        })?;
        parsed.finish(id)
    }

    /// Parse a JSON descriptor.
    ///
    /// # Errors
    /// Returns error if JSON is invalid or the descriptor shape is malformed.
    pub fn from_json(id: impl Into<ImplicationId>, json: &str) -> PrecursorResult<Self> {
        let id = id.into();
        let parsed: Self =
            serde_json::from_str(json).map_err(|e| PrecursorError::DescriptorParse {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        parsed.finish(id)
    }

    fn finish(mut self, id: ImplicationId) -> PrecursorResult<Self> {
        if self.id.is_empty() {
            self.id = id;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check the descriptor shape.
    ///
    /// # Errors
    /// Returns `InvalidDescriptor` naming the first problem found.
    pub fn validate(&self) -> PrecursorResult<()> {
        let fail = |message: String| Err(PrecursorError::invalid_descriptor(self.id.as_str(), message));
        if self.id.is_empty() {
            return fail("id is empty".to_string());
        }
        if self.target_status.trim().is_empty() {
            return fail("targetStatus is empty".to_string());
        }
        if self.entity.as_deref().is_some_and(|e| e.trim().is_empty()) {
            return fail("entity is empty".to_string());
        }
        for (i, entry) in self.setup.iter().enumerate() {
            if entry.test_file.trim().is_empty() {
                return fail(format!("setup[{i}].testFile is empty"));
            }
            if entry.previous_status.as_deref().is_some_and(|p| p.trim().is_empty()) {
                return fail(format!("setup[{i}].previousStatus is empty"));
            }
        }
        for (event, configs) in &self.on {
            if configs.is_empty() {
                return fail(format!("on.{event} has no transitions"));
            }
            if configs.iter().any(|c| c.target.trim().is_empty()) {
                return fail(format!("on.{event} has a transition with an empty target"));
            }
        }
        Ok(())
    }

    /// Every `(event, transition)` pair.
    pub fn transitions(&self) -> impl Iterator<Item = (&str, &TransitionConfig)> {
        self.on
            .iter()
            .flat_map(|(event, configs)| configs.iter().map(move |c| (event.as_str(), c)))
    }

    /// Transitions reaching `status`, in declaration order.
    #[must_use]
    pub fn transitions_to(&self, status: &str) -> Vec<(&str, &TransitionConfig)> {
        self.transitions().filter(|(_, c)| c.reaches(status)).collect()
    }

    /// `previousStatus` of every setup entry.
    pub fn previous_statuses(&self) -> impl Iterator<Item = &str> {
        self.setup.iter().filter_map(|e| e.previous_status.as_deref())
    }
}

/// File name without directories.
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
