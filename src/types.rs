//! Core domain types: importance tiers and the typed extraction payloads
//! produced upstream by the enrichment LLM.
//!
//! Extraction JSON is loosely typed on the wire (optional keys, free-text
//! values). Each payload kind gets an explicit struct here with a documented
//! default per optional field instead of being passed around as raw maps.

use serde::{Deserialize, Serialize};

/// Business-importance classification for a message.
///
/// Ordered by severity: CRITICAL > EXECUTION > COORDINATION > FYI > NOISE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportanceTier {
    Critical,
    Execution,
    Coordination,
    Fyi,
    Noise,
}

impl ImportanceTier {
    /// All tiers, most severe first.
    pub const ALL: [ImportanceTier; 5] = [
        ImportanceTier::Critical,
        ImportanceTier::Execution,
        ImportanceTier::Coordination,
        ImportanceTier::Fyi,
        ImportanceTier::Noise,
    ];

    /// Parse an upstream tier string. Unrecognized or missing values fall
    /// back to COORDINATION.
    pub fn parse(value: &str) -> ImportanceTier {
        match value.trim().to_uppercase().as_str() {
            "CRITICAL" => ImportanceTier::Critical,
            "EXECUTION" => ImportanceTier::Execution,
            "COORDINATION" => ImportanceTier::Coordination,
            "FYI" => ImportanceTier::Fyi,
            "NOISE" => ImportanceTier::Noise,
            _ => ImportanceTier::Coordination,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportanceTier::Critical => "CRITICAL",
            ImportanceTier::Execution => "EXECUTION",
            ImportanceTier::Coordination => "COORDINATION",
            ImportanceTier::Fyi => "FYI",
            ImportanceTier::Noise => "NOISE",
        }
    }
}

impl Default for ImportanceTier {
    fn default() -> Self {
        ImportanceTier::Coordination
    }
}

// ---------------------------------------------------------------------------
// Extraction payloads (one JSON document per message per task)
// ---------------------------------------------------------------------------

/// One project name pulled out of a message. An empty `extraction` is
/// dropped by the pipeline without counting as an error.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectExtraction {
    #[serde(default)]
    pub extraction: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Vec<String>,
}

/// `task_a_projects` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectsPayload {
    #[serde(default)]
    pub extractions: Vec<ProjectExtraction>,
    /// The single project this message is most likely about; links
    /// stakeholders to clusters.
    #[serde(default)]
    pub most_likely_project: Option<String>,
}

/// One stakeholder observation. An empty `email` is dropped by the
/// pipeline; every other field has a stand-in default.
#[derive(Debug, Clone, Deserialize)]
pub struct StakeholderExtraction {
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_unknown")]
    pub stakeholder: String,
    #[serde(default = "default_unknown")]
    pub inferred_role: String,
    #[serde(default = "default_confidence")]
    pub role_confidence: f64,
    #[serde(default = "default_interaction")]
    pub interaction_type: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// `task_b_stakeholders` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StakeholdersPayload {
    #[serde(default)]
    pub extractions: Vec<StakeholderExtraction>,
}

/// `task_c_importance` payload. The tier arrives as a free string and is
/// parsed leniently; absent or unknown → COORDINATION.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportancePayload {
    #[serde(default)]
    pub importance_tier: Option<String>,
}

impl ImportancePayload {
    pub fn tier(&self) -> ImportanceTier {
        self.importance_tier
            .as_deref()
            .map(ImportanceTier::parse)
            .unwrap_or_default()
    }
}

/// `task_d_meetings` payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeetingsPayload {
    #[serde(default)]
    pub is_meeting_related: bool,
}

fn default_confidence() -> f64 {
    0.5
}

fn default_unknown() -> String {
    "Unknown".to_string()
}

fn default_interaction() -> String {
    "stakeholder".to_string()
}
