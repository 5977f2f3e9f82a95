//! Aggregation run configuration, loaded from a JSON file.
//!
//! Every field has a default so a missing or partial file is never fatal;
//! a present-but-malformed file is an error.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    #[serde(default)]
    pub clustering: ClusteringConfig,
    #[serde(default)]
    pub stakeholder_filtering: StakeholderFilterConfig,
    #[serde(default)]
    pub post_filter: PostFilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Minimum similarity between a mention and a cluster's canonical name
    /// for the mention to join the cluster.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StakeholderFilterConfig {
    /// Second dedup pass merging profiles whose display names look like the
    /// same person across different addresses.
    #[serde(default)]
    pub enable_name_deduplication: bool,
    #[serde(default = "default_name_similarity_threshold")]
    pub name_similarity_threshold: f64,
    /// Export-time quality filtering (confidence floor, mention floor,
    /// generic-name denylist).
    #[serde(default)]
    pub enable_filtering: bool,
    #[serde(default = "default_min_role_confidence")]
    pub min_role_confidence: f64,
    #[serde(default = "default_min_mention_count")]
    pub min_mention_count: usize,
    #[serde(default)]
    pub exclude_generic_names: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Free-text description of the user's role, given to the relevance
    /// scorer as context.
    #[serde(default)]
    pub user_role: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig {
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for StakeholderFilterConfig {
    fn default() -> Self {
        StakeholderFilterConfig {
            enable_name_deduplication: false,
            name_similarity_threshold: default_name_similarity_threshold(),
            enable_filtering: false,
            min_role_confidence: default_min_role_confidence(),
            min_mention_count: default_min_mention_count(),
            exclude_generic_names: false,
        }
    }
}

impl Default for PostFilterConfig {
    fn default() -> Self {
        PostFilterConfig {
            enabled: false,
            user_role: String::new(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

fn default_similarity_threshold() -> f64 {
    0.75
}

fn default_name_similarity_threshold() -> f64 {
    0.85
}

fn default_min_role_confidence() -> f64 {
    0.70
}

fn default_min_mention_count() -> usize {
    2
}

fn default_confidence_threshold() -> f64 {
    0.70
}

impl AggregationConfig {
    /// Load configuration from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<AggregationConfig, String> {
        if !path.exists() {
            return Ok(AggregationConfig::default());
        }
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
    }
}
