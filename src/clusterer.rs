//! Greedy online clustering of project mentions by lexical similarity.
//!
//! Each incoming mention is compared against every existing cluster's
//! canonical name (never its aliases). The best match strictly above the
//! threshold wins; ties keep the cluster found first in the scan. No match
//! starts a new cluster whose canonical name is this mention's raw name.
//! Canonical names are first-seen and never revised, so cluster identity
//! stays stable for the whole run even when a later alias would have made
//! a prettier label.
//!
//! The scan is linear per insertion, O(n²) over n distinct names for a full
//! run. Fine at low-thousands scale; anything beyond that wants a blocking
//! index, not a change to this behavior.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::ImportanceTier;
use crate::util::{normalize_project_name, round1, round2, similarity_ratio};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One observation of a project in one message. Immutable once built; owned
/// by the cluster it lands in.
#[derive(Debug, Clone)]
pub struct ProjectMention {
    /// Store row id of the source message.
    pub message_id: i64,
    /// Upstream source identifier of the message.
    pub msg_id: String,
    pub subject: String,
    pub delivery_date: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub importance_tier: ImportanceTier,
    pub is_meeting: bool,
}

/// A set of mentions judged to refer to the same real project.
#[derive(Debug, Clone)]
pub struct ProjectCluster {
    /// Fixed at creation from the first mention's raw name; never renamed.
    pub canonical_name: String,
    aliases: HashSet<String>,
    mentions: Vec<ProjectMention>,
    stakeholder_emails: HashSet<String>,
    tier_counts: HashMap<ImportanceTier, usize>,
    meeting_count: usize,
}

/// Mention counts by exported-confidence band. The three bands always sum
/// to the cluster's total mention count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConfidenceDistribution {
    /// confidence >= 0.80
    pub high: usize,
    /// 0.50 <= confidence < 0.80
    pub medium: usize,
    /// confidence < 0.50
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DateRange {
    pub first: Option<String>,
    pub last: Option<String>,
}

/// Aggregate statistics over a cluster's full mention list.
#[derive(Debug, Clone)]
pub struct ClusterStats {
    pub total_mentions: usize,
    pub avg_confidence: f64,
    pub distribution: ConfidenceDistribution,
    pub date_range: DateRange,
    pub importance_tier: ImportanceTier,
}

/// Per-mention view embedded in the exported cluster. Identifier and
/// subject are truncated for size; cluster totals are always computed over
/// the untruncated mention list.
#[derive(Debug, Clone, Serialize)]
pub struct MentionView {
    pub message_id: i64,
    pub msg_id: String,
    pub subject: String,
    pub confidence: f64,
    pub evidence: Vec<String>,
}

/// Exported cluster record for `aggregated_projects.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterView {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub total_mentions: usize,
    pub avg_confidence: f64,
    pub confidence_distribution: ConfidenceDistribution,
    pub messages: Vec<MentionView>,
    pub stakeholders: Vec<String>,
    pub date_range: DateRange,
    pub importance_tier: ImportanceTier,
    pub meeting_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectsStats {
    pub total_projects: usize,
    pub total_aliases_merged: usize,
    pub avg_mentions_per_project: f64,
    pub processing_time_ms: u64,
}

/// Full `aggregated_projects.json` document.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectsExport {
    pub projects: Vec<ClusterView>,
    pub stats: ProjectsStats,
}

// ---------------------------------------------------------------------------
// Cluster
// ---------------------------------------------------------------------------

impl ProjectCluster {
    fn new(canonical_name: &str) -> ProjectCluster {
        let mut aliases = HashSet::new();
        aliases.insert(canonical_name.to_string());
        ProjectCluster {
            canonical_name: canonical_name.to_string(),
            aliases,
            mentions: Vec::new(),
            stakeholder_emails: HashSet::new(),
            tier_counts: HashMap::new(),
            meeting_count: 0,
        }
    }

    fn add_mention(&mut self, mention: ProjectMention) {
        *self.tier_counts.entry(mention.importance_tier).or_insert(0) += 1;
        if mention.is_meeting {
            self.meeting_count += 1;
        }
        self.mentions.push(mention);
    }

    fn add_alias(&mut self, alias: &str) {
        self.aliases.insert(alias.to_string());
    }

    pub fn add_stakeholder(&mut self, email: &str) {
        self.stakeholder_emails.insert(email.to_string());
    }

    pub fn mentions(&self) -> &[ProjectMention] {
        &self.mentions
    }

    pub fn aliases(&self) -> &HashSet<String> {
        &self.aliases
    }

    /// Statistics over the full mention list.
    pub fn calculate_stats(&self) -> ClusterStats {
        if self.mentions.is_empty() {
            return ClusterStats {
                total_mentions: 0,
                avg_confidence: 0.0,
                distribution: ConfidenceDistribution::default(),
                date_range: DateRange::default(),
                importance_tier: ImportanceTier::Coordination,
            };
        }

        let total = self.mentions.len();
        let sum: f64 = self.mentions.iter().map(|m| m.confidence).sum();

        let mut distribution = ConfidenceDistribution::default();
        for m in &self.mentions {
            if m.confidence >= 0.80 {
                distribution.high += 1;
            } else if m.confidence >= 0.50 {
                distribution.medium += 1;
            } else {
                distribution.low += 1;
            }
        }

        let mut first: Option<DateTime<Utc>> = None;
        let mut last: Option<DateTime<Utc>> = None;
        for m in &self.mentions {
            if let Some(date) = m.delivery_date {
                first = Some(first.map_or(date, |f| f.min(date)));
                last = Some(last.map_or(date, |l| l.max(date)));
            }
        }

        ClusterStats {
            total_mentions: total,
            avg_confidence: round2(sum / total as f64),
            distribution,
            date_range: DateRange {
                first: first.map(|d| d.to_rfc3339()),
                last: last.map(|d| d.to_rfc3339()),
            },
            importance_tier: self.dominant_tier(),
        }
    }

    /// Most frequent importance tier. A frequency tie goes to the more
    /// severe tier, never to map iteration order.
    fn dominant_tier(&self) -> ImportanceTier {
        let mut best = ImportanceTier::Coordination;
        let mut best_count = 0;
        for tier in ImportanceTier::ALL {
            let count = self.tier_counts.get(&tier).copied().unwrap_or(0);
            if count > best_count {
                best_count = count;
                best = tier;
            }
        }
        best
    }

    fn to_view(&self) -> ClusterView {
        let stats = self.calculate_stats();

        let mut aliases: Vec<String> = self.aliases.iter().cloned().collect();
        aliases.sort();
        let mut stakeholders: Vec<String> =
            self.stakeholder_emails.iter().cloned().collect();
        stakeholders.sort();

        let messages = self
            .mentions
            .iter()
            .map(|m| MentionView {
                message_id: m.message_id,
                msg_id: format!("{}...", m.msg_id.chars().take(16).collect::<String>()),
                subject: if m.subject.is_empty() {
                    "(no subject)".to_string()
                } else {
                    m.subject.chars().take(80).collect()
                },
                confidence: round2(m.confidence),
                evidence: m.evidence.clone(),
            })
            .collect();

        ClusterView {
            canonical_name: self.canonical_name.clone(),
            aliases,
            total_mentions: stats.total_mentions,
            avg_confidence: stats.avg_confidence,
            confidence_distribution: stats.distribution,
            messages,
            stakeholders,
            date_range: stats.date_range,
            importance_tier: stats.importance_tier,
            meeting_count: self.meeting_count,
        }
    }
}

// ---------------------------------------------------------------------------
// Clusterer
// ---------------------------------------------------------------------------

/// Greedy online clusterer over project mentions.
#[derive(Debug)]
pub struct ProjectClusterer {
    similarity_threshold: f64,
    clusters: Vec<ProjectCluster>,
    processing_time_ms: u64,
}

impl ProjectClusterer {
    pub fn new(similarity_threshold: f64) -> ProjectClusterer {
        ProjectClusterer {
            similarity_threshold,
            clusters: Vec::new(),
            processing_time_ms: 0,
        }
    }

    /// Similarity between two raw project names: normalize both, 0.0 if
    /// either normalizes to empty, Gestalt ratio otherwise.
    pub fn calculate_similarity(&self, a: &str, b: &str) -> f64 {
        let norm_a = normalize_project_name(a);
        let norm_b = normalize_project_name(b);
        if norm_a.is_empty() || norm_b.is_empty() {
            return 0.0;
        }
        similarity_ratio(&norm_a, &norm_b)
    }

    /// Index of the cluster whose canonical name is strictly most similar
    /// to `name`, above the threshold. Aliases are not consulted. Ties keep
    /// the cluster found first in the scan.
    pub fn find_best_cluster(&self, name: &str) -> Option<usize> {
        let mut best: Option<usize> = None;
        let mut best_similarity = self.similarity_threshold;
        for (idx, cluster) in self.clusters.iter().enumerate() {
            let similarity = self.calculate_similarity(name, &cluster.canonical_name);
            if similarity > best_similarity {
                best_similarity = similarity;
                best = Some(idx);
            }
        }
        best
    }

    /// Route one mention: join the best-matching cluster (registering the
    /// raw name as an alias) or start a new one. Empty names are dropped.
    pub fn add_mention(&mut self, project_name: &str, mention: ProjectMention) {
        if project_name.is_empty() {
            return;
        }

        match self.find_best_cluster(project_name) {
            Some(idx) => {
                let cluster = &mut self.clusters[idx];
                cluster.add_alias(project_name);
                log::debug!(
                    "Added alias '{}' to cluster '{}'",
                    project_name,
                    cluster.canonical_name
                );
                cluster.add_mention(mention);
            }
            None => {
                log::debug!("Created new cluster: {}", project_name);
                let mut cluster = ProjectCluster::new(project_name);
                cluster.add_mention(mention);
                self.clusters.push(cluster);
            }
        }
    }

    /// Record a stakeholder email on the cluster matching `project_name`.
    /// Returns false when no cluster matches.
    pub fn attach_stakeholder(&mut self, project_name: &str, email: &str) -> bool {
        match self.find_best_cluster(project_name) {
            Some(idx) => {
                self.clusters[idx].add_stakeholder(email);
                true
            }
            None => false,
        }
    }

    pub fn clusters(&self) -> &[ProjectCluster] {
        &self.clusters
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn set_processing_time_ms(&mut self, elapsed_ms: u64) {
        self.processing_time_ms = elapsed_ms;
    }

    /// Cluster views sorted by total mentions descending, plus run stats.
    pub fn export(&self) -> ProjectsExport {
        let mut projects: Vec<ClusterView> =
            self.clusters.iter().map(|c| c.to_view()).collect();
        projects.sort_by(|a, b| b.total_mentions.cmp(&a.total_mentions));

        let total_aliases_merged = projects.iter().map(|p| p.aliases.len()).sum();
        let avg_mentions_per_project = if projects.is_empty() {
            0.0
        } else {
            let total: usize = projects.iter().map(|p| p.total_mentions).sum();
            round1(total as f64 / projects.len() as f64)
        };

        ProjectsExport {
            stats: ProjectsStats {
                total_projects: projects.len(),
                total_aliases_merged,
                avg_mentions_per_project,
                processing_time_ms: self.processing_time_ms,
            },
            projects,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
