//! Post-aggregation relevance filtering of project clusters.
//!
//! Each exported cluster is rendered into a templated prompt and handed to
//! an external scoring collaborator through the [`RelevanceScorer`] seam.
//! Any failure on that path (transport error, empty response, unparseable
//! output) degrades to a deterministic heuristic built from the cluster's
//! own aggregation stats, so a filter run always produces a score for every
//! cluster. Every evaluation, scored or fallback, is persisted as an audit
//! row keyed by canonical name; re-running the filter overwrites the prior
//! row for that cluster entirely.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clusterer::ClusterView;
use crate::db::{AggregateDb, DbFilterAudit};
use crate::stakeholders::ProfileView;
use crate::types::ImportanceTier;
use crate::util::round2;

/// Version tag recorded on every audit row.
pub const FILTER_VERSION: &str = "task_post_aggregation_filter_v1";

/// Per-cluster scoring request. `{key}` placeholders are substituted before
/// the prompt is sent.
const PROMPT_TEMPLATE: &str = "\
You are evaluating whether a project is relevant to a specific person's role.\n\
\n\
USER ROLE:\n\
{user_role}\n\
\n\
PROJECT:\n\
- Name: {project_name}\n\
- Known aliases: {project_aliases}\n\
- Importance tier: {importance_tier}\n\
- Total mentions: {total_mentions}\n\
- Average extraction confidence: {avg_confidence}\n\
- First seen: {date_range_first}\n\
- Last seen: {date_range_last}\n\
- Meeting-related mentions: {meeting_count}\n\
- Confidence distribution: high={confidence_high}, medium={confidence_medium}, low={confidence_low}\n\
\n\
STAKEHOLDERS:\n\
{stakeholder_list}\n\
\n\
Assess whether this project matters to someone in the user's role. Consider\n\
ownership, decision influence, and whether the mentions look like real work\n\
or incidental chatter.\n\
\n\
Return ONLY a JSON object, no other text:\n\
{\"confidence\": 0.0, \"is_relevant\": false, \"reasoning\": [\"short bullet\"]}\n";

// ---------------------------------------------------------------------------
// Scoring seam
// ---------------------------------------------------------------------------

/// Errors from the external scoring collaborator.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("scoring transport failed: {0}")]
    Transport(String),

    #[error("scoring request timed out after {0} seconds")]
    Timeout(u64),
}

/// Blocking relevance-scoring collaborator, one call per cluster.
///
/// The production implementation lives outside this crate. The filter never
/// propagates a scorer failure; it routes to the fallback heuristic instead.
pub trait RelevanceScorer {
    fn score(&self, prompt: &str) -> Result<String, ScoreError>;
}

/// Scorer with no external collaborator wired. Every call fails, so every
/// cluster takes the deterministic fallback heuristic.
pub struct FallbackOnlyScorer;

impl RelevanceScorer for FallbackOnlyScorer {
    fn score(&self, _prompt: &str) -> Result<String, ScoreError> {
        Err(ScoreError::Transport(
            "no scoring collaborator configured".to_string(),
        ))
    }
}

/// Expected collaborator response shape. Each field has the stand-in used
/// when the key is absent.
#[derive(Debug, Deserialize)]
struct ScorerResponse {
    #[serde(default = "default_response_confidence")]
    confidence: f64,
    #[serde(default)]
    is_relevant: bool,
    #[serde(default = "default_response_reasoning")]
    reasoning: Vec<String>,
}

fn default_response_confidence() -> f64 {
    0.5
}

fn default_response_reasoning() -> Vec<String> {
    vec!["Unable to determine".to_string()]
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One cluster's relevance evaluation, however it was produced.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub confidence: f64,
    pub is_relevant: bool,
    pub reasoning: Vec<String>,
}

/// Per-cluster entry in the exported `filter_results` map.
#[derive(Debug, Clone, Serialize)]
pub struct FilterResult {
    pub included: bool,
    pub confidence: f64,
    pub reasoning: Vec<String>,
}

/// Evaluation counts by confidence band. Boundaries differ from the
/// clusterer's mention bands: high starts at 0.75 here, not 0.80.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterDistribution {
    /// confidence >= 0.75
    pub high: usize,
    /// 0.50 <= confidence < 0.75
    pub medium: usize,
    /// confidence < 0.50
    pub low: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FilterStats {
    pub projects_analyzed: usize,
    pub projects_relevant: usize,
    pub projects_filtered: usize,
    pub avg_confidence: f64,
    pub confidence_distribution: FilterDistribution,
    pub processing_time_ms: u64,
}

/// Everything one filter run produced. Every input cluster lands in exactly
/// one of `included`/`excluded` and has exactly one entry in `results`.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub included: Vec<ClusterView>,
    pub excluded: Vec<ClusterView>,
    pub results: BTreeMap<String, FilterResult>,
    pub stats: FilterStats,
}

/// Full `filtered_projects.json` document.
#[derive(Debug, Clone, Serialize)]
pub struct FilteredExport {
    pub role_description: String,
    pub confidence_threshold: f64,
    pub total_projects: usize,
    pub included_count: usize,
    pub excluded_count: usize,
    pub avg_confidence: f64,
    pub confidence_distribution: FilterDistribution,
    pub projects: Vec<ClusterView>,
    pub filter_results: BTreeMap<String, FilterResult>,
    pub processing_time_ms: u64,
}

impl FilterOutcome {
    /// Export view: the included clusters plus the full per-cluster result
    /// map. Excluded clusters appear only in the counts and the map.
    pub fn to_export(&self, role_description: &str, confidence_threshold: f64) -> FilteredExport {
        FilteredExport {
            role_description: role_description.to_string(),
            confidence_threshold,
            total_projects: self.stats.projects_analyzed,
            included_count: self.stats.projects_relevant,
            excluded_count: self.stats.projects_filtered,
            avg_confidence: self.stats.avg_confidence,
            confidence_distribution: self.stats.confidence_distribution,
            projects: self.included.clone(),
            filter_results: self.results.clone(),
            processing_time_ms: self.stats.processing_time_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Relevance filter over exported clusters.
pub struct PostAggregationFilter<'a> {
    db: &'a AggregateDb,
    scorer: &'a dyn RelevanceScorer,
}

impl<'a> PostAggregationFilter<'a> {
    pub fn new(db: &'a AggregateDb, scorer: &'a dyn RelevanceScorer) -> PostAggregationFilter<'a> {
        PostAggregationFilter { db, scorer }
    }

    /// Score every cluster and partition on `confidence >= threshold`.
    ///
    /// `profiles` supplies display names and roles for the stakeholder
    /// emails referenced by clusters; emails without a surviving profile
    /// are rendered bare. One blocking scorer call per cluster, strictly
    /// sequential. Audit rows are upserted per cluster as evaluations
    /// complete; a failed audit write is logged and skipped, never fatal.
    pub fn filter_projects(
        &self,
        clusters: &[ClusterView],
        profiles: &[ProfileView],
        role_description: &str,
        confidence_threshold: f64,
    ) -> FilterOutcome {
        let start = Instant::now();
        let profile_index: HashMap<&str, &ProfileView> =
            profiles.iter().map(|p| (p.email.as_str(), p)).collect();

        log::info!(
            "Starting post-aggregation filter: role_desc_length={}, threshold={:.2}",
            role_description.len(),
            confidence_threshold
        );

        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut results = BTreeMap::new();
        let mut stats = FilterStats::default();

        for cluster in clusters {
            let evaluation = self.evaluate_cluster(cluster, &profile_index, role_description);
            let include = evaluation.confidence >= confidence_threshold;

            self.persist_audit(
                cluster,
                &evaluation,
                role_description,
                confidence_threshold,
                !include,
            );

            stats.projects_analyzed += 1;
            if evaluation.confidence >= 0.75 {
                stats.confidence_distribution.high += 1;
            } else if evaluation.confidence >= 0.5 {
                stats.confidence_distribution.medium += 1;
            } else {
                stats.confidence_distribution.low += 1;
            }

            log::debug!(
                "Filter decision for '{}': confidence={:.2}, relevant={}, included={}",
                cluster.canonical_name,
                evaluation.confidence,
                evaluation.is_relevant,
                include
            );

            results.insert(
                cluster.canonical_name.clone(),
                FilterResult {
                    included: include,
                    confidence: evaluation.confidence,
                    reasoning: evaluation.reasoning,
                },
            );
            if include {
                stats.projects_relevant += 1;
                included.push(cluster.clone());
            } else {
                stats.projects_filtered += 1;
                excluded.push(cluster.clone());
            }
        }

        if stats.projects_analyzed > 0 {
            let total: f64 = results.values().map(|r| r.confidence).sum();
            stats.avg_confidence = round2(total / stats.projects_analyzed as f64);
        }
        stats.processing_time_ms = start.elapsed().as_millis() as u64;

        log::info!(
            "Filter complete: {} included, {} excluded, avg_confidence={:.2}",
            stats.projects_relevant,
            stats.projects_filtered,
            stats.avg_confidence
        );

        FilterOutcome {
            included,
            excluded,
            results,
            stats,
        }
    }

    /// One cluster's evaluation: scorer first, fallback on any failure.
    fn evaluate_cluster(
        &self,
        cluster: &ClusterView,
        profiles: &HashMap<&str, &ProfileView>,
        role_description: &str,
    ) -> Evaluation {
        let prompt = build_prompt(cluster, profiles, role_description);

        let response = match self.scorer.score(&prompt) {
            Ok(response) => response,
            Err(err) => {
                log::warn!(
                    "Scorer call failed for '{}': {}; using fallback scoring",
                    cluster.canonical_name,
                    err
                );
                return fallback_score(cluster);
            }
        };

        if response.trim().is_empty() {
            log::warn!(
                "Empty scorer response for '{}'; using fallback scoring",
                cluster.canonical_name
            );
            return fallback_score(cluster);
        }

        match parse_scorer_response(&response) {
            Some(evaluation) => evaluation,
            None => {
                log::warn!(
                    "Unparseable scorer response for '{}'; using fallback scoring",
                    cluster.canonical_name
                );
                fallback_score(cluster)
            }
        }
    }

    /// Upsert the audit row for one evaluation inside its own transaction.
    fn persist_audit(
        &self,
        cluster: &ClusterView,
        evaluation: &Evaluation,
        role_description: &str,
        threshold: f64,
        filtered: bool,
    ) {
        let now = Utc::now().to_rfc3339();
        let reasoning =
            serde_json::to_string(&evaluation.reasoning).unwrap_or_else(|_| "[]".to_string());
        let audit = DbFilterAudit {
            canonical_name: cluster.canonical_name.clone(),
            role_description: role_description.to_string(),
            confidence: evaluation.confidence,
            is_relevant: evaluation.is_relevant,
            reasoning,
            filtered,
            threshold,
            filter_version: FILTER_VERSION.to_string(),
            filtered_at: now.clone(),
            updated_at: now,
        };

        let write = self
            .db
            .with_transaction(|db| db.upsert_filter_audit(&audit).map_err(|e| e.to_string()));
        if let Err(err) = write {
            log::error!(
                "Failed to persist filter audit for '{}': {}",
                cluster.canonical_name,
                err
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

fn build_prompt(
    cluster: &ClusterView,
    profiles: &HashMap<&str, &ProfileView>,
    user_role: &str,
) -> String {
    PROMPT_TEMPLATE
        .replace("{user_role}", user_role)
        .replace("{project_name}", &cluster.canonical_name)
        .replace("{project_aliases}", &cluster.aliases.join(", "))
        .replace("{importance_tier}", cluster.importance_tier.as_str())
        .replace("{total_mentions}", &cluster.total_mentions.to_string())
        .replace(
            "{avg_confidence}",
            &format!("{:.2}", cluster.avg_confidence),
        )
        .replace(
            "{date_range_first}",
            cluster.date_range.first.as_deref().unwrap_or("Unknown"),
        )
        .replace(
            "{date_range_last}",
            cluster.date_range.last.as_deref().unwrap_or("Unknown"),
        )
        .replace("{meeting_count}", &cluster.meeting_count.to_string())
        .replace(
            "{confidence_high}",
            &cluster.confidence_distribution.high.to_string(),
        )
        .replace(
            "{confidence_medium}",
            &cluster.confidence_distribution.medium.to_string(),
        )
        .replace(
            "{confidence_low}",
            &cluster.confidence_distribution.low.to_string(),
        )
        .replace(
            "{stakeholder_list}",
            &format_stakeholder_list(&cluster.stakeholders, profiles),
        )
}

/// Render the cluster's stakeholder emails, top 10, one line each. Emails
/// with a surviving profile get name, roles, and mention count; the rest
/// are listed bare.
fn format_stakeholder_list(emails: &[String], profiles: &HashMap<&str, &ProfileView>) -> String {
    if emails.is_empty() {
        return "No stakeholders identified".to_string();
    }

    let mut lines = Vec::new();
    for email in emails.iter().take(10) {
        match profiles.get(email.as_str()) {
            Some(profile) => {
                let roles = profile
                    .inferred_roles
                    .iter()
                    .map(|r| format!("{} ({:.2})", r.role, r.confidence))
                    .collect::<Vec<_>>()
                    .join(", ");
                lines.push(format!(
                    "- {} ({}): {}, {} mentions",
                    profile.name, email, roles, profile.message_count
                ));
            }
            None => lines.push(format!("- {}", email)),
        }
    }
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Deterministic heuristic used whenever the scorer yields nothing usable.
///
/// Baseline is the cluster's own aggregation confidence, boosted +0.2 for
/// CRITICAL or +0.1 for EXECUTION, penalized -0.3 under 2 mentions, clamped
/// to [0,1]. Relevance is confidence >= 0.5.
fn fallback_score(cluster: &ClusterView) -> Evaluation {
    let mut confidence = cluster.avg_confidence;

    match cluster.importance_tier {
        ImportanceTier::Critical => confidence = (confidence + 0.2).min(1.0),
        ImportanceTier::Execution => confidence = (confidence + 0.1).min(1.0),
        _ => {}
    }

    if cluster.total_mentions < 2 {
        confidence = (confidence - 0.3).max(0.0);
    }

    let reasoning = vec![
        "Fallback scoring (LLM unavailable)".to_string(),
        format!("Importance tier: {}", cluster.importance_tier.as_str()),
        format!("Mention count: {}", cluster.total_mentions),
        format!("Aggregation confidence: {:.2}", cluster.avg_confidence),
        format!("Final confidence: {:.2}", confidence),
    ];

    Evaluation {
        confidence,
        is_relevant: confidence >= 0.5,
        reasoning,
    }
}

fn parse_scorer_response(response: &str) -> Option<Evaluation> {
    let json = extract_json_object(response)?;
    let parsed: ScorerResponse = serde_json::from_str(json).ok()?;
    Some(Evaluation {
        confidence: parsed.confidence.clamp(0.0, 1.0),
        is_relevant: parsed.is_relevant,
        reasoning: parsed.reasoning,
    })
}

/// Pull a JSON object out of scorer output that may wrap it in markdown
/// fences or surrounding prose.
fn extract_json_object(text: &str) -> Option<&str> {
    // ```json fence
    if let Some(start) = text.find("```json") {
        let body = start + 7;
        if let Some(end) = text[body..].find("```") {
            return Some(text[body..body + end].trim());
        }
    }

    // Generic ``` fence whose body is an object
    if let Some(start) = text.find("```") {
        let after = start + 3;
        if let Some(nl) = text[after..].find('\n') {
            let body = after + nl + 1;
            if let Some(end) = text[body..].find("```") {
                let candidate = text[body..body + end].trim();
                if candidate.starts_with('{') {
                    return Some(candidate);
                }
            }
        }
    }

    // Bare object
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return Some(trimmed);
    }

    // Object embedded in prose. Braces inside string literals must not move
    // the depth counter.
    let start = text.find('{')?;
    let candidate = &text[start..];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, ch) in candidate.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if ch == '\\' && in_string {
            escape = true;
            continue;
        }
        if ch == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        if ch == '{' {
            depth += 1;
        } else if ch == '}' {
            depth -= 1;
            if depth == 0 {
                return Some(&candidate[..=i]);
            }
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusterer::{ConfidenceDistribution, DateRange};
    use crate::db::test_utils::test_db;
    use crate::stakeholders::RoleView;

    fn cluster(
        name: &str,
        tier: ImportanceTier,
        avg_confidence: f64,
        total_mentions: usize,
    ) -> ClusterView {
        ClusterView {
            canonical_name: name.to_string(),
            aliases: vec![name.to_string()],
            total_mentions,
            avg_confidence,
            confidence_distribution: ConfidenceDistribution::default(),
            messages: Vec::new(),
            stakeholders: Vec::new(),
            date_range: DateRange::default(),
            importance_tier: tier,
            meeting_count: 0,
        }
    }

    fn profile(
        email: &str,
        name: &str,
        role: &str,
        confidence: f64,
        message_count: usize,
    ) -> ProfileView {
        ProfileView {
            email: email.to_string(),
            name: name.to_string(),
            inferred_roles: vec![RoleView {
                role: role.to_string(),
                confidence,
                mention_count: message_count,
            }],
            primary_role: role.to_string(),
            interaction_types: Vec::new(),
            projects: Vec::new(),
            message_count,
            first_appearance: None,
            last_appearance: None,
        }
    }

    struct CannedScorer(String);

    impl RelevanceScorer for CannedScorer {
        fn score(&self, _prompt: &str) -> Result<String, ScoreError> {
            Ok(self.0.clone())
        }
    }

    struct FailingScorer;

    impl RelevanceScorer for FailingScorer {
        fn score(&self, _prompt: &str) -> Result<String, ScoreError> {
            Err(ScoreError::Timeout(30))
        }
    }

    #[test]
    fn test_fallback_critical_boost() {
        let eval = fallback_score(&cluster("Atlas", ImportanceTier::Critical, 0.5, 3));
        assert!((eval.confidence - 0.7).abs() < 1e-9);
        assert!(eval.is_relevant);
    }

    #[test]
    fn test_fallback_execution_boost() {
        let eval = fallback_score(&cluster("Atlas", ImportanceTier::Execution, 0.5, 3));
        assert!((eval.confidence - 0.6).abs() < 1e-9);
        assert!(eval.is_relevant);
    }

    #[test]
    fn test_fallback_low_mention_penalty_floors_at_zero() {
        let eval = fallback_score(&cluster("Atlas", ImportanceTier::Coordination, 0.2, 1));
        assert_eq!(eval.confidence, 0.0);
        assert!(!eval.is_relevant);
    }

    #[test]
    fn test_fallback_clamps_at_one() {
        let eval = fallback_score(&cluster("Atlas", ImportanceTier::Critical, 0.95, 3));
        assert_eq!(eval.confidence, 1.0);
    }

    #[test]
    fn test_fallback_reasoning_records_inputs() {
        let eval = fallback_score(&cluster("Atlas", ImportanceTier::Critical, 0.5, 3));
        assert_eq!(eval.reasoning.len(), 5);
        assert!(eval.reasoning[0].contains("Fallback"));
        assert!(eval.reasoning[1].contains("CRITICAL"));
        assert!(eval.reasoning[2].contains('3'));
    }

    #[test]
    fn test_fallback_threshold_boundary_flips_partition() {
        // CRITICAL at avg 0.5 with 3 mentions scores 0.7 on the fallback
        // path; inclusion flips as the threshold crosses that value.
        let db = test_db();
        let scorer = FallbackOnlyScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Critical, 0.5, 3)];

        let outcome = filter.filter_projects(&clusters, &[], "engineering manager", 0.7);
        assert_eq!(outcome.included.len(), 1);
        assert!(outcome.results["Atlas"].included);

        let outcome = filter.filter_projects(&clusters, &[], "engineering manager", 0.75);
        assert_eq!(outcome.excluded.len(), 1);
        assert!(!outcome.results["Atlas"].included);
    }

    #[test]
    fn test_partition_totality() {
        let db = test_db();
        let scorer = FallbackOnlyScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        // Fallback scores: 1.0, 0.0, 0.65.
        let clusters = vec![
            cluster("Apex", ImportanceTier::Critical, 0.9, 3),
            cluster("Background Noise", ImportanceTier::Noise, 0.2, 1),
            cluster("Conveyor", ImportanceTier::Execution, 0.55, 2),
        ];

        let outcome = filter.filter_projects(&clusters, &[], "ops lead", 0.7);

        assert_eq!(outcome.included.len() + outcome.excluded.len(), 3);
        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.stats.projects_analyzed, 3);
        assert_eq!(outcome.stats.projects_relevant, 1);
        assert_eq!(outcome.stats.projects_filtered, 2);
        assert!(outcome.results["Apex"].included);
        assert!(!outcome.results["Background Noise"].included);
        assert!(!outcome.results["Conveyor"].included);
        assert_eq!(
            outcome.stats.confidence_distribution,
            FilterDistribution {
                high: 1,
                medium: 1,
                low: 1
            }
        );
        assert_eq!(outcome.stats.avg_confidence, 0.55);
    }

    #[test]
    fn test_scorer_success_path() {
        let db = test_db();
        let scorer = CannedScorer(
            "```json\n{\"confidence\": 0.92, \"is_relevant\": true, \"reasoning\": [\"direct ownership\"]}\n```"
                .to_string(),
        );
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Coordination, 0.4, 2)];

        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        assert_eq!(outcome.included.len(), 1);
        let result = &outcome.results["Atlas"];
        assert_eq!(result.confidence, 0.92);
        assert_eq!(result.reasoning, vec!["direct ownership".to_string()]);
    }

    #[test]
    fn test_malformed_response_falls_back() {
        let db = test_db();
        let scorer = CannedScorer("I think this is probably relevant.".to_string());
        let filter = PostAggregationFilter::new(&db, &scorer);
        // Fallback: no boost, no penalty, stays at 0.4.
        let clusters = vec![cluster("Atlas", ImportanceTier::Coordination, 0.4, 2)];

        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        let result = &outcome.results["Atlas"];
        assert!((result.confidence - 0.4).abs() < 1e-9);
        assert!(result.reasoning[0].contains("Fallback"));
    }

    #[test]
    fn test_empty_response_falls_back() {
        let db = test_db();
        let scorer = CannedScorer("  \n".to_string());
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Coordination, 0.4, 2)];

        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        assert!(outcome.results["Atlas"].reasoning[0].contains("Fallback"));
    }

    #[test]
    fn test_scorer_error_falls_back() {
        let db = test_db();
        let scorer = FailingScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Execution, 0.5, 3)];

        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        assert!((outcome.results["Atlas"].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_scorer_confidence_is_clamped() {
        let db = test_db();
        let scorer = CannedScorer(r#"{"confidence": 1.7, "is_relevant": true}"#.to_string());
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Coordination, 0.4, 2)];

        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        assert_eq!(outcome.results["Atlas"].confidence, 1.0);

        let scorer = CannedScorer(r#"{"confidence": -0.4}"#.to_string());
        let filter = PostAggregationFilter::new(&db, &scorer);
        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        assert_eq!(outcome.results["Atlas"].confidence, 0.0);
    }

    #[test]
    fn test_missing_response_fields_use_defaults() {
        let db = test_db();
        let scorer = CannedScorer(r#"{"confidence": 0.8}"#.to_string());
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Coordination, 0.4, 2)];

        // Partition is on confidence, not on is_relevant.
        let outcome = filter.filter_projects(&clusters, &[], "PM", 0.75);
        let result = &outcome.results["Atlas"];
        assert!(result.included);
        assert_eq!(result.reasoning, vec!["Unable to determine".to_string()]);

        let audit = db.get_filter_audit("Atlas").unwrap().unwrap();
        assert!(!audit.is_relevant);
    }

    #[test]
    fn test_audit_row_written_per_cluster() {
        let db = test_db();
        let scorer = FallbackOnlyScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Critical, 0.5, 3)];

        filter.filter_projects(&clusters, &[], "engineering manager", 0.75);

        let audit = db.get_filter_audit("Atlas").unwrap().unwrap();
        assert!((audit.confidence - 0.7).abs() < 1e-9);
        assert!(audit.is_relevant);
        assert!(audit.filtered, "0.7 < 0.75 threshold marks the row filtered");
        assert_eq!(audit.threshold, 0.75);
        assert_eq!(audit.filter_version, FILTER_VERSION);
        assert_eq!(audit.role_description, "engineering manager");

        let reasoning: Vec<String> = serde_json::from_str(&audit.reasoning).unwrap();
        assert_eq!(reasoning.len(), 5);
    }

    #[test]
    fn test_second_run_overwrites_audit() {
        let db = test_db();
        let scorer = FallbackOnlyScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![cluster("Atlas", ImportanceTier::Critical, 0.5, 3)];

        filter.filter_projects(&clusters, &[], "PM", 0.7);
        filter.filter_projects(&clusters, &[], "CFO", 0.9);

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM cluster_filter_audit", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(count, 1);

        let audit = db.get_filter_audit("Atlas").unwrap().unwrap();
        assert_eq!(audit.role_description, "CFO");
        assert_eq!(audit.threshold, 0.9);
        assert!(audit.filtered);
    }

    #[test]
    fn test_prompt_renders_cluster_and_stakeholders() {
        let mut c = cluster("Atlas Migration", ImportanceTier::Critical, 0.85, 4);
        c.stakeholders = vec!["ghost@co.com".to_string(), "jane@co.com".to_string()];
        let profiles = vec![profile("jane@co.com", "Jane Ortiz", "PM", 0.8, 5)];
        let index: HashMap<&str, &ProfileView> =
            profiles.iter().map(|p| (p.email.as_str(), p)).collect();

        let prompt = build_prompt(&c, &index, "platform engineering manager");

        assert!(prompt.contains("platform engineering manager"));
        assert!(prompt.contains("- Name: Atlas Migration"));
        assert!(prompt.contains("- Importance tier: CRITICAL"));
        assert!(prompt.contains("- Jane Ortiz (jane@co.com): PM (0.80), 5 mentions"));
        assert!(prompt.contains("- ghost@co.com"));
        assert!(!prompt.contains("{project_name}"));
        assert!(!prompt.contains("{stakeholder_list}"));
    }

    #[test]
    fn test_prompt_empty_stakeholders_placeholder() {
        let c = cluster("Atlas", ImportanceTier::Fyi, 0.3, 1);
        let prompt = build_prompt(&c, &HashMap::new(), "PM");
        assert!(prompt.contains("No stakeholders identified"));
    }

    #[test]
    fn test_extract_json_from_fenced_response() {
        let text = "Here you go:\n```json\n{\"confidence\": 0.9}\n```\nDone.";
        assert_eq!(extract_json_object(text), Some("{\"confidence\": 0.9}"));
    }

    #[test]
    fn test_extract_json_from_generic_fence() {
        let text = "```\n{\"confidence\": 0.9}\n```";
        assert_eq!(extract_json_object(text), Some("{\"confidence\": 0.9}"));
    }

    #[test]
    fn test_extract_json_bare_object() {
        let text = "  {\"confidence\": 0.9}  ";
        assert_eq!(extract_json_object(text), Some("{\"confidence\": 0.9}"));
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let text = "Verdict: {\"note\": \"braces {inside} a string\", \"ok\": true} end";
        assert_eq!(
            extract_json_object(text),
            Some("{\"note\": \"braces {inside} a string\", \"ok\": true}")
        );
    }

    #[test]
    fn test_extract_json_none_when_absent() {
        assert_eq!(extract_json_object("no json here"), None);
    }

    #[test]
    fn test_export_shape() {
        let db = test_db();
        let scorer = FallbackOnlyScorer;
        let filter = PostAggregationFilter::new(&db, &scorer);
        let clusters = vec![
            cluster("Apex", ImportanceTier::Critical, 0.9, 3),
            cluster("Background Noise", ImportanceTier::Noise, 0.2, 1),
        ];

        let outcome = filter.filter_projects(&clusters, &[], "ops lead", 0.7);
        let export = outcome.to_export("ops lead", 0.7);

        assert_eq!(export.role_description, "ops lead");
        assert_eq!(export.confidence_threshold, 0.7);
        assert_eq!(export.total_projects, 2);
        assert_eq!(export.included_count, 1);
        assert_eq!(export.excluded_count, 1);
        assert_eq!(export.projects.len(), 1);
        assert_eq!(export.projects[0].canonical_name, "Apex");
        assert_eq!(export.filter_results.len(), 2);
    }
}
