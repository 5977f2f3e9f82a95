//! Batch orchestration: load enriched messages, feed the clusterer and the
//! stakeholder aggregator, write the JSON outputs, and optionally run the
//! post-aggregation relevance filter.
//!
//! Single-threaded and synchronous by design; one invocation processes the
//! full completed-message snapshot and exits. The only hard failures are an
//! empty input set and filtering with no clusters; everything else degrades
//! to skipped records and an error counter.

use std::fs;
use std::path::Path;
use std::time::Instant;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;

use crate::clusterer::{ProjectClusterer, ProjectMention};
use crate::config::AggregationConfig;
use crate::db::{AggregateDb, DbExtraction, EnrichedMessage};
use crate::error::PipelineError;
use crate::filter::{PostAggregationFilter, RelevanceScorer};
use crate::stakeholders::StakeholderAggregator;
use crate::types::{
    ImportancePayload, MeetingsPayload, ProjectsPayload, StakeholdersPayload,
};

const TASK_PROJECTS: &str = "task_a_projects";
const TASK_STAKEHOLDERS: &str = "task_b_stakeholders";
const TASK_IMPORTANCE: &str = "task_c_importance";
const TASK_MEETINGS: &str = "task_d_meetings";

/// How many raw stakeholder extractions get logged per run.
const STAKEHOLDER_LOG_LIMIT: usize = 50;

/// Counters for one aggregation run.
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub messages_processed: usize,
    pub projects_found: usize,
    pub stakeholders_found: usize,
    pub errors: usize,
    pub processing_time_ms: u64,
}

/// Main orchestrator for the aggregation batch.
pub struct AggregationEngine {
    config: AggregationConfig,
    clusterer: ProjectClusterer,
    aggregator: StakeholderAggregator,
    stats: RunStats,
    stakeholder_log_count: usize,
}

impl AggregationEngine {
    pub fn new(config: AggregationConfig) -> AggregationEngine {
        let clusterer = ProjectClusterer::new(config.clustering.similarity_threshold);
        let aggregator = StakeholderAggregator::new(config.stakeholder_filtering.clone());
        AggregationEngine {
            config,
            clusterer,
            aggregator,
            stats: RunStats::default(),
            stakeholder_log_count: 0,
        }
    }

    /// Run the full batch: every completed message, in delivery order.
    ///
    /// Zero completed messages is the one hard input failure; a store with
    /// rows that all fail to parse still "succeeds" with a high error count.
    pub fn run(&mut self, db: &AggregateDb) -> Result<RunStats, PipelineError> {
        let start = Instant::now();
        log::info!("Starting aggregation pipeline");

        if db.count_completed_messages()? == 0 {
            return Err(PipelineError::NoInput);
        }

        let messages = db.get_enriched_messages()?;
        log::info!("Loaded {} enriched messages for aggregation", messages.len());

        for message in &messages {
            self.process_message(message);
        }

        let elapsed_ms = start.elapsed().as_millis() as u64;
        self.stats.processing_time_ms = elapsed_ms;
        self.clusterer.set_processing_time_ms(elapsed_ms);
        self.aggregator.set_processing_time_ms(elapsed_ms);

        self.stats.projects_found = self.clusterer.cluster_count();
        self.log_stakeholder_summary();

        log::info!(
            "Aggregation complete: messages={}, projects={}, stakeholders={}, errors={}, time={}ms",
            self.stats.messages_processed,
            self.clusterer.cluster_count(),
            self.aggregator.profile_count(),
            self.stats.errors,
            elapsed_ms
        );

        Ok(self.stats.clone())
    }

    /// Feed one message's four extraction payloads into the components.
    ///
    /// task_a and task_b are the load-bearing payloads; a message missing
    /// either is skipped as one error. task_c and task_d degrade to their
    /// defaults (COORDINATION, not a meeting).
    fn process_message(&mut self, message: &EnrichedMessage) {
        let task_a: Option<ProjectsPayload> =
            self.parse_extraction(message.extractions.get(TASK_PROJECTS));
        let task_b: Option<StakeholdersPayload> =
            self.parse_extraction(message.extractions.get(TASK_STAKEHOLDERS));
        let task_c: Option<ImportancePayload> =
            self.parse_extraction(message.extractions.get(TASK_IMPORTANCE));
        let task_d: Option<MeetingsPayload> =
            self.parse_extraction(message.extractions.get(TASK_MEETINGS));

        let (Some(projects), Some(stakeholders)) = (task_a, task_b) else {
            self.stats.errors += 1;
            return;
        };

        let importance_tier = task_c.map(|c| c.tier()).unwrap_or_default();
        let is_meeting = task_d.map(|d| d.is_meeting_related).unwrap_or(false);
        let primary_project = projects.most_likely_project.as_deref();
        let delivery_date = parse_delivery_date(message.message.delivery_date.as_deref());

        for extraction in &projects.extractions {
            self.clusterer.add_mention(
                &extraction.extraction,
                ProjectMention {
                    message_id: message.message.id,
                    msg_id: message.message.msg_id.clone(),
                    subject: message.message.subject.clone(),
                    delivery_date,
                    confidence: extraction.confidence,
                    evidence: extraction.reasoning.clone(),
                    importance_tier,
                    is_meeting,
                },
            );
        }

        for extraction in &stakeholders.extractions {
            if extraction.email.is_empty() {
                continue;
            }

            // Raw extractions, pre-aggregation. Helps diagnose hallucinated
            // names vs. real recipient addresses.
            if self.stakeholder_log_count < STAKEHOLDER_LOG_LIMIT {
                if self.stakeholder_log_count == 0 {
                    log::debug!("=== Stakeholder extractions (raw) ===");
                }
                let evidence = if extraction.evidence.is_empty() {
                    "No evidence".to_string()
                } else {
                    extraction
                        .evidence
                        .iter()
                        .take(2)
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(" | ")
                };
                let snippet: String = evidence.chars().take(60).collect();
                log::debug!(
                    "  {:20} | {:35} | {:20} | conf={:.2} | {:15} | {}",
                    extraction.stakeholder,
                    extraction.email,
                    extraction.inferred_role,
                    extraction.role_confidence,
                    extraction.interaction_type,
                    snippet
                );
                self.stakeholder_log_count += 1;
            }

            self.aggregator.add_mention(
                &extraction.email,
                &extraction.stakeholder,
                &extraction.inferred_role,
                extraction.role_confidence,
                &extraction.interaction_type,
                delivery_date,
                primary_project,
            );

            if let Some(project) = primary_project {
                self.clusterer.attach_stakeholder(project, &extraction.email);
            }
        }

        self.stats.messages_processed += 1;
    }

    /// Parse one extraction payload. A missing row or the upstream 'error'
    /// confidence sentinel is an expected gap and parses to None silently;
    /// missing or malformed JSON on a live row counts as an error.
    fn parse_extraction<T: DeserializeOwned>(
        &mut self,
        extraction: Option<&DbExtraction>,
    ) -> Option<T> {
        let extraction = extraction?;

        if extraction.confidence.as_deref() == Some("error") {
            return None;
        }

        let Some(json) = extraction.extraction_json.as_deref() else {
            log::warn!(
                "Missing extraction JSON for message_id={}, task={}",
                extraction.message_id,
                extraction.task_name
            );
            self.stats.errors += 1;
            return None;
        };

        match serde_json::from_str(json) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!(
                    "Malformed JSON for message_id={}, task={}: {}",
                    extraction.message_id,
                    extraction.task_name,
                    err
                );
                self.stats.errors += 1;
                None
            }
        }
    }

    /// Role-confidence distribution and the top profiles by message count.
    fn log_stakeholder_summary(&mut self) {
        let export = self.aggregator.export();
        self.stats.stakeholders_found = export.stakeholders.len();
        if export.stakeholders.is_empty() {
            return;
        }

        let mut high = 0usize;
        let mut medium = 0usize;
        let mut low = 0usize;
        for profile in &export.stakeholders {
            for role in &profile.inferred_roles {
                if role.confidence >= 0.80 {
                    high += 1;
                } else if role.confidence >= 0.50 {
                    medium += 1;
                } else {
                    low += 1;
                }
            }
        }
        log::info!(
            "Stakeholder confidence distribution: High(>=0.80)={}, Medium(0.50-0.80)={}, Low(<0.50)={}",
            high,
            medium,
            low
        );

        log::info!("Top stakeholders by message count:");
        for (i, profile) in export.stakeholders.iter().take(10).enumerate() {
            log::info!(
                "  {}. {:20} ({:35}) | {:20} | msgs={}",
                i + 1,
                profile.name,
                profile.email,
                profile.primary_role,
                profile.message_count
            );
        }
    }

    /// Write `aggregated_projects.json` and `aggregated_stakeholders.json`
    /// into `dir`, creating it if needed.
    pub fn write_outputs(&mut self, dir: &Path) -> Result<(), PipelineError> {
        fs::create_dir_all(dir)?;

        let projects = self.clusterer.export();
        let path = dir.join("aggregated_projects.json");
        fs::write(&path, serde_json::to_string_pretty(&projects)?)?;
        log::info!("Wrote {}", path.display());

        let stakeholders = self.aggregator.export();
        let path = dir.join("aggregated_stakeholders.json");
        fs::write(&path, serde_json::to_string_pretty(&stakeholders)?)?;
        log::info!("Wrote {}", path.display());

        let stats = &stakeholders.stats;
        if stats.filtered_out > 0 {
            let pct = 100.0 * stats.filtered_out as f64 / stats.total_before_filtering as f64;
            log::info!(
                "Stakeholder filtering: {} removed ({:.1}% of {} total), {} remaining",
                stats.filtered_out,
                pct,
                stats.total_before_filtering,
                stakeholders.stakeholders.len()
            );
        }

        Ok(())
    }

    /// Run the post-aggregation relevance filter over the current clusters
    /// and write `filtered_projects.json` into `dir`.
    pub fn run_filter(
        &mut self,
        db: &AggregateDb,
        scorer: &dyn RelevanceScorer,
        dir: &Path,
    ) -> Result<(), PipelineError> {
        let projects = self.clusterer.export();
        if projects.projects.is_empty() {
            return Err(PipelineError::NoClusters);
        }
        let stakeholders = self.aggregator.export();

        let role = self.config.post_filter.user_role.clone();
        let threshold = self.config.post_filter.confidence_threshold;

        let filter = PostAggregationFilter::new(db, scorer);
        let outcome = filter.filter_projects(
            &projects.projects,
            &stakeholders.stakeholders,
            &role,
            threshold,
        );

        fs::create_dir_all(dir)?;
        let export = outcome.to_export(&role, threshold);
        let path = dir.join("filtered_projects.json");
        fs::write(&path, serde_json::to_string_pretty(&export)?)?;
        log::info!("Wrote {}", path.display());

        Ok(())
    }

    pub fn post_filter_enabled(&self) -> bool {
        self.config.post_filter.enabled
    }
}

/// Upstream timestamps are RFC 3339 when a zone is known and naive ISO 8601
/// otherwise; naive values are read as UTC.
fn parse_delivery_date(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
