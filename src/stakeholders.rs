//! Stakeholder profile aggregation keyed by email, with optional
//! cross-identity name deduplication and export-time quality filtering.
//!
//! Email is the canonical identity; it arrives already lower-cased and
//! trimmed. The name-dedup pass exists for the case that identity fails:
//! the same person split across look-alike addresses ("jane@co.com" and
//! "jane.smith@co.com" both displaying as Jane Smith).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::StakeholderFilterConfig;
use crate::util::{round1, round2};

/// Display names that upstream models hallucinate when no real person is
/// in evidence. Compared case-insensitively against the full name.
const GENERIC_NAMES: [&str; 14] = [
    "john doe",
    "jane smith",
    "jane doe",
    "john smith",
    "michael chen",
    "emily davis",
    "alice brown",
    "bob johnson",
    "david lee",
    "sarah johnson",
    "michael johnson",
    "alice johnson",
    "corporate stakeholders",
    "stakeholder",
];

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One inferred role with its accumulated evidence.
#[derive(Debug, Clone)]
pub struct RoleInference {
    pub role: String,
    pub confidence: f64,
    pub mention_count: usize,
}

/// Accumulated record of all mentions for one email address.
#[derive(Debug, Clone)]
pub struct StakeholderProfile {
    pub email: String,
    pub name: String,
    roles: Vec<RoleInference>,
    interaction_types: HashSet<String>,
    projects: HashSet<String>,
    message_count: usize,
    first_appearance: Option<DateTime<Utc>>,
    last_appearance: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoleView {
    pub role: String,
    pub confidence: f64,
    pub mention_count: usize,
}

/// Exported profile record for `aggregated_stakeholders.json`.
#[derive(Debug, Clone, Serialize)]
pub struct ProfileView {
    pub email: String,
    pub name: String,
    pub inferred_roles: Vec<RoleView>,
    pub primary_role: String,
    pub interaction_types: Vec<String>,
    pub projects: Vec<String>,
    pub message_count: usize,
    pub first_appearance: Option<String>,
    pub last_appearance: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StakeholdersStats {
    pub total_stakeholders: usize,
    pub total_before_filtering: usize,
    pub filtered_out: usize,
    pub avg_projects_per_person: f64,
    pub processing_time_ms: u64,
}

/// Full `aggregated_stakeholders.json` document.
#[derive(Debug, Clone, Serialize)]
pub struct StakeholdersExport {
    pub stakeholders: Vec<ProfileView>,
    pub stats: StakeholdersStats,
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

impl StakeholderProfile {
    fn new(email: &str, name: &str) -> StakeholderProfile {
        StakeholderProfile {
            email: email.to_string(),
            name: name.to_string(),
            roles: Vec::new(),
            interaction_types: HashSet::new(),
            projects: HashSet::new(),
            message_count: 0,
            first_appearance: None,
            last_appearance: None,
        }
    }

    pub fn roles(&self) -> &[RoleInference] {
        &self.roles
    }

    pub fn message_count(&self) -> usize {
        self.message_count
    }

    fn widen_window(&mut self, date: DateTime<Utc>) {
        if self.first_appearance.map_or(true, |f| date < f) {
            self.first_appearance = Some(date);
        }
        if self.last_appearance.map_or(true, |l| date > l) {
            self.last_appearance = Some(date);
        }
    }

    fn to_view(&self) -> ProfileView {
        let inferred_roles: Vec<RoleView> = self
            .roles
            .iter()
            .map(|r| RoleView {
                role: r.role.clone(),
                confidence: round2(r.confidence),
                mention_count: r.mention_count,
            })
            .collect();
        let primary_role = inferred_roles
            .first()
            .map(|r| r.role.clone())
            .unwrap_or_else(|| "Unknown".to_string());

        let mut interaction_types: Vec<String> =
            self.interaction_types.iter().cloned().collect();
        interaction_types.sort();
        let mut projects: Vec<String> = self.projects.iter().cloned().collect();
        projects.sort();

        ProfileView {
            email: self.email.clone(),
            name: self.name.clone(),
            inferred_roles,
            primary_role,
            interaction_types,
            projects,
            message_count: self.message_count,
            first_appearance: self.first_appearance.map(|d| d.to_rfc3339()),
            last_appearance: self.last_appearance.map(|d| d.to_rfc3339()),
        }
    }
}

// ---------------------------------------------------------------------------
// Name similarity
// ---------------------------------------------------------------------------

/// Tiered display-name similarity in [0,1].
///
/// 1.0 for a case/whitespace-insensitive exact match; 0.90 when the token
/// sets overlap in all but at most one token of the shorter name ("Jane
/// Smith" vs "J. Smith"); 0.75 when one full name contains the other
/// ("Ann" vs "Joann"); otherwise Jaro-Winkler over the lowered strings.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let n1 = a.to_lowercase();
    let n2 = b.to_lowercase();
    let parts1: Vec<&str> = n1.split_whitespace().collect();
    let parts2: Vec<&str> = n2.split_whitespace().collect();

    if parts1.join(" ") == parts2.join(" ") {
        return 1.0;
    }

    let set1: HashSet<&str> = parts1.iter().copied().collect();
    let set2: HashSet<&str> = parts2.iter().copied().collect();
    let common = set1.intersection(&set2).count();
    let min_len = parts1.len().min(parts2.len());
    if common > 0 && common + 1 >= min_len {
        return 0.90;
    }

    let t1 = n1.trim();
    let t2 = n2.trim();
    if t1.contains(t2) || t2.contains(t1) {
        return 0.75;
    }

    strsim::jaro_winkler(t1, t2)
}

fn is_generic_name(name: &str) -> bool {
    GENERIC_NAMES.contains(&name.to_lowercase().as_str())
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Deduplicates stakeholders by email and accumulates their signals.
#[derive(Debug)]
pub struct StakeholderAggregator {
    profiles: HashMap<String, StakeholderProfile>,
    config: StakeholderFilterConfig,
    processing_time_ms: u64,
}

impl StakeholderAggregator {
    pub fn new(config: StakeholderFilterConfig) -> StakeholderAggregator {
        StakeholderAggregator {
            profiles: HashMap::new(),
            config,
            processing_time_ms: 0,
        }
    }

    /// Record one stakeholder mention. Empty emails are dropped. The
    /// display name is updated on every call; the last value seen wins.
    pub fn add_mention(
        &mut self,
        email: &str,
        name: &str,
        inferred_role: &str,
        role_confidence: f64,
        interaction_type: &str,
        delivery_date: Option<DateTime<Utc>>,
        project_name: Option<&str>,
    ) {
        if email.is_empty() {
            return;
        }

        let profile = self
            .profiles
            .entry(email.to_string())
            .or_insert_with(|| StakeholderProfile::new(email, name));
        profile.name = name.to_string();

        merge_roles(&mut profile.roles, inferred_role, role_confidence);
        rank_roles(&mut profile.roles);

        if let Some(date) = delivery_date {
            profile.widen_window(date);
        }
        if !interaction_type.is_empty() {
            profile.interaction_types.insert(interaction_type.to_string());
        }
        if let Some(project) = project_name {
            if !project.is_empty() {
                profile.projects.insert(project.to_string());
            }
        }
        profile.message_count += 1;
    }

    pub fn profile(&self, email: &str) -> Option<&StakeholderProfile> {
        self.profiles.get(email)
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn set_processing_time_ms(&mut self, elapsed_ms: u64) {
        self.processing_time_ms = elapsed_ms;
    }

    /// Pair-scan all profiles for same-person display names. Returns a map
    /// of duplicate email → canonical email. The scan walks profiles in
    /// email order so the result never depends on map iteration order; the
    /// higher-message-count profile of a pair is canonical, and an equal
    /// count goes to the email that sorts first.
    fn deduplicate_by_name(&self) -> HashMap<String, String> {
        let threshold = self.config.name_similarity_threshold;
        let mut merge_map: HashMap<String, String> = HashMap::new();

        let mut emails: Vec<&String> = self.profiles.keys().collect();
        emails.sort();

        for i in 0..emails.len() {
            for j in (i + 1)..emails.len() {
                let p1 = &self.profiles[emails[i]];
                let p2 = &self.profiles[emails[j]];
                let similarity = name_similarity(&p1.name, &p2.name);
                if similarity < threshold {
                    continue;
                }

                let (canonical, duplicate) = if p1.message_count >= p2.message_count {
                    (&p1.email, &p2.email)
                } else {
                    (&p2.email, &p1.email)
                };
                log::info!(
                    "Deduplicate: '{}' ({}) + '{}' ({}) => {} (similarity={:.2})",
                    p1.name,
                    p1.email,
                    p2.name,
                    p2.email,
                    canonical,
                    similarity
                );
                merge_map.insert(duplicate.clone(), canonical.clone());
            }
        }

        merge_map
    }

    /// Destructively merge each duplicate profile into its canonical one.
    fn apply_deduplication(&mut self, merge_map: HashMap<String, String>) {
        let mut pairs: Vec<(String, String)> = merge_map.into_iter().collect();
        pairs.sort();

        for (dup_email, canonical_email) in pairs {
            let Some(dup_profile) = self.profiles.remove(&dup_email) else {
                continue;
            };

            match self.profiles.get_mut(&canonical_email) {
                Some(canonical) => merge_profile_into(canonical, dup_profile),
                None => {
                    // Canonical was itself merged away earlier; re-home the
                    // duplicate under the canonical address.
                    let mut renamed = dup_profile;
                    renamed.email = canonical_email.clone();
                    self.profiles.insert(canonical_email, renamed);
                }
            }
        }
    }

    /// Export all profiles, running the optional dedup pass first and the
    /// optional quality filters after, in that order, so a split identity
    /// is not discarded for low per-address mention count.
    pub fn export(&mut self) -> StakeholdersExport {
        if self.config.enable_name_deduplication {
            let merge_map = self.deduplicate_by_name();
            self.apply_deduplication(merge_map);
        }

        let mut views: Vec<ProfileView> = Vec::new();
        let mut filtered_out = 0usize;

        let mut emails: Vec<&String> = self.profiles.keys().collect();
        emails.sort();

        for email in emails {
            let view = self.profiles[email].to_view();

            if self.config.enable_filtering {
                if !view.inferred_roles.is_empty() {
                    let avg: f64 = view
                        .inferred_roles
                        .iter()
                        .map(|r| r.confidence)
                        .sum::<f64>()
                        / view.inferred_roles.len() as f64;
                    if avg < self.config.min_role_confidence {
                        filtered_out += 1;
                        continue;
                    }
                }

                if view.message_count < self.config.min_mention_count {
                    filtered_out += 1;
                    continue;
                }

                if self.config.exclude_generic_names && is_generic_name(&view.name) {
                    log::info!("Filtering generic name: {} ({})", view.name, view.email);
                    filtered_out += 1;
                    continue;
                }
            }

            views.push(view);
        }

        views.sort_by(|a, b| {
            b.message_count
                .cmp(&a.message_count)
                .then_with(|| a.email.cmp(&b.email))
        });

        let avg_projects_per_person = if views.is_empty() {
            0.0
        } else {
            let total: usize = views.iter().map(|v| v.projects.len()).sum();
            round1(total as f64 / views.len() as f64)
        };

        log::info!(
            "Stakeholder filtering complete: {} filtered out, {} remaining",
            filtered_out,
            views.len()
        );

        StakeholdersExport {
            stats: StakeholdersStats {
                total_stakeholders: views.len(),
                total_before_filtering: views.len() + filtered_out,
                filtered_out,
                avg_projects_per_person,
                processing_time_ms: self.processing_time_ms,
            },
            stakeholders: views,
        }
    }
}

/// Fold one role observation into the list. An existing entry with the
/// same label gets mention_count += 1 and confidence replaced by the plain
/// pairwise average (old+new)/2, not a count-weighted mean, so old
/// evidence decays geometrically. Empty labels are ignored.
fn merge_roles(roles: &mut Vec<RoleInference>, new_role: &str, confidence: f64) {
    if new_role.is_empty() {
        return;
    }
    for entry in roles.iter_mut() {
        if entry.role == new_role {
            entry.mention_count += 1;
            entry.confidence = (entry.confidence + confidence) / 2.0;
            return;
        }
    }
    roles.push(RoleInference {
        role: new_role.to_string(),
        confidence,
        mention_count: 1,
    });
}

/// Rank by total accumulated signal, confidence × mention_count. Index 0
/// is the primary role.
fn rank_roles(roles: &mut [RoleInference]) {
    roles.sort_by(|a, b| {
        let score_a = a.confidence * a.mention_count as f64;
        let score_b = b.confidence * b.mention_count as f64;
        score_b
            .partial_cmp(&score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Union a duplicate profile into the canonical one: counts are summed,
/// sets unioned, the appearance window widened, and roles merged by label
/// with mention counts summed and the max confidence kept. Role ranking is
/// not recomputed here; only per-mention updates re-rank.
fn merge_profile_into(canonical: &mut StakeholderProfile, dup: StakeholderProfile) {
    canonical.message_count += dup.message_count;
    canonical.interaction_types.extend(dup.interaction_types);
    canonical.projects.extend(dup.projects);

    for role in dup.roles {
        match canonical.roles.iter_mut().find(|r| r.role == role.role) {
            Some(existing) => {
                existing.mention_count += role.mention_count;
                existing.confidence = existing.confidence.max(role.confidence);
            }
            None => canonical.roles.push(role),
        }
    }

    if let Some(first) = dup.first_appearance {
        if canonical.first_appearance.map_or(true, |f| first < f) {
            canonical.first_appearance = Some(first);
        }
    }
    if let Some(last) = dup.last_appearance {
        if canonical.last_appearance.map_or(true, |l| last > l) {
            canonical.last_appearance = Some(last);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn aggregator() -> StakeholderAggregator {
        StakeholderAggregator::new(StakeholderFilterConfig::default())
    }

    fn add_simple(agg: &mut StakeholderAggregator, email: &str, name: &str, role: &str, conf: f64) {
        agg.add_mention(email, name, role, conf, "stakeholder", None, None);
    }

    #[test]
    fn test_repeat_role_uses_pairwise_average() {
        // The merge contract is (old+new)/2 on every repeat, not a
        // count-weighted running mean: 0.6 then 0.8 must land on exactly
        // 0.7, and a third mention at 0.9 on (0.7+0.9)/2 = 0.8.
        let mut agg = aggregator();
        add_simple(&mut agg, "jane@co.com", "Jane", "PM", 0.6);
        add_simple(&mut agg, "jane@co.com", "Jane", "PM", 0.8);

        let roles = agg.profile("jane@co.com").unwrap().roles();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].mention_count, 2);
        assert!((roles[0].confidence - 0.7).abs() < 1e-9);

        add_simple(&mut agg, "jane@co.com", "Jane", "PM", 0.9);
        let roles = agg.profile("jane@co.com").unwrap().roles();
        assert!((roles[0].confidence - 0.8).abs() < 1e-9);
        assert_eq!(roles[0].mention_count, 3);
    }

    #[test]
    fn test_no_duplicate_role_labels() {
        let mut agg = aggregator();
        add_simple(&mut agg, "a@co.com", "A", "Engineer", 0.5);
        add_simple(&mut agg, "a@co.com", "A", "PM", 0.6);
        add_simple(&mut agg, "a@co.com", "A", "Engineer", 0.7);

        let roles = agg.profile("a@co.com").unwrap().roles();
        let labels: HashSet<&str> = roles.iter().map(|r| r.role.as_str()).collect();
        assert_eq!(labels.len(), roles.len());
    }

    #[test]
    fn test_message_count_equals_calls() {
        let mut agg = aggregator();
        for _ in 0..5 {
            add_simple(&mut agg, "a@co.com", "A", "PM", 0.6);
        }
        assert_eq!(agg.profile("a@co.com").unwrap().message_count(), 5);
    }

    #[test]
    fn test_primary_role_is_highest_total_signal() {
        // "Engineer" at 0.4 × 3 mentions (1.2) outranks "PM" at 0.9 × 1.
        let mut agg = aggregator();
        add_simple(&mut agg, "a@co.com", "A", "PM", 0.9);
        add_simple(&mut agg, "a@co.com", "A", "Engineer", 0.4);
        add_simple(&mut agg, "a@co.com", "A", "Engineer", 0.4);
        add_simple(&mut agg, "a@co.com", "A", "Engineer", 0.4);

        let roles = agg.profile("a@co.com").unwrap().roles();
        assert_eq!(roles[0].role, "Engineer");
    }

    #[test]
    fn test_display_name_last_value_wins() {
        let mut agg = aggregator();
        add_simple(&mut agg, "a@co.com", "J. Smith", "PM", 0.6);
        add_simple(&mut agg, "a@co.com", "Jane Smith", "PM", 0.6);
        assert_eq!(agg.profile("a@co.com").unwrap().name, "Jane Smith");
    }

    #[test]
    fn test_empty_email_dropped() {
        let mut agg = aggregator();
        add_simple(&mut agg, "", "Ghost", "PM", 0.9);
        assert_eq!(agg.profile_count(), 0);
    }

    #[test]
    fn test_appearance_window_widens() {
        let early = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let mut agg = aggregator();
        agg.add_mention("a@co.com", "A", "PM", 0.6, "initiator", Some(late), None);
        agg.add_mention("a@co.com", "A", "PM", 0.6, "responder", Some(early), None);
        agg.add_mention("a@co.com", "A", "PM", 0.6, "", None, Some("Atlas"));

        let export = agg.export();
        let view = &export.stakeholders[0];
        assert_eq!(view.first_appearance, Some(early.to_rfc3339()));
        assert_eq!(view.last_appearance, Some(late.to_rfc3339()));
        // Empty interaction types are skipped; sets are sorted.
        assert_eq!(view.interaction_types, vec!["initiator", "responder"]);
        assert_eq!(view.projects, vec!["Atlas"]);
    }

    #[test]
    fn test_name_similarity_exact_ignores_case_and_whitespace() {
        assert_eq!(name_similarity("Jane Smith", "jane smith"), 1.0);
        assert_eq!(name_similarity("Jane  Smith ", "jane smith"), 1.0);
    }

    #[test]
    fn test_name_similarity_token_overlap() {
        assert_eq!(name_similarity("Jane Smith", "J. Smith"), 0.90);
        assert_eq!(name_similarity("Jane", "Jane Smith"), 0.90);
    }

    #[test]
    fn test_name_similarity_substring() {
        assert_eq!(name_similarity("Ann", "Joann"), 0.75);
    }

    #[test]
    fn test_name_similarity_unrelated_names_score_low() {
        assert!(name_similarity("Alice Wong", "Bob Tran") < 0.5);
    }

    fn dedup_config() -> StakeholderFilterConfig {
        StakeholderFilterConfig {
            enable_name_deduplication: true,
            ..StakeholderFilterConfig::default()
        }
    }

    #[test]
    fn test_dedup_merges_into_higher_count_profile() {
        let mut agg = StakeholderAggregator::new(dedup_config());
        for _ in 0..5 {
            add_simple(&mut agg, "jane.smith@co.com", "Jane Smith", "PM", 0.8);
        }
        for _ in 0..2 {
            add_simple(&mut agg, "j.smith@co.com", "J. Smith", "Engineer", 0.6);
        }

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        let survivor = &export.stakeholders[0];
        // The 5-message profile's email survives with the pooled count.
        assert_eq!(survivor.email, "jane.smith@co.com");
        assert_eq!(survivor.message_count, 7);
        // Roles from both sides are present, merged by label.
        let labels: Vec<&str> = survivor
            .inferred_roles
            .iter()
            .map(|r| r.role.as_str())
            .collect();
        assert!(labels.contains(&"PM"));
        assert!(labels.contains(&"Engineer"));
    }

    #[test]
    fn test_dedup_tie_survivor_is_lexicographically_first_email() {
        let mut agg = StakeholderAggregator::new(dedup_config());
        add_simple(&mut agg, "b@co.com", "Sam Lee", "PM", 0.8);
        add_simple(&mut agg, "a@co.com", "Sam Lee", "PM", 0.8);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].email, "a@co.com");
        assert_eq!(export.stakeholders[0].message_count, 2);
    }

    #[test]
    fn test_dedup_merge_sums_counts_and_takes_max_confidence() {
        let mut agg = StakeholderAggregator::new(dedup_config());
        add_simple(&mut agg, "a@co.com", "Kim Park", "PM", 0.9);
        add_simple(&mut agg, "a@co.com", "Kim Park", "PM", 0.9);
        add_simple(&mut agg, "b@co.com", "Kim Park", "PM", 0.4);

        let export = agg.export();
        let survivor = &export.stakeholders[0];
        assert_eq!(survivor.inferred_roles.len(), 1);
        assert_eq!(survivor.inferred_roles[0].mention_count, 3);
        // Dedup-merge keeps the max, not an average.
        assert_eq!(survivor.inferred_roles[0].confidence, 0.9);
    }

    #[test]
    fn test_dedup_runs_before_mention_count_filter() {
        // One person split across two addresses, one message each. With
        // min_mention_count = 2 the merged profile must survive; filtering
        // before dedup would wrongly discard both halves.
        let config = StakeholderFilterConfig {
            enable_name_deduplication: true,
            enable_filtering: true,
            min_role_confidence: 0.0,
            min_mention_count: 2,
            ..StakeholderFilterConfig::default()
        };
        let mut agg = StakeholderAggregator::new(config);
        add_simple(&mut agg, "jane@co.com", "Jane Smith", "PM", 0.9);
        add_simple(&mut agg, "jsmith@co.com", "Jane Smith", "PM", 0.9);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].message_count, 2);
        assert_eq!(export.stats.filtered_out, 0);
    }

    #[test]
    fn test_filter_drops_low_confidence_profiles() {
        let config = StakeholderFilterConfig {
            enable_filtering: true,
            min_role_confidence: 0.70,
            min_mention_count: 1,
            ..StakeholderFilterConfig::default()
        };
        let mut agg = StakeholderAggregator::new(config);
        add_simple(&mut agg, "low@co.com", "Lo", "PM", 0.4);
        add_simple(&mut agg, "high@co.com", "Hi", "PM", 0.9);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].email, "high@co.com");
        assert_eq!(export.stats.filtered_out, 1);
        assert_eq!(export.stats.total_before_filtering, 2);
    }

    #[test]
    fn test_filter_drops_below_min_mentions() {
        let config = StakeholderFilterConfig {
            enable_filtering: true,
            min_role_confidence: 0.0,
            min_mention_count: 2,
            ..StakeholderFilterConfig::default()
        };
        let mut agg = StakeholderAggregator::new(config);
        add_simple(&mut agg, "once@co.com", "Once", "PM", 0.9);
        add_simple(&mut agg, "twice@co.com", "Twice", "PM", 0.9);
        add_simple(&mut agg, "twice@co.com", "Twice", "PM", 0.9);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].email, "twice@co.com");
    }

    #[test]
    fn test_filter_drops_generic_names() {
        let config = StakeholderFilterConfig {
            enable_filtering: true,
            min_role_confidence: 0.0,
            min_mention_count: 1,
            exclude_generic_names: true,
            ..StakeholderFilterConfig::default()
        };
        let mut agg = StakeholderAggregator::new(config);
        add_simple(&mut agg, "fake@co.com", "John Doe", "PM", 0.9);
        add_simple(&mut agg, "real@co.com", "Priya Raman", "PM", 0.9);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].name, "Priya Raman");
        assert_eq!(export.stats.filtered_out, 1);
    }

    #[test]
    fn test_filter_skips_confidence_check_without_roles() {
        // A profile whose every mention carried an empty role label has no
        // role entries; the confidence floor does not apply to it.
        let config = StakeholderFilterConfig {
            enable_filtering: true,
            min_role_confidence: 0.99,
            min_mention_count: 1,
            ..StakeholderFilterConfig::default()
        };
        let mut agg = StakeholderAggregator::new(config);
        add_simple(&mut agg, "a@co.com", "A", "", 0.1);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stakeholders[0].primary_role, "Unknown");
        assert!(export.stakeholders[0].inferred_roles.is_empty());
    }

    #[test]
    fn test_filtering_disabled_keeps_everything() {
        let mut agg = aggregator();
        add_simple(&mut agg, "low@co.com", "John Doe", "PM", 0.1);

        let export = agg.export();
        assert_eq!(export.stakeholders.len(), 1);
        assert_eq!(export.stats.filtered_out, 0);
        assert_eq!(export.stats.total_before_filtering, 1);
    }

    #[test]
    fn test_export_sorted_by_message_count_desc() {
        let mut agg = aggregator();
        add_simple(&mut agg, "quiet@co.com", "Quiet", "PM", 0.8);
        for _ in 0..3 {
            add_simple(&mut agg, "busy@co.com", "Busy", "PM", 0.8);
        }

        let export = agg.export();
        assert_eq!(export.stakeholders[0].email, "busy@co.com");
        assert_eq!(export.stakeholders[1].email, "quiet@co.com");
    }

    #[test]
    fn test_export_stats_avg_projects() {
        let mut agg = aggregator();
        agg.add_mention("a@co.com", "A", "PM", 0.8, "stakeholder", None, Some("Atlas"));
        agg.add_mention("a@co.com", "A", "PM", 0.8, "stakeholder", None, Some("Zephyr"));
        agg.add_mention("b@co.com", "B", "PM", 0.8, "stakeholder", None, Some("Atlas"));

        let export = agg.export();
        assert_eq!(export.stats.total_stakeholders, 2);
        assert_eq!(export.stats.avg_projects_per_person, 1.5);
    }

    #[test]
    fn test_role_confidence_rounded_in_view() {
        let mut agg = aggregator();
        add_simple(&mut agg, "a@co.com", "A", "PM", 0.856);
        let export = agg.export();
        assert_eq!(export.stakeholders[0].inferred_roles[0].confidence, 0.86);
    }
}
