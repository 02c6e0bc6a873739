//! Cohort reports with JSON persistence.
//!
//! Both reports are pure recomputations over stored history; nothing here
//! writes to the store.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;
use crate::model::{Assessment, LearnerProfile, RiskLevel, RiskState, Submission};
use crate::progression::{repeated_failure_advisory, Advisory, AdvisoryLevel};
use crate::scorer::round_to;
use crate::store::Store;

/// One learner with a repeated-failure advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerWarning {
    pub learner_id: u64,
    pub learner_name: String,
    pub advisory: Advisory,
}

/// Every learner with an advisory, critical first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningsReport {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub warnings: Vec<LearnerWarning>,
    pub total_warnings: usize,
    pub critical_warnings: usize,
    pub standard_warnings: usize,
    pub summary: CohortSummary,
}

/// Cohort-wide aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummary {
    /// Learners with a profile.
    pub total: usize,
    /// Mean overall progress, to two decimals.
    pub average_progress: f64,
    /// Learner count per risk level; learners never assessed count as low.
    pub risk_distribution: BTreeMap<String, usize>,
}

impl WarningsReport {
    /// Build the report from raw history.
    pub fn build(
        submissions: &[Submission],
        assessments: &[Assessment],
        profiles: &[LearnerProfile],
        risks: &[RiskState],
    ) -> Self {
        let titles: HashMap<u64, String> = assessments
            .iter()
            .map(|a| (a.id, a.title.clone()))
            .collect();
        let names: HashMap<u64, &str> = profiles
            .iter()
            .map(|p| (p.learner_id, p.name.as_str()))
            .collect();

        let mut by_learner: BTreeMap<u64, Vec<Submission>> = BTreeMap::new();
        for s in submissions {
            by_learner.entry(s.learner_id).or_default().push(s.clone());
        }

        let mut warnings: Vec<LearnerWarning> = by_learner
            .iter()
            .filter_map(|(&learner_id, history)| {
                let advisory = repeated_failure_advisory(history, &titles)?;
                let learner_name = names
                    .get(&learner_id)
                    .filter(|n| !n.trim().is_empty())
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| format!("Learner {learner_id}"));
                Some(LearnerWarning {
                    learner_id,
                    learner_name,
                    advisory,
                })
            })
            .collect();

        warnings.sort_by(|a, b| {
            let critical = |w: &LearnerWarning| w.advisory.level == AdvisoryLevel::Critical;
            critical(b)
                .cmp(&critical(a))
                .then(b.advisory.failed_count.cmp(&a.advisory.failed_count))
                .then(a.learner_id.cmp(&b.learner_id))
        });

        let critical_warnings = warnings
            .iter()
            .filter(|w| w.advisory.level == AdvisoryLevel::Critical)
            .count();

        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            total_warnings: warnings.len(),
            standard_warnings: warnings.len() - critical_warnings,
            critical_warnings,
            warnings,
            summary: CohortSummary::build(profiles, risks),
        }
    }

    /// Read everything the report needs from a store.
    pub async fn from_store(store: &dyn Store) -> Result<Self, StoreError> {
        let submissions = store.all_submissions().await?;
        let assessments = store.assessments().await?;
        let profiles = store.profiles().await?;

        let mut risks = Vec::with_capacity(profiles.len());
        for p in &profiles {
            if let Some(state) = store.risk_state(p.learner_id).await? {
                risks.push(state);
            }
        }

        Ok(Self::build(&submissions, &assessments, &profiles, &risks))
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: WarningsReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }
}

impl CohortSummary {
    pub fn build(profiles: &[LearnerProfile], risks: &[RiskState]) -> Self {
        let levels: HashMap<u64, RiskLevel> =
            risks.iter().map(|r| (r.learner_id, r.risk_level)).collect();

        let mut risk_distribution: BTreeMap<String, usize> = [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ]
        .iter()
        .map(|l| (l.to_string(), 0))
        .collect();

        for p in profiles {
            let level = levels.get(&p.learner_id).copied().unwrap_or_default();
            *risk_distribution.entry(level.to_string()).or_default() += 1;
        }

        let average_progress = if profiles.is_empty() {
            0.0
        } else {
            let sum: f64 = profiles.iter().map(|p| p.overall_progress).sum();
            round_to(sum / profiles.len() as f64, 2)
        };

        Self {
            total: profiles.len(),
            average_progress,
            risk_distribution,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentKind, PassStatus, SubmissionStatus};

    fn assessment(id: u64, title: &str) -> Assessment {
        Assessment {
            id,
            title: title.into(),
            description: String::new(),
            instructions: None,
            kind: AssessmentKind::Quiz,
            max_score: 100.0,
            passing_score: Some(70.0),
            questions: vec![],
            rubric: None,
            skills: vec![],
            is_active: true,
        }
    }

    fn attempts(learner: u64, assessment: u64, fails: usize, next_id: &mut u64) -> Vec<Submission> {
        (0..fails)
            .map(|_| {
                *next_id += 1;
                let mut s = Submission::started(*next_id, assessment, learner);
                s.status = SubmissionStatus::Completed;
                s.score = Some(30.0);
                s.pass_status = Some(PassStatus::Fail);
                s
            })
            .collect()
    }

    fn profile(id: u64, name: &str, progress: f64) -> LearnerProfile {
        LearnerProfile {
            learner_id: id,
            name: name.into(),
            overall_progress: progress,
        }
    }

    #[test]
    fn warnings_sorted_critical_first_then_by_count() {
        let mut id = 0;
        let mut subs = attempts(1, 10, 2, &mut id);
        subs.extend(attempts(2, 10, 3, &mut id));
        subs.extend(attempts(3, 11, 4, &mut id));
        subs.extend(attempts(4, 10, 1, &mut id));

        let report = WarningsReport::build(
            &subs,
            &[assessment(10, "SQL"), assessment(11, "Git")],
            &[profile(1, "Asha", 10.0), profile(2, "", 20.0)],
            &[],
        );

        let order: Vec<u64> = report.warnings.iter().map(|w| w.learner_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
        assert_eq!(report.total_warnings, 3);
        assert_eq!(report.critical_warnings, 2);
        assert_eq!(report.standard_warnings, 1);
        assert_eq!(report.warnings[0].advisory.assessment_title, "Git");
        assert_eq!(report.warnings[1].learner_name, "Learner 2");
        assert_eq!(report.warnings[2].learner_name, "Asha");
    }

    #[test]
    fn cohort_summary_counts_unassessed_as_low() {
        let profiles = [profile(1, "a", 50.0), profile(2, "b", 25.0), profile(3, "c", 0.0)];
        let risks = [RiskState {
            learner_id: 2,
            risk_level: RiskLevel::High,
            risk_score: 70.0,
        }];
        let summary = CohortSummary::build(&profiles, &risks);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.average_progress, 25.0);
        assert_eq!(summary.risk_distribution["low"], 2);
        assert_eq!(summary.risk_distribution["high"], 1);
        assert_eq!(summary.risk_distribution["critical"], 0);
    }

    #[test]
    fn empty_cohort() {
        let report = WarningsReport::build(&[], &[], &[], &[]);
        assert_eq!(report.total_warnings, 0);
        assert_eq!(report.summary.average_progress, 0.0);
    }

    #[test]
    fn save_and_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("warnings.json");
        let mut id = 0;
        let report = WarningsReport::build(
            &attempts(7, 1, 2, &mut id),
            &[assessment(1, "Rust")],
            &[profile(7, "Kai", 40.0)],
            &[],
        );
        report.save_json(&path).unwrap();

        let loaded = WarningsReport::load_json(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.warnings.len(), 1);
        assert_eq!(loaded.summary, report.summary);
    }
}
