//! Applies a graded submission to the learner's longitudinal state.
//!
//! Steps run in a fixed order and are independent: a failing step is logged
//! and recorded in the [`ProgressionReport`], and the remaining steps still
//! run. Badges, progress, and risk are recomputed from the full submission
//! history every time rather than maintained as counters.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::StoreError;
use crate::model::{
    Achievement, Alert, Assessment, Badge, BadgeAward, RiskLevel, RiskState, SkillRecord,
    Submission, Trend,
};
use crate::scorer::round_to;
use crate::store::Store;

/// Icon of the "High Scorer" achievement.
pub const HIGH_SCORER_ICON: &str = "⭐";

// ---------------------------------------------------------------------------
// Repeated-failure advisories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvisoryLevel {
    Warning,
    Critical,
}

impl fmt::Display for AdvisoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdvisoryLevel::Warning => write!(f, "warning"),
            AdvisoryLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Escalation raised when a learner keeps failing the same assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Advisory {
    pub level: AdvisoryLevel,
    pub assessment_id: u64,
    pub assessment_title: String,
    /// Failures on `assessment_id`.
    pub failed_count: usize,
    /// Failures across every assessment.
    pub total_failures: usize,
    pub reason: String,
    pub recommendation: String,
}

/// Advisory for the assessment this learner failed most often, if it was
/// failed at least twice. Ties go to the assessment that was failed first.
///
/// `submissions` should be one learner's history; only completed, failing
/// attempts count.
pub fn repeated_failure_advisory(
    submissions: &[Submission],
    titles: &HashMap<u64, String>,
) -> Option<Advisory> {
    // assessment id -> (failures, earliest failure)
    let mut failures: BTreeMap<u64, (usize, DateTime<Utc>)> = BTreeMap::new();
    for submission in submissions.iter().filter(|s| s.is_failed_attempt()) {
        let entry = failures
            .entry(submission.assessment_id)
            .or_insert((0, submission.submitted_at));
        entry.0 += 1;
        entry.1 = entry.1.min(submission.submitted_at);
    }
    let total_failures: usize = failures.values().map(|(n, _)| n).sum();

    let (&assessment_id, &(failed_count, _)) = failures
        .iter()
        .min_by_key(|(id, (n, first))| (Reverse(*n), *first, **id))?;
    if failed_count < 2 {
        return None;
    }

    let title = titles
        .get(&assessment_id)
        .cloned()
        .unwrap_or_else(|| "Assessment".to_string());

    let (level, reason, recommendation) = if failed_count == 2 {
        (
            AdvisoryLevel::Warning,
            format!(
                "Performance Concern: Failed '{title}' twice. Immediate intervention and targeted support required to meet program standards."
            ),
            format!(
                "HR Recommendation: Schedule one-on-one review with mentor. Provide additional learning resources for {title}. Monitor next attempt closely. If third failure occurs, evaluate program fit."
            ),
        )
    } else {
        (
            AdvisoryLevel::Critical,
            format!(
                "Critical Performance Issue: Failed '{title}' {failed_count} times. Performance does not meet minimum program requirements despite multiple attempts."
            ),
            "HR Recommendation: IMMEDIATE ACTION REQUIRED. Schedule urgent review meeting with HR and program manager. Assess: (1) Skill gap analysis, (2) Learning capability alignment, (3) Program fit evaluation. Consider: Remedial training program, role reassignment, or program termination if performance standards cannot be met.".to_string(),
        )
    };

    Some(Advisory {
        level,
        assessment_id,
        assessment_title: title,
        failed_count,
        total_failures,
        reason,
        recommendation,
    })
}

// ---------------------------------------------------------------------------
// Pure recompute helpers
// ---------------------------------------------------------------------------

/// Running weighted mean of a skill level, to one decimal.
pub fn weighted_level(old_level: f64, old_count: u32, score: f64) -> f64 {
    let count = f64::from(old_count);
    round_to((old_level * count + score) / (count + 1.0), 1)
}

pub fn trend_of(old_level: f64, new_level: f64) -> Trend {
    if new_level > old_level {
        Trend::Up
    } else if new_level < old_level {
        Trend::Down
    } else {
        Trend::Stable
    }
}

/// Learner risk from the mean of their graded scores.
pub fn risk_from_scores(scores: &[f64]) -> (RiskLevel, f64) {
    if scores.is_empty() {
        return (RiskLevel::Low, 0.0);
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    match mean {
        m if m >= 75.0 => (RiskLevel::Low, 15.0),
        m if m >= 60.0 => (RiskLevel::Medium, 40.0),
        m if m >= 40.0 => (RiskLevel::High, 70.0),
        _ => (RiskLevel::Critical, 90.0),
    }
}

/// Badges whose threshold the learner's mean score meets, with that mean.
///
/// A badge tracks the assessments tagged with its skill, or every graded
/// submission when it is a general badge.
pub fn eligible_badges(
    badges: &[Badge],
    submissions: &[Submission],
    assessments: &HashMap<u64, Assessment>,
) -> Vec<(u64, f64)> {
    let graded: Vec<(&Submission, f64)> = submissions
        .iter()
        .filter(|s| s.is_completed())
        .filter_map(|s| s.score.map(|score| (s, score)))
        .collect();

    badges
        .iter()
        .filter_map(|badge| {
            let scores: Vec<f64> = graded
                .iter()
                .filter(|(s, _)| {
                    badge.is_general()
                        || assessments.get(&s.assessment_id).is_some_and(|a| {
                            a.skill_tags()
                                .iter()
                                .any(|tag| tag.eq_ignore_ascii_case(&badge.skill_name))
                        })
                })
                .map(|(_, score)| *score)
                .collect();
            if scores.is_empty() {
                return None;
            }
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            (mean >= badge.min_score).then_some((badge.id, round_to(mean, 2)))
        })
        .collect()
}

fn completed_scores(submissions: &[Submission]) -> Vec<f64> {
    submissions
        .iter()
        .filter(|s| s.is_completed())
        .filter_map(|s| s.score)
        .collect()
}

// ---------------------------------------------------------------------------
// Updater
// ---------------------------------------------------------------------------

/// What one progression run changed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressionReport {
    pub skills: Vec<SkillRecord>,
    pub achievement: Option<Achievement>,
    pub new_badges: Vec<BadgeAward>,
    pub overall_progress: Option<f64>,
    pub risk: Option<RiskState>,
    pub alert: Option<Alert>,
    pub advisory: Option<Advisory>,
    /// One entry per failed step.
    pub errors: Vec<String>,
}

impl ProgressionReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record<T>(&mut self, step: &str, result: Result<T, StoreError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(step, error = %e, "progression step failed");
                self.errors.push(format!("{step}: {e}"));
                None
            }
        }
    }
}

/// Applies graded submissions to learner state through a [`Store`].
pub struct ProgressionUpdater {
    store: Arc<dyn Store>,
}

impl ProgressionUpdater {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run every step for a committed, completed submission.
    pub async fn apply(
        &self,
        submission: &Submission,
        assessment: &Assessment,
        config: &EngineConfig,
    ) -> ProgressionReport {
        let mut report = ProgressionReport::default();
        let Some(score) = submission.score else {
            report.errors.push("submission has no score".into());
            return report;
        };
        let learner = submission.learner_id;

        let skills = self.update_skills(learner, assessment, score).await;
        report.skills = report.record("skills", skills).unwrap_or_default();

        let achievement = self.award_achievement(learner, assessment, score, config).await;
        report.achievement = report.record("achievement", achievement).flatten();

        let badges = self.check_badges(learner).await;
        report.new_badges = report.record("badges", badges).unwrap_or_default();

        let progress = self.recompute_overall_progress(learner).await;
        report.overall_progress = report.record("overall_progress", progress);

        let risk = self.assess_risk(learner).await;
        if let Some((state, alert, advisory)) = report.record("risk", risk) {
            report.risk = Some(state);
            report.alert = alert;
            report.advisory = advisory;
        }

        debug!(
            learner,
            submission = submission.id,
            errors = report.errors.len(),
            "progression applied"
        );
        report
    }

    /// Step 1: fold the score into each tagged skill.
    pub async fn update_skills(
        &self,
        learner_id: u64,
        assessment: &Assessment,
        score: f64,
    ) -> Result<Vec<SkillRecord>, StoreError> {
        let mut updated = Vec::new();
        for skill_name in assessment.skill_tags() {
            let record = match self.store.get_skill(learner_id, &skill_name).await? {
                Some(old) => {
                    let level = weighted_level(old.level, old.assessments_count, score);
                    SkillRecord {
                        trend: trend_of(old.level, level),
                        level,
                        assessments_count: old.assessments_count + 1,
                        ..old
                    }
                }
                None => SkillRecord {
                    learner_id,
                    skill_name,
                    level: round_to(score, 1),
                    assessments_count: 1,
                    trend: Trend::Stable,
                },
            };
            self.store.upsert_skill(&record).await?;
            updated.push(record);
        }
        Ok(updated)
    }

    /// Step 2: one-off "High Scorer" achievement.
    pub async fn award_achievement(
        &self,
        learner_id: u64,
        assessment: &Assessment,
        score: f64,
        config: &EngineConfig,
    ) -> Result<Option<Achievement>, StoreError> {
        if score < config.high_scorer_threshold {
            return Ok(None);
        }
        let achievement = Achievement {
            learner_id,
            title: format!("High Scorer: {}", assessment.title),
            icon: HIGH_SCORER_ICON.to_string(),
            description: format!("Scored {score:.1}% on {}", assessment.title),
            earned_at: Utc::now(),
        };
        if self.store.insert_achievement(&achievement).await? {
            info!(learner = learner_id, title = %achievement.title, "achievement awarded");
            Ok(Some(achievement))
        } else {
            Ok(None)
        }
    }

    /// Step 3: award every badge the learner now qualifies for.
    pub async fn check_badges(&self, learner_id: u64) -> Result<Vec<BadgeAward>, StoreError> {
        let badges = self.store.badges().await?;
        if badges.is_empty() {
            return Ok(Vec::new());
        }
        let submissions = self.store.submissions_for_learner(learner_id).await?;
        let assessments: HashMap<u64, Assessment> = self
            .store
            .assessments()
            .await?
            .into_iter()
            .map(|a| (a.id, a))
            .collect();

        let mut awarded = Vec::new();
        for (badge_id, mean) in eligible_badges(&badges, &submissions, &assessments) {
            let award = BadgeAward {
                learner_id,
                badge_id,
                score_achieved: mean,
                earned_at: Utc::now(),
            };
            if self.store.insert_badge_award(&award).await? {
                info!(learner = learner_id, badge = badge_id, mean, "badge awarded");
                awarded.push(award);
            }
        }
        Ok(awarded)
    }

    /// Step 4: mean of every graded score, capped at 100.
    pub async fn recompute_overall_progress(&self, learner_id: u64) -> Result<f64, StoreError> {
        let scores = completed_scores(&self.store.submissions_for_learner(learner_id).await?);
        let progress = if scores.is_empty() {
            0.0
        } else {
            round_to(
                (scores.iter().sum::<f64>() / scores.len() as f64).min(100.0),
                2,
            )
        };
        self.store.set_overall_progress(learner_id, progress).await?;
        Ok(progress)
    }

    /// Step 5: numeric risk, alert on escalation, repeated-failure advisory.
    pub async fn assess_risk(
        &self,
        learner_id: u64,
    ) -> Result<(RiskState, Option<Alert>, Option<Advisory>), StoreError> {
        let submissions = self.store.submissions_for_learner(learner_id).await?;
        let scores = completed_scores(&submissions);
        let (risk_level, risk_score) = risk_from_scores(&scores);

        let previous = self
            .store
            .risk_state(learner_id)
            .await?
            .unwrap_or_else(|| RiskState::initial(learner_id));
        let state = RiskState {
            learner_id,
            risk_level,
            risk_score,
        };
        self.store.set_risk_state(&state).await?;

        let alert = if risk_level.is_alerting() && !previous.risk_level.is_alerting() {
            let mean = scores.iter().sum::<f64>() / scores.len().max(1) as f64;
            let alert = Alert {
                id: Uuid::new_v4(),
                learner_id,
                risk_level,
                risk_score,
                reason: format!(
                    "Average score {mean:.1}% across {} graded submissions",
                    scores.len()
                ),
                created_at: Utc::now(),
            };
            self.store.append_alert(&alert).await?;
            warn!(learner = learner_id, level = %risk_level, "learner risk escalated");
            Some(alert)
        } else {
            None
        };

        let titles: HashMap<u64, String> = self
            .store
            .assessments()
            .await?
            .into_iter()
            .map(|a| (a.id, a.title))
            .collect();
        let advisory = repeated_failure_advisory(&submissions, &titles);
        if let Some(advisory) = &advisory {
            warn!(
                learner = learner_id,
                level = %advisory.level,
                assessment = advisory.assessment_id,
                failures = advisory.failed_count,
                "repeated failures"
            );
        }

        Ok((state, alert, advisory))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssessmentKind, PassStatus, SubmissionStatus};
    use crate::store::MemoryStore;

    fn assessment(id: u64, title: &str, skills: &[&str]) -> Assessment {
        Assessment {
            id,
            title: title.into(),
            description: String::new(),
            instructions: None,
            kind: AssessmentKind::Quiz,
            max_score: 100.0,
            passing_score: Some(60.0),
            questions: vec![],
            rubric: None,
            skills: skills.iter().map(|s| s.to_string()).collect(),
            is_active: true,
        }
    }

    fn graded(id: u64, assessment_id: u64, learner_id: u64, score: f64) -> Submission {
        let mut s = Submission::started(id, assessment_id, learner_id);
        s.status = SubmissionStatus::Completed;
        s.score = Some(score);
        s.pass_status = Some(if score >= 60.0 {
            PassStatus::Pass
        } else {
            PassStatus::Fail
        });
        s
    }

    fn badge(id: u64, skill: &str, min_score: f64) -> Badge {
        Badge {
            id,
            name: format!("Badge {id}"),
            description: String::new(),
            skill_name: skill.into(),
            min_score,
        }
    }

    /// Store seeded with `assessments` and committed `submissions`.
    async fn seeded(
        assessments: Vec<Assessment>,
        badges: Vec<Badge>,
        submissions: &[Submission],
    ) -> Arc<MemoryStore> {
        let store = MemoryStore::new().with_assessments(assessments).with_badges(badges);
        for s in submissions {
            let mut created = store.create_submission(s.assessment_id, s.learner_id).await.unwrap();
            created.status = s.status;
            created.score = s.score;
            created.pass_status = s.pass_status;
            store.save_submission(&created).await.unwrap();
        }
        Arc::new(store)
    }

    #[test]
    fn weighted_level_example() {
        assert_eq!(weighted_level(70.0, 2, 100.0), 80.0);
        assert_eq!(weighted_level(0.0, 0, 55.56), 55.6);
    }

    #[test]
    fn trend_direction() {
        assert_eq!(trend_of(70.0, 80.0), Trend::Up);
        assert_eq!(trend_of(70.0, 60.0), Trend::Down);
        assert_eq!(trend_of(70.0, 70.0), Trend::Stable);
    }

    #[test]
    fn risk_bands() {
        assert_eq!(risk_from_scores(&[]), (RiskLevel::Low, 0.0));
        assert_eq!(risk_from_scores(&[75.0]), (RiskLevel::Low, 15.0));
        assert_eq!(risk_from_scores(&[60.0, 70.0]), (RiskLevel::Medium, 40.0));
        assert_eq!(risk_from_scores(&[40.0]), (RiskLevel::High, 70.0));
        assert_eq!(risk_from_scores(&[10.0, 20.0]), (RiskLevel::Critical, 90.0));
    }

    #[test]
    fn advisory_thresholds() {
        let titles = HashMap::from([(1, "Rust Basics".to_string())]);
        let one = vec![graded(1, 1, 9, 10.0)];
        assert!(repeated_failure_advisory(&one, &titles).is_none());

        let two = vec![graded(1, 1, 9, 10.0), graded(2, 1, 9, 20.0)];
        let advisory = repeated_failure_advisory(&two, &titles).unwrap();
        assert_eq!(advisory.level, AdvisoryLevel::Warning);
        assert!(advisory.reason.contains("Failed 'Rust Basics' twice"));

        let three = vec![
            graded(1, 1, 9, 10.0),
            graded(2, 1, 9, 20.0),
            graded(3, 1, 9, 30.0),
        ];
        let advisory = repeated_failure_advisory(&three, &titles).unwrap();
        assert_eq!(advisory.level, AdvisoryLevel::Critical);
        assert_eq!(advisory.failed_count, 3);
    }

    #[test]
    fn advisory_ignores_passes_and_ungraded() {
        let mut pending = graded(3, 1, 9, 10.0);
        pending.status = SubmissionStatus::Failed;
        let history = vec![graded(1, 1, 9, 10.0), graded(2, 1, 9, 90.0), pending];
        assert!(repeated_failure_advisory(&history, &HashMap::new()).is_none());
    }

    #[test]
    fn advisory_picks_most_failed_then_earliest() {
        let at = |minute: u32| {
            chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 3, 14, 9, minute, 0).unwrap()
        };
        let failed = |id, assessment_id, minute| {
            let mut s = graded(id, assessment_id, 9, 10.0);
            s.submitted_at = at(minute);
            s
        };
        let history = vec![
            failed(1, 5, 1),
            failed(2, 2, 2),
            failed(3, 5, 3),
            failed(4, 2, 4),
            failed(5, 7, 0),
        ];
        let advisory = repeated_failure_advisory(&history, &HashMap::new()).unwrap();
        assert_eq!(advisory.assessment_id, 5);
        assert_eq!(advisory.assessment_title, "Assessment");
        assert_eq!(advisory.total_failures, 5);

        let mut simultaneous = history.clone();
        for s in &mut simultaneous {
            s.submitted_at = at(0);
        }
        let advisory = repeated_failure_advisory(&simultaneous, &HashMap::new()).unwrap();
        assert_eq!(advisory.assessment_id, 2);
    }

    #[test]
    fn badge_eligibility_by_skill_and_general() {
        let assessments = HashMap::from([
            (1, assessment(1, "Rust Basics", &["Rust"])),
            (2, assessment(2, "SQL Basics", &["SQL"])),
        ]);
        let history = vec![graded(1, 1, 9, 90.0), graded(2, 2, 9, 50.0)];
        let badges = vec![badge(1, "rust", 85.0), badge(2, "SQL", 60.0), badge(3, "General", 70.0)];

        let eligible = eligible_badges(&badges, &history, &assessments);
        assert_eq!(eligible, vec![(1, 90.0), (3, 70.0)]);
    }

    #[tokio::test]
    async fn skill_update_seeds_then_averages() {
        let store = seeded(vec![assessment(1, "Rust Basics", &["Rust"])], vec![], &[]).await;
        let updater = ProgressionUpdater::new(store.clone());
        let a = assessment(1, "Rust Basics", &["Rust"]);

        updater.update_skills(9, &a, 70.0).await.unwrap();
        updater.update_skills(9, &a, 70.0).await.unwrap();
        let records = updater.update_skills(9, &a, 100.0).await.unwrap();

        assert_eq!(records[0].level, 80.0);
        assert_eq!(records[0].assessments_count, 3);
        assert_eq!(records[0].trend, Trend::Up);
    }

    #[tokio::test]
    async fn repeated_skill_tags_count_once() {
        let a = assessment(1, "Rust Basics", &["Rust", "rust"]);
        let store = seeded(vec![a.clone()], vec![], &[]).await;
        let updater = ProgressionUpdater::new(store.clone());

        updater.update_skills(9, &a, 60.0).await.unwrap();
        let records = updater.update_skills(9, &a, 80.0).await.unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].assessments_count, 2);
        assert_eq!(records[0].level, 70.0);
        assert_eq!(store.skills_for(9).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn achievement_awarded_once() {
        let store = seeded(vec![], vec![], &[]).await;
        let updater = ProgressionUpdater::new(store.clone());
        let a = assessment(1, "Rust Basics", &[]);
        let config = EngineConfig::default();

        let first = updater.award_achievement(9, &a, 95.0, &config).await.unwrap();
        assert_eq!(first.unwrap().title, "High Scorer: Rust Basics");
        assert!(updater.award_achievement(9, &a, 99.0, &config).await.unwrap().is_none());
        assert!(updater.award_achievement(9, &a, 89.9, &config).await.unwrap().is_none());
        assert_eq!(store.achievements_for(9).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn badges_are_idempotent_across_runs() {
        let store = seeded(
            vec![assessment(1, "Rust Basics", &["Rust"])],
            vec![badge(1, "Rust", 80.0)],
            &[graded(0, 1, 9, 85.0)],
        )
        .await;
        let updater = ProgressionUpdater::new(store.clone());

        assert_eq!(updater.check_badges(9).await.unwrap().len(), 1);
        assert!(updater.check_badges(9).await.unwrap().is_empty());
        assert_eq!(store.badge_awards_for(9).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn alert_only_on_escalation() {
        let store = seeded(
            vec![assessment(1, "Rust Basics", &[])],
            vec![],
            &[graded(0, 1, 9, 30.0)],
        )
        .await;
        let updater = ProgressionUpdater::new(store.clone());

        let (state, alert, _) = updater.assess_risk(9).await.unwrap();
        assert_eq!(state.risk_level, RiskLevel::Critical);
        assert!(alert.is_some());

        let (_, again, _) = updater.assess_risk(9).await.unwrap();
        assert!(again.is_none());
        assert_eq!(store.alerts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_step_does_not_stop_the_rest() {
        let store = seeded(
            vec![assessment(1, "Rust Basics", &["Rust"])],
            vec![badge(1, "Rust", 50.0)],
            &[graded(0, 1, 9, 95.0)],
        )
        .await;
        store.fail_operation("insert_badge_award");
        let updater = ProgressionUpdater::new(store.clone());
        let submission = store.get_submission(1).await.unwrap().unwrap();
        let a = assessment(1, "Rust Basics", &["Rust"]);

        let report = updater.apply(&submission, &a, &EngineConfig::default()).await;

        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("badges:"));
        assert_eq!(report.skills.len(), 1);
        assert!(report.achievement.is_some());
        assert_eq!(report.overall_progress, Some(95.0));
        assert_eq!(report.risk.unwrap().risk_level, RiskLevel::Low);
    }
}
