//! Persistence seam for the grading engine.
//!
//! The engine only needs point reads, full-history reads per learner, and
//! a handful of upserts. [`MemoryStore`] keeps everything in one mutex and
//! can snapshot itself to a JSON file, which is all the CLI needs.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{
    Achievement, Alert, Assessment, Badge, BadgeAward, LearnerProfile, RiskState, SkillRecord,
    Submission, SubmissionRevision, SubmissionStatus,
};

/// Storage operations the engine depends on.
///
/// Award inserts are idempotent: inserting a duplicate returns `Ok(false)`
/// and leaves the store unchanged.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_assessment(&self, id: u64) -> Result<Option<Assessment>, StoreError>;
    async fn assessments(&self) -> Result<Vec<Assessment>, StoreError>;

    async fn get_submission(&self, id: u64) -> Result<Option<Submission>, StoreError>;
    /// Create an `in_progress` submission with a fresh id.
    async fn create_submission(
        &self,
        assessment_id: u64,
        learner_id: u64,
    ) -> Result<Submission, StoreError>;
    /// Overwrite an existing submission.
    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError>;
    /// Move a submission to `failed`, recording `error` in place of feedback.
    async fn mark_failed(&self, submission_id: u64, error: &str) -> Result<(), StoreError>;
    async fn submissions_for_learner(&self, learner_id: u64)
        -> Result<Vec<Submission>, StoreError>;
    async fn all_submissions(&self) -> Result<Vec<Submission>, StoreError>;

    async fn get_skill(
        &self,
        learner_id: u64,
        skill_name: &str,
    ) -> Result<Option<SkillRecord>, StoreError>;
    async fn upsert_skill(&self, record: &SkillRecord) -> Result<(), StoreError>;
    async fn skills_for(&self, learner_id: u64) -> Result<Vec<SkillRecord>, StoreError>;

    async fn badges(&self) -> Result<Vec<Badge>, StoreError>;
    async fn badge_awards_for(&self, learner_id: u64) -> Result<Vec<BadgeAward>, StoreError>;
    /// `Ok(true)` if the award was new.
    async fn insert_badge_award(&self, award: &BadgeAward) -> Result<bool, StoreError>;

    async fn achievements_for(&self, learner_id: u64) -> Result<Vec<Achievement>, StoreError>;
    /// `Ok(true)` if no achievement with the same title existed for the learner.
    async fn insert_achievement(&self, achievement: &Achievement) -> Result<bool, StoreError>;

    async fn profile(&self, learner_id: u64) -> Result<Option<LearnerProfile>, StoreError>;
    async fn profiles(&self) -> Result<Vec<LearnerProfile>, StoreError>;
    async fn set_overall_progress(&self, learner_id: u64, progress: f64)
        -> Result<(), StoreError>;

    async fn risk_state(&self, learner_id: u64) -> Result<Option<RiskState>, StoreError>;
    async fn set_risk_state(&self, state: &RiskState) -> Result<(), StoreError>;
    async fn append_alert(&self, alert: &Alert) -> Result<(), StoreError>;
    async fn alerts(&self) -> Result<Vec<Alert>, StoreError>;

    /// Append an immutable revision of an assignment's text; returns its version.
    async fn append_revision(&self, submission_id: u64, text: &str) -> Result<u32, StoreError>;
    async fn revisions(&self, submission_id: u64) -> Result<Vec<SubmissionRevision>, StoreError>;
}

/// Everything a [`MemoryStore`] holds; also its on-disk snapshot format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub assessments: BTreeMap<u64, Assessment>,
    pub badges: Vec<Badge>,
    pub submissions: BTreeMap<u64, Submission>,
    pub next_submission_id: u64,
    pub skills: Vec<SkillRecord>,
    pub badge_awards: Vec<BadgeAward>,
    pub achievements: Vec<Achievement>,
    pub profiles: BTreeMap<u64, LearnerProfile>,
    pub risk: BTreeMap<u64, RiskState>,
    pub alerts: Vec<Alert>,
    pub revisions: Vec<SubmissionRevision>,
}

/// In-process [`Store`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
    failing: Mutex<HashSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Replace the assessment catalog.
    pub fn with_assessments(self, assessments: impl IntoIterator<Item = Assessment>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.assessments = assessments.into_iter().map(|a| (a.id, a)).collect();
        }
        self
    }

    /// Replace the badge rules.
    pub fn with_badges(self, badges: impl IntoIterator<Item = Badge>) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.badges = badges.into_iter().collect();
        }
        self
    }

    /// Make every later call of the named operation (e.g. `"save_submission"`)
    /// fail with [`StoreError::Unavailable`].
    pub fn fail_operation(&self, operation: &str) {
        if let Ok(mut failing) = self.failing.lock() {
            failing.insert(operation.to_string());
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        Ok(self.state()?.clone())
    }

    /// Save the whole store to a JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot).context("failed to serialize store")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write store to {}", path.display()))?;
        Ok(())
    }

    /// Load a store from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read store from {}", path.display()))?;
        let snapshot: StoreSnapshot =
            serde_json::from_str(&content).context("failed to parse store JSON")?;
        Ok(Self::from_snapshot(snapshot))
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreSnapshot>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".into()))
    }

    /// Lock the state for `operation`, honouring injected failures.
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, StoreSnapshot>, StoreError> {
        let injected = self
            .failing
            .lock()
            .map(|f| f.contains(operation))
            .unwrap_or(false);
        if injected {
            return Err(StoreError::Unavailable(format!("{operation} is failing")));
        }
        self.state()
    }
}

fn profile_entry(state: &mut StoreSnapshot, learner_id: u64) -> &mut LearnerProfile {
    state
        .profiles
        .entry(learner_id)
        .or_insert_with(|| LearnerProfile {
            learner_id,
            name: String::new(),
            overall_progress: 0.0,
        })
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_assessment(&self, id: u64) -> Result<Option<Assessment>, StoreError> {
        Ok(self.enter("get_assessment")?.assessments.get(&id).cloned())
    }

    async fn assessments(&self) -> Result<Vec<Assessment>, StoreError> {
        Ok(self.enter("assessments")?.assessments.values().cloned().collect())
    }

    async fn get_submission(&self, id: u64) -> Result<Option<Submission>, StoreError> {
        Ok(self.enter("get_submission")?.submissions.get(&id).cloned())
    }

    async fn create_submission(
        &self,
        assessment_id: u64,
        learner_id: u64,
    ) -> Result<Submission, StoreError> {
        let mut state = self.enter("create_submission")?;
        if !state.assessments.contains_key(&assessment_id) {
            return Err(StoreError::NotFound {
                entity: "assessment",
                id: assessment_id.to_string(),
            });
        }
        state.next_submission_id += 1;
        let submission = Submission::started(state.next_submission_id, assessment_id, learner_id);
        state.submissions.insert(submission.id, submission.clone());
        profile_entry(&mut state, learner_id);
        Ok(submission)
    }

    async fn save_submission(&self, submission: &Submission) -> Result<(), StoreError> {
        let mut state = self.enter("save_submission")?;
        match state.submissions.get_mut(&submission.id) {
            Some(slot) => {
                *slot = submission.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound {
                entity: "submission",
                id: submission.id.to_string(),
            }),
        }
    }

    async fn mark_failed(&self, submission_id: u64, error: &str) -> Result<(), StoreError> {
        let mut state = self.enter("mark_failed")?;
        let Some(submission) = state.submissions.get_mut(&submission_id) else {
            return Err(StoreError::NotFound {
                entity: "submission",
                id: submission_id.to_string(),
            });
        };
        submission.status = SubmissionStatus::Failed;
        submission.error = Some(error.to_string());
        submission.feedback = None;
        submission.score = None;
        submission.pass_status = None;
        submission.graded_at = Some(Utc::now());
        Ok(())
    }

    async fn submissions_for_learner(
        &self,
        learner_id: u64,
    ) -> Result<Vec<Submission>, StoreError> {
        Ok(self
            .enter("submissions_for_learner")?
            .submissions
            .values()
            .filter(|s| s.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn all_submissions(&self) -> Result<Vec<Submission>, StoreError> {
        Ok(self.enter("all_submissions")?.submissions.values().cloned().collect())
    }

    async fn get_skill(
        &self,
        learner_id: u64,
        skill_name: &str,
    ) -> Result<Option<SkillRecord>, StoreError> {
        Ok(self
            .enter("get_skill")?
            .skills
            .iter()
            .find(|s| s.learner_id == learner_id && s.skill_name == skill_name)
            .cloned())
    }

    async fn upsert_skill(&self, record: &SkillRecord) -> Result<(), StoreError> {
        let mut state = self.enter("upsert_skill")?;
        match state
            .skills
            .iter()
            .position(|s| s.learner_id == record.learner_id && s.skill_name == record.skill_name)
        {
            Some(i) => state.skills[i] = record.clone(),
            None => state.skills.push(record.clone()),
        }
        Ok(())
    }

    async fn skills_for(&self, learner_id: u64) -> Result<Vec<SkillRecord>, StoreError> {
        Ok(self
            .enter("skills_for")?
            .skills
            .iter()
            .filter(|s| s.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn badges(&self) -> Result<Vec<Badge>, StoreError> {
        Ok(self.enter("badges")?.badges.clone())
    }

    async fn badge_awards_for(&self, learner_id: u64) -> Result<Vec<BadgeAward>, StoreError> {
        Ok(self
            .enter("badge_awards_for")?
            .badge_awards
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn insert_badge_award(&self, award: &BadgeAward) -> Result<bool, StoreError> {
        let mut state = self.enter("insert_badge_award")?;
        let exists = state
            .badge_awards
            .iter()
            .any(|a| a.learner_id == award.learner_id && a.badge_id == award.badge_id);
        if exists {
            return Ok(false);
        }
        state.badge_awards.push(award.clone());
        Ok(true)
    }

    async fn achievements_for(&self, learner_id: u64) -> Result<Vec<Achievement>, StoreError> {
        Ok(self
            .enter("achievements_for")?
            .achievements
            .iter()
            .filter(|a| a.learner_id == learner_id)
            .cloned()
            .collect())
    }

    async fn insert_achievement(&self, achievement: &Achievement) -> Result<bool, StoreError> {
        let mut state = self.enter("insert_achievement")?;
        let exists = state
            .achievements
            .iter()
            .any(|a| a.learner_id == achievement.learner_id && a.title == achievement.title);
        if exists {
            return Ok(false);
        }
        state.achievements.push(achievement.clone());
        Ok(true)
    }

    async fn profile(&self, learner_id: u64) -> Result<Option<LearnerProfile>, StoreError> {
        Ok(self.enter("profile")?.profiles.get(&learner_id).cloned())
    }

    async fn profiles(&self) -> Result<Vec<LearnerProfile>, StoreError> {
        Ok(self.enter("profiles")?.profiles.values().cloned().collect())
    }

    async fn set_overall_progress(
        &self,
        learner_id: u64,
        progress: f64,
    ) -> Result<(), StoreError> {
        let mut state = self.enter("set_overall_progress")?;
        profile_entry(&mut state, learner_id).overall_progress = progress;
        Ok(())
    }

    async fn risk_state(&self, learner_id: u64) -> Result<Option<RiskState>, StoreError> {
        Ok(self.enter("risk_state")?.risk.get(&learner_id).cloned())
    }

    async fn set_risk_state(&self, risk: &RiskState) -> Result<(), StoreError> {
        let mut state = self.enter("set_risk_state")?;
        state.risk.insert(risk.learner_id, risk.clone());
        Ok(())
    }

    async fn append_alert(&self, alert: &Alert) -> Result<(), StoreError> {
        self.enter("append_alert")?.alerts.push(alert.clone());
        Ok(())
    }

    async fn alerts(&self) -> Result<Vec<Alert>, StoreError> {
        Ok(self.enter("alerts")?.alerts.clone())
    }

    async fn append_revision(&self, submission_id: u64, text: &str) -> Result<u32, StoreError> {
        let mut state = self.enter("append_revision")?;
        if !state.submissions.contains_key(&submission_id) {
            return Err(StoreError::NotFound {
                entity: "submission",
                id: submission_id.to_string(),
            });
        }
        let version = state
            .revisions
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .map(|r| r.version)
            .max()
            .unwrap_or(0)
            + 1;
        state.revisions.push(SubmissionRevision {
            submission_id,
            version,
            text: text.to_string(),
            created_at: Utc::now(),
        });
        Ok(version)
    }

    async fn revisions(&self, submission_id: u64) -> Result<Vec<SubmissionRevision>, StoreError> {
        Ok(self
            .enter("revisions")?
            .revisions
            .iter()
            .filter(|r| r.submission_id == submission_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssessmentKind;

    fn quiz(id: u64) -> Assessment {
        Assessment {
            id,
            title: format!("Quiz {id}"),
            description: String::new(),
            instructions: None,
            kind: AssessmentKind::Quiz,
            max_score: 100.0,
            passing_score: None,
            questions: vec![],
            rubric: None,
            skills: vec![],
            is_active: true,
        }
    }

    fn award(learner_id: u64, badge_id: u64) -> BadgeAward {
        BadgeAward {
            learner_id,
            badge_id,
            score_achieved: 91.0,
            earned_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_assigns_increasing_ids() {
        let store = MemoryStore::new().with_assessments([quiz(1)]);
        let a = store.create_submission(1, 7).await.unwrap();
        let b = store.create_submission(1, 7).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(store.submissions_for_learner(7).await.unwrap().len(), 2);
        assert!(store.profile(7).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn create_for_unknown_assessment_fails() {
        let store = MemoryStore::new();
        let err = store.create_submission(99, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "assessment", .. }));
    }

    #[tokio::test]
    async fn badge_award_is_idempotent() {
        let store = MemoryStore::new();
        assert!(store.insert_badge_award(&award(1, 5)).await.unwrap());
        assert!(!store.insert_badge_award(&award(1, 5)).await.unwrap());
        assert!(store.insert_badge_award(&award(2, 5)).await.unwrap());
        assert_eq!(store.badge_awards_for(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn revisions_are_versioned_per_submission() {
        let store = MemoryStore::new().with_assessments([quiz(1)]);
        let s = store.create_submission(1, 1).await.unwrap();
        assert_eq!(store.append_revision(s.id, "draft").await.unwrap(), 1);
        assert_eq!(store.append_revision(s.id, "final").await.unwrap(), 2);
        let revs = store.revisions(s.id).await.unwrap();
        assert_eq!(revs[1].text, "final");
        assert!(store.append_revision(404, "x").await.is_err());
    }

    #[tokio::test]
    async fn injected_failure_only_hits_named_operation() {
        let store = MemoryStore::new().with_assessments([quiz(1)]);
        let s = store.create_submission(1, 1).await.unwrap();
        store.fail_operation("save_submission");
        assert!(matches!(
            store.save_submission(&s).await,
            Err(StoreError::Unavailable(_))
        ));
        assert!(store.get_submission(s.id).await.unwrap().is_some());

        store.mark_failed(s.id, "disk full").await.unwrap();
        let failed = store.get_submission(s.id).await.unwrap().unwrap();
        assert_eq!(failed.status, SubmissionStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn json_snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("store.json");

        let store = MemoryStore::new().with_assessments([quiz(3)]);
        store.create_submission(3, 42).await.unwrap();
        store.set_overall_progress(42, 66.5).await.unwrap();
        store.save_json(&path).unwrap();

        let loaded = MemoryStore::load_json(&path).unwrap();
        assert_eq!(loaded.all_submissions().await.unwrap().len(), 1);
        assert_eq!(loaded.profile(42).await.unwrap().unwrap().overall_progress, 66.5);
        let next = loaded.create_submission(3, 42).await.unwrap();
        assert_eq!(next.id, 2);
    }
}
