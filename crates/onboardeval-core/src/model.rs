//! Core data model types for onboardeval.
//!
//! Assessments and badges are authored elsewhere and are read-only here.
//! Submissions, skill records, awards and risk state are the learner-side
//! records the grading engine writes.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::feedback::FeedbackContract;

/// Skill name of badges that apply across every assessment.
pub const GENERAL_SKILL: &str = "General";

/// Kind of question in a quiz bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    #[default]
    #[serde(alias = "mcq", alias = "single_choice")]
    SingleChoice,
    #[serde(alias = "true_false", alias = "boolean")]
    TrueFalse,
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionKind::SingleChoice => write!(f, "single-choice"),
            QuestionKind::TrueFalse => write!(f, "true-false"),
        }
    }
}

/// One item of an assessment's question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Question id as authored. Numeric ids are kept in their decimal form.
    #[serde(deserialize_with = "string_or_scalar")]
    pub id: String,
    /// Question text shown to the learner.
    #[serde(alias = "question")]
    pub text: String,
    #[serde(rename = "type", default)]
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(deserialize_with = "string_or_scalar")]
    pub correct_answer: String,
    /// Weight of the question; the configured default applies when absent.
    #[serde(default)]
    pub points: Option<f64>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Assessment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssessmentKind {
    Quiz,
    Assignment,
}

impl fmt::Display for AssessmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssessmentKind::Quiz => write!(f, "quiz"),
            AssessmentKind::Assignment => write!(f, "assignment"),
        }
    }
}

impl FromStr for AssessmentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quiz" => Ok(AssessmentKind::Quiz),
            "assignment" => Ok(AssessmentKind::Assignment),
            other => Err(format!("unknown assessment type: {other}")),
        }
    }
}

/// A quiz or assignment definition with its scoring rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(rename = "type")]
    pub kind: AssessmentKind,
    #[serde(default = "default_max_score")]
    pub max_score: f64,
    /// Passing threshold in percent; the configured default applies when absent.
    #[serde(default)]
    pub passing_score: Option<f64>,
    #[serde(default, alias = "question_bank")]
    pub questions: Vec<Question>,
    /// Rubric criteria for assignments, criterion name → description.
    #[serde(default)]
    pub rubric: Option<BTreeMap<String, String>>,
    /// Skill tags updated by this assessment.
    #[serde(default, alias = "skills_assessed")]
    pub skills: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_max_score() -> f64 {
    100.0
}

fn default_true() -> bool {
    true
}

impl Assessment {
    /// Passing threshold, falling back to `default` when the assessment has none.
    pub fn passing_threshold(&self, default: f64) -> f64 {
        self.passing_score.unwrap_or(default)
    }

    /// Skill tags this assessment feeds into.
    ///
    /// Untagged assessments count toward the first word of their title,
    /// or [`GENERAL_SKILL`] when the title is blank. Repeated tags (ignoring
    /// case) are kept once, in the first spelling seen.
    pub fn skill_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if !tags.iter().any(|t| t.eq_ignore_ascii_case(tag)) {
                tags.push(tag.to_string());
            }
        }
        if !tags.is_empty() {
            return tags;
        }
        match self.title.split_whitespace().next() {
            Some(word) => vec![word.to_string()],
            None => vec![GENERAL_SKILL.to_string()],
        }
    }
}

/// Lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    InProgress,
    Submitted,
    Completed,
    Failed,
}

impl SubmissionStatus {
    /// Terminal states are written once by the engine and never changed.
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionStatus::Completed | SubmissionStatus::Failed)
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::InProgress => write!(f, "in_progress"),
            SubmissionStatus::Submitted => write!(f, "submitted"),
            SubmissionStatus::Completed => write!(f, "completed"),
            SubmissionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Pass/fail verdict of a graded submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PassStatus {
    Pass,
    Fail,
}

impl fmt::Display for PassStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassStatus::Pass => write!(f, "pass"),
            PassStatus::Fail => write!(f, "fail"),
        }
    }
}

/// One learner's attempt at an assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: u64,
    pub assessment_id: u64,
    pub learner_id: u64,
    /// Raw quiz answers keyed however the client chose to key them.
    #[serde(default)]
    pub answers: serde_json::Map<String, serde_json::Value>,
    /// Free text of an assignment submission.
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub pass_status: Option<PassStatus>,
    pub status: SubmissionStatus,
    #[serde(default)]
    pub feedback: Option<FeedbackContract>,
    /// Error payload persisted in place of feedback when grading failed.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub trace_id: Option<Uuid>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub graded_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// A fresh attempt in the `in_progress` state.
    pub fn started(id: u64, assessment_id: u64, learner_id: u64) -> Self {
        Self {
            id,
            assessment_id,
            learner_id,
            answers: serde_json::Map::new(),
            text: None,
            score: None,
            pass_status: None,
            status: SubmissionStatus::InProgress,
            feedback: None,
            error: None,
            trace_id: None,
            submitted_at: Utc::now(),
            graded_at: None,
        }
    }

    /// Graded successfully (pass or fail).
    pub fn is_completed(&self) -> bool {
        self.status == SubmissionStatus::Completed
    }

    /// Graded with a failing verdict.
    pub fn is_failed_attempt(&self) -> bool {
        self.is_completed() && self.pass_status == Some(PassStatus::Fail)
    }
}

/// Immutable history entry for an assignment revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRevision {
    pub submission_id: u64,
    pub version: u32,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Direction of a skill level after the latest update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Stable,
}

impl fmt::Display for Trend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trend::Up => write!(f, "up"),
            Trend::Down => write!(f, "down"),
            Trend::Stable => write!(f, "stable"),
        }
    }
}

/// Running skill level of a learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkillRecord {
    pub learner_id: u64,
    pub skill_name: String,
    /// Weighted mean of every graded score for this skill, 0-100.
    pub level: f64,
    pub assessments_count: u32,
    pub trend: Trend,
}

/// Static threshold rule for earning a badge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Badge {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Skill the badge tracks, or [`GENERAL_SKILL`].
    #[serde(default = "default_badge_skill")]
    pub skill_name: String,
    #[serde(default = "default_badge_min_score")]
    pub min_score: f64,
}

fn default_badge_skill() -> String {
    GENERAL_SKILL.to_string()
}

fn default_badge_min_score() -> f64 {
    80.0
}

impl Badge {
    pub fn is_general(&self) -> bool {
        self.skill_name.eq_ignore_ascii_case(GENERAL_SKILL)
    }
}

/// The fact that a learner met a badge's threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BadgeAward {
    pub learner_id: u64,
    pub badge_id: u64,
    pub score_achieved: f64,
    pub earned_at: DateTime<Utc>,
}

/// One-off recognition such as "High Scorer: <assessment>".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Achievement {
    pub learner_id: u64,
    pub title: String,
    pub icon: String,
    pub description: String,
    pub earned_at: DateTime<Utc>,
}

/// Coarse escalation tier of a learner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// High and critical learners raise alerts.
    pub fn is_alerting(self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Current risk of a learner; recomputed, never appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub learner_id: u64,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
}

impl RiskState {
    pub fn initial(learner_id: u64) -> Self {
        Self {
            learner_id,
            risk_level: RiskLevel::Low,
            risk_score: 0.0,
        }
    }
}

/// Raised when a learner's risk crosses into high or critical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub learner_id: u64,
    pub risk_level: RiskLevel,
    pub risk_score: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Learner-level aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnerProfile {
    pub learner_id: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub overall_progress: f64,
}

/// Accepts a JSON/TOML string, number, or boolean and keeps it as text.
fn string_or_scalar<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Int(i64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(title: &str, skills: Vec<&str>) -> Assessment {
        Assessment {
            id: 1,
            title: title.into(),
            description: String::new(),
            instructions: None,
            kind: AssessmentKind::Quiz,
            max_score: 100.0,
            passing_score: None,
            questions: vec![],
            rubric: None,
            skills: skills.into_iter().map(String::from).collect(),
            is_active: true,
        }
    }

    #[test]
    fn assessment_kind_display_and_parse() {
        assert_eq!(AssessmentKind::Quiz.to_string(), "quiz");
        assert_eq!(
            "Assignment".parse::<AssessmentKind>().unwrap(),
            AssessmentKind::Assignment
        );
        assert!("code".parse::<AssessmentKind>().is_err());
    }

    #[test]
    fn question_accepts_numeric_ids_and_answers() {
        let q: Question = serde_json::from_value(serde_json::json!({
            "id": 7,
            "question": "Is Rust memory safe?",
            "type": "true-false",
            "correct_answer": true
        }))
        .unwrap();
        assert_eq!(q.id, "7");
        assert_eq!(q.correct_answer, "true");
        assert_eq!(q.kind, QuestionKind::TrueFalse);
        assert!(q.points.is_none());
    }

    #[test]
    fn skill_tags_fall_back_to_title_word() {
        assert_eq!(
            quiz("Python Basics", vec![]).skill_tags(),
            vec!["Python".to_string()]
        );
        assert_eq!(quiz("   ", vec![]).skill_tags(), vec!["General".to_string()]);
        assert_eq!(
            quiz("Python Basics", vec!["SQL", " "]).skill_tags(),
            vec!["SQL".to_string()]
        );
    }

    #[test]
    fn skill_tags_drop_repeats_ignoring_case() {
        assert_eq!(
            quiz("Rust", vec!["Rust", " rust ", "SQL", "RUST"]).skill_tags(),
            vec!["Rust".to_string(), "SQL".to_string()]
        );
    }

    #[test]
    fn passing_threshold_default() {
        let mut a = quiz("Rust", vec![]);
        assert_eq!(a.passing_threshold(70.0), 70.0);
        a.passing_score = Some(60.0);
        assert_eq!(a.passing_threshold(70.0), 60.0);
    }

    #[test]
    fn submission_status_serde() {
        let json = serde_json::to_string(&SubmissionStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert!(SubmissionStatus::Failed.is_terminal());
        assert!(!SubmissionStatus::Submitted.is_terminal());
    }

    #[test]
    fn risk_level_ordering() {
        assert!(RiskLevel::Critical > RiskLevel::High);
        assert!(RiskLevel::High.is_alerting());
        assert!(!RiskLevel::Medium.is_alerting());
    }
}
