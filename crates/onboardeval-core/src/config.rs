//! Grading engine configuration.
//!
//! An `EngineConfig` is an immutable value. Callers that need to retune the
//! engine build a new value and hand it to
//! [`GradingEngine::replace_config`](crate::engine::GradingEngine::replace_config).

use serde::{Deserialize, Serialize};

use crate::feedback::FeedbackRisk;

/// Tunable parameters of the grading pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Questions shown (and graded) per quiz per day.
    pub daily_question_count: usize,
    /// Weight of a question that carries no `points`.
    pub default_question_points: f64,
    /// Passing threshold for assessments that carry none.
    pub default_passing_score: f64,
    /// Incorrect items embedded in the prompt and retried individually.
    pub max_incorrect_details: usize,
    /// Cap on every list field of the feedback contract.
    pub max_feedback_items: usize,
    /// Score at which a "High Scorer" achievement is awarded.
    pub high_scorer_threshold: f64,
    /// When false the synthesizer never calls the model.
    pub enable_model_feedback: bool,
    /// Model identifier passed to the provider.
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Upper bound on a single model call.
    pub model_timeout_secs: u64,
    /// Assignment score used when the model answers without one.
    pub assignment_default_score: f64,
    /// Template tiers for quiz feedback, highest `min_score` first.
    pub quiz_bands: Vec<FeedbackBand>,
    /// Template tiers for assignment feedback, highest `min_score` first.
    pub assignment_bands: Vec<FeedbackBand>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            daily_question_count: 5,
            default_question_points: 10.0,
            default_passing_score: 70.0,
            max_incorrect_details: 5,
            max_feedback_items: 4,
            high_scorer_threshold: 90.0,
            enable_model_feedback: true,
            model: "phi3:latest".to_string(),
            temperature: 0.3,
            max_tokens: 800,
            model_timeout_secs: 60,
            assignment_default_score: 75.0,
            quiz_bands: default_quiz_bands(),
            assignment_bands: default_assignment_bands(),
        }
    }
}

impl EngineConfig {
    /// The quiz tier a score falls into.
    pub fn quiz_band(&self, score: f64) -> FeedbackBand {
        select_band(&self.quiz_bands, score)
    }

    /// The assignment tier a score falls into.
    pub fn assignment_band(&self, score: f64) -> FeedbackBand {
        select_band(&self.assignment_bands, score)
    }
}

/// One deterministic feedback tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackBand {
    /// Inclusive lower bound of the tier.
    pub min_score: f64,
    pub label: String,
    /// Comment template; `{score}` is replaced with the score to one decimal.
    pub comment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    pub risk_level: FeedbackRisk,
}

impl FeedbackBand {
    pub fn render_comment(&self, score: f64) -> String {
        self.comment.replace("{score}", &format!("{score:.1}"))
    }
}

/// Picks the first band whose threshold the score meets, scanning from the
/// highest threshold down. Scores below every band get the lowest band.
fn select_band(bands: &[FeedbackBand], score: f64) -> FeedbackBand {
    let mut ordered: Vec<&FeedbackBand> = bands.iter().collect();
    ordered.sort_by(|a, b| b.min_score.total_cmp(&a.min_score));

    ordered
        .iter()
        .find(|band| score >= band.min_score)
        .or_else(|| ordered.last())
        .map(|band| (*band).clone())
        .unwrap_or_else(last_resort_band)
}

/// Used only when a configuration has no bands at all.
fn last_resort_band() -> FeedbackBand {
    FeedbackBand {
        min_score: 0.0,
        label: "Evaluated".into(),
        comment: "You scored {score}%.".into(),
        strengths: vec!["Completed the assessment".into()],
        weaknesses: vec!["Review the material covered by this assessment".into()],
        suggestions: vec!["Discuss the results with your mentor".into()],
        improvements: vec![],
        risk_level: FeedbackRisk::Medium,
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_quiz_bands() -> Vec<FeedbackBand> {
    vec![
        FeedbackBand {
            min_score: 80.0,
            label: "Exceeds Expectations".into(),
            comment: "Excellent work! You scored {score}%, demonstrating strong understanding of the concepts.".into(),
            strengths: strings(&[
                "High accuracy on assessment questions",
                "Good grasp of core concepts",
            ]),
            weaknesses: strings(&["Minor gaps in some advanced topics"]),
            suggestions: strings(&[
                "Review any missed questions",
                "Explore advanced topics to deepen knowledge",
            ]),
            improvements: strings(&[
                "Revisit concepts behind missed questions",
                "Practice similar quizzes",
            ]),
            risk_level: FeedbackRisk::Low,
        },
        FeedbackBand {
            min_score: 60.0,
            label: "Meets Expectations".into(),
            comment: "Good effort! You scored {score}%. You're on track but have room for improvement.".into(),
            strengths: strings(&[
                "Attempted all questions",
                "Solid understanding of fundamentals",
            ]),
            weaknesses: strings(&[
                "Some conceptual gaps in key areas",
                "Accuracy could be improved",
            ]),
            suggestions: strings(&[
                "Review incorrect answers carefully",
                "Practice similar problems",
                "Revisit study materials",
            ]),
            improvements: strings(&[
                "Focus on weakest topics first",
                "Do short daily quizzes",
            ]),
            risk_level: FeedbackRisk::Medium,
        },
        FeedbackBand {
            min_score: 0.0,
            label: "Needs Improvement".into(),
            comment: "You scored {score}%. This indicates significant gaps that need attention.".into(),
            strengths: strings(&["Completed the assessment"]),
            weaknesses: strings(&[
                "Multiple fundamental concepts not understood",
                "Low accuracy rate",
            ]),
            suggestions: strings(&[
                "Schedule a 1-on-1 session with your mentor",
                "Revisit foundational study materials",
                "Practice with easier problems first",
                "Don't hesitate to ask for help",
            ]),
            improvements: strings(&[
                "Start with basics and build up",
                "Use guided practice daily",
            ]),
            risk_level: FeedbackRisk::High,
        },
    ]
}

fn default_assignment_bands() -> Vec<FeedbackBand> {
    let weaknesses = strings(&[
        "Provide more detailed analysis and depth",
        "Improve professional presentation and formatting",
        "Include specific examples and evidence",
        "Enhance clarity and organization of content",
    ]);
    let suggestions = strings(&[
        "Complete a business writing and technical documentation course",
        "Review examples of professional technical reports",
        "Practice structured writing with clear sections and flow",
        "Seek feedback from your mentor on documentation quality",
    ]);
    vec![
        FeedbackBand {
            min_score: 85.0,
            label: "Proficient".into(),
            comment: "Submission demonstrates good effort with comprehensive content. Professional presentation meets corporate documentation standards.".into(),
            strengths: strings(&["Submission completed within deadline", "Basic structure present"]),
            weaknesses: weaknesses.clone(),
            suggestions: suggestions.clone(),
            improvements: strings(&["Add supporting references", "Structure sections clearly"]),
            risk_level: FeedbackRisk::Low,
        },
        FeedbackBand {
            min_score: 75.0,
            label: "Adequate".into(),
            comment: "Submission meets basic requirements with adequate content coverage. Some areas could benefit from more depth and detail.".into(),
            strengths: strings(&["Submission completed within deadline", "Basic structure present"]),
            weaknesses: weaknesses.clone(),
            suggestions: suggestions.clone(),
            improvements: strings(&["Add supporting references", "Structure sections clearly"]),
            risk_level: FeedbackRisk::Low,
        },
        FeedbackBand {
            min_score: 60.0,
            label: "Developing".into(),
            comment: "Submission shows basic understanding but lacks sufficient depth and detail. Significant expansion and refinement needed.".into(),
            strengths: strings(&["Attempted the assignment", "Basic structure present"]),
            weaknesses: weaknesses.clone(),
            suggestions: suggestions.clone(),
            improvements: strings(&["Expand each section with concrete examples"]),
            risk_level: FeedbackRisk::Medium,
        },
        FeedbackBand {
            min_score: 0.0,
            label: "Insufficient".into(),
            comment: "Submission is incomplete and does not meet minimum requirements. Substantial additional work required.".into(),
            strengths: strings(&["Attempted the assignment"]),
            weaknesses,
            suggestions,
            improvements: strings(&["Address every part of the assignment brief"]),
            risk_level: FeedbackRisk::Medium,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = EngineConfig::default();
        assert_eq!(config.daily_question_count, 5);
        assert_eq!(config.max_feedback_items, 4);
        assert_eq!(config.assignment_default_score, 75.0);
        assert!(config.enable_model_feedback);
    }

    #[test]
    fn quiz_band_boundaries() {
        let config = EngineConfig::default();
        assert_eq!(config.quiz_band(80.0).risk_level, FeedbackRisk::Low);
        assert_eq!(config.quiz_band(79.9).risk_level, FeedbackRisk::Medium);
        assert_eq!(config.quiz_band(60.0).risk_level, FeedbackRisk::Medium);
        assert_eq!(config.quiz_band(12.0).risk_level, FeedbackRisk::High);
    }

    #[test]
    fn assignment_band_for_short_submission_is_medium() {
        let config = EngineConfig::default();
        let band = config.assignment_band(45.0);
        assert_eq!(band.label, "Insufficient");
        assert_eq!(band.risk_level, FeedbackRisk::Medium);
    }

    #[test]
    fn negative_scores_get_lowest_band() {
        let config = EngineConfig::default();
        assert_eq!(config.quiz_band(-5.0).label, "Needs Improvement");
    }

    #[test]
    fn empty_bands_use_last_resort() {
        let config = EngineConfig {
            quiz_bands: vec![],
            ..Default::default()
        };
        assert_eq!(config.quiz_band(50.0).label, "Evaluated");
    }

    #[test]
    fn render_comment_substitutes_score() {
        let band = EngineConfig::default().quiz_band(62.0);
        assert!(band.render_comment(62.0).contains("62.0%"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str("daily_question_count = 8").unwrap();
        assert_eq!(config.daily_question_count, 8);
        assert_eq!(config.default_passing_score, 70.0);
        assert_eq!(config.quiz_bands.len(), 3);
    }
}
