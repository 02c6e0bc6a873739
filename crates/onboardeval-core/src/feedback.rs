//! The fixed feedback shape persisted on every graded submission.
//!
//! Values of this type only come out of [`sanitize`](crate::sanitize::sanitize);
//! nothing downstream needs to know whether the model or a template wrote it.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Risk tier carried inside feedback. Learner-level risk has an extra
/// `critical` tier (see [`RiskLevel`](crate::model::RiskLevel)); feedback does not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackRisk {
    #[default]
    Low,
    Medium,
    High,
}

impl FeedbackRisk {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackRisk::Low => "low",
            FeedbackRisk::Medium => "medium",
            FeedbackRisk::High => "high",
        }
    }

    /// Lenient parse used at the sanitizer boundary.
    pub fn parse_lenient(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "medium" => FeedbackRisk::Medium,
            "high" | "critical" => FeedbackRisk::High,
            _ => FeedbackRisk::Low,
        }
    }
}

impl fmt::Display for FeedbackRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative feedback on one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackContract {
    pub overall_comment: String,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub missing_points: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub risk_level: FeedbackRisk,
    /// Percentage of quiz points earned; quiz path only.
    #[serde(default)]
    pub accuracy_score: Option<f64>,
    #[serde(default)]
    pub test_score: Option<f64>,
    #[serde(default)]
    pub style_score: Option<f64>,
    #[serde(default)]
    pub rubric_scores: BTreeMap<String, f64>,
}

impl FeedbackContract {
    /// Re-serialize into the untyped form the sanitizer accepts.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Every list field, in contract order, for callers that check shape.
    pub fn lists(&self) -> [&Vec<String>; 6] {
        [
            &self.strengths,
            &self.weaknesses,
            &self.suggestions,
            &self.missing_points,
            &self.errors,
            &self.improvements,
        ]
    }
}
