//! Weighted scoring and pass/fail verdicts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::matcher::{answers_match, lookup_answer, normalize_answer};
use crate::model::{PassStatus, Question};

/// Outcome of one graded item (question or test case).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub weight: f64,
    pub correct: bool,
}

/// Percentage and verdict for a set of items.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreOutcome {
    /// 0-100.
    pub percentage: f64,
    pub verdict: PassStatus,
}

/// `pass` iff `percentage >= passing` (inclusive).
pub fn verdict(percentage: f64, passing: f64) -> PassStatus {
    if percentage >= passing {
        PassStatus::Pass
    } else {
        PassStatus::Fail
    }
}

/// Earned weight over total weight, as a clamped percentage.
///
/// Negative or non-finite weights count as zero. With no weight at all the
/// percentage is 0.
pub fn score(results: &[ItemResult], passing: f64) -> ScoreOutcome {
    let weight = |r: &ItemResult| {
        if r.weight.is_finite() && r.weight > 0.0 {
            r.weight
        } else {
            0.0
        }
    };
    let total: f64 = results.iter().map(weight).sum();
    let earned: f64 = results.iter().filter(|r| r.correct).map(weight).sum();

    let percentage = if total > 0.0 {
        (earned / total * 100.0).clamp(0.0, 100.0)
    } else {
        0.0
    };

    ScoreOutcome {
        percentage,
        verdict: verdict(percentage, passing),
    }
}

/// Round to `places` decimals.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// A question the learner got wrong, as fed to the synthesizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncorrectItem {
    pub question_id: String,
    pub question: String,
    pub correct_answer: String,
    pub user_answer: String,
    pub topic: String,
    pub points: f64,
}

/// Per-question results and the overall outcome of a quiz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizGrading {
    pub items: Vec<ItemResult>,
    pub incorrect: Vec<IncorrectItem>,
    pub outcome: ScoreOutcome,
    pub questions_total: usize,
    /// Questions for which some answer key was found.
    pub questions_attempted: usize,
}

/// Grade `answers` against the presented `questions`.
pub fn grade_quiz(
    questions: &[Question],
    answers: &Map<String, Value>,
    passing: f64,
    config: &EngineConfig,
) -> QuizGrading {
    let mut items = Vec::with_capacity(questions.len());
    let mut incorrect = Vec::new();
    let mut attempted = 0usize;

    for (index, question) in questions.iter().enumerate() {
        let points = question.points.unwrap_or(config.default_question_points);
        let (matched_key, user_answer) = lookup_answer(answers, question, index);
        if matched_key.is_some() {
            attempted += 1;
        }
        let correct = answers_match(&user_answer, &question.correct_answer);

        tracing::debug!(
            question = index + 1,
            id = %question.id,
            key = ?matched_key,
            user = %normalize_answer(&user_answer),
            expected = %normalize_answer(&question.correct_answer),
            correct,
            "graded question"
        );

        items.push(ItemResult {
            weight: points,
            correct,
        });
        if !correct {
            incorrect.push(IncorrectItem {
                question_id: question.id.clone(),
                question: question.text.clone(),
                correct_answer: question.correct_answer.clone(),
                user_answer,
                topic: question
                    .topic
                    .clone()
                    .unwrap_or_else(|| crate::model::GENERAL_SKILL.to_string()),
                points,
            });
        }
    }

    let outcome = score(&items, passing);
    QuizGrading {
        items,
        incorrect,
        outcome,
        questions_total: questions.len(),
        questions_attempted: attempted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionKind;
    use serde_json::json;

    fn item(weight: f64, correct: bool) -> ItemResult {
        ItemResult { weight, correct }
    }

    fn question(id: &str, answer: &str, points: Option<f64>) -> Question {
        Question {
            id: id.into(),
            text: format!("Question {id}"),
            kind: QuestionKind::SingleChoice,
            options: vec![],
            correct_answer: answer.into(),
            points,
            topic: None,
            explanation: None,
        }
    }

    #[test]
    fn weighted_percentage() {
        let outcome = score(&[item(10.0, true), item(30.0, false)], 70.0);
        assert!((outcome.percentage - 25.0).abs() < f64::EPSILON);
        assert_eq!(outcome.verdict, PassStatus::Fail);
    }

    #[test]
    fn zero_total_weight_is_zero_percent() {
        assert_eq!(score(&[], 0.0).percentage, 0.0);
        assert_eq!(score(&[item(0.0, true)], 50.0).percentage, 0.0);
        assert_eq!(score(&[item(-5.0, true), item(f64::NAN, true)], 50.0).percentage, 0.0);
    }

    #[test]
    fn passing_boundary_is_inclusive() {
        assert_eq!(verdict(60.0, 60.0), PassStatus::Pass);
        assert_eq!(verdict(59.999, 60.0), PassStatus::Fail);
        for p in 0..=100 {
            let pct = p as f64;
            assert_eq!(verdict(pct, 60.0) == PassStatus::Pass, pct >= 60.0);
        }
    }

    #[test]
    fn all_correct_is_hundred() {
        let outcome = score(&[item(10.0, true), item(5.0, true)], 100.0);
        assert_eq!(outcome.percentage, 100.0);
        assert_eq!(outcome.verdict, PassStatus::Pass);
    }

    #[test]
    fn round_to_places() {
        assert_eq!(round_to(66.666_666, 2), 66.67);
        assert_eq!(round_to(79.95, 1), 80.0);
    }

    #[test]
    fn grade_quiz_collects_incorrect_items() {
        let config = EngineConfig::default();
        let questions = vec![
            question("a", "4", None),
            question("b", "true", Some(20.0)),
            question("c", "Rust", None),
        ];
        let answers = json!({"a": "4", "q2": "no"}).as_object().cloned().unwrap();

        let graded = grade_quiz(&questions, &answers, 70.0, &config);
        assert_eq!(graded.questions_total, 3);
        assert_eq!(graded.questions_attempted, 2);
        assert_eq!(graded.incorrect.len(), 2);
        assert_eq!(graded.incorrect[0].question_id, "b");
        assert_eq!(graded.incorrect[0].user_answer, "no");
        assert_eq!(graded.incorrect[1].user_answer, "");
        assert_eq!(graded.incorrect[1].topic, "General");
        assert!((graded.outcome.percentage - 25.0).abs() < 1e-9);
        assert_eq!(graded.outcome.verdict, PassStatus::Fail);
    }
}
