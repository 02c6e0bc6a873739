//! Untyped feedback → [`FeedbackContract`].
//!
//! The model answers in whatever shape it likes and the templates use a
//! slightly different vocabulary again. [`sanitize`] is the only place
//! those shapes are read; it never fails and is idempotent:
//! `sanitize(&sanitize(x).to_value()) == sanitize(x)`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::feedback::{FeedbackContract, FeedbackRisk};

/// Cap on every list field of the contract.
pub const MAX_LIST_ITEMS: usize = 4;

/// Comment used when the source has none.
pub const DEFAULT_OVERALL_COMMENT: &str = "Assessment evaluated successfully.";

pub(crate) const OVERALL_KEYS: &[&str] = &["overall_comment", "overall_assessment", "overall", "feedback"];
pub(crate) const STRENGTH_KEYS: &[&str] = &["strengths", "key_strengths"];
pub(crate) const WEAKNESS_KEYS: &[&str] = &["weaknesses", "development_areas", "areas_for_improvement"];
pub(crate) const SUGGESTION_KEYS: &[&str] = &[
    "suggestions",
    "recommended_actions",
    "actionable_suggestions",
    "developmental_recommendations",
];
const MISSING_KEYS: &[&str] = &["missing_points"];
const ERROR_KEYS: &[&str] = &["errors"];
const IMPROVEMENT_KEYS: &[&str] = &[
    "improvements",
    "recommended_actions",
    "developmental_recommendations",
];

/// Coerce arbitrary feedback data into the fixed contract.
pub fn sanitize(raw: &Value) -> FeedbackContract {
    sanitize_capped(raw, MAX_LIST_ITEMS)
}

/// [`sanitize`] with a caller-chosen cap on list fields.
///
/// The cap can only tighten [`MAX_LIST_ITEMS`], never loosen it.
pub fn sanitize_capped(raw: &Value, max_items: usize) -> FeedbackContract {
    let max_items = max_items.min(MAX_LIST_ITEMS);
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let list = |keys: &[&str]| string_list(first_present(obj, keys), max_items);

    FeedbackContract {
        overall_comment: overall_comment(obj),
        strengths: list(STRENGTH_KEYS),
        weaknesses: list(WEAKNESS_KEYS),
        suggestions: list(SUGGESTION_KEYS),
        missing_points: list(MISSING_KEYS),
        errors: list(ERROR_KEYS),
        improvements: list(IMPROVEMENT_KEYS),
        risk_level: obj
            .get("risk_level")
            .and_then(Value::as_str)
            .map(FeedbackRisk::parse_lenient)
            .unwrap_or_default(),
        accuracy_score: obj.get("accuracy_score").and_then(number),
        test_score: obj.get("test_score").and_then(number),
        style_score: obj.get("style_score").and_then(number),
        rubric_scores: rubric_scores(obj.get("rubric_scores")),
    }
}

/// First key in `keys` whose value is present and not null.
fn first_present<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn overall_comment(obj: &Map<String, Value>) -> String {
    OVERALL_KEYS
        .iter()
        .filter_map(|k| obj.get(*k))
        .filter(|v| !v.is_null())
        .map(render)
        .find(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_OVERALL_COMMENT.to_string())
}

fn string_list(value: Option<&Value>, max_items: usize) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().take(max_items).map(render).collect(),
        Some(scalar) => vec![render(scalar)],
    }
}

/// Plain-text rendering of one JSON value.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// A finite number, or a string holding one.
fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn rubric_scores(value: Option<&Value>) -> BTreeMap<String, f64> {
    match value {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), number(v).unwrap_or(0.0)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_idempotent(raw: Value) {
        let once = sanitize(&raw);
        let twice = sanitize(&once.to_value());
        assert_eq!(once, twice, "not idempotent for {raw}");
    }

    #[test]
    fn empty_object_gets_defaults() {
        let c = sanitize(&json!({}));
        assert_eq!(c.overall_comment, DEFAULT_OVERALL_COMMENT);
        assert!(c.lists().iter().all(|l| l.is_empty()));
        assert_eq!(c.risk_level, FeedbackRisk::Low);
        assert!(c.accuracy_score.is_none());
        assert!(c.rubric_scores.is_empty());
    }

    #[test]
    fn non_object_input_gets_defaults() {
        for raw in [json!(null), json!("text"), json!([1, 2]), json!(42)] {
            let c = sanitize(&raw);
            assert_eq!(c.overall_comment, DEFAULT_OVERALL_COMMENT);
            assert_eq!(c.risk_level, FeedbackRisk::Low);
        }
    }

    #[test]
    fn lists_are_stringified_and_capped() {
        let c = sanitize(&json!({
            "strengths": ["a", 1, true, {"k": "v"}, ["x"], "dropped by cap"],
            "weaknesses": "single string",
            "errors": null,
        }));
        assert_eq!(c.strengths, vec!["a", "1", "true", "{\"k\":\"v\"}"]);
        assert_eq!(c.weaknesses, vec!["single string"]);
        assert!(c.errors.is_empty());
    }

    #[test]
    fn aliases_are_accepted() {
        let c = sanitize(&json!({
            "overall_assessment": "Solid work.",
            "development_areas": ["lifetimes"],
            "recommended_actions": ["read the book", "pair with mentor"],
        }));
        assert_eq!(c.overall_comment, "Solid work.");
        assert_eq!(c.weaknesses, vec!["lifetimes"]);
        assert_eq!(c.suggestions, vec!["read the book", "pair with mentor"]);
        assert_eq!(c.improvements, vec!["read the book", "pair with mentor"]);
    }

    #[test]
    fn canonical_key_wins_over_alias() {
        let c = sanitize(&json!({
            "weaknesses": [],
            "development_areas": ["ignored"],
        }));
        assert!(c.weaknesses.is_empty());
    }

    #[test]
    fn blank_comment_falls_back() {
        let c = sanitize(&json!({"overall_comment": "   ", "overall_assessment": "Nice."}));
        assert_eq!(c.overall_comment, "Nice.");
        let c = sanitize(&json!({"overall_comment": ""}));
        assert_eq!(c.overall_comment, DEFAULT_OVERALL_COMMENT);
    }

    #[test]
    fn risk_level_coercion() {
        assert_eq!(sanitize(&json!({"risk_level": "Medium"})).risk_level, FeedbackRisk::Medium);
        assert_eq!(sanitize(&json!({"risk_level": "critical"})).risk_level, FeedbackRisk::High);
        assert_eq!(sanitize(&json!({"risk_level": 3})).risk_level, FeedbackRisk::Low);
        assert_eq!(sanitize(&json!({"risk_level": "severe"})).risk_level, FeedbackRisk::Low);
    }

    #[test]
    fn numeric_scores_coercion() {
        let c = sanitize(&json!({
            "accuracy_score": "62.5",
            "test_score": "NaN",
            "style_score": {"x": 1},
            "rubric_scores": {"clarity": 80, "depth": "n/a", "structure": "70"},
        }));
        assert_eq!(c.accuracy_score, Some(62.5));
        assert!(c.test_score.is_none());
        assert!(c.style_score.is_none());
        assert_eq!(c.rubric_scores["clarity"], 80.0);
        assert_eq!(c.rubric_scores["depth"], 0.0);
        assert_eq!(c.rubric_scores["structure"], 70.0);
    }

    #[test]
    fn custom_cap_applies_to_every_list() {
        let c = sanitize_capped(&json!({"errors": ["a", "b", "c"], "strengths": ["x", "y"]}), 2);
        assert_eq!(c.errors, vec!["a", "b"]);
        assert_eq!(c.strengths, vec!["x", "y"]);
    }

    #[test]
    fn custom_cap_never_exceeds_contract_limit() {
        let raw = json!({"suggestions": ["1", "2", "3", "4", "5", "6", "7"]});
        let c = sanitize_capped(&raw, 6);
        assert_eq!(c.suggestions.len(), MAX_LIST_ITEMS);
        assert_eq!(sanitize(&c.to_value()), c);
    }

    #[test]
    fn rubric_scores_wrong_type_is_empty() {
        assert!(sanitize(&json!({"rubric_scores": [1, 2]})).rubric_scores.is_empty());
    }

    #[test]
    fn idempotent_on_malformed_inputs() {
        assert_idempotent(json!({}));
        assert_idempotent(json!(null));
        assert_idempotent(json!({
            "overall": 12,
            "strengths": [null, {"nested": [1, 2]}, 3.5],
            "development_areas": "one",
            "actionable_suggestions": [[], {}, "", "x", "y"],
            "risk_level": "CRITICAL",
            "accuracy_score": "1e400",
            "rubric_scores": {"a": "7", "b": null, "c": false},
        }));
        assert_idempotent(json!({
            "overall_comment": "ok",
            "errors": ["e1", "e2", "e3", "e4", "e5", "e6"],
            "test_score": 40,
            "style_score": "55.5",
        }));
    }
}
