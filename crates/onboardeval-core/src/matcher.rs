//! Answer normalization and lookup.

use serde_json::{Map, Value};

use crate::model::Question;

/// Lower-case, trim, and fold boolean synonyms to `true`/`false`.
pub fn normalize_answer(value: &str) -> String {
    let text = value.trim().to_lowercase();
    match text.as_str() {
        "true" | "t" | "yes" | "1" => "true".to_string(),
        "false" | "f" | "no" | "0" => "false".to_string(),
        _ => text,
    }
}

/// Compare a submitted answer to the canonical one after normalization.
///
/// An empty answer is never correct, even against an empty canonical value.
pub fn answers_match(submitted: &str, canonical: &str) -> bool {
    let submitted = normalize_answer(submitted);
    !submitted.is_empty() && submitted == normalize_answer(canonical)
}

/// Keys tried for the question at `index`, highest priority first:
/// native id, trimmed id, `q{n}`, zero-based index, one-based index.
pub fn candidate_keys(question: &Question, index: usize) -> Vec<String> {
    vec![
        question.id.clone(),
        question.id.trim().to_string(),
        format!("q{}", index + 1),
        index.to_string(),
        (index + 1).to_string(),
    ]
}

/// Find the learner's answer for the question at `index` (position in the
/// presented subset). Returns the matched key alongside the answer text;
/// a missing answer is the empty string.
pub fn lookup_answer(
    answers: &Map<String, Value>,
    question: &Question,
    index: usize,
) -> (Option<String>, String) {
    for key in candidate_keys(question, index) {
        if let Some(value) = answers.get(&key) {
            return (Some(key), answer_text(value));
        }
    }
    (None, String::new())
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionKind;
    use serde_json::json;

    fn question(id: &str) -> Question {
        Question {
            id: id.into(),
            text: "What is 2 + 2?".into(),
            kind: QuestionKind::SingleChoice,
            options: vec!["3".into(), "4".into()],
            correct_answer: "4".into(),
            points: None,
            topic: None,
            explanation: None,
        }
    }

    fn answers(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn normalize_folds_booleans() {
        for t in ["true", " T ", "Yes", "1"] {
            assert_eq!(normalize_answer(t), "true");
        }
        for f in ["FALSE", "f", "no", "0"] {
            assert_eq!(normalize_answer(f), "false");
        }
        assert_eq!(normalize_answer("  Ownership "), "ownership");
    }

    #[test]
    fn match_is_case_and_space_insensitive() {
        assert!(answers_match(" Borrow Checker", "borrow checker"));
        assert!(answers_match("yes", "True"));
        assert!(!answers_match("no", "true"));
        assert!(!answers_match("", ""));
    }

    #[test]
    fn lookup_prefers_native_id() {
        let a = answers(json!({"abc": "4", "q1": "3", "0": "3", "1": "3"}));
        let (key, value) = lookup_answer(&a, &question("abc"), 0);
        assert_eq!(key.as_deref(), Some("abc"));
        assert_eq!(value, "4");
    }

    #[test]
    fn lookup_uses_trimmed_id() {
        let a = answers(json!({"abc": "4"}));
        let (key, _) = lookup_answer(&a, &question(" abc "), 0);
        assert_eq!(key.as_deref(), Some("abc"));
    }

    #[test]
    fn lookup_positional_priority() {
        let a = answers(json!({"q2": "a", "1": "b", "2": "c"}));
        assert_eq!(lookup_answer(&a, &question("x"), 1).1, "a");

        let a = answers(json!({"1": "b", "2": "c"}));
        assert_eq!(lookup_answer(&a, &question("x"), 1).1, "b");

        let a = answers(json!({"2": "c"}));
        assert_eq!(lookup_answer(&a, &question("x"), 1).1, "c");
    }

    #[test]
    fn lookup_missing_is_empty() {
        let a = answers(json!({"other": "4"}));
        let (key, value) = lookup_answer(&a, &question("x"), 3);
        assert!(key.is_none());
        assert_eq!(value, "");
        assert!(!answers_match(&value, "4"));
    }

    #[test]
    fn lookup_stringifies_scalars() {
        let a = answers(json!({"7": 4, "8": true, "9": null}));
        assert_eq!(lookup_answer(&a, &question("7"), 0).1, "4");
        assert_eq!(lookup_answer(&a, &question("8"), 0).1, "true");
        assert_eq!(lookup_answer(&a, &question("9"), 0).1, "");
    }
}
