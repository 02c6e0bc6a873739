//! Qualitative feedback from a language model, with deterministic fallback.
//!
//! Each grading call walks an explicit state machine:
//!
//! ```text
//! REQUEST ─► PARSE ─► SUCCESS
//!    │         │
//!    └────┬────┘
//!         ▼
//! RETRY_INDIVIDUAL (quiz only) ─► TEMPLATE_FALLBACK
//! ```
//!
//! Every stage is a plain function returning a value, so stages can be tested
//! in isolation. The template stage cannot fail and never touches the model.
//! The output is untyped; callers pass it through
//! [`sanitize`](crate::sanitize::sanitize) before persisting.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::model::Assessment;
use crate::sanitize::{OVERALL_KEYS, STRENGTH_KEYS, SUGGESTION_KEYS, WEAKNESS_KEYS};
use crate::scorer::{round_to, IncorrectItem};
use crate::traits::{extract_json_object, GenerateRequest, LlmProvider, DEFAULT_SYSTEM_PROMPT};

/// Field groups a quiz reply must carry; any key of a group satisfies it.
pub const QUIZ_REQUIRED: &[&[&str]] = &[OVERALL_KEYS, STRENGTH_KEYS, WEAKNESS_KEYS, SUGGESTION_KEYS];

const SCORE_KEYS: &[&str] = &["score"];

/// Field groups an assignment reply must carry.
pub const ASSIGNMENT_REQUIRED: &[&[&str]] = &[SCORE_KEYS, OVERALL_KEYS, WEAKNESS_KEYS];

const EXPLANATION_SYSTEM_PROMPT: &str =
    "You are a patient tutor. Answer in plain text, one or two short sentences, addressing the learner directly.";

const STANDARD_CRITERIA: &str = "Standard Professional Assessment Criteria:
- Content Quality & Depth (30%): Technical accuracy, depth of analysis, completeness
- Communication & Clarity (25%): Writing quality, organization, clarity of expression
- Professional Presentation (20%): Structure, formatting, professionalism
- Critical Thinking (15%): Analysis, insights, problem-solving approach
- Practical Application (10%): Real-world relevance, actionable recommendations
";

const DESCRIPTION_PROMPT_CHARS: usize = 500;
const SUBMISSION_PROMPT_CHARS: usize = 2000;

/// Which stage produced the feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackSource {
    Model,
    IndividualRetry,
    Template,
}

/// Result of a synthesis run.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    /// Raw feedback object, not yet sanitized.
    pub feedback: Value,
    pub source: FeedbackSource,
    /// Score decided during synthesis. Only the assignment path sets it.
    pub score: Option<f64>,
}

/// Why a model-backed stage did not produce usable output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SynthesisFailure {
    #[error("model call timed out after {0}s")]
    Timeout(u64),

    #[error("provider error: {message}")]
    Provider { message: String, permanent: bool },

    #[error("no JSON object in model reply")]
    NoJson,

    #[error("malformed JSON: {0}")]
    Malformed(String),

    #[error("model reply is not a JSON object")]
    NotAnObject,

    #[error("model reply is missing required field `{0}`")]
    MissingField(&'static str),
}

impl SynthesisFailure {
    /// Further model calls in this run would fail the same way.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SynthesisFailure::Provider { permanent: true, .. })
    }

    /// No further model calls are made in this run after this failure.
    ///
    /// A timed-out model is treated as hung for the rest of the call, so a
    /// synthesis waits for at most one timeout.
    pub fn ends_model_use(&self) -> bool {
        self.is_permanent() || matches!(self, SynthesisFailure::Timeout(_))
    }

    fn from_provider(err: &anyhow::Error) -> Self {
        let permanent = err
            .downcast_ref::<ProviderError>()
            .is_some_and(ProviderError::is_permanent);
        SynthesisFailure::Provider {
            message: format!("{err:#}"),
            permanent,
        }
    }
}

/// What the quiz prompt and templates need to know about a graded attempt.
#[derive(Debug, Clone, Copy)]
pub struct QuizContext<'a> {
    pub assessment_title: &'a str,
    pub score: f64,
    pub passing_score: f64,
    pub total_questions: usize,
    pub incorrect: &'a [IncorrectItem],
}

/// An assignment submission under review.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentContext<'a> {
    pub assessment: &'a Assessment,
    pub text: &'a str,
    pub passing_score: f64,
}

enum Stage {
    Request,
    Parse(String),
    RetryIndividual { allow_model: bool },
    TemplateFallback { explanations: Vec<String>, from_model: usize },
}

/// Drives the feedback state machine against one provider.
pub struct FeedbackSynthesizer {
    provider: Arc<dyn LlmProvider>,
}

impl FeedbackSynthesizer {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Feedback for a scored quiz.
    pub async fn synthesize_quiz(&self, ctx: &QuizContext<'_>, config: &EngineConfig) -> Synthesis {
        let mut stage = if config.enable_model_feedback {
            Stage::Request
        } else {
            Stage::RetryIndividual { allow_model: false }
        };

        loop {
            stage = match stage {
                Stage::Request => {
                    let prompt = build_quiz_prompt(ctx, config);
                    match self.request(prompt, DEFAULT_SYSTEM_PROMPT, config).await {
                        Ok(raw) => Stage::Parse(raw),
                        Err(failure) => {
                            warn!(error = %failure, "quiz feedback request failed");
                            Stage::RetryIndividual {
                                allow_model: !failure.ends_model_use(),
                            }
                        }
                    }
                }
                Stage::Parse(raw) => match parse_model_feedback(&raw, QUIZ_REQUIRED) {
                    Ok(map) => {
                        return Synthesis {
                            feedback: complete_quiz_feedback(map, ctx, config),
                            source: FeedbackSource::Model,
                            score: None,
                        };
                    }
                    Err(failure) => {
                        warn!(error = %failure, "quiz feedback unusable");
                        Stage::RetryIndividual { allow_model: true }
                    }
                },
                Stage::RetryIndividual { allow_model } => {
                    let (explanations, from_model) =
                        self.explain_items(ctx.incorrect, config, allow_model).await;
                    Stage::TemplateFallback {
                        explanations,
                        from_model,
                    }
                }
                Stage::TemplateFallback {
                    explanations,
                    from_model,
                } => {
                    let source = if from_model > 0 {
                        FeedbackSource::IndividualRetry
                    } else {
                        FeedbackSource::Template
                    };
                    return Synthesis {
                        feedback: quiz_template(ctx, explanations, config),
                        source,
                        score: None,
                    };
                }
            };
        }
    }

    /// Feedback and score for an assignment.
    pub async fn synthesize_assignment(
        &self,
        ctx: &AssignmentContext<'_>,
        config: &EngineConfig,
    ) -> Synthesis {
        let mut stage = if config.enable_model_feedback {
            Stage::Request
        } else {
            Stage::TemplateFallback {
                explanations: Vec::new(),
                from_model: 0,
            }
        };

        loop {
            stage = match stage {
                Stage::Request => {
                    let prompt = build_assignment_prompt(ctx);
                    match self.request(prompt, DEFAULT_SYSTEM_PROMPT, config).await {
                        Ok(raw) => Stage::Parse(raw),
                        Err(failure) => {
                            warn!(error = %failure, "assignment feedback request failed");
                            Stage::TemplateFallback {
                                explanations: Vec::new(),
                                from_model: 0,
                            }
                        }
                    }
                }
                Stage::Parse(raw) => match parse_model_feedback(&raw, ASSIGNMENT_REQUIRED) {
                    Ok(map) => {
                        let (feedback, score) = complete_assignment_feedback(map, config);
                        return Synthesis {
                            feedback,
                            source: FeedbackSource::Model,
                            score: Some(score),
                        };
                    }
                    Err(failure) => {
                        warn!(error = %failure, "assignment feedback unusable");
                        Stage::TemplateFallback {
                            explanations: Vec::new(),
                            from_model: 0,
                        }
                    }
                },
                // Assignments have no per-item retry.
                Stage::RetryIndividual { .. } | Stage::TemplateFallback { .. } => {
                    let (feedback, score) = assignment_template(ctx.text, config);
                    return Synthesis {
                        feedback,
                        source: FeedbackSource::Template,
                        score: Some(score),
                    };
                }
            };
        }
    }

    /// One bounded model call.
    async fn request(
        &self,
        prompt: String,
        system_prompt: &str,
        config: &EngineConfig,
    ) -> Result<String, SynthesisFailure> {
        let request = GenerateRequest {
            model: config.model.clone(),
            prompt,
            system_prompt: Some(system_prompt.to_string()),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        let limit = Duration::from_secs(config.model_timeout_secs);

        match tokio::time::timeout(limit, self.provider.generate(&request)).await {
            Err(_) => Err(SynthesisFailure::Timeout(config.model_timeout_secs)),
            Ok(Err(e)) => Err(SynthesisFailure::from_provider(&e)),
            Ok(Ok(response)) => {
                debug!(
                    provider = self.provider.name(),
                    latency_ms = response.latency_ms,
                    tokens = response.token_usage.total_tokens,
                    "model replied"
                );
                Ok(response.content)
            }
        }
    }

    /// RETRY_INDIVIDUAL: one short explanation per incorrect item.
    ///
    /// Returns the error sentences and how many of them the model wrote.
    async fn explain_items(
        &self,
        incorrect: &[IncorrectItem],
        config: &EngineConfig,
        allow_model: bool,
    ) -> (Vec<String>, usize) {
        let mut explanations = Vec::new();
        let mut from_model = 0;
        let mut allow_model = allow_model;

        for item in incorrect.iter().take(config.max_incorrect_details) {
            let mut explanation = None;
            if allow_model {
                match self
                    .request(build_explanation_prompt(item), EXPLANATION_SYSTEM_PROMPT, config)
                    .await
                {
                    Ok(text) if !text.trim().is_empty() => {
                        explanation = Some(text.trim().replace('"', "'"));
                    }
                    Ok(_) => warn!(question = %item.question_id, "empty explanation"),
                    Err(failure) => {
                        warn!(question = %item.question_id, error = %failure, "explanation failed");
                        allow_model = !failure.ends_model_use();
                    }
                }
            }
            let explanation = match explanation {
                Some(text) => {
                    from_model += 1;
                    text
                }
                None => fallback_explanation(item),
            };
            explanations.push(error_sentence(item, &explanation));
        }

        (explanations, from_model)
    }
}

// ---------------------------------------------------------------------------
// REQUEST: prompts
// ---------------------------------------------------------------------------

/// Prompt asking for the whole quiz feedback object.
pub fn build_quiz_prompt(ctx: &QuizContext<'_>, config: &EngineConfig) -> String {
    let correct = ctx.total_questions.saturating_sub(ctx.incorrect.len());
    let mut prompt = format!(
        "You are a Corporate HR Learning & Development Specialist evaluating a technical assessment.

Assessment: {title}
Score Achieved: {score:.1}%
Passing Threshold: {passing}%
Questions Answered Correctly: {correct}/{total}
",
        title = ctx.assessment_title,
        score = ctx.score,
        passing = ctx.passing_score,
        total = ctx.total_questions,
    );

    if ctx.incorrect.is_empty() {
        prompt.push_str("\nAll questions were answered correctly.\n");
    } else {
        prompt.push_str("\nAREAS REQUIRING ATTENTION:\n");
        for (i, item) in ctx.incorrect.iter().take(config.max_incorrect_details).enumerate() {
            prompt.push_str(&format!(
                "\n{n}. Topic: {topic}\n   Question: {question}\n   Expected: {expected}\n   Response: {response}\n",
                n = i + 1,
                topic = item.topic,
                question = item.question,
                expected = item.correct_answer,
                response = display_answer(&item.user_answer),
            ));
        }
    }

    prompt.push_str(
        r#"
Provide your evaluation as a JSON object with exactly these fields:
{
  "overall_comment": "2-3 sentence professional summary of performance",
  "strengths": ["strength 1", "strength 2"],
  "weaknesses": ["development area 1 with specific topic", "area 2"],
  "suggestions": ["actionable recommendation 1", "recommendation 2"],
  "missing_points": ["concept missed 1", "concept missed 2"],
  "errors": ["For '<question>', you answered '<answer>' but the correct answer is '<correct>' because <reason>"],
  "improvements": ["specific improvement 1", "improvement 2"],
  "risk_level": "low | medium | high"
}

Return ONLY valid JSON, no additional text or markdown."#,
    );
    prompt
}

/// Prompt for one incorrect item.
pub fn build_explanation_prompt(item: &IncorrectItem) -> String {
    format!(
        "Question: {}\nUser Answer: {}\nCorrect Answer: {}\n\n\
         Explain why the user's answer is wrong and why the correct answer is right. \
         Keep it to 1-2 short, helpful sentences. Address the user directly (\"You...\").",
        item.question,
        display_answer(&item.user_answer),
        item.correct_answer,
    )
}

/// Prompt asking for an assignment review and score.
pub fn build_assignment_prompt(ctx: &AssignmentContext<'_>) -> String {
    let assessment = ctx.assessment;
    let mut prompt = format!(
        "You are a Corporate HR Learning & Development Specialist evaluating a written assignment.

ASSIGNMENT DETAILS:
Title: {title}
Requirement: {description}
",
        title = assessment.title,
        description = truncate_chars(&assessment.description, DESCRIPTION_PROMPT_CHARS),
    );
    if let Some(instructions) = assessment.instructions.as_deref() {
        prompt.push_str(&format!("Instructions: {instructions}\n"));
    }
    prompt.push_str(&format!(
        "Maximum Score: {max}\nPassing Threshold: {passing}\n\nCANDIDATE'S SUBMISSION:\n{text}\n\nEVALUATION CRITERIA:\n",
        max = assessment.max_score,
        passing = ctx.passing_score,
        text = truncate_chars(ctx.text, SUBMISSION_PROMPT_CHARS),
    ));

    match assessment.rubric.as_ref().filter(|r| !r.is_empty()) {
        Some(rubric) => {
            prompt.push_str("Assessment Rubric:\n");
            for (criterion, details) in rubric {
                prompt.push_str(&format!("- {criterion}: {details}\n"));
            }
        }
        None => prompt.push_str(STANDARD_CRITERIA),
    }

    prompt.push_str(
        r#"
Provide your evaluation as a JSON object:
{
  "score": <number between 0-100>,
  "overall_comment": "Professional 2-3 sentence summary of submission quality",
  "strengths": ["strength 1", "strength 2"],
  "weaknesses": ["area needing development 1 with actionable guidance", "area 2"],
  "suggestions": ["training or resource recommendation 1", "recommendation 2"],
  "rubric_scores": {"<criterion>": <number between 0-100>},
  "risk_level": "low | medium | high"
}

SCORING GUIDANCE:
- 90-100: Exceptional work exceeding professional standards
- 80-89: Proficient work meeting all requirements
- 70-79: Adequate work meeting minimum standards with some gaps
- 60-69: Developing work with significant improvement needed
- Below 60: Insufficient quality requiring comprehensive revision

Return ONLY valid JSON."#,
    );
    prompt
}

fn display_answer(answer: &str) -> &str {
    if answer.trim().is_empty() {
        "(no answer)"
    } else {
        answer
    }
}

/// The first `max` characters of `s`.
fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// PARSE
// ---------------------------------------------------------------------------

/// Extract and validate the feedback object from a raw model reply.
pub fn parse_model_feedback(
    raw: &str,
    required: &[&[&'static str]],
) -> Result<Map<String, Value>, SynthesisFailure> {
    let json = extract_json_object(raw).ok_or(SynthesisFailure::NoJson)?;
    let value: Value =
        serde_json::from_str(json).map_err(|e| SynthesisFailure::Malformed(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(SynthesisFailure::NotAnObject);
    };

    for group in required {
        let present = group
            .iter()
            .any(|key| map.get(*key).is_some_and(|v| !v.is_null()));
        if !present {
            return Err(SynthesisFailure::MissingField(group.first().copied().unwrap_or("?")));
        }
    }
    Ok(map)
}

/// Fill the fields the grader owns; the model's own versions are replaced.
fn complete_quiz_feedback(
    mut map: Map<String, Value>,
    ctx: &QuizContext<'_>,
    config: &EngineConfig,
) -> Value {
    let missed = ctx.incorrect.iter().take(config.max_feedback_items);
    let missing: Vec<&str> = missed.clone().map(|i| i.question.as_str()).collect();
    let errors: Vec<String> = missed.map(expected_sentence).collect();
    map.insert("missing_points".into(), json!(missing));
    map.insert("errors".into(), json!(errors));
    map.insert("accuracy_score".into(), json!(round_to(ctx.score, 2)));
    if !map.get("risk_level").is_some_and(Value::is_string) {
        let band = config.quiz_band(ctx.score);
        map.insert("risk_level".into(), json!(band.risk_level.as_str()));
    }
    Value::Object(map)
}

fn complete_assignment_feedback(mut map: Map<String, Value>, config: &EngineConfig) -> (Value, f64) {
    let score = map
        .get("score")
        .and_then(numeric)
        .map(|s| s.clamp(0.0, 100.0))
        .unwrap_or(config.assignment_default_score);
    let score = round_to(score, 2);
    map.insert("score".into(), json!(score));
    if !map.get("risk_level").is_some_and(Value::is_string) {
        let band = config.assignment_band(score);
        map.insert("risk_level".into(), json!(band.risk_level.as_str()));
    }
    (Value::Object(map), score)
}

fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

// ---------------------------------------------------------------------------
// RETRY_INDIVIDUAL / TEMPLATE_FALLBACK
// ---------------------------------------------------------------------------

/// Sentence used when no model explanation is available.
pub fn fallback_explanation(item: &IncorrectItem) -> String {
    format!("The correct answer is '{}'.", item.correct_answer)
}

fn expected_sentence(item: &IncorrectItem) -> String {
    format!(
        "For '{}', expected '{}' but got '{}'.",
        item.question, item.correct_answer, item.user_answer
    )
}

fn error_sentence(item: &IncorrectItem, explanation: &str) -> String {
    if item.user_answer.trim().is_empty() {
        format!("For '{}', you did not answer. {explanation}", item.question)
    } else {
        format!(
            "For '{}', you answered '{}'. {explanation}",
            item.question, item.user_answer
        )
    }
}

/// Deterministic quiz feedback for `ctx.score`.
pub fn quiz_template(ctx: &QuizContext<'_>, explanations: Vec<String>, config: &EngineConfig) -> Value {
    let band = config.quiz_band(ctx.score);
    let missing: Vec<&str> = ctx.incorrect.iter().map(|i| i.question.as_str()).collect();
    let weaknesses = if ctx.incorrect.is_empty() && ctx.total_questions > 0 {
        vec!["None identified".to_string()]
    } else {
        band.weaknesses.clone()
    };

    json!({
        "overall_comment": band.render_comment(ctx.score),
        "strengths": band.strengths,
        "weaknesses": weaknesses,
        "suggestions": band.suggestions,
        "missing_points": missing,
        "errors": explanations,
        "improvements": band.improvements,
        "risk_level": band.risk_level.as_str(),
        "accuracy_score": round_to(ctx.score, 2),
    })
}

/// Score derived from submission length when the model is unavailable.
pub fn assignment_fallback_score(text: &str) -> f64 {
    match text.split_whitespace().count() {
        n if n > 500 => 85.0,
        n if n > 200 => 75.0,
        n if n > 50 => 60.0,
        _ => 45.0,
    }
}

/// Deterministic assignment feedback and score.
pub fn assignment_template(text: &str, config: &EngineConfig) -> (Value, f64) {
    let score = assignment_fallback_score(text);
    let band = config.assignment_band(score);
    let feedback = json!({
        "score": score,
        "overall_comment": band.render_comment(score),
        "strengths": band.strengths,
        "weaknesses": band.weaknesses,
        "suggestions": band.suggestions,
        "missing_points": [],
        "errors": [],
        "improvements": band.improvements,
        "risk_level": band.risk_level.as_str(),
    });
    (feedback, score)
}
