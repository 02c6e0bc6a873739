//! Central grading orchestrator.
//!
//! Runs Selector → Matcher → Scorer → Synthesizer → Sanitizer for one
//! submission, commits the terminal state, then hands off to the
//! progression updater. Model calls happen before the learner lock is
//! taken; the commit and progression run under it, so two submissions of
//! the same learner are applied one after the other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Local, NaiveDate, Utc};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::{error, field, info, instrument, warn, Span};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::feedback::FeedbackContract;
use crate::model::{
    Assessment, AssessmentKind, PassStatus, Question, Submission, SubmissionStatus,
};
use crate::progression::{ProgressionReport, ProgressionUpdater};
use crate::sanitize::sanitize_capped;
use crate::scorer::{grade_quiz, round_to, verdict};
use crate::selector::{presented_questions, today};
use crate::store::Store;
use crate::synthesizer::{AssignmentContext, FeedbackSource, FeedbackSynthesizer, QuizContext};
use crate::traits::LlmProvider;

/// Default number of submissions graded at once by [`GradingEngine::evaluate_many`].
pub const DEFAULT_PARALLELISM: usize = 4;

/// What the caller gets back for a graded submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingOutcome {
    pub submission_id: u64,
    pub score: f64,
    pub pass_status: PassStatus,
    pub feedback: FeedbackContract,
    pub source: FeedbackSource,
    pub trace_id: Uuid,
    /// Bookkeeping results; failures here never affect the fields above.
    pub progression: ProgressionReport,
}

/// A freshly started attempt and the questions to show for it.
#[derive(Debug, Clone)]
pub struct StartedAttempt {
    pub submission: Submission,
    pub questions: Vec<Question>,
}

/// Learner input for an attempt.
#[derive(Debug, Clone)]
pub enum SubmissionPayload {
    Answers(Map<String, Value>),
    Text(String),
}

/// The grading engine.
pub struct GradingEngine {
    store: Arc<dyn Store>,
    synthesizer: FeedbackSynthesizer,
    progression: ProgressionUpdater,
    config: RwLock<Arc<EngineConfig>>,
    learner_locks: Mutex<HashMap<u64, Arc<tokio::sync::Mutex<()>>>>,
}

impl GradingEngine {
    pub fn new(store: Arc<dyn Store>, provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self {
            progression: ProgressionUpdater::new(Arc::clone(&store)),
            store,
            synthesizer: FeedbackSynthesizer::new(provider),
            config: RwLock::new(Arc::new(config)),
            learner_locks: Mutex::new(HashMap::new()),
        }
    }

    /// The configuration new grading calls will use.
    pub fn config(&self) -> Arc<EngineConfig> {
        let guard = self.config.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Swap in a new configuration. Calls already running keep the old one.
    pub fn replace_config(&self, config: EngineConfig) {
        let mut guard = self.config.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(config);
        info!("engine configuration replaced");
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Create an `in_progress` submission and select today's questions.
    pub async fn start_attempt(
        &self,
        assessment_id: u64,
        learner_id: u64,
    ) -> Result<StartedAttempt, EngineError> {
        let assessment = self
            .store
            .get_assessment(assessment_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(EngineError::AssessmentNotFound(assessment_id))?;

        let submission = self.store.create_submission(assessment_id, learner_id).await?;
        let questions = presented_questions(
            &assessment,
            presentation_date(&submission),
            &self.config(),
        );
        info!(
            submission = submission.id,
            learner = learner_id,
            assessment = assessment_id,
            questions = questions.len(),
            "attempt started"
        );
        Ok(StartedAttempt {
            submission,
            questions,
        })
    }

    /// Record the learner's answers or text and move the attempt to `submitted`.
    ///
    /// Assignment text is also appended to the revision history.
    pub async fn submit(
        &self,
        submission_id: u64,
        payload: SubmissionPayload,
    ) -> Result<Submission, EngineError> {
        let mut submission = self.open_submission(submission_id).await?;
        match payload {
            SubmissionPayload::Answers(answers) => submission.answers = answers,
            SubmissionPayload::Text(text) => {
                let version = self.store.append_revision(submission_id, &text).await?;
                tracing::debug!(submission = submission_id, version, "revision appended");
                submission.text = Some(text);
            }
        }
        submission.status = SubmissionStatus::Submitted;
        self.store.save_submission(&submission).await?;
        Ok(submission)
    }

    /// Look up a submission and its assessment, then [`evaluate`](Self::evaluate).
    pub async fn grade_submission(&self, submission_id: u64) -> Result<GradingOutcome, EngineError> {
        let submission = self.open_submission(submission_id).await?;
        let assessment = self
            .store
            .get_assessment(submission.assessment_id)
            .await?
            .ok_or(EngineError::AssessmentNotFound(submission.assessment_id))?;
        self.evaluate(submission, &assessment).await
    }

    /// Grade a batch with at most `parallelism` submissions in flight.
    ///
    /// Results come back in completion order.
    pub async fn evaluate_many(
        &self,
        submission_ids: &[u64],
        parallelism: usize,
    ) -> Vec<(u64, Result<GradingOutcome, EngineError>)> {
        let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
        let mut futures = FuturesUnordered::new();

        for &id in submission_ids {
            let semaphore = Arc::clone(&semaphore);
            futures.push(async move {
                let _permit = semaphore.acquire_owned().await;
                (id, self.grade_submission(id).await)
            });
        }

        let mut results = Vec::with_capacity(submission_ids.len());
        while let Some(result) = futures.next().await {
            results.push(result);
        }
        results
    }

    /// Grade one submission against its assessment.
    ///
    /// The submission ends in `completed` (returned as `Ok`) or, when the
    /// commit fails, in `failed` (returned as [`EngineError::GradingFailed`]).
    /// Of two overlapping calls for the same submission only the first to
    /// commit wins; the other gets [`EngineError::AlreadyGraded`].
    #[instrument(
        skip_all,
        fields(submission = submission.id, learner = submission.learner_id, trace_id = field::Empty)
    )]
    pub async fn evaluate(
        &self,
        submission: Submission,
        assessment: &Assessment,
    ) -> Result<GradingOutcome, EngineError> {
        if submission.status.is_terminal() {
            return Err(EngineError::AlreadyGraded {
                id: submission.id,
                status: submission.status.to_string(),
            });
        }
        let trace_id = Uuid::new_v4();
        Span::current().record("trace_id", field::display(trace_id));

        let config = self.config();
        let passing = assessment.passing_threshold(config.default_passing_score);

        let (score, pass_status, synthesis) = match assessment.kind {
            AssessmentKind::Quiz => {
                let questions =
                    presented_questions(assessment, presentation_date(&submission), &config);
                let graded = grade_quiz(&questions, &submission.answers, passing, &config);
                let score = round_to(graded.outcome.percentage, 2);
                let ctx = QuizContext {
                    assessment_title: &assessment.title,
                    score,
                    passing_score: passing,
                    total_questions: graded.questions_total,
                    incorrect: &graded.incorrect,
                };
                let synthesis = self.synthesizer.synthesize_quiz(&ctx, &config).await;
                (score, verdict(score, passing), synthesis)
            }
            AssessmentKind::Assignment => {
                let ctx = AssignmentContext {
                    assessment,
                    text: submission.text.as_deref().unwrap_or_default(),
                    passing_score: passing,
                };
                let synthesis = self.synthesizer.synthesize_assignment(&ctx, &config).await;
                let score = round_to(synthesis.score.unwrap_or(config.assignment_default_score), 2);
                (score, verdict(score, passing), synthesis)
            }
        };
        let feedback = sanitize_capped(&synthesis.feedback, config.max_feedback_items);

        let lock = self.learner_lock(submission.learner_id);
        let _guard = lock.lock().await;

        // Another call may have committed this submission while the model ran.
        if let Some(current) = self.store.get_submission(submission.id).await? {
            if current.status.is_terminal() {
                warn!(status = %current.status, "submission graded concurrently, discarding result");
                return Err(EngineError::AlreadyGraded {
                    id: current.id,
                    status: current.status.to_string(),
                });
            }
        }

        let committed = Submission {
            score: Some(score),
            pass_status: Some(pass_status),
            status: SubmissionStatus::Completed,
            feedback: Some(feedback.clone()),
            error: None,
            trace_id: Some(trace_id),
            graded_at: Some(Utc::now()),
            ..submission
        };

        if let Err(e) = self.store.save_submission(&committed).await {
            let reason = e.to_string();
            error!(error = %reason, "failed to commit graded submission");
            if let Err(mark) = self.store.mark_failed(committed.id, &reason).await {
                error!(error = %mark, "failed to mark submission as failed");
            }
            return Err(EngineError::GradingFailed {
                id: committed.id,
                reason,
            });
        }

        let progression = self.progression.apply(&committed, assessment, &config).await;

        info!(
            score,
            pass_status = %pass_status,
            source = ?synthesis.source,
            progression_errors = progression.errors.len(),
            "submission graded"
        );

        Ok(GradingOutcome {
            submission_id: committed.id,
            score,
            pass_status,
            feedback,
            source: synthesis.source,
            trace_id,
            progression,
        })
    }

    /// A submission that exists and has not been graded yet.
    async fn open_submission(&self, submission_id: u64) -> Result<Submission, EngineError> {
        let submission = self
            .store
            .get_submission(submission_id)
            .await?
            .ok_or(EngineError::SubmissionNotFound(submission_id))?;
        if submission.status.is_terminal() {
            return Err(EngineError::AlreadyGraded {
                id: submission_id,
                status: submission.status.to_string(),
            });
        }
        Ok(submission)
    }

    fn learner_lock(&self, learner_id: u64) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .learner_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(learner_id).or_default())
    }
}

/// Local calendar day on which the attempt's questions were selected.
fn presentation_date(submission: &Submission) -> NaiveDate {
    let started = submission.submitted_at.with_timezone(&Local).date_naive();
    if started > today() {
        today()
    } else {
        started
    }
}
