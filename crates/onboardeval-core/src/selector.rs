//! Deterministic daily question selection.
//!
//! Everyone who opens the same quiz on the same calendar day gets the same
//! subset, and grading re-derives exactly that subset. The seeded `StdRng`
//! stream is fixed for a given `rand` release, which the lockfile pins.

use chrono::{Datelike, Local, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::config::EngineConfig;
use crate::model::{Assessment, AssessmentKind, Question};

/// Today in local time; the subset rolls over at local midnight.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Seed for `(date, assessment_id)`.
///
/// The date occupies the high half as `YYYYMMDD` so two assessments never
/// collide on the same day.
pub fn daily_seed(date: NaiveDate, assessment_id: u64) -> u64 {
    let day = date.year() as u64 * 10_000 + date.month() as u64 * 100 + date.day() as u64;
    (day << 32) ^ assessment_id
}

/// Narrow `bank` to `count` questions for `date`.
///
/// Banks no larger than `count` come back unchanged. Otherwise the sample is
/// returned in bank order.
pub fn select_daily_questions(
    bank: &[Question],
    count: usize,
    assessment_id: u64,
    date: NaiveDate,
) -> Vec<Question> {
    if bank.len() <= count {
        return bank.to_vec();
    }

    let mut rng = StdRng::seed_from_u64(daily_seed(date, assessment_id));
    let mut picked = index::sample(&mut rng, bank.len(), count).into_vec();
    picked.sort_unstable();

    picked.into_iter().map(|i| bank[i].clone()).collect()
}

/// The questions a learner sees (and is graded on) for `date`.
///
/// Only quizzes are narrowed; assignments keep their full bank.
pub fn presented_questions(
    assessment: &Assessment,
    date: NaiveDate,
    config: &EngineConfig,
) -> Vec<Question> {
    match assessment.kind {
        AssessmentKind::Quiz => select_daily_questions(
            &assessment.questions,
            config.daily_question_count,
            assessment.id,
            date,
        ),
        AssessmentKind::Assignment => assessment.questions.clone(),
    }
}
