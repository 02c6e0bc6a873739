//! The `onboardeval grade` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};
use serde_json::Value;

use onboardeval_core::engine::{GradingOutcome, SubmissionPayload};
use onboardeval_providers::config::load_config_from;

use super::state;

pub struct GradeArgs {
    pub state: PathBuf,
    pub catalog: Option<PathBuf>,
    pub submission: u64,
    pub answers: Option<String>,
    pub text: Option<String>,
    pub offline: bool,
    pub format: String,
    pub config: Option<PathBuf>,
}

pub async fn execute(args: GradeArgs) -> Result<()> {
    let config = load_config_from(args.config.as_deref())?;
    let store = state::open(&args.state, args.catalog.as_deref())?;
    let engine = state::engine(store.clone(), &config, args.offline)?;

    if let Some(raw) = &args.answers {
        let answers = match serde_json::from_str::<Value>(&read_arg(raw)?)
            .context("answers must be a JSON object")?
        {
            Value::Object(map) => map,
            other => anyhow::bail!("answers must be a JSON object, got {other}"),
        };
        engine
            .submit(args.submission, SubmissionPayload::Answers(answers))
            .await?;
    } else if let Some(raw) = &args.text {
        engine
            .submit(args.submission, SubmissionPayload::Text(read_arg(raw)?))
            .await?;
    }

    let result = engine.grade_submission(args.submission).await;
    // A failed commit is still recorded in the state file.
    state::save(&store, &args.state)?;
    let outcome = result?;

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcome)?),
        _ => print_outcome(&outcome),
    }

    Ok(())
}

/// Inline value, or the contents of the file named after a leading `@`.
fn read_arg(raw: &str) -> Result<String> {
    match raw.strip_prefix('@') {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))
        }
        None => Ok(raw.to_string()),
    }
}

fn print_outcome(outcome: &GradingOutcome) {
    let feedback = &outcome.feedback;

    println!(
        "Submission {}: score {:.2}, {} (feedback: {:?}, risk: {})",
        outcome.submission_id,
        outcome.score,
        outcome.pass_status.to_string().to_uppercase(),
        outcome.source,
        feedback.risk_level
    );
    println!("\n{}", feedback.overall_comment);

    let mut table = Table::new();
    table.set_header(vec!["Section", "Items"]);
    let sections = [
        ("Strengths", &feedback.strengths),
        ("Weaknesses", &feedback.weaknesses),
        ("Suggestions", &feedback.suggestions),
        ("Missing points", &feedback.missing_points),
        ("Errors", &feedback.errors),
        ("Improvements", &feedback.improvements),
    ];
    for (name, items) in sections {
        if !items.is_empty() {
            table.add_row(vec![Cell::new(name), Cell::new(items.join("\n"))]);
        }
    }
    for (criterion, score) in &feedback.rubric_scores {
        table.add_row(vec![
            Cell::new(format!("Rubric: {criterion}")),
            Cell::new(score),
        ]);
    }
    println!("{table}");

    let progression = &outcome.progression;
    if let Some(achievement) = &progression.achievement {
        println!("Achievement: {} {}", achievement.icon, achievement.title);
    }
    for award in &progression.new_badges {
        println!("Badge earned: #{} ({:.1})", award.badge_id, award.score_achieved);
    }
    if let Some(progress) = progression.overall_progress {
        println!("Overall progress: {progress:.2}%");
    }
    if let Some(alert) = &progression.alert {
        println!("ALERT: risk {} ({:.0})", alert.risk_level, alert.risk_score);
    }
    if let Some(advisory) = &progression.advisory {
        println!("{}: {}", advisory.level.to_string().to_uppercase(), advisory.reason);
    }
    for error in &progression.errors {
        eprintln!("  progression step failed: {error}");
    }
    eprintln!("trace id: {}", outcome.trace_id);
}
