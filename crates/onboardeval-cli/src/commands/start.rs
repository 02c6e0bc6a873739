//! The `onboardeval start` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use onboardeval_providers::config::load_config_from;

use super::state;

pub async fn execute(
    state_path: PathBuf,
    catalog: Option<PathBuf>,
    assessment_id: u64,
    learner_id: u64,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let store = state::open(&state_path, catalog.as_deref())?;
    // Starting an attempt never calls the model.
    let engine = state::engine(store.clone(), &config, true)?;

    let attempt = engine.start_attempt(assessment_id, learner_id).await?;
    state::save(&store, &state_path)?;

    println!(
        "Started submission {} (learner {}, assessment {})",
        attempt.submission.id, learner_id, assessment_id
    );

    if !attempt.questions.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["#", "ID", "Question", "Options"]);
        for (i, q) in attempt.questions.iter().enumerate() {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(&q.id),
                Cell::new(&q.text),
                Cell::new(q.options.join(" / ")),
            ]);
        }
        println!("{table}");
    }

    println!(
        "\nGrade with: onboardeval grade --state {} --submission {} --answers '{{...}}'",
        state_path.display(),
        attempt.submission.id
    );

    Ok(())
}
