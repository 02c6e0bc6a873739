//! The `onboardeval daily` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use comfy_table::{Cell, Table};

use onboardeval_core::parser::load_catalog;
use onboardeval_core::selector::{presented_questions, today};
use onboardeval_providers::config::load_config_from;

pub fn execute(
    catalog_path: PathBuf,
    assessment_id: u64,
    date: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let catalog = load_catalog(&catalog_path)?;
    let assessment = catalog
        .assessment(assessment_id)
        .with_context(|| format!("assessment {assessment_id} not found in catalog"))?;

    let date = match date {
        Some(d) => NaiveDate::parse_from_str(&d, "%Y-%m-%d")
            .with_context(|| format!("invalid date '{d}', expected YYYY-MM-DD"))?,
        None => today(),
    };

    let questions = presented_questions(assessment, date, &config.engine);
    println!(
        "{} ({}) on {}: {} of {} question(s)",
        assessment.title,
        assessment.kind,
        date,
        questions.len(),
        assessment.questions.len()
    );

    let mut table = Table::new();
    table.set_header(vec!["#", "ID", "Question", "Options", "Points"]);
    for (i, q) in questions.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&q.id),
            Cell::new(&q.text),
            Cell::new(q.options.join(" / ")),
            Cell::new(q.points.unwrap_or(config.engine.default_question_points)),
        ]);
    }
    println!("{table}");

    Ok(())
}
