//! The `onboardeval warnings` command.

use std::path::PathBuf;

use anyhow::Result;
use comfy_table::{Cell, Table};

use onboardeval_core::report::WarningsReport;

use super::state;

pub async fn execute(state_path: PathBuf, format: String, output: Option<PathBuf>) -> Result<()> {
    if !state_path.exists() {
        anyhow::bail!("state file not found: {}", state_path.display());
    }
    let store = state::open(&state_path, None)?;
    let report = WarningsReport::from_store(store.as_ref()).await?;

    if let Some(path) = &output {
        report.save_json(path)?;
        eprintln!("Report saved to: {}", path.display());
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => print_report(&report),
    }

    Ok(())
}

fn print_report(report: &WarningsReport) {
    println!(
        "{} warning(s): {} critical, {} standard",
        report.total_warnings, report.critical_warnings, report.standard_warnings
    );

    if !report.warnings.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Level", "Learner", "Assessment", "Failed", "Recommendation"]);
        for w in &report.warnings {
            table.add_row(vec![
                Cell::new(w.advisory.level.to_string().to_uppercase()),
                Cell::new(format!("{} (#{})", w.learner_name, w.learner_id)),
                Cell::new(&w.advisory.assessment_title),
                Cell::new(format!(
                    "{} of {}",
                    w.advisory.failed_count, w.advisory.total_failures
                )),
                Cell::new(&w.advisory.recommendation),
            ]);
        }
        println!("{table}");
    }

    let summary = &report.summary;
    let distribution: Vec<String> = summary
        .risk_distribution
        .iter()
        .map(|(level, count)| format!("{level}={count}"))
        .collect();
    println!(
        "\nCohort: {} learner(s), average progress {:.2}%, risk {}",
        summary.total,
        summary.average_progress,
        distribution.join(" ")
    );
}
