//! The `onboardeval validate` command.

use std::path::PathBuf;

use anyhow::Result;

use onboardeval_core::model::AssessmentKind;
use onboardeval_core::parser::{load_catalog, validate_catalog};

pub fn execute(catalog_path: PathBuf) -> Result<()> {
    let catalog = load_catalog(&catalog_path)?;

    let quizzes = catalog
        .assessments
        .iter()
        .filter(|a| a.kind == AssessmentKind::Quiz)
        .count();
    println!(
        "Catalog: {} assessment(s) ({} quiz, {} assignment), {} badge(s)",
        catalog.assessments.len(),
        quizzes,
        catalog.assessments.len() - quizzes,
        catalog.badges.len()
    );

    let warnings = validate_catalog(&catalog);
    for w in &warnings {
        let prefix = match (w.assessment_id, w.badge_id) {
            (Some(id), _) => format!("  [assessment {id}]"),
            (None, Some(id)) => format!("  [badge {id}]"),
            (None, None) => "  ".to_string(),
        };
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Catalog valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
