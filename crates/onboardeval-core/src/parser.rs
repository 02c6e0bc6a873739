//! TOML catalog parser.
//!
//! Loads assessments (question banks, rubrics, skill tags) and badge rules
//! from TOML files and directories, and validates them.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::matcher::answers_match;
use crate::model::{Assessment, AssessmentKind, Badge, QuestionKind};

/// Everything the engine reads but never writes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub assessments: Vec<Assessment>,
    #[serde(default)]
    pub badges: Vec<Badge>,
}

impl Catalog {
    pub fn assessment(&self, id: u64) -> Option<&Assessment> {
        self.assessments.iter().find(|a| a.id == id)
    }

    /// Append another catalog's entries.
    pub fn merge(&mut self, other: Catalog) {
        self.assessments.extend(other.assessments);
        self.badges.extend(other.badges);
    }
}

/// Parse a single TOML catalog file.
pub fn parse_catalog(path: &Path) -> Result<Catalog> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog file: {}", path.display()))?;

    parse_catalog_str(&content, path)
}

/// Parse a TOML string into a [`Catalog`] (useful for testing).
pub fn parse_catalog_str(content: &str, source_path: &Path) -> Result<Catalog> {
    toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))
}

/// Load a catalog from a file, or merge every `.toml` file under a directory.
pub fn load_catalog(path: &Path) -> Result<Catalog> {
    if path.is_dir() {
        load_catalog_directory(path)
    } else {
        parse_catalog(path)
    }
}

/// Recursively load and merge all `.toml` catalog files from a directory.
pub fn load_catalog_directory(dir: &Path) -> Result<Catalog> {
    let mut catalog = Catalog::default();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();

        if path.is_dir() {
            catalog.merge(load_catalog_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_catalog(&path) {
                Ok(part) => catalog.merge(part),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(catalog)
}

/// A warning from catalog validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationWarning {
    /// The assessment ID (if applicable).
    pub assessment_id: Option<u64>,
    /// The badge ID (if applicable).
    pub badge_id: Option<u64>,
    pub message: String,
}

impl ValidationWarning {
    fn assessment(id: u64, message: impl Into<String>) -> Self {
        Self {
            assessment_id: Some(id),
            badge_id: None,
            message: message.into(),
        }
    }

    fn badge(id: u64, message: impl Into<String>) -> Self {
        Self {
            assessment_id: None,
            badge_id: Some(id),
            message: message.into(),
        }
    }
}

/// Validate a catalog for common authoring mistakes.
pub fn validate_catalog(catalog: &Catalog) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    for a in &catalog.assessments {
        if !seen_ids.insert(a.id) {
            warnings.push(ValidationWarning::assessment(
                a.id,
                format!("duplicate assessment ID: {}", a.id),
            ));
        }
    }

    for a in &catalog.assessments {
        if a.title.trim().is_empty() {
            warnings.push(ValidationWarning::assessment(a.id, "title is empty"));
        }

        if let Some(passing) = a.passing_score {
            if passing > a.max_score {
                warnings.push(ValidationWarning::assessment(
                    a.id,
                    format!("passing score {passing} exceeds max score {}", a.max_score),
                ));
            }
        }

        let mut skills: Vec<&str> = Vec::new();
        for skill in a.skills.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
            if skills.iter().any(|s| s.eq_ignore_ascii_case(skill)) {
                warnings.push(ValidationWarning::assessment(
                    a.id,
                    format!("duplicate skill tag: {skill}"),
                ));
            } else {
                skills.push(skill);
            }
        }

        if a.kind == AssessmentKind::Quiz && a.questions.is_empty() {
            warnings.push(ValidationWarning::assessment(a.id, "quiz has an empty question bank"));
        }

        let mut question_ids = HashSet::new();
        for q in &a.questions {
            if !question_ids.insert(q.id.as_str()) {
                warnings.push(ValidationWarning::assessment(
                    a.id,
                    format!("duplicate question ID: {}", q.id),
                ));
            }

            let listed = q.options.iter().any(|o| answers_match(o, &q.correct_answer));
            if q.kind == QuestionKind::SingleChoice && !q.options.is_empty() && !listed {
                warnings.push(ValidationWarning::assessment(
                    a.id,
                    format!(
                        "question {}: correct answer '{}' is not among the options",
                        q.id, q.correct_answer
                    ),
                ));
            }

            if q.points.is_some_and(|p| !p.is_finite() || p < 0.0) {
                warnings.push(ValidationWarning::assessment(
                    a.id,
                    format!("question {}: points must be a non-negative number", q.id),
                ));
            }
        }
    }

    let mut seen_badges = HashSet::new();
    for b in &catalog.badges {
        if !seen_badges.insert(b.id) {
            warnings.push(ValidationWarning::badge(b.id, format!("duplicate badge ID: {}", b.id)));
        }
        if !(0.0..=100.0).contains(&b.min_score) {
            warnings.push(ValidationWarning::badge(
                b.id,
                format!("badge threshold {} is outside 0-100", b.min_score),
            ));
        }
    }

    warnings
}
