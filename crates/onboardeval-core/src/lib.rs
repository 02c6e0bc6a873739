//! onboardeval-core: Assessment grading, feedback synthesis, and learner progression.
//!
//! This crate defines the data model, the grading pipeline (selection,
//! matching, scoring, feedback synthesis, sanitization), and the progression
//! updater that the rest of onboardeval builds on.

pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod progression;
pub mod report;
pub mod sanitize;
pub mod scorer;
pub mod selector;
pub mod store;
pub mod synthesizer;
pub mod traits;
