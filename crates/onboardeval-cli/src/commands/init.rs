//! The `onboardeval init` command.

use std::path::Path;

use anyhow::{Context, Result};

pub fn execute() -> Result<()> {
    if Path::new("onboardeval.toml").exists() {
        println!("onboardeval.toml already exists, skipping.");
    } else {
        std::fs::write("onboardeval.toml", SAMPLE_CONFIG)
            .context("failed to write onboardeval.toml")?;
        println!("Created onboardeval.toml");
    }

    std::fs::create_dir_all("catalog").context("failed to create catalog directory")?;
    let example_path = Path::new("catalog/example.toml");
    if example_path.exists() {
        println!("catalog/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_CATALOG)
            .context("failed to write catalog/example.toml")?;
        println!("Created catalog/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit onboardeval.toml to point at your model provider");
    println!("  2. Run: onboardeval validate --catalog catalog/example.toml");
    println!("  3. Run: onboardeval start --catalog catalog/example.toml --assessment 1 --learner 1");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# onboardeval configuration

default_provider = "ollama"
parallelism = 4

[providers.ollama]
type = "ollama"
base_url = "http://localhost:11434"

[providers.openai]
type = "openai"
api_key = "${OPENAI_API_KEY}"

[engine]
model = "phi3:latest"
daily_question_count = 5
default_passing_score = 70
max_feedback_items = 4
model_timeout_secs = 60
enable_model_feedback = true
"#;

const EXAMPLE_CATALOG: &str = r#"[[assessments]]
id = 1
title = "Git Fundamentals"
description = "Everyday version control"
type = "quiz"
passing_score = 60
skills = ["Git"]

[[assessments.questions]]
id = 1
question = "Which command records staged changes?"
options = ["git commit", "git push", "git add"]
correct_answer = "git commit"
topic = "basics"

[[assessments.questions]]
id = 2
question = "git pull is a fetch followed by a merge (by default)."
type = "true-false"
options = ["true", "false"]
correct_answer = true
topic = "remotes"

[[assessments.questions]]
id = 3
question = "Which command shows unstaged changes?"
options = ["git diff", "git log", "git show"]
correct_answer = "git diff"
topic = "basics"

[[assessments]]
id = 2
title = "Onboarding Reflection"
description = "Summarize what you learned in your first week"
type = "assignment"
passing_score = 70
skills = ["Communication"]

[assessments.rubric]
clarity = "Ideas are organized and easy to follow"
depth = "Concrete examples support each point"

[[badges]]
id = 1
name = "Quick Starter"
description = "Scored 80 or more on any assessment"
skill_name = "General"
min_score = 80

[[badges]]
id = 2
name = "Version Controller"
skill_name = "Git"
min_score = 90
"#;
