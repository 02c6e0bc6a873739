//! onboardeval CLI: operator harness around the grading engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "onboardeval",
    version,
    about = "Assessment grading and learner progression for onboarding programs"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create starter config and example catalog
    Init,

    /// Validate catalog TOML files
    Validate {
        /// Path to catalog file or directory
        #[arg(long)]
        catalog: PathBuf,
    },

    /// Show the questions a quiz presents on a given day
    Daily {
        /// Path to catalog file or directory
        #[arg(long)]
        catalog: PathBuf,

        /// Assessment ID
        #[arg(long)]
        assessment: u64,

        /// Calendar day as YYYY-MM-DD (default: today)
        #[arg(long)]
        date: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Start an attempt for a learner
    Start {
        /// Learner state file (JSON)
        #[arg(long, default_value = "onboardeval-state.json")]
        state: PathBuf,

        /// Catalog to load into the state before starting
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Assessment ID
        #[arg(long)]
        assessment: u64,

        /// Learner ID
        #[arg(long)]
        learner: u64,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Submit answers or text and grade a submission
    Grade {
        /// Learner state file (JSON)
        #[arg(long, default_value = "onboardeval-state.json")]
        state: PathBuf,

        /// Catalog to load into the state before grading
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Submission ID
        #[arg(long)]
        submission: u64,

        /// Quiz answers as a JSON object, or @path to a JSON file
        #[arg(long, conflicts_with = "text")]
        answers: Option<String>,

        /// Assignment text, or @path to a text file
        #[arg(long)]
        text: Option<String>,

        /// Skip the model and use template feedback
        #[arg(long)]
        offline: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Report learners with repeated failures
    Warnings {
        /// Learner state file (JSON)
        #[arg(long, default_value = "onboardeval-state.json")]
        state: PathBuf,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Also write the JSON report to this file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List available models
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("onboardeval=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => commands::init::execute(),
        Commands::Validate { catalog } => commands::validate::execute(catalog),
        Commands::Daily {
            catalog,
            assessment,
            date,
            config,
        } => commands::daily::execute(catalog, assessment, date, config),
        Commands::Start {
            state,
            catalog,
            assessment,
            learner,
            config,
        } => commands::start::execute(state, catalog, assessment, learner, config).await,
        Commands::Grade {
            state,
            catalog,
            submission,
            answers,
            text,
            offline,
            format,
            config,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                state,
                catalog,
                submission,
                answers,
                text,
                offline,
                format,
                config,
            })
            .await
        }
        Commands::Warnings {
            state,
            format,
            output,
        } => commands::warnings::execute(state, format, output).await,
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
