//! gradeforge CLI: a developer harness over the generation ladder and the grading engine.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gradeforge_core::model::ContentKind;

mod commands;

#[derive(Parser)]
#[command(
    name = "gradeforge",
    version,
    about = "Structured educational content generation and grading"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a structured record through the retry ladder
    Generate {
        /// Content kind: assignment, test, flashcard_set, rubric, course_structure, module
        #[arg(long)]
        kind: ContentKind,

        /// Subject of the content
        #[arg(long)]
        topic: String,

        /// Extra parameters as key=value (repeatable), e.g. num_questions=5
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        /// Provider name from the config (default: default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Write the result JSON to this file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Grade one submission, or a batch of submissions
    Grade {
        /// Assignment JSON (a record or the output of `generate`)
        #[arg(long)]
        assignment: PathBuf,

        /// Plain-text submission file
        #[arg(long, required_unless_present = "batch", conflicts_with = "batch")]
        submission: Option<PathBuf>,

        /// JSON array of {"id", "content"} submissions
        #[arg(long)]
        batch: Option<PathBuf>,

        /// Add quality and critical-thinking analysis (single submission only)
        #[arg(long, conflicts_with = "batch")]
        comprehensive: bool,

        /// Ask the backend for narrative feedback on the score (single submission only)
        #[arg(long, conflicts_with = "batch")]
        detailed: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Provider name from the config (default: default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model override
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Fairness statistics for a list of scores
    Fairness {
        /// Comma-separated scores, e.g. "70,72,68,71"
        #[arg(long)]
        scores: String,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,
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

    /// Create a starter gradeforge.toml
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("gradeforge=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Generate {
            kind,
            topic,
            params,
            provider,
            model,
            output,
            config,
        } => {
            commands::generate::execute(kind, topic, params, provider, model, output, config).await
        }
        Commands::Grade {
            assignment,
            submission,
            batch,
            comprehensive,
            detailed,
            format,
            provider,
            model,
            config,
        } => {
            commands::grade::execute(commands::grade::GradeArgs {
                assignment,
                submission,
                batch,
                comprehensive,
                detailed,
                format,
                provider,
                model,
                config,
            })
            .await
        }
        Commands::Fairness { scores, format } => commands::fairness::execute(&scores, &format),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
