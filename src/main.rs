//! budgetctl: compress conversations and inspect routing decisions offline

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use token_budget_engine::context::{CompressionRequest, ContextBudget, ContextCompressor, TiktokenTokenizer};
use token_budget_engine::router::ModelRouter;
use token_budget_engine::{telemetry, ComplexityDescriptor, EngineConfig};
use tracing::info;

#[derive(Parser)]
#[command(name = "budgetctl", about = "Token budget and context compression tools")]
struct Cli {
    /// Engine configuration file (TOML, JSON or YAML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compress a conversation file and print the retained turns as JSON
    Compress {
        /// JSON file holding a compression request
        input: PathBuf,
        /// Override the budget from the file
        #[arg(long)]
        budget: Option<usize>,
        /// Treat every system turn as must-keep
        #[arg(long)]
        keep_system: bool,
    },
    /// Show which model a task complexity routes to
    Route {
        #[arg(long)]
        reasoning: Option<String>,
        #[arg(long)]
        context: Option<String>,
        #[arg(long)]
        creativity: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs)?;

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Compress {
            input,
            budget,
            keep_system,
        } => {
            let raw = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let mut request: CompressionRequest = serde_json::from_str(&raw)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            if let Some(budget) = budget {
                request.budget_tokens = budget;
            }
            if request.model.is_empty() {
                request.model = config.default_model.clone();
            }
            if keep_system {
                request = request.keep_system_turns();
            }
            let context_budget = ContextBudget::from_config(&config)?;
            request.budget_tokens = context_budget.effective_budget(request.budget_tokens);

            let tokenizer = TiktokenTokenizer::for_models([request.model.as_str()])?;
            let compressor = ContextCompressor::new(Arc::new(tokenizer));
            let outcome = compressor.compress_with_report(&request)?;

            info!(
                "Kept {} turns ({} tokens), dropped {}",
                outcome.turns.len(),
                outcome.total_tokens,
                outcome.dropped.len()
            );
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Route {
            reasoning,
            context,
            creativity,
        } => {
            let router = ModelRouter::new(config.model_profiles.clone())?;
            let complexity = ComplexityDescriptor::parse(
                reasoning.as_deref(),
                context.as_deref(),
                creativity.as_deref(),
            )?;
            let profile = router.select(&complexity);
            println!("{}", serde_json::to_string_pretty(profile)?);
        }
    }

    Ok(())
}
