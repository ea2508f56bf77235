//! LoRAFactory CLI - batch image and caption dataset generation.
//!
//! Drives several generative backends (fal.ai, Kie.ai, OpenRouter and any
//! template-described API) through one engine to produce LoRA training
//! datasets: synthesized prompts, primary images, edited twins and captions.
//!
//! # Usage
//!
//! ```bash
//! # Ten paired images on a theme, manifest to a file
//! lorafactory run "studio portraits" -t "relight with a hard key light" -o run.jsonl
//!
//! # Inspect a model's parameters
//! lorafactory schema show fal-ai/flux/dev
//!
//! # View configuration
//! lorafactory config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// LoRAFactory - batch image and caption dataset generation.
#[derive(Parser, Debug)]
#[command(name = "lorafactory")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, env = "LORAFACTORY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a generation batch
    Run(cli::run::RunArgs),

    /// Inspect, validate and translate model parameters
    Schema(cli::schema::SchemaArgs),

    /// List configured providers and their capabilities
    Providers(cli::providers::ProvidersArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = cli::load_config(cli.config.as_deref())?;
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("LoRAFactory v{}", lorafactory_core::VERSION);

    match cli.command {
        Commands::Run(args) => cli::run::execute(args, config).await,
        Commands::Schema(args) => cli::schema::execute(args, config).await,
        Commands::Providers(args) => cli::providers::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args, config, cli.config).await,
    }
}
