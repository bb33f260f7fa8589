mod checkpoints;
mod generate;
mod status;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use gfkitchen_core::BatchPaths;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::generate::GenerateConfig;

#[derive(Parser)]
#[command(name = "gfkitchen")]
#[command(about = "Batch image generation for gluten-free recipes", long_about = None)]
struct Cli {
    /// Data directory for state, checkpoints and images (default: $GFK_DATA_DIR or ~/.gfkitchen/image-generation)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate one photo per recipe, skipping recipes already done
    Generate {
        /// JSON file with an array of recipe descriptors (default: built-in catalog)
        #[arg(long)]
        recipes: Option<PathBuf>,

        /// Only consider the first N recipes
        #[arg(long)]
        limit: Option<usize>,

        /// Only recipes in this category (case-insensitive)
        #[arg(long)]
        category: Option<String>,

        /// Treat this slug as already done (repeatable)
        #[arg(long = "skip", value_name = "SLUG")]
        skip: Vec<String>,

        /// Do not retry recipes that failed in a previous run
        #[arg(long)]
        skip_failed: bool,

        /// Delay after every generation call, in milliseconds
        #[arg(long, default_value = "2500")]
        delay_ms: u64,

        /// Pause after every N successes (0 disables)
        #[arg(long, default_value = "10")]
        pause_every: usize,

        /// Length of the periodic pause, in milliseconds
        #[arg(long, default_value = "15000")]
        pause_ms: u64,

        /// Backoff after a rate-limited response, in milliseconds
        #[arg(long, default_value = "60000")]
        rate_limit_backoff_ms: u64,

        /// Retries of the same recipe after a rate-limit backoff
        #[arg(long, default_value = "0")]
        rate_limit_retries: u32,

        /// Write a checkpoint after every N successes (0: only at the end)
        #[arg(long, default_value = "5")]
        checkpoint_every: usize,

        /// Checkpoint file name prefix
        #[arg(long, default_value = "progress")]
        label: String,

        /// Keep only the returned URLs instead of downloading the images
        #[arg(long)]
        no_download: bool,
    },
    /// Summarize the state file
    Status,
    /// List the recipe catalog
    Recipes {
        /// JSON file with an array of recipe descriptors (default: built-in catalog)
        #[arg(long)]
        recipes: Option<PathBuf>,
    },
    /// Inspect and maintain checkpoint files
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Print the newest checkpoint
    Latest,
    /// Merge all checkpoints into one slug -> URL map (newer files win)
    Merge {
        /// Write the merged map here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete all but the newest checkpoints
    Prune {
        /// Number of checkpoints to keep
        #[arg(long, default_value = "5")]
        keep: usize,
    },
}

fn init_logging() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let paths = match cli.data_dir {
        Some(dir) => BatchPaths::new(dir),
        None => BatchPaths::from_env(),
    };
    tracing::debug!(root = %paths.root.display(), "using data directory");

    match cli.command {
        Commands::Generate {
            recipes,
            limit,
            category,
            skip,
            skip_failed,
            delay_ms,
            pause_every,
            pause_ms,
            rate_limit_backoff_ms,
            rate_limit_retries,
            checkpoint_every,
            label,
            no_download,
        } => {
            let config = GenerateConfig {
                paths,
                recipes_file: recipes,
                limit,
                category,
                skip,
                skip_failed,
                delay_ms,
                pause_every,
                pause_ms,
                rate_limit_backoff_ms,
                rate_limit_retries,
                checkpoint_every,
                label,
                download: !no_download,
            };
            generate::run_generate(config).await?;
        }
        Commands::Status => {
            status::print_status(&paths)?;
        }
        Commands::Recipes { recipes } => {
            status::print_recipes(recipes.as_deref())?;
        }
        Commands::Checkpoints { action } => {
            let dir = paths.checkpoint_dir();
            match action {
                CheckpointAction::Latest => checkpoints::latest(&dir)?,
                CheckpointAction::Merge { output } => checkpoints::merge(&dir, output.as_deref())?,
                CheckpointAction::Prune { keep } => checkpoints::prune(&dir, keep)?,
            }
        }
    }

    Ok(())
}
