use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use gfkitchen_core::batch::{BatchConfig, BatchEvent, BatchPaths, BatchReport, BatchRunner};
use gfkitchen_core::{
    builtin_recipes, create_generator_from_env, filter_by_category, load_recipes,
    CheckpointWriter, DownloadClient, RecipeDescriptor, StateStore,
};

// ============================================================================
// Configuration
// ============================================================================

pub struct GenerateConfig {
    pub paths: BatchPaths,
    pub recipes_file: Option<std::path::PathBuf>,
    pub limit: Option<usize>,
    pub category: Option<String>,
    pub skip: Vec<String>,
    pub skip_failed: bool,
    pub delay_ms: u64,
    pub pause_every: usize,
    pub pause_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub rate_limit_retries: u32,
    pub checkpoint_every: usize,
    pub label: String,
    pub download: bool,
}

impl GenerateConfig {
    fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            delay: Duration::from_millis(self.delay_ms),
            pause_every: self.pause_every,
            pause: Duration::from_millis(self.pause_ms),
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
            rate_limit_retries: self.rate_limit_retries,
            checkpoint_every: self.checkpoint_every,
        }
    }
}

/// Built-in catalog, or the descriptors in `file`.
pub fn load_catalog(file: Option<&Path>) -> Result<Vec<RecipeDescriptor>> {
    match file {
        Some(path) => load_recipes(path)
            .with_context(|| format!("Failed to load recipes from {}", path.display())),
        None => Ok(builtin_recipes()),
    }
}

/// Apply the category filter, then the limit.
fn select_recipes(
    recipes: Vec<RecipeDescriptor>,
    category: Option<&str>,
    limit: Option<usize>,
) -> Vec<RecipeDescriptor> {
    let mut recipes = match category {
        Some(category) => filter_by_category(recipes, category),
        None => recipes,
    };
    if let Some(limit) = limit {
        recipes.truncate(limit);
    }
    recipes
}

// ============================================================================
// Main orchestrator
// ============================================================================

pub async fn run_generate(config: GenerateConfig) -> Result<BatchReport> {
    let catalog = load_catalog(config.recipes_file.as_deref())?;
    let recipes = select_recipes(catalog, config.category.as_deref(), config.limit);

    let mut checkpoints = CheckpointWriter::new(config.paths.checkpoint_dir(), &config.label)
        .context("Invalid --label")?;

    let generator = create_generator_from_env().context("Failed to configure image generator")?;

    let state_file = config.paths.state_file();
    let mut state = StateStore::load(&state_file)
        .with_context(|| format!("Failed to load state from {}", state_file.display()))?;

    let mut completed = state.completion_set(config.skip_failed);
    completed.extend(config.skip.iter().cloned());

    let downloader = if config.download {
        Some(DownloadClient::new().context("Failed to create HTTP client")?)
    } else {
        None
    };

    println!("Image Generation Starting");
    println!("=========================");
    println!(
        "Provider: {} ({})",
        generator.provider_name(),
        generator.model_name()
    );
    println!("Recipes: {}", recipes.len());
    println!("Already done: {}", completed.len());
    if let Some(ref category) = config.category {
        println!("Category filter: {}", category);
    }
    if !config.download {
        println!("Downloads disabled: keeping URLs only");
    }
    println!();

    let mut runner =
        BatchRunner::new(generator.as_ref(), config.batch_config()).with_observer(print_event);
    if let Some(client) = downloader.as_ref() {
        runner = runner.with_downloads(client, config.paths.images_dir());
    }

    let report = runner
        .run(&recipes, &completed, &mut state, &mut checkpoints)
        .await
        .context("Batch run aborted")?;

    print_summary(&report, &config.paths);

    Ok(report)
}

fn print_event(event: &BatchEvent<'_>) {
    match event {
        BatchEvent::Skipped {
            position,
            total,
            slug,
        } => {
            println!("[{}/{}] ⏭️  {} (already done)", position, total, slug);
        }
        BatchEvent::Succeeded {
            position,
            total,
            slug,
            image,
        } => match &image.local_path {
            Some(path) => println!("[{}/{}] ✅ {} -> {}", position, total, slug, path.display()),
            None => println!("[{}/{}] ✅ {} -> {}", position, total, slug, image.url),
        },
        BatchEvent::Failed {
            position,
            total,
            slug,
            error,
            ..
        } => {
            println!("[{}/{}] ❌ {}: {}", position, total, slug, error);
        }
        BatchEvent::Backoff { wait, retrying, .. } => {
            let next = if *retrying { "then retrying" } else { "then moving on" };
            println!("  Rate limited, waiting {}s {}", wait.as_secs(), next);
        }
        BatchEvent::Pause { succeeded, wait } => {
            println!(
                "  Pausing {}s after {} images",
                wait.as_secs(),
                succeeded
            );
        }
        BatchEvent::Checkpoint {
            path,
            total_generated,
        } => {
            println!(
                "  Checkpoint saved: {} ({} images)",
                path.display(),
                total_generated
            );
        }
    }
}

fn print_summary(report: &BatchReport, paths: &BatchPaths) {
    let attempted = report.succeeded + report.failed;

    println!();
    println!("Image Generation Results");
    println!("========================");
    println!("Duration: {:.1}s", report.elapsed.as_secs_f64());
    println!("Recipes: {}", report.total);
    println!(
        "  Generated: {} ({:.1}% of attempted)",
        report.succeeded,
        if attempted > 0 {
            report.succeeded as f64 / attempted as f64 * 100.0
        } else {
            0.0
        }
    );
    println!("  Skipped: {}", report.skipped);
    println!("  Failed: {}", report.failed);
    println!("  Rate-limit backoffs: {}", report.rate_limit_backoffs);

    if !report.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &report.failures {
            println!("  {} [{:?}]: {}", failure.slug, failure.kind, failure.error);
        }
        println!("Failed recipes are retried on the next run unless --skip-failed is given.");
    }

    println!();
    if let Some(last) = report.checkpoints.last() {
        println!("Checkpoint: {}", last.display());
    }
    println!("State file: {}", paths.state_file().display());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> GenerateConfig {
        GenerateConfig {
            paths: BatchPaths::new("/tmp/gfk"),
            recipes_file: None,
            limit: None,
            category: None,
            skip: Vec::new(),
            skip_failed: false,
            delay_ms: 100,
            pause_every: 3,
            pause_ms: 2000,
            rate_limit_backoff_ms: 30_000,
            rate_limit_retries: 2,
            checkpoint_every: 4,
            label: "progress".to_string(),
            download: true,
        }
    }

    #[test]
    fn flags_map_to_batch_config() {
        let batch = config().batch_config();
        assert_eq!(batch.delay, Duration::from_millis(100));
        assert_eq!(batch.pause, Duration::from_secs(2));
        assert_eq!(batch.rate_limit_backoff, Duration::from_secs(30));
        assert_eq!(batch.rate_limit_retries, 2);
        assert_eq!(batch.checkpoint_every, 4);
    }

    #[test]
    fn category_filter_applies_before_limit() {
        let recipes = select_recipes(builtin_recipes(), Some("dessert"), Some(1));
        assert_eq!(recipes.len(), 1);
        assert_eq!(recipes[0].category, "Dessert");

        let all = select_recipes(builtin_recipes(), None, None);
        assert_eq!(all.len(), builtin_recipes().len());
    }

    #[tokio::test]
    async fn label_with_path_separator_is_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = GenerateConfig {
            paths: BatchPaths::new(dir.path()),
            label: "a/b".to_string(),
            ..config()
        };

        let err = run_generate(config).await.unwrap_err();
        assert!(format!("{err:#}").contains("Invalid checkpoint label \"a/b\""));
        assert!(!dir.path().join("state.json").exists());
    }

    #[test]
    fn missing_recipes_file_is_an_error() {
        let err = load_catalog(Some(Path::new("/nonexistent/recipes.json"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/recipes.json"));
    }
}
