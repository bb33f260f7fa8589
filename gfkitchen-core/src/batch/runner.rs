use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::time::{sleep, Instant};

use crate::catalog::validate_recipes;
use crate::generate::{is_rate_limited, ErrorKind, GenerationError, ImageGenerator};
use crate::http::HttpClient;
use crate::image::{fetch_and_validate_image, save_image};
use crate::prompt::compose_prompt;
use crate::types::{CompletionSet, GeneratedImage, RecipeDescriptor};

use super::{
    should_checkpoint, BatchConfig, BatchError, BatchEvent, BatchReport, CheckpointWriter,
    FailedItem, StateError, StateStore,
};

/// `Retry-After` is honored up to this multiple of the configured backoff.
const MAX_RETRY_AFTER_FACTOR: u32 = 10;

/// Why a single recipe did not get an image.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("Failed to save image from {url}: {source}")]
    Save {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl ItemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ItemError::Generation(err) => err.kind(),
            ItemError::Download { .. } | ItemError::Save { .. } => ErrorKind::Transient,
        }
    }

    /// The generated URL, when generation succeeded but a later step did not.
    pub fn url(&self) -> Option<&str> {
        match self {
            ItemError::Generation(_) => None,
            ItemError::Download { url, .. } | ItemError::Save { url, .. } => Some(url),
        }
    }
}

type Observer<'a> = Box<dyn FnMut(&BatchEvent<'_>) + Send + 'a>;

/// Walks a recipe list in order, one generation call at a time.
pub struct BatchRunner<'a> {
    generator: &'a dyn ImageGenerator,
    downloader: Option<&'a dyn HttpClient>,
    images_dir: PathBuf,
    config: BatchConfig,
    observer: Option<Observer<'a>>,
}

impl<'a> BatchRunner<'a> {
    /// A runner that keeps only the returned URLs.
    pub fn new(generator: &'a dyn ImageGenerator, config: BatchConfig) -> Self {
        Self {
            generator,
            downloader: None,
            images_dir: PathBuf::new(),
            config,
            observer: None,
        }
    }

    /// Download every generated image into `images_dir`.
    pub fn with_downloads(mut self, client: &'a dyn HttpClient, images_dir: impl Into<PathBuf>) -> Self {
        self.downloader = Some(client);
        self.images_dir = images_dir.into();
        self
    }

    pub fn with_observer(mut self, observer: impl FnMut(&BatchEvent<'_>) + Send + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Process `recipes` in order.
    ///
    /// Slugs in `completed` are skipped without a generation call or delay. Every other
    /// recipe is attempted once (plus configured rate-limit retries); its outcome is
    /// recorded in `state` before the next one starts. Per-item failures are counted
    /// and the run continues. State persistence and the final checkpoint are fatal; when
    /// a state write fails mid-run, a checkpoint of the results so far is attempted first.
    pub async fn run(
        &mut self,
        recipes: &[RecipeDescriptor],
        completed: &CompletionSet,
        state: &mut StateStore,
        checkpoints: &mut CheckpointWriter,
    ) -> Result<BatchReport, BatchError> {
        validate_recipes(recipes)?;

        let start = Instant::now();
        let total = recipes.len();
        let mut report = BatchReport::new(total);

        state.register_pending(
            recipes
                .iter()
                .filter(|r| !completed.contains(&r.slug))
                .map(|r| r.slug.as_str()),
        )?;

        tracing::info!(
            total,
            completed = completed.len(),
            provider = self.generator.provider_name(),
            model = self.generator.model_name(),
            "starting batch"
        );

        for (idx, recipe) in recipes.iter().enumerate() {
            let position = idx + 1;
            let slug = recipe.slug.as_str();

            if completed.contains(slug) {
                report.skipped += 1;
                tracing::debug!(slug, "already complete, skipping");
                self.emit(BatchEvent::Skipped {
                    position,
                    total,
                    slug,
                });
                continue;
            }

            let (outcome, calls) = self.process(recipe, &mut report).await;

            match outcome {
                Ok(image) => {
                    let persisted = state.mark_done(slug, &image, calls);
                    report.succeeded += 1;
                    report.results.entry(slug.to_string()).or_insert(image);
                    if let Err(e) = persisted {
                        return Err(self.abort_with_checkpoint(&mut report, checkpoints, e));
                    }

                    let image = &report.results[slug];
                    tracing::info!(slug, url = %image.url, "generated image");
                    if let Some(observer) = self.observer.as_mut() {
                        observer(&BatchEvent::Succeeded {
                            position,
                            total,
                            slug,
                            image,
                        });
                    }

                    self.after_success(&mut report, checkpoints).await;
                }
                Err(err) => {
                    let kind = err.kind();
                    let message = err.to_string();
                    let persisted = state.mark_failed(slug, &message, kind, err.url(), calls);
                    report.failed += 1;

                    tracing::warn!(slug, ?kind, error = %message, "image generation failed");
                    self.emit(BatchEvent::Failed {
                        position,
                        total,
                        slug,
                        error: &message,
                        kind,
                    });
                    report.failures.push(FailedItem {
                        slug: slug.to_string(),
                        error: message,
                        kind,
                    });

                    if let Err(e) = persisted {
                        return Err(self.abort_with_checkpoint(&mut report, checkpoints, e));
                    }
                }
            }
        }

        let path = checkpoints.write(&report.results, report.counts())?;
        self.emit(BatchEvent::Checkpoint {
            path: &path,
            total_generated: report.results.len(),
        });
        report.checkpoints.push(path);

        report.elapsed = start.elapsed();
        tracing::info!(
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            backoffs = report.rate_limit_backoffs,
            elapsed_secs = report.elapsed.as_secs_f64(),
            "batch complete"
        );

        Ok(report)
    }

    /// Attempt one recipe, retrying after a rate-limit backoff while retries remain.
    /// Also returns the number of generation calls made.
    async fn process(
        &mut self,
        recipe: &RecipeDescriptor,
        report: &mut BatchReport,
    ) -> (Result<GeneratedImage, ItemError>, u32) {
        let prompt = compose_prompt(recipe);
        let mut retries_left = self.config.rate_limit_retries;
        let mut calls = 0;

        loop {
            let attempt = self.attempt(recipe, &prompt).await;
            calls += 1;
            sleep(self.config.delay).await;

            let backoff = match &attempt {
                Err(ItemError::Generation(err)) if is_rate_limited(err) => {
                    Some(self.backoff_for(err))
                }
                _ => None,
            };
            let Some(wait) = backoff else {
                return (attempt, calls);
            };

            let retrying = retries_left > 0;
            report.rate_limit_backoffs += 1;
            tracing::warn!(
                slug = %recipe.slug,
                wait_secs = wait.as_secs(),
                retrying,
                "rate limited, backing off"
            );
            self.emit(BatchEvent::Backoff {
                slug: &recipe.slug,
                wait,
                retrying,
            });
            sleep(wait).await;

            if !retrying {
                return (attempt, calls);
            }
            retries_left -= 1;
        }
    }

    async fn attempt(
        &self,
        recipe: &RecipeDescriptor,
        prompt: &str,
    ) -> Result<GeneratedImage, ItemError> {
        let url = self.generator.generate(prompt).await?;
        if url.trim().is_empty() {
            return Err(GenerationError::EmptyResponse.into());
        }

        let mut image = GeneratedImage {
            url,
            local_path: None,
            content_type: None,
            generated_at: Utc::now(),
        };

        if let Some(client) = self.downloader {
            let fetched = fetch_and_validate_image(client, &image.url)
                .await
                .map_err(|message| ItemError::Download {
                    url: image.url.clone(),
                    message,
                })?;
            let path = save_image(&self.images_dir, &recipe.slug, &fetched).map_err(|source| {
                ItemError::Save {
                    url: image.url.clone(),
                    source,
                }
            })?;
            image.local_path = Some(path);
            image.content_type = Some(fetched.content_type);
        }

        Ok(image)
    }

    fn backoff_for(&self, err: &GenerationError) -> Duration {
        let requested = err
            .retry_after_secs()
            .map(Duration::from_secs)
            .unwrap_or_default();
        let cap = self.config.rate_limit_backoff * MAX_RETRY_AFTER_FACTOR;
        self.config.rate_limit_backoff.max(requested.min(cap))
    }

    /// Save what this run produced before giving up on a broken state file.
    fn abort_with_checkpoint(
        &mut self,
        report: &mut BatchReport,
        checkpoints: &mut CheckpointWriter,
        err: StateError,
    ) -> BatchError {
        tracing::error!(error = %err, "state file write failed, checkpointing before abort");
        match checkpoints.write(&report.results, report.counts()) {
            Ok(path) => {
                self.emit(BatchEvent::Checkpoint {
                    path: &path,
                    total_generated: report.results.len(),
                });
                report.checkpoints.push(path);
            }
            Err(e) => {
                tracing::error!(error = %e, "recovery checkpoint failed");
            }
        }
        BatchError::State(err)
    }

    async fn after_success(&mut self, report: &mut BatchReport, checkpoints: &mut CheckpointWriter) {
        if should_checkpoint(report.succeeded, self.config.checkpoint_every) {
            match checkpoints.write(&report.results, report.counts()) {
                Ok(path) => {
                    self.emit(BatchEvent::Checkpoint {
                        path: &path,
                        total_generated: report.results.len(),
                    });
                    report.checkpoints.push(path);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "periodic checkpoint failed, continuing");
                }
            }
        }

        let pause_every = self.config.pause_every;
        if pause_every > 0 && report.succeeded % pause_every == 0 {
            let wait = self.config.pause;
            tracing::info!(succeeded = report.succeeded, wait_secs = wait.as_secs(), "pausing");
            self.emit(BatchEvent::Pause {
                succeeded: report.succeeded,
                wait,
            });
            sleep(wait).await;
        }
    }

    fn emit(&mut self, event: BatchEvent<'_>) {
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{list_checkpoints, load_checkpoint, ItemStatus};
    use crate::generate::FakeImageGenerator;
    use crate::http::MockClient;
    use crate::image::tiny_png;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn recipes() -> Vec<RecipeDescriptor> {
        vec![
            RecipeDescriptor::new("Alpha Pancakes", "alpha", "Breakfast", "Fluffy."),
            RecipeDescriptor::new("Bravo Salad", "bravo", "Lunch", "Crisp."),
            RecipeDescriptor::new("Charlie Stew", "charlie", "Dinner", "Hearty."),
        ]
    }

    fn fixtures(dir: &TempDir) -> (StateStore, CheckpointWriter) {
        let state = StateStore::load(&dir.path().join("state.json")).unwrap();
        let checkpoints = CheckpointWriter::new(dir.path().join("checkpoints"), "progress").unwrap();
        (state, checkpoints)
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_succeeded_and_rate_limited() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::new()
            .with_url("bravo", "https://img/bravo.png")
            .with_error(
                "charlie",
                GenerationError::RateLimited {
                    retry_after_secs: None,
                },
            );
        let completed: CompletionSet = ["alpha"].into_iter().collect();

        let mut runner = BatchRunner::new(&generator, BatchConfig::default());
        let report = runner
            .run(&recipes(), &completed, &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.rate_limit_backoffs, 1);
        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results["bravo"].url, "https://img/bravo.png");
        assert_eq!(generator.calls_matching("alpha"), 0);

        // Two delays plus one backoff.
        assert!(report.elapsed >= Duration::from_millis(2 * 2500 + 60_000));

        assert_eq!(state.get("charlie").unwrap().error_kind, Some(ErrorKind::RateLimited));
        assert!(state.get("alpha").is_none());
        assert_eq!(report.checkpoints.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limited_item_when_configured() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::default()
            .with_error(
                "bravo",
                GenerationError::RateLimited {
                    retry_after_secs: Some(90),
                },
            )
            .with_url("bravo", "https://img/bravo-retry.png");

        let config = BatchConfig {
            rate_limit_retries: 1,
            ..BatchConfig::default()
        };
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut runner = BatchRunner::new(&generator, config).with_observer(move |event| {
            if let BatchEvent::Backoff { wait, retrying, .. } = event {
                sink.lock().unwrap().push((*wait, *retrying));
            }
        });
        let report = runner
            .run(&recipes(), &CompletionSet::new(), &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 3);
        assert_eq!(report.failed, 0);
        assert_eq!(report.rate_limit_backoffs, 1);
        assert_eq!(report.results["bravo"].url, "https://img/bravo-retry.png");
        assert_eq!(generator.calls_matching("bravo"), 2);
        assert_eq!(*events.lock().unwrap(), vec![(Duration::from_secs(90), true)]);

        // Both calls count, not just the run that finished the item.
        assert_eq!(state.get("bravo").unwrap().attempts, 2);
        assert_eq!(state.get("alpha").unwrap().attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_after_is_capped() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::default().with_error(
            "alpha",
            GenerationError::RateLimited {
                retry_after_secs: Some(86_400),
            },
        );
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);

        let mut runner =
            BatchRunner::new(&generator, BatchConfig::default()).with_observer(move |event| {
                if let BatchEvent::Backoff { wait, .. } = event {
                    sink.lock().unwrap().push(*wait);
                }
            });
        let report = runner
            .run(&recipes(), &CompletionSet::new(), &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.rate_limit_backoffs, 1);
        assert_eq!(*events.lock().unwrap(), vec![Duration::from_secs(600)]);
        assert!(report.elapsed < Duration::from_secs(3600));
    }

    /// Succeeds every call, but breaks the state file before call number `break_on`.
    #[derive(Debug)]
    struct BreaksStateGenerator {
        state_file: PathBuf,
        break_on: usize,
        calls: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl ImageGenerator for BreaksStateGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.break_on {
                // A non-empty directory cannot be replaced by the atomic rename.
                std::fs::remove_file(&self.state_file).ok();
                std::fs::create_dir_all(self.state_file.join("blocker")).unwrap();
            }
            Ok(format!("https://img/{call}.png"))
        }

        fn provider_name(&self) -> &'static str {
            "test"
        }

        fn model_name(&self) -> &str {
            "test"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn state_write_failure_checkpoints_results_first() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = BreaksStateGenerator {
            state_file: dir.path().join("state.json"),
            break_on: 3,
            calls: AtomicUsize::new(0),
        };
        let mut recipes = recipes();
        recipes.push(RecipeDescriptor::new("Delta Tart", "delta", "Dessert", "Tangy."));

        let mut runner = BatchRunner::new(&generator, BatchConfig::default());
        let result = runner
            .run(&recipes, &CompletionSet::new(), &mut state, &mut checkpoints)
            .await;

        assert!(matches!(result, Err(BatchError::State(_))));
        assert_eq!(generator.calls.load(Ordering::SeqCst), 3);

        let files = list_checkpoints(&dir.path().join("checkpoints")).unwrap();
        assert_eq!(files.len(), 1);
        let checkpoint = load_checkpoint(&files[0].path).unwrap();
        let slugs: Vec<&str> = checkpoint.images.keys().map(String::as_str).collect();
        assert_eq!(slugs, vec!["alpha", "bravo", "charlie"]);
        assert_eq!(checkpoint.images["charlie"], "https://img/3.png");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_does_not_back_off() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::default().with_error(
            "alpha",
            GenerationError::Api {
                status: 400,
                message: "unsupported frame rate".to_string(),
            },
        );

        let mut runner = BatchRunner::new(&generator, BatchConfig::default());
        let report = runner
            .run(&recipes(), &CompletionSet::new(), &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.rate_limit_backoffs, 0);
        assert_eq!(report.failures[0].kind, ErrorKind::Permanent);
        assert!(report.elapsed < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_url_is_a_failure() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::default().with_url("charlie", "  ");

        let mut runner = BatchRunner::new(&generator, BatchConfig::default());
        let report = runner
            .run(&recipes(), &CompletionSet::new(), &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.failed, 1);
        assert!(!report.results.contains_key("charlie"));
        assert_eq!(state.get("charlie").unwrap().status, ItemStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn downloads_and_stores_images() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::new()
            .with_url("alpha", "https://img/alpha.png")
            .with_url("bravo", "https://img/bravo.png")
            .with_url("charlie", "https://img/charlie.png");
        let client = MockClient::new()
            .with_bytes("https://img/alpha.png", tiny_png())
            .with_status("https://img/bravo.png", 403)
            .with_bytes("https://img/charlie.png", tiny_png());
        let images_dir = dir.path().join("images");

        let mut runner =
            BatchRunner::new(&generator, BatchConfig::default()).with_downloads(&client, &images_dir);
        let report = runner
            .run(&recipes(), &CompletionSet::new(), &mut state, &mut checkpoints)
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].slug, "bravo");
        assert_eq!(report.failures[0].kind, ErrorKind::Transient);

        let alpha = &report.results["alpha"];
        assert_eq!(alpha.local_path.as_deref(), Some(images_dir.join("alpha.png").as_path()));
        assert_eq!(alpha.content_type.as_deref(), Some("image/png"));
        assert!(images_dir.join("charlie.png").exists());

        // The URL is kept so a later run can see what was generated.
        let bravo = state.get("bravo").unwrap();
        assert_eq!(bravo.url.as_deref(), Some("https://img/bravo.png"));
        assert_eq!(bravo.status, ItemStatus::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_catalog_is_fatal() {
        let dir = TempDir::new().unwrap();
        let (mut state, mut checkpoints) = fixtures(&dir);
        let generator = FakeImageGenerator::default();
        let mut recipes = recipes();
        recipes.push(RecipeDescriptor::new("Alpha Again", "alpha", "Dinner", ""));

        let mut runner = BatchRunner::new(&generator, BatchConfig::default());
        let result = runner
            .run(&recipes, &CompletionSet::new(), &mut state, &mut checkpoints)
            .await;

        assert!(matches!(result, Err(BatchError::Catalog(_))));
        assert!(generator.calls().is_empty());
    }
}
