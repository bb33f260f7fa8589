//! Fake image generator for testing.
//!
//! Outcomes are matched by checking if the prompt contains a registered substring,
//! so tests and dry runs work without network access or API costs.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use super::{GenerationError, ImageGenerator};

/// Base URL for generated fake image URLs.
pub const DEFAULT_FAKE_URL_BASE: &str = "https://images.invalid/fake";

/// A scripted result for one call.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Url(String),
    Error(GenerationError),
}

#[derive(Debug)]
struct Script {
    pattern: String,
    outcomes: VecDeque<FakeOutcome>,
}

/// A fake image generator.
///
/// Each registered pattern holds a queue of outcomes. Outcomes are consumed in order,
/// and the last one repeats for any further matching calls. Prompts matching no
/// pattern get a generated URL, or an error if no default is configured.
#[derive(Debug)]
pub struct FakeImageGenerator {
    scripts: Mutex<Vec<Script>>,
    default_url_base: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeImageGenerator {
    fn default() -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            default_url_base: Some(DEFAULT_FAKE_URL_BASE.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeImageGenerator {
    /// Create a generator with no scripted outcomes and no default.
    pub fn new() -> Self {
        Self {
            default_url_base: None,
            ..Self::default()
        }
    }

    /// Return `url` for prompts containing `prompt_contains`.
    pub fn with_url(self, prompt_contains: &str, url: &str) -> Self {
        self.with_outcome(prompt_contains, FakeOutcome::Url(url.to_string()))
    }

    /// Fail with `error` for prompts containing `prompt_contains`.
    pub fn with_error(self, prompt_contains: &str, error: GenerationError) -> Self {
        self.with_outcome(prompt_contains, FakeOutcome::Error(error))
    }

    /// Queue an outcome for prompts containing `prompt_contains`.
    pub fn with_outcome(self, prompt_contains: &str, outcome: FakeOutcome) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);
            let pattern = prompt_contains.to_lowercase();
            match scripts.iter_mut().find(|s| s.pattern == pattern) {
                Some(script) => script.outcomes.push_back(outcome),
                None => scripts.push(Script {
                    pattern,
                    outcomes: VecDeque::from([outcome]),
                }),
            }
        }
        self
    }

    /// Set the base used for generated URLs when no pattern matches.
    pub fn with_default_url_base(mut self, base: &str) -> Self {
        self.default_url_base = Some(base.trim_end_matches('/').to_string());
        self
    }

    /// Prompts received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of prompts containing `substring` (case-insensitive).
    pub fn calls_matching(&self, substring: &str) -> usize {
        let needle = substring.to_lowercase();
        self.calls()
            .iter()
            .filter(|p| p.to_lowercase().contains(&needle))
            .count()
    }

    fn next_scripted(&self, prompt: &str) -> Option<FakeOutcome> {
        let prompt_lower = prompt.to_lowercase();
        let mut scripts = self.scripts.lock().unwrap_or_else(PoisonError::into_inner);

        let script = scripts
            .iter_mut()
            .find(|s| prompt_lower.contains(&s.pattern))?;

        if script.outcomes.len() > 1 {
            script.outcomes.pop_front()
        } else {
            script.outcomes.front().cloned()
        }
    }
}

#[async_trait]
impl ImageGenerator for FakeImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let call_number = {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.push(prompt.to_string());
            calls.len()
        };

        match self.next_scripted(prompt) {
            Some(FakeOutcome::Url(url)) => Ok(url),
            Some(FakeOutcome::Error(err)) => Err(err),
            None => match &self.default_url_base {
                Some(base) => Ok(format!("{}/{}.png", base, call_number)),
                None => Err(GenerationError::RequestFailed(format!(
                    "FakeImageGenerator: No outcome configured for prompt (first 100 chars): {}",
                    prompt.chars().take(100).collect::<String>()
                ))),
            },
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }

    fn model_name(&self) -> &str {
        "fake-image-model"
    }
}
