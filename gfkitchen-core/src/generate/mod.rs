//! Image generation provider abstraction.
//!
//! This module provides:
//! - `ImageGenerator` trait for abstracting image-generation APIs
//! - `OpenAiImageGenerator` talking to an OpenAI-compatible images endpoint
//! - `FakeImageGenerator` for tests and dry runs
//! - `GenerationError` with a machine-checkable `ErrorKind`
//!
//! # Configuration
//!
//! - `GFK_IMAGE_PROVIDER` (optional): "openai" (default) or "fake"
//! - `OPENAI_API_KEY` (required for "openai")
//! - `GFK_IMAGE_MODEL` (optional): Model name, e.g. "dall-e-3"
//! - `GFK_IMAGE_BASE_URL` (optional): API base URL
//! - `GFK_IMAGE_SIZE` (optional): Requested image size, e.g. "1024x1024"
//! - `GFK_IMAGE_TIMEOUT_SECS` (optional): Request timeout

mod config;
mod fake;
mod openai;

pub use config::{ConfigError, GeneratorConfig, Provider};
pub use fake::{FakeImageGenerator, FakeOutcome};
pub use openai::OpenAiImageGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// How a failed generation call should be treated by the batch runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The API asked us to slow down. Back off before the next call.
    RateLimited,
    /// Worth trying again on a later run.
    Transient,
    /// Retrying the same request will not help.
    Permanent,
}

/// Error type for image generation.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("API returned error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned no image URL")]
    EmptyResponse,

    #[error("Failed to parse response: {0}")]
    ParseError(String),

    #[error("Generator not configured: {0}")]
    NotConfigured(String),
}

impl GenerationError {
    /// Classify this error from its structure (status codes), never its message text.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenerationError::RateLimited { .. } => ErrorKind::RateLimited,
            GenerationError::Api { status, .. } => match status {
                429 => ErrorKind::RateLimited,
                408 | 500..=599 => ErrorKind::Transient,
                _ => ErrorKind::Permanent,
            },
            GenerationError::RequestFailed(_) | GenerationError::EmptyResponse => {
                ErrorKind::Transient
            }
            GenerationError::ParseError(_) | GenerationError::NotConfigured(_) => {
                ErrorKind::Permanent
            }
        }
    }

    /// Seconds the API asked us to wait, if it said.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            GenerationError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}

/// True if the error should trigger the rate-limit backoff.
pub fn is_rate_limited(err: &GenerationError) -> bool {
    err.kind() == ErrorKind::RateLimited
}

/// Trait for image generation providers.
///
/// A call is a single-shot request: one prompt in, one image URL out. Providers do
/// not retry internally; the batch runner decides what happens after a failure.
#[async_trait]
pub trait ImageGenerator: Send + Sync + fmt::Debug {
    /// Generate one image for the prompt and return its URL.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// Get the provider name (e.g., "openai", "fake").
    fn provider_name(&self) -> &'static str;

    /// Get the model name (e.g., "dall-e-3").
    fn model_name(&self) -> &str;
}

/// Create a generator for the configured provider.
pub fn create_generator(config: GeneratorConfig) -> Result<Box<dyn ImageGenerator>, GenerationError> {
    match config.provider {
        Provider::Fake => Ok(Box::new(FakeImageGenerator::default())),
        Provider::OpenAi => Ok(Box::new(OpenAiImageGenerator::new(config)?)),
    }
}

/// Create a generator from environment variables.
pub fn create_generator_from_env() -> Result<Box<dyn ImageGenerator>, GenerationError> {
    let config =
        GeneratorConfig::from_env().map_err(|e| GenerationError::NotConfigured(e.to_string()))?;
    create_generator(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_classification_uses_structure_not_text() {
        let rate_limited = GenerationError::RateLimited {
            retry_after_secs: None,
        };
        assert!(is_rate_limited(&rate_limited));

        let too_many = GenerationError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(is_rate_limited(&too_many));

        // Message text mentioning "rate" is irrelevant.
        let frame_rate = GenerationError::Api {
            status: 400,
            message: "unsupported frame rate".to_string(),
        };
        assert!(!is_rate_limited(&frame_rate));
        assert_eq!(frame_rate.kind(), ErrorKind::Permanent);

        let exchange_rate = GenerationError::RequestFailed("exchange rate service down".into());
        assert!(!is_rate_limited(&exchange_rate));
        assert_eq!(exchange_rate.kind(), ErrorKind::Transient);
    }

    #[test]
    fn server_errors_and_timeouts_are_transient() {
        for status in [408, 500, 502, 503] {
            let err = GenerationError::Api {
                status,
                message: String::new(),
            };
            assert_eq!(err.kind(), ErrorKind::Transient, "status {}", status);
        }
        assert_eq!(GenerationError::EmptyResponse.kind(), ErrorKind::Transient);
    }

    #[test]
    fn retry_after_only_for_rate_limited() {
        let err = GenerationError::RateLimited {
            retry_after_secs: Some(90),
        };
        assert_eq!(err.retry_after_secs(), Some(90));
        assert_eq!(GenerationError::EmptyResponse.retry_after_secs(), None);
    }

    #[tokio::test]
    async fn fake_provider_is_created_without_api_key() {
        let config = GeneratorConfig::fake();
        let generator = create_generator(config).unwrap();
        assert_eq!(generator.provider_name(), "fake");
        assert!(generator.generate("anything").await.is_ok());
    }
}
