//! Image generator configuration from environment variables.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default OpenAI-compatible base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default image model.
pub const DEFAULT_MODEL: &str = "dall-e-3";

/// Default requested image size.
pub const DEFAULT_SIZE: &str = "1024x1024";

/// Default request timeout in seconds. Image generation is slow.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unknown image provider: {0}")]
    UnknownProvider(String),

    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
}

/// Which image-generation backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Fake,
}

/// Image generator configuration.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub provider: Provider,
    /// API key. Only required for `Provider::OpenAi`.
    pub api_key: Option<String>,
    /// Model name (e.g., "dall-e-3", "gpt-image-1").
    pub model: String,
    /// Base URL for the API.
    pub base_url: String,
    /// Requested image size (e.g., "1024x1024").
    pub size: String,
    /// Request timeout.
    pub timeout: Duration,
}

impl GeneratorConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `GFK_IMAGE_PROVIDER`: "openai" or "fake" (default: "openai")
    /// - `GFK_IMAGE_MODEL`: Model name (default: "dall-e-3")
    /// - `GFK_IMAGE_BASE_URL`: API base URL (default: "https://api.openai.com/v1")
    /// - `GFK_IMAGE_SIZE`: Image size (default: "1024x1024")
    /// - `GFK_IMAGE_TIMEOUT_SECS`: Timeout in seconds (default: 120)
    ///
    /// Required for the openai provider:
    /// - `OPENAI_API_KEY`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration for the fake provider, needing no environment.
    pub fn fake() -> Self {
        Self {
            provider: Provider::Fake,
            api_key: None,
            model: "fake-image-model".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            size: DEFAULT_SIZE.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let provider = match lookup("GFK_IMAGE_PROVIDER").as_deref() {
            None | Some("openai") => Provider::OpenAi,
            Some("fake") => Provider::Fake,
            Some(other) => return Err(ConfigError::UnknownProvider(other.to_string())),
        };

        let api_key = lookup("OPENAI_API_KEY").filter(|k| !k.is_empty());
        if provider == Provider::OpenAi && api_key.is_none() {
            return Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        }

        let model = lookup("GFK_IMAGE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let base_url = lookup("GFK_IMAGE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let size = lookup("GFK_IMAGE_SIZE").unwrap_or_else(|| DEFAULT_SIZE.to_string());

        let timeout_secs = match lookup("GFK_IMAGE_TIMEOUT_SECS") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidValue {
                var: "GFK_IMAGE_TIMEOUT_SECS".to_string(),
                value,
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            provider,
            api_key,
            model,
            base_url,
            size,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}
