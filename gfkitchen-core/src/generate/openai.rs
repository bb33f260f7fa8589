//! OpenAI-compatible image generation provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::config::GeneratorConfig;
use super::{GenerationError, ImageGenerator};

/// Images API provider (`POST {base_url}/images/generations`).
#[derive(Debug)]
pub struct OpenAiImageGenerator {
    api_key: String,
    model: String,
    size: String,
    endpoint: String,
    client: reqwest::Client,
}

impl OpenAiImageGenerator {
    /// Create a new generator from configuration.
    pub fn new(config: GeneratorConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .ok_or_else(|| GenerationError::NotConfigured("OPENAI_API_KEY not set".to_string()))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GenerationError::NotConfigured(e.to_string()))?;

        Ok(Self {
            api_key,
            model: config.model,
            size: config.size,
            endpoint: format!("{}/images/generations", config.base_url.trim_end_matches('/')),
            client,
        })
    }
}

/// Images API request format.
#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

/// Images API response format.
#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Error response from the Images API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

/// Turn a raw HTTP response into an image URL or a classified error.
fn parse_response(
    status: u16,
    retry_after: Option<&str>,
    body: &str,
) -> Result<String, GenerationError> {
    if status == 429 {
        return Err(GenerationError::RateLimited {
            retry_after_secs: retry_after.and_then(|v| v.trim().parse().ok()),
        });
    }

    if !(200..300).contains(&status) {
        // Try to parse error response
        if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(body) {
            return Err(GenerationError::Api {
                status,
                message: error_response.error.message,
            });
        }
        return Err(GenerationError::Api {
            status,
            message: body.to_string(),
        });
    }

    let response: ImageResponse =
        serde_json::from_str(body).map_err(|e| GenerationError::ParseError(e.to_string()))?;

    response
        .data
        .into_iter()
        .find_map(|d| d.url)
        .filter(|url| !url.trim().is_empty())
        .ok_or(GenerationError::EmptyResponse)
}

#[async_trait]
impl ImageGenerator for OpenAiImageGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = ImageRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: &self.size,
        };

        tracing::debug!(model = %self.model, size = %self.size, "Calling image API");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::RequestFailed(e.to_string()))?;

        parse_response(status, retry_after.as_deref(), &body)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
