//! Client for OpenAI-compatible chat completion and embedding endpoints.

use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, error, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

#[derive(Debug, Clone, Error)]
pub enum AiError {
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited")]
    RateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("json error: {0}")]
    Serde(String),
    #[error("missing api key: AI_API_KEY is not set")]
    MissingApiKey,
}

impl AiError {
    /// Returns true if the error is transient and should be retried.
    pub fn should_retry(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout | Self::RateLimited => true,
            Self::Http { status, .. } => (500..=599).contains(status),
            _ => false,
        }
    }
}

/// Text generation and embedding backend used by the AI-driven services
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Single-turn chat completion returning the assistant's text
    async fn chat(&self, system: Option<&str>, prompt: &str, max_tokens: u32) -> Result<String, AiError>;

    /// One embedding per input, in input order
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiError>;
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// HTTP implementation of [`AiProvider`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AiClient {
    http: Client,
    config: AiConfig,
}

impl AiClient {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// Build a client. A missing API key is reported on the first call, not here.
    pub fn new(config: AiConfig) -> Result<Self, AiError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("skill-assess/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AiError::Transport(e.to_string()))?;

        Ok(Self { http, config })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn api_key(&self) -> Result<&str, AiError> {
        self.config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AiError::MissingApiKey)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, AiError> {
        let api_key = self.api_key()?;
        let url = self.url(path);

        (|| async { self.send_request(&url, api_key, body).await })
            .retry(
                ExponentialBuilder::default()
                    .with_min_delay(Duration::from_secs(1))
                    .with_max_delay(Duration::from_secs(30))
                    .with_max_times(3)
                    .with_jitter(),
            )
            .when(|e: &AiError| e.should_retry())
            .notify(|e, dur| {
                warn!(
                    "AI API call failed, retrying after {:.2}s: {}",
                    dur.as_secs_f64(),
                    e
                )
            })
            .await
    }

    async fn send_request<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        url: &str,
        api_key: &str,
        body: &B,
    ) -> Result<R, AiError> {
        let res = self
            .http
            .post(url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => res.json::<R>().await.map_err(|e| AiError::Serde(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(AiError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(AiError::RateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(AiError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl AiProvider for AiClient {
    async fn chat(&self, system: Option<&str>, prompt: &str, max_tokens: u32) -> Result<String, AiError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.config.chat_model,
            messages,
            max_tokens,
        };
        debug!(model = %self.config.chat_model, prompt_len = prompt.len(), "Sending chat request");

        let response: ChatResponse = self.post("chat/completions", &request).await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AiError::Serde("No text content in response".to_string()))
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.config.embedding_model,
            input: inputs,
        };
        let mut response: EmbeddingResponse = self.post("embeddings", &request).await?;
        if response.data.len() != inputs.len() {
            return Err(AiError::Serde(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

/// Send a prompt expecting a JSON object in the reply and deserialize it
pub async fn ask_json<T: DeserializeOwned>(
    provider: &dyn AiProvider,
    prompt: &str,
    system: Option<&str>,
    max_tokens: u32,
) -> Result<T, AiError> {
    let response = provider.chat(system, prompt, max_tokens).await?;

    if response.trim().is_empty() {
        error!("Model returned an empty response");
        return Err(AiError::Serde("Empty response from model".to_string()));
    }

    // The reply may wrap the JSON in a markdown code block
    let json_str = extract_json(&response);

    serde_json::from_str(json_str).map_err(|e| {
        error!(
            json_error = %e,
            response_length = response.len(),
            extracted_json_preview = %json_str.chars().take(500).collect::<String>(),
            "Failed to parse JSON response from model"
        );
        AiError::Serde(format!(
            "{} (response preview: {})",
            e,
            json_str.chars().take(500).collect::<String>()
        ))
    })
}

fn map_reqwest_error(e: reqwest::Error) -> AiError {
    if e.is_timeout() {
        AiError::Timeout
    } else {
        AiError::Transport(e.to_string())
    }
}

/// Extract JSON from a string that might contain markdown code blocks
fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        // Skip past any language identifier on the same line
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    // Prose around a bare object
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}
