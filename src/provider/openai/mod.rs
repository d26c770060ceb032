
use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

use super::{ChatModel, Embedder};
use crate::config::ProviderConfig;
use crate::{DandoriError, Result};

const EXPONENTIAL_BACKOFF_BASE: u64 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Blocking client for an OpenAI-compatible `/embeddings` and
/// `/chat/completions` API.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    base_url: String,
    api_key: String,
    embedding_model: String,
    chat_model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ProviderClient {
    #[inline]
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = config
            .endpoint_url()
            .map_err(|e| DandoriError::Config(e.to_string()))?
            .as_str()
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            base_url,
            api_key: config.api_key.clone(),
            embedding_model: config.embedding_model.clone(),
            chat_model: config.chat_model.clone(),
            agent: build_agent(Duration::from_secs(config.timeout_secs)),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base delay before the first retry; doubles on each further attempt.
    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Generate an embedding for a single text input
    #[inline]
    pub fn generate_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        debug!("Generating embedding for text (length: {})", text.len());

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: text,
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize embedding request")?;

        let response_text = self
            .post_json("embeddings", &request_json, self.retry_attempts)
            .context("Failed to generate embedding")?;

        let response: EmbeddingResponse =
            serde_json::from_str(&response_text).context("Failed to parse embedding response")?;

        let embedding = response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("Embedding response contained no data"))?;

        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    /// Ask the chat model for a completion and return the first choice verbatim
    #[inline]
    pub fn generate_completion(&self, system: &str, user: &str) -> anyhow::Result<String> {
        debug!(
            "Requesting completion from {} (prompt length: {})",
            self.chat_model,
            user.len()
        );

        let request = ChatRequest {
            model: &self.chat_model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        let request_json =
            serde_json::to_string(&request).context("Failed to serialize completion request")?;

        // A completion is sent once; the caller's request deadline bounds it.
        let response_text = self
            .post_json("chat/completions", &request_json, 1)
            .context("Failed to generate completion")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse completion response")?;

        response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Completion response contained no choices"))?
            .message
            .content
            .ok_or_else(|| anyhow!("Completion response contained no content"))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post_json(&self, path: &str, body: &str, attempts: u32) -> anyhow::Result<String> {
        let url = self.endpoint(path);
        let authorization = format!("Bearer {}", self.api_key);

        self.make_request_with_retry(&url, attempts, || {
            self.agent
                .post(url.as_str())
                .header("Authorization", authorization.as_str())
                .header("Content-Type", "application/json")
                .send(body)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    fn make_request_with_retry<F>(
        &self,
        url: &str,
        attempts: u32,
        mut request_fn: F,
    ) -> anyhow::Result<String>
    where
        F: FnMut() -> std::result::Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!("HTTP request attempt {}/{}", attempt, attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    let should_retry = match &error {
                        ureq::Error::StatusCode(status) => {
                            if *status >= 500 {
                                warn!(
                                    "Server error (status {}), attempt {}/{}",
                                    status, attempt, attempts
                                );
                                true
                            } else {
                                warn!("Client error (status {}), not retrying", status);
                                return Err(anyhow!("Client error: HTTP {}", status));
                            }
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, attempts
                            );
                            true
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            false
                        }
                    };

                    if !should_retry {
                        return Err(anyhow!("Non-retryable error: {}", error));
                    }

                    last_error = Some(anyhow!("Request error: {}", error));

                    if attempt < attempts {
                        let delay = self.retry_delay * EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) as u32;
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", url);

        Err(last_error.unwrap_or_else(|| anyhow!("Request failed after retries")))
    }
}

impl Embedder for ProviderClient {
    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.generate_embedding(text)
            .map_err(|e| DandoriError::Provider(format!("{e:#}")))
    }
}

impl ChatModel for ProviderClient {
    #[inline]
    fn complete(&self, system: &str, user: &str) -> Result<String> {
        self.generate_completion(system, user)
            .map_err(|e| DandoriError::Provider(format!("{e:#}")))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}
