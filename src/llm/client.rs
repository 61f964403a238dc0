use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{ChatRequest, GenerationOptions, Message};
use crate::config::{ModelConfig, RequestConfig};
use crate::error::{LlmError, LlmResult};

/// Client for an OpenAI-compatible chat completion API
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    request_config: RequestConfig,
}

impl LlmClient {
    /// Create a new chat client
    pub fn new(config: &ModelConfig, request_config: RequestConfig) -> LlmResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(LlmError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            request_config,
        })
    }

    /// Run a chat completion and return the assistant reply text
    pub async fn chat(
        &self,
        messages: Vec<Message>,
        options: GenerationOptions,
    ) -> LlmResult<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest::new(self.model.clone(), messages)
            .with_temperature(options.temperature.unwrap_or(self.temperature))
            .with_max_tokens(options.max_tokens.unwrap_or(self.max_tokens));

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.request_config.max_retries {
            if retries > 0 {
                let delay = Duration::from_millis(
                    self.request_config.retry_delay_ms * (2_u64.pow(retries - 1)),
                );
                warn!(
                    model = %self.model,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying chat request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, &request).await {
                Ok(content) => {
                    let latency = start.elapsed();
                    info!(
                        model = %self.model,
                        latency_ms = latency.as_millis(),
                        "Chat completion succeeded"
                    );
                    return Ok(content);
                }
                Err(e) => {
                    let latency = start.elapsed();
                    error!(
                        model = %self.model,
                        error = %e,
                        latency_ms = latency.as_millis(),
                        retry = retries,
                        "Chat completion failed"
                    );
                    last_error = Some(e);
                    retries += 1;
                }
            }
        }

        Err(LlmError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Execute a single request (internal)
    async fn execute_request(&self, url: &str, request: &ChatRequest) -> LlmResult<String> {
        debug!(
            model = %request.model,
            messages = request.messages.len(),
            "Calling chat completion API"
        );

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        timeout_ms: self.request_config.timeout_ms,
                    }
                } else {
                    LlmError::Http(e)
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_body,
            });
        }

        let chat_response: super::types::ChatResponse =
            response.json().await.map_err(|e| LlmError::InvalidResponse {
                message: format!("Failed to parse response: {}", e),
            })?;

        if let Some(usage) = &chat_response.usage {
            debug!(
                total_tokens = ?usage.total_tokens,
                "Chat completion usage"
            );
        }

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse {
                message: "Response contained no choices".to_string(),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model_config() -> ModelConfig {
        ModelConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.1,
            max_tokens: 4000,
        }
    }

    #[test]
    fn test_client_creation() {
        let client = LlmClient::new(&test_model_config(), RequestConfig::default());
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let mut config = test_model_config();
        config.base_url = "https://api.openai.com/v1/".to_string();

        let client = LlmClient::new(&config, RequestConfig::default()).unwrap();
        assert_eq!(client.base_url(), "https://api.openai.com/v1");
    }
}
