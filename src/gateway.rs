//! Outbound client for an OpenAI-compatible chat-completions gateway.

use crate::completion::{ChatMessage, CompletionBackend, CompletionRequest};
use crate::error::{ClassificationError, ConfigurationError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default chat-completions endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";
/// Default model identifier.
pub const DEFAULT_MODEL: &str = "google/gemini-2.5-flash";

/// Configuration for the gateway client.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Full URL of the chat-completions endpoint
    pub url: String,
    /// Model identifier sent with every request
    pub model: String,
    /// Bearer token; requests fail with a configuration error when absent
    pub api_key: Option<String>,
    /// Overall request timeout, transport default when `None`
    pub timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

/// Chat-completions client over `reqwest`.
pub struct GatewayClient {
    http: reqwest::Client,
    config: GatewayConfig,
}

#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct CompletionReply {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl GatewayClient {
    /// Build a client for the given gateway.
    ///
    /// # Errors
    /// Returns a configuration error if the HTTP client cannot be built.
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| ConfigurationError::InvalidClient(e.to_string()))?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub const fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

#[async_trait]
impl CompletionBackend for GatewayClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            error!("Gateway API key not configured");
            return Err(ConfigurationError::MissingApiKey.into());
        };

        let body = CompletionBody {
            model: &self.config.model,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(
            "Calling {} with {} message(s)",
            self.config.url,
            request.messages.len()
        );

        let response = self
            .http
            .post(&self.config.url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!("Gateway request failed: {e}");
                ClassificationError::Unreachable(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Gateway returned {status}");
            return Err(ClassificationError::UpstreamFailure(status.as_u16()).into());
        }

        let reply: CompletionReply = response
            .json()
            .await
            .map_err(|e| ClassificationError::Unreachable(e.to_string()))?;

        Ok(reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .and_then(|m| m.content)
            .unwrap_or_default())
    }
}
