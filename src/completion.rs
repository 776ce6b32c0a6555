//! Chat-completion capability and the optional retry wrapper around it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One turn of a conversation sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    #[must_use]
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A single completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// Something that turns a conversation into model text.
///
/// The production implementation is [`crate::GatewayClient`]; tests inject
/// scripted backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Run one completion and return the reply text (possibly empty).
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;
}

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (zero based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self
            .base_delay_ms
            .saturating_mul(1_u64.checked_shl(attempt).unwrap_or(u64::MAX))
            .min(self.max_delay_ms);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        };
        Duration::from_millis(backoff + jitter)
    }
}

/// Wraps a backend and retries transient upstream failures.
pub struct RetryingBackend<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: CompletionBackend> RetryingBackend<B> {
    #[must_use]
    pub const fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<B: CompletionBackend> CompletionBackend for RetryingBackend<B> {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(request).await {
                Err(Error::Classification(e))
                    if e.is_transient() && attempt < self.policy.max_retries =>
                {
                    let delay = self.policy.delay_for(attempt);
                    attempt += 1;
                    warn!(
                        "Upstream failure ({e}), retry {attempt}/{} in {delay:?}",
                        self.policy.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}
