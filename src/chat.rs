//! Security-advice assistant.

use crate::completion::{ChatMessage, ChatRole, CompletionBackend, CompletionRequest};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Number of most recent turns forwarded upstream.
pub const HISTORY_WINDOW: usize = 20;
/// Sampling temperature for chat replies.
pub const CHAT_TEMPERATURE: f32 = 0.7;
/// Reply length cap in tokens.
pub const CHAT_MAX_TOKENS: u32 = 1000;

/// Returned when the model produced no text.
pub const EMPTY_REPLY: &str = "I couldn't generate a response. Please try again.";
/// Returned by [`ChatAssistant::reply_or_apology`] when the upstream call fails.
pub const APOLOGY: &str = "Sorry, I'm having trouble connecting. Please try again later.";

const SYSTEM_PROMPT: &str = "You are a Security Assistant, an expert in email security, phishing detection, cybersecurity best practices, and digital hygiene.

Your role:
- Answer questions about email threats (phishing, malware, tampering, social engineering)
- Explain cybersecurity concepts in plain language
- Provide actionable security tips for students and institutions
- Help users understand threat analysis results
- Guide users on digital hygiene best practices

Rules:
- Be concise but thorough
- Use markdown for formatting
- If asked about topics outside cybersecurity, politely redirect
- Never provide actual malicious code or techniques
- Always prioritize user safety and education";

/// Chat front end over a completion backend.
#[derive(Clone)]
pub struct ChatAssistant {
    backend: Arc<dyn CompletionBackend>,
}

impl ChatAssistant {
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Build the upstream request: system turn plus the last
    /// [`HISTORY_WINDOW`] caller turns. Caller-supplied system turns are dropped.
    #[must_use]
    pub fn build_request(turns: &[ChatMessage]) -> CompletionRequest {
        let history: Vec<&ChatMessage> = turns
            .iter()
            .filter(|t| t.role != ChatRole::System)
            .collect();
        let start = history.len().saturating_sub(HISTORY_WINDOW);

        let mut messages = Vec::with_capacity(HISTORY_WINDOW + 1);
        messages.push(ChatMessage::new(ChatRole::System, SYSTEM_PROMPT));
        messages.extend(history[start..].iter().map(|t| (*t).clone()));

        CompletionRequest {
            messages,
            temperature: CHAT_TEMPERATURE,
            max_tokens: Some(CHAT_MAX_TOKENS),
        }
    }

    /// Ask the model. Empty replies become [`EMPTY_REPLY`].
    ///
    /// # Errors
    /// Upstream and configuration failures are passed through.
    pub async fn reply(&self, turns: &[ChatMessage]) -> Result<String> {
        let request = Self::build_request(turns);
        debug!("Chat request with {} turn(s)", request.messages.len());

        let text = self.backend.complete(&request).await?;
        if text.trim().is_empty() {
            Ok(EMPTY_REPLY.to_string())
        } else {
            Ok(text)
        }
    }

    /// Like [`Self::reply`], but never fails: errors are logged and the fixed
    /// [`APOLOGY`] is returned instead.
    pub async fn reply_or_apology(&self, turns: &[ChatMessage]) -> String {
        match self.reply(turns).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Chat reply failed: {e}");
                APOLOGY.to_string()
            }
        }
    }
}
