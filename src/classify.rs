//! Threat classification through the completion backend.

use crate::completion::{ChatMessage, ChatRole, CompletionBackend, CompletionRequest};
use crate::error::{ClassificationError, Result};
use crate::extract::extract_json_object;
use crate::submission::EmailSubmission;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

/// Sampling temperature for classification: low, but not zero.
pub const CLASSIFY_TEMPERATURE: f32 = 0.1;

/// Closed set of threat labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Safe,
    Suspicious,
    Phishing,
    Malicious,
    Tampering,
}

impl ThreatLevel {
    pub const ALL: [Self; 5] = [
        Self::Safe,
        Self::Suspicious,
        Self::Phishing,
        Self::Malicious,
        Self::Tampering,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Suspicious => "suspicious",
            Self::Phishing => "phishing",
            Self::Malicious => "malicious",
            Self::Tampering => "tampering",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = ClassificationError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or(ClassificationError::SchemaViolation("threat_level"))
    }
}

/// Verdict returned by the model after schema validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatClassification {
    pub threat_level: ThreatLevel,
    pub confidence_score: u8,
    pub analysis_summary: String,
    pub indicators: Vec<String>,
}

/// Build the single-turn prompt for a submission.
#[must_use]
pub fn build_prompt(submission: &EmailSubmission) -> String {
    format!(
        r#"You are an expert email security analyst. Analyze this email for threats including phishing, malware, social engineering, tampering, and other malicious indicators.

Email Details:
- Subject: {subject}
- Sender: {sender}
- Body: {body}

Respond ONLY with valid JSON in this exact format and nothing else:
{{
  "threat_level": "safe" | "suspicious" | "phishing" | "malicious" | "tampering",
  "confidence_score": <integer 0-100>,
  "analysis_summary": "<2-3 sentence summary>",
  "indicators": ["<indicator 1>", "<indicator 2>", ...]
}}

Analyze carefully for:
1. Suspicious sender domain (mismatched, free email for official comms)
2. Urgency/pressure tactics
3. Suspicious links or attachments mentioned
4. Grammar/spelling anomalies
5. Requests for sensitive info (passwords, SSN, bank details)
6. Header manipulation signs
7. Social engineering patterns
8. Impersonation attempts"#,
        subject = submission.subject(),
        sender = submission.sender(),
        body = submission.body(),
    )
}

/// Parse and schema-check a raw model reply.
///
/// # Errors
/// Extraction errors from [`extract_json_object`], or
/// [`ClassificationError::SchemaViolation`] naming the first bad field.
pub fn parse_classification(reply: &str) -> std::result::Result<ThreatClassification, ClassificationError> {
    let object = extract_json_object(reply)?;
    from_object(&object)
}

fn from_object(
    object: &Map<String, Value>,
) -> std::result::Result<ThreatClassification, ClassificationError> {
    let threat_level = object
        .get("threat_level")
        .and_then(Value::as_str)
        .ok_or(ClassificationError::SchemaViolation("threat_level"))?
        .parse::<ThreatLevel>()?;

    let confidence_score = object
        .get("confidence_score")
        .and_then(confidence)
        .ok_or(ClassificationError::SchemaViolation("confidence_score"))?;

    let analysis_summary = object
        .get("analysis_summary")
        .and_then(Value::as_str)
        .ok_or(ClassificationError::SchemaViolation("analysis_summary"))?
        .to_string();

    let indicators = match object.get("indicators") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .ok_or(ClassificationError::SchemaViolation("indicators"))?,
        Some(_) => return Err(ClassificationError::SchemaViolation("indicators")),
    };

    Ok(ThreatClassification {
        threat_level,
        confidence_score,
        analysis_summary,
        indicators,
    })
}

/// Integer in `[0, 100]`; whole-valued floats such as `87.0` are accepted.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn confidence(value: &Value) -> Option<u8> {
    if let Some(n) = value.as_u64() {
        return u8::try_from(n).ok().filter(|n| *n <= 100);
    }
    let f = value.as_f64()?;
    (f.fract() == 0.0 && (0.0..=100.0).contains(&f)).then(|| f as u8)
}

/// Classifies submissions with one completion call each.
#[derive(Clone)]
pub struct Classifier {
    backend: Arc<dyn CompletionBackend>,
}

impl Classifier {
    #[must_use]
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self { backend }
    }

    /// Classify a validated submission.
    ///
    /// # Errors
    /// Configuration errors (missing API key), upstream failures, or reply
    /// extraction and schema errors. Nothing is retried here.
    pub async fn classify(&self, submission: &EmailSubmission) -> Result<ThreatClassification> {
        let request = CompletionRequest {
            messages: vec![ChatMessage::new(ChatRole::User, build_prompt(submission))],
            temperature: CLASSIFY_TEMPERATURE,
            max_tokens: None,
        };

        let reply = self.backend.complete(&request).await?;

        match parse_classification(&reply) {
            Ok(classification) => {
                info!(
                    "Classified email from {} as {} ({}%)",
                    submission.sender(),
                    classification.threat_level,
                    classification.confidence_score
                );
                Ok(classification)
            }
            Err(e) => {
                warn!("Rejected model reply: {e:?}");
                Err(e.into())
            }
        }
    }
}
