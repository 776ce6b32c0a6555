//! Persisted analysis record type.

use crate::classify::{ThreatClassification, ThreatLevel};
use crate::submission::EmailSubmission;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One analyzed email together with its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub created_at: String,
    pub subject: String,
    pub sender: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub body: String,
    pub threat_level: ThreatLevel,
    pub confidence_score: u8,
    pub analysis_summary: String,
    pub indicators: Vec<String>,
}

impl AnalysisRecord {
    /// Combine a submission and its classification under a fresh id.
    #[must_use]
    pub fn new(submission: &EmailSubmission, classification: ThreatClassification) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            subject: submission.subject().to_string(),
            sender: submission.sender().to_string(),
            recipient: submission.recipient().map(str::to_string),
            body: submission.body().to_string(),
            threat_level: classification.threat_level,
            confidence_score: classification.confidence_score,
            analysis_summary: classification.analysis_summary,
            indicators: classification.indicators,
        }
    }
}
