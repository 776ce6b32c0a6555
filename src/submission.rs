//! Validation of email submissions before any upstream call.

use crate::error::ValidationError;
use lettre::Address;
use serde::Deserialize;

/// Maximum subject length in characters.
pub const MAX_SUBJECT_LEN: usize = 500;
/// Maximum sender/recipient address length in characters.
pub const MAX_ADDRESS_LEN: usize = 255;
/// Maximum body length in characters.
pub const MAX_BODY_LEN: usize = 50_000;

/// Unvalidated submission as it arrives over the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSubmission {
    pub subject: Option<String>,
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub body: Option<String>,
}

impl RawSubmission {
    /// True when subject, sender and body are all present and non-empty.
    #[must_use]
    pub fn has_required_fields(&self) -> bool {
        [&self.subject, &self.sender, &self.body]
            .iter()
            .all(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
    }
}

/// A validated email, immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailSubmission {
    subject: String,
    sender: String,
    recipient: Option<String>,
    body: String,
}

impl EmailSubmission {
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn recipient(&self) -> Option<&str> {
        self.recipient.as_deref()
    }

    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }
}

/// Validate a raw submission.
///
/// Fields are checked in the order subject, sender, recipient, body and the
/// first failure is returned.
///
/// # Errors
/// Returns the [`ValidationError`] of the first failing field.
pub fn validate(raw: &RawSubmission) -> Result<EmailSubmission, ValidationError> {
    let subject = required_text(raw.subject.as_deref(), "subject", MAX_SUBJECT_LEN)?;
    let sender = address(raw.sender.as_deref().unwrap_or_default(), "sender")?;

    let recipient = match raw.recipient.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(r) => Some(address(r, "recipient")?),
    };

    let body = required_text(raw.body.as_deref(), "body", MAX_BODY_LEN)?;

    Ok(EmailSubmission {
        subject,
        sender,
        recipient,
        body,
    })
}

fn required_text(
    value: Option<&str>,
    field: &'static str,
    max: usize,
) -> Result<String, ValidationError> {
    let trimmed = value.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong(field));
    }
    Ok(trimmed.to_string())
}

fn address(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField(field));
    }
    if trimmed.chars().count() > MAX_ADDRESS_LEN {
        return Err(ValidationError::TooLong(field));
    }
    if !is_valid_address(trimmed) {
        return Err(ValidationError::InvalidEmail(field));
    }
    Ok(trimmed.to_string())
}

/// Check `local@domain` shape.
///
/// `lettre` enforces the RFC 5321 local part and hostname rules; on top of
/// that a domain name must have at least two non-empty labels.
#[must_use]
pub fn is_valid_address(s: &str) -> bool {
    let Ok(addr) = s.parse::<Address>() else {
        return false;
    };
    let domain = addr.domain();
    if domain.starts_with('[') {
        return true;
    }
    let mut labels = domain.split('.');
    let first_ok = labels.next().is_some_and(|l| !l.is_empty());
    let rest: Vec<&str> = labels.collect();
    first_ok && !rest.is_empty() && rest.iter().all(|l| !l.is_empty())
}
