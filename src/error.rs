//! Custom error types for threat-proxy.

use std::fmt;
use std::io;

/// Main error type for proxy operations.
#[derive(Debug)]
pub enum Error {
    /// I/O errors (listener, file operations)
    Io(io::Error),
    /// `SQLite` database errors
    Database(String),
    /// Submitted email failed validation
    Validation(ValidationError),
    /// Upstream model call or reply parsing failed
    Classification(ClassificationError),
    /// Upstream credentials or settings missing
    Config(ConfigurationError),
}

/// Input validation failures. Each variant names the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Field is empty after trimming
    EmptyField(&'static str),
    /// Field is not a syntactically valid email address
    InvalidEmail(&'static str),
    /// Field exceeds its length ceiling
    TooLong(&'static str),
}

/// Failures of the upstream completion call or of its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassificationError {
    /// Upstream answered with a non-success HTTP status
    UpstreamFailure(u16),
    /// Upstream could not be reached or the response body was unreadable
    Unreachable(String),
    /// No `{ ... }` span in the model reply
    NoJsonFound,
    /// A `{ ... }` span exists but is not a JSON object
    MalformedJson(String),
    /// Parsed object does not satisfy the classification schema
    SchemaViolation(&'static str),
}

/// Missing or unusable upstream configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No API key configured for the gateway
    MissingApiKey,
    /// Gateway client could not be constructed
    InvalidClient(String),
}

impl ValidationError {
    /// Name of the field that failed.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyField(f) | Self::InvalidEmail(f) | Self::TooLong(f) => f,
        }
    }
}

impl ClassificationError {
    /// Whether a bounded retry could plausibly succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::UpstreamFailure(status) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Database(msg) => write!(f, "database error: {msg}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Classification(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyField(field) => write!(f, "{field} is required"),
            Self::InvalidEmail(field) => write!(f, "{field} must be a valid email address"),
            Self::TooLong(field) => write!(f, "{field} is too long"),
        }
    }
}

impl fmt::Display for ClassificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpstreamFailure(status) => write!(f, "AI API error: {status}"),
            Self::Unreachable(_) => write!(f, "AI API unreachable"),
            Self::NoJsonFound | Self::MalformedJson(_) => write!(f, "Failed to parse AI response"),
            Self::SchemaViolation(field) => write!(f, "AI response has invalid {field}"),
        }
    }
}

impl fmt::Display for ConfigurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingApiKey => write!(f, "API key not configured"),
            Self::InvalidClient(_) => write!(f, "AI client not configured"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Classification(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Database(_) => None,
        }
    }
}

impl std::error::Error for ValidationError {}
impl std::error::Error for ClassificationError {}
impl std::error::Error for ConfigurationError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<ClassificationError> for Error {
    fn from(e: ClassificationError) -> Self {
        Self::Classification(e)
    }
}

impl From<ConfigurationError> for Error {
    fn from(e: ConfigurationError) -> Self {
        Self::Config(e)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(io_err) => io_err,
            other => Self::other(other.to_string()),
        }
    }
}

/// Result type alias for threat-proxy operations.
pub type Result<T> = std::result::Result<T, Error>;
