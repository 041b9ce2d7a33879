//! Error types for the transcript router.

use thiserror::Error;

/// Result type alias using our [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed error taxonomy (spec §7). Every variant also maps to an [`ErrorKind`]
/// tag via [`Error::kind`] for persistence in an `Agent Result.error_kind` field
/// or a structured log record — callers must never persist `Display` output as
/// the taxonomy itself.
#[derive(Error, Debug)]
pub enum Error {
    /// Transcript object absent at READ time.
    #[error("transcript object missing: {0}")]
    SourceMissing(String),

    /// Classifier produced no valid decision even after all fallbacks.
    /// Defensive only — the fallback chain is designed to make this unreachable.
    #[error("classifier produced no decision: {0}")]
    Classify(String),

    /// Model adapter call failed or returned invalid output after retries.
    #[error("model call failed: {0}")]
    Model(String),

    /// Non-retryable blob store failure (auth, quota, 5xx after retries).
    #[error("blob store error: {0}")]
    Storage(String),

    /// Conditional append exhausted its retries.
    #[error("conditional append conflict: {0}")]
    Conflict(String),

    /// Non-retryable external API error (Repository Processor).
    #[error("external API error: {0}")]
    External(String),

    /// Credential missing or rejected.
    #[error("auth error: {0}")]
    Auth(String),

    /// Deadline exceeded (event, processor, or model).
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Required configuration missing at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transcript exceeds the 1 MiB size policy.
    #[error("transcript exceeds size limit: {0} bytes")]
    Oversize(usize),

    /// HTTP transport error, wrapped from `reqwest`.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn source_missing(msg: impl Into<String>) -> Self {
        Error::SourceMissing(msg.into())
    }

    pub fn classify(msg: impl Into<String>) -> Self {
        Error::Classify(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Error::Model(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Error::Storage(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Error::Conflict(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Error::External(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Error::Auth(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Stable, serializable tag for this error. Used as `Agent Result.error_kind`
    /// and in structured log fields — never the `Display` string, which may
    /// carry free-text detail not meant for machine matching.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::SourceMissing(_) => ErrorKind::SourceMissing,
            Error::Classify(_) => ErrorKind::Classify,
            Error::Model(_) => ErrorKind::Model,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::External(_) => ErrorKind::External,
            Error::Auth(_) => ErrorKind::Auth,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Config(_) => ErrorKind::Config,
            Error::Oversize(_) => ErrorKind::Oversize,
            Error::Http(_) => ErrorKind::Storage,
            Error::Json(_) => ErrorKind::Model,
        }
    }
}

/// Fieldless mirror of [`Error`]'s variants, serialized into persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceMissing,
    Classify,
    Model,
    Storage,
    Conflict,
    External,
    Auth,
    Timeout,
    Config,
    Oversize,
}
