use crate::models::RatioKind;
use thiserror::Error;

/// Why a ratio kind or channel could not be produced. Never fatal: callers
/// report it next to whatever did resolve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Unavailable {
    #[error("missing data: {0}")]
    MissingData(String),

    #[error("{kind} value {value} is outside its plausibility bound")]
    ImplausibleValue { kind: RatioKind, value: f64 },

    #[error("source {source_name} unavailable: {reason}")]
    SourceUnavailable {
        source_name: &'static str,
        reason: String,
    },

    #[error("insufficient history: {have} valid points, need {need}")]
    InsufficientHistory { have: usize, need: usize },
}

impl Unavailable {
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData(what.into())
    }

    pub fn source(source_name: &'static str, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_name,
            reason: reason.to_string(),
        }
    }
}

/// Precondition violations; the only errors the core surfaces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("lookback window must be between 1 and 100 years, got {0}")]
    InvalidLookback(i64),

    #[error("ticker must not be empty")]
    EmptyTicker,
}

/// Failure at a provider boundary.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unparseable response: {0}")]
    Parse(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl SourceError {
    /// Worth another attempt: rate limiting, server errors and transport failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Transport { .. } => true,
            Self::Parse(_) | Self::Storage(_) => false,
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(e: serde_json::Error) -> Self {
        Self::Parse(e.to_string())
    }
}

impl From<duckdb::Error> for SourceError {
    fn from(e: duckdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_statuses() {
        let status = |s| SourceError::Status {
            status: s,
            url: "http://x".into(),
        };
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
        assert!(!status(404).is_transient());
        assert!(!SourceError::Parse("bad".into()).is_transient());
    }

    #[test]
    fn test_unavailable_messages() {
        let e = Unavailable::InsufficientHistory { have: 1, need: 3 };
        assert_eq!(e.to_string(), "insufficient history: 1 valid points, need 3");
        let e = Unavailable::source("remote_table", "HTTP 403");
        assert_eq!(e.to_string(), "source remote_table unavailable: HTTP 403");
    }
}
