use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One successfully fetched resource. Immutable once created; moved into the
/// queue and consumed exactly once by a single worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub latency_seconds: f64,
    pub content: String,
}

impl FetchRecord {
    pub fn new(url: String, latency_seconds: f64, content: String) -> Self {
        Self {
            url,
            timestamp: Utc::now(),
            latency_seconds,
            content,
        }
    }
}

/// Classification of a terminal fetch failure, after retries are spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    HttpError,
    RetriesExhausted,
}

impl FailureKind {
    pub fn classify(err: &Error) -> Self {
        if err.is_timeout() {
            FailureKind::Timeout
        } else if matches!(err, Error::HttpStatus { .. }) {
            FailureKind::HttpError
        } else {
            FailureKind::RetriesExhausted
        }
    }
}

/// Terminal result of one logical fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchRecord),
    Failure {
        kind: FailureKind,
        url: String,
        cause: Error,
    },
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, FetchOutcome::Success(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_matches_error_shape() {
        let timeout = Error::Timeout {
            url: "http://a".into(),
        };
        assert_eq!(FailureKind::classify(&timeout), FailureKind::Timeout);

        let status = Error::HttpStatus {
            url: "http://a".into(),
            status: reqwest::StatusCode::BAD_GATEWAY,
        };
        assert_eq!(FailureKind::classify(&status), FailureKind::HttpError);

        let other = Error::Internal("connection reset".into());
        assert_eq!(FailureKind::classify(&other), FailureKind::RetriesExhausted);
    }
}
