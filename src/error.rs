use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::SubmissionState;

/// Why the answer buffer stopped accepting edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealReason {
    Expired,
    Finalizing,
    Submitted,
}

impl fmt::Display for SealReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SealReason::Expired => write!(f, "time limit reached"),
            SealReason::Finalizing => write!(f, "submission in progress"),
            SealReason::Submitted => write!(f, "attempt submitted"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("session clock already started")]
    AlreadyStarted,
    #[error("session no longer accepts changes: {0}")]
    SessionExpired(SealReason),
    #[error("unknown question id: {0}")]
    UnknownQuestion(String),
    #[error("submission cannot be retried while {0:?}")]
    NotRetryable(SubmissionState),
}

/// Failures reported by the persistence boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("transient network error: {0}")]
    Transient(String),
    #[error("answer rejected: {0}")]
    Validation(String),
    #[error("attempt was already submitted")]
    AlreadySubmitted,
}

impl GatewayError {
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }
}

#[derive(Debug, Error)]
pub enum SupplyError {
    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid attempt file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid attempt: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt answers file (use --clear to reset): {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("attempt file has changed since the answers were saved (use --clear to reset)")]
    AttemptMismatch,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
