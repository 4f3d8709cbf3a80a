use std::fmt;

use crate::quota::QuotaWindow;

/// Every way an ingestion request can be refused.
///
/// `Timeout` and `Persistence` are fail-closed outcomes: the request is
/// denied because the service could not prove it was allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionError {
    /// Malformed, unknown, wrong-environment or wrong-secret credential.
    InvalidCredential,
    KeyRevoked,
    FetcherSuspended,
    InsufficientScope { missing: Vec<String> },
    QuotaExceeded {
        window: QuotaWindow,
        used: i64,
        cap: i64,
        requested: i64,
    },
    Timeout { operation: &'static str },
    Persistence(String),
}

impl AdmissionError {
    /// Stable machine-readable code for API bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            AdmissionError::InvalidCredential => "invalid_credential",
            AdmissionError::KeyRevoked => "key_revoked",
            AdmissionError::FetcherSuspended => "fetcher_suspended",
            AdmissionError::InsufficientScope { .. } => "insufficient_scope",
            AdmissionError::QuotaExceeded { .. } => "quota_exceeded",
            AdmissionError::Timeout { .. } => "timeout",
            AdmissionError::Persistence(_) => "unavailable",
        }
    }

    /// Wrap a storage failure. The message is logged, not returned to callers.
    pub fn persistence(err: impl fmt::Display) -> Self {
        AdmissionError::Persistence(err.to_string())
    }
}

impl fmt::Display for AdmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionError::InvalidCredential => write!(f, "invalid api key"),
            AdmissionError::KeyRevoked => write!(f, "api key revoked"),
            AdmissionError::FetcherSuspended => write!(f, "fetcher suspended"),
            AdmissionError::InsufficientScope { missing } => {
                write!(f, "insufficient scope: missing {}", missing.join(","))
            }
            AdmissionError::QuotaExceeded {
                window,
                used,
                cap,
                requested,
            } => write!(
                f,
                "{} quota exceeded: used={used} requested={requested} cap={cap}",
                window.as_str()
            ),
            AdmissionError::Timeout { operation } => write!(f, "{operation} timed out"),
            AdmissionError::Persistence(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for AdmissionError {}
