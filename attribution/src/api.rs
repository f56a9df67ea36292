use thiserror::Error;

use crate::response::AttributionResult;
use crate::token::InvalidTokenReason;

/// Errors surfaced to the embedding application. Only construction can fail.
#[derive(Error, Debug)]
pub enum AttributionError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("failed to construct http client for the match service: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl From<InvalidTokenReason> for AttributionError {
    fn from(reason: InvalidTokenReason) -> Self {
        AttributionError::InvalidArgument(format!("tenant credentials are not valid: {reason}"))
    }
}

/// Why a referrer lookup did not produce a referrer string.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferrerFailure {
    #[error("install referrer is not supported on this device")]
    NotSupported,
    #[error("install referrer service is unavailable")]
    ServiceUnavailable,
    #[error("install referrer setup failed with code {0}")]
    SetupFailed(i32),
    #[error("install referrer service disconnected before setup finished")]
    Disconnected,
    #[error("install referrer is empty")]
    Empty,
    #[error("install referrer transport error: {0}")]
    TransportError(String),
}

impl ReferrerFailure {
    pub fn reason(&self) -> &str {
        match self {
            Self::NotSupported => "not_supported",
            Self::ServiceUnavailable => "service_unavailable",
            Self::SetupFailed(_) => "setup_failed",
            Self::Disconnected => "disconnected",
            Self::Empty => "empty",
            Self::TransportError(_) => "transport_error",
        }
    }

    /// Value recorded on the match request, e.g. `error:not_supported`.
    pub fn marker(&self) -> String {
        match self {
            Self::TransportError(message) => format!("error:{}:{}", self.reason(), message),
            _ => format!("error:{}", self.reason()),
        }
    }
}

/// Enumeration of errors that end a match call without a result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("no connectivity")]
    NoConnectivity,
    #[error("could not build tenant token: {0}")]
    Token(#[from] InvalidTokenReason),
    #[error("error serializing match request: {0}")]
    Serialize(String),
    #[error("{0}")]
    Request(String),
    #[error("timed out waiting for the match service: {0}")]
    Timeout(String),
    #[error("{status} - {body}")]
    Status { status: u16, body: String },
    #[error("error parsing match response: {0}")]
    Decode(String),
}

impl MatchError {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoConnectivity => "no_connectivity",
            Self::Token(_) => "token",
            Self::Serialize(_) => "serialize",
            Self::Request(_) => "request",
            Self::Timeout(_) => "timeout",
            Self::Status { .. } => "status",
            Self::Decode(_) => "decode",
        }
    }
}

impl From<reqwest::Error> for MatchError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            MatchError::Timeout(error.to_string())
        } else if error.is_decode() {
            MatchError::Decode(error.to_string())
        } else {
            MatchError::Request(error.to_string())
        }
    }
}

/// An analytics sink call that returned an error or panicked.
#[derive(Error, Debug)]
#[error("analytics sink {kind} {call} failed: {message}")]
pub struct SinkError {
    pub kind: &'static str,
    pub call: String,
    pub message: String,
}

pub type MatchOutcome = Result<AttributionResult, MatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn referrer_markers() {
        assert_eq!(ReferrerFailure::NotSupported.marker(), "error:not_supported");
        assert_eq!(
            ReferrerFailure::ServiceUnavailable.marker(),
            "error:service_unavailable"
        );
        assert_eq!(ReferrerFailure::SetupFailed(3).marker(), "error:setup_failed");
        assert_eq!(ReferrerFailure::Disconnected.marker(), "error:disconnected");
        assert_eq!(ReferrerFailure::Empty.marker(), "error:empty");
        assert_eq!(
            ReferrerFailure::TransportError("binder died".to_owned()).marker(),
            "error:transport_error:binder died"
        );
    }

    #[test]
    fn status_error_message_carries_status_and_body() {
        let error = MatchError::Status {
            status: 500,
            body: "boom".to_owned(),
        };

        assert_eq!(error.to_string(), "500 - boom");
        assert_eq!(MatchError::NoConnectivity.to_string(), "no connectivity");
    }
}
