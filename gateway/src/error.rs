use onpoint_types::FailureKind;
use thiserror::Error;

/// Failure of a single assistant round trip.
///
/// Always returned to the caller; the gateway never swallows a failure.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure: connection refused, reset, DNS, or timeout.
    #[error("{endpoint}: network error: {message}")]
    Network {
        endpoint: &'static str,
        message: String,
        timed_out: bool,
    },
    /// The service answered with a non-success status.
    #[error("{endpoint}: server error (HTTP {status})")]
    Server {
        endpoint: &'static str,
        status: u16,
        /// Response body, truncated.
        body: String,
    },
    /// The service answered 2xx with a payload of the wrong shape.
    #[error("{endpoint}: malformed response: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    Network,
    Server,
    Decode,
}

impl GatewayError {
    /// Deadline expiry, reported as a network failure.
    #[must_use]
    pub fn timeout(endpoint: &'static str) -> Self {
        Self::Network {
            endpoint,
            message: "request timed out".to_string(),
            timed_out: true,
        }
    }

    pub(crate) fn transport(endpoint: &'static str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::timeout(endpoint);
        }
        Self::Network {
            endpoint,
            message: err.to_string(),
            timed_out: false,
        }
    }

    pub(crate) fn decode(endpoint: &'static str, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> GatewayErrorKind {
        match self {
            Self::Network { .. } => GatewayErrorKind::Network,
            Self::Server { .. } => GatewayErrorKind::Server,
            Self::Decode { .. } => GatewayErrorKind::Decode,
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Network { endpoint, .. }
            | Self::Server { endpoint, .. }
            | Self::Decode { endpoint, .. } => endpoint,
        }
    }

    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network { timed_out: true, .. })
    }

    /// Classification stored on a session when the call fails.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } => FailureKind::Network,
            Self::Server { status, .. } => FailureKind::Server { status: *status },
            Self::Decode { .. } => FailureKind::Decode,
        }
    }
}
