/// Errors surfaced to the caller of any client or session operation.
///
/// The core never renders UI; callers turn these into text with
/// [`Error::user_message`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No response was received (connection refused, DNS, timeout).
    #[error("Network error: {0}")]
    Network(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The refresh call itself was rejected with 401/403.
    #[error("Session expired")]
    SessionExpired,

    /// A response body did not match the expected contract.
    #[error("Protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The persisted token store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Missing or invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// HTTP status code, when the error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the error came from the transport rather than the application.
    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// User-facing copy for the error, without internals or stack traces.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(_) => {
                "Unable to connect to the server. Please check your internet connection and try again."
            }
            Self::SessionExpired => "Your session has expired. Please log in again.",
            Self::Http { status, .. } => match *status {
                400 | 422 => "Some of the submitted information is invalid. Please review it and try again.",
                401 => "Invalid credentials. Please check your email and password.",
                403 => "You do not have permission to perform this action.",
                404 => "The requested resource was not found.",
                409 => "This record already exists or was changed by someone else.",
                500..=599 => "Server error. Please try again later or contact support.",
                _ => "The request failed. Please try again.",
            },
            Self::ProtocolMismatch(_) => {
                "The server returned an unexpected response. Please try again later."
            }
            Self::Storage(_) | Self::Config(_) => {
                "The application is not configured correctly. Please contact support."
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::ProtocolMismatch(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_only_for_http() {
        let err = Error::Http {
            status: 404,
            body: String::new(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(Error::SessionExpired.status(), None);
    }

    #[test]
    fn user_message_is_status_specific() {
        let unauthorized = Error::Http {
            status: 401,
            body: "nope".into(),
        };
        let server = Error::Http {
            status: 503,
            body: String::new(),
        };
        assert!(unauthorized.user_message().starts_with("Invalid credentials"));
        assert!(server.user_message().starts_with("Server error"));
        assert_ne!(unauthorized.user_message(), server.user_message());
    }

    #[test]
    fn network_message_mentions_connection() {
        let err = Error::Network("connection refused".into());
        assert!(err.is_network());
        assert!(err.user_message().contains("internet connection"));
        assert!(!err.user_message().contains("refused"));
    }

    #[test]
    fn serde_errors_become_protocol_mismatch() {
        let err: Error = serde_json::from_str::<u32>("\"x\"").unwrap_err().into();
        assert!(matches!(err, Error::ProtocolMismatch(_)));
    }
}
