//! Error kinds for mender operations

use std::fmt;

/// The kind of error that occurred.
///
/// Users can match on ErrorKind to decide how to handle specific error cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // =========================================================================
    // General errors
    // =========================================================================
    /// An unexpected error occurred - catch-all for unhandled cases
    Unexpected,

    /// Invalid configuration or parameters
    ConfigInvalid,

    // =========================================================================
    // Completion backend errors
    // =========================================================================
    /// Connection to a backend failed
    NetworkFailed,

    /// A backend did not answer within its configured limit
    Timeout,

    /// A backend answered with a non-success status
    BackendRejected,

    /// Neither backend could start a stream
    BackendUnavailable,

    /// The stream broke after it had started
    StreamInterrupted,

    /// A wire record could not be decoded
    DecodeFailed,

    // =========================================================================
    // Run errors
    // =========================================================================
    /// The installer could not make a module available
    InstallFailed,

    /// A run-level retry ceiling was reached
    RetriesExhausted,

    // =========================================================================
    // IO errors
    // =========================================================================
    /// IO operation failed
    IoFailed,
}

impl ErrorKind {
    /// Returns the error kind as a static string
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unexpected => "Unexpected",
            ErrorKind::ConfigInvalid => "ConfigInvalid",

            ErrorKind::NetworkFailed => "NetworkFailed",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::BackendRejected => "BackendRejected",
            ErrorKind::BackendUnavailable => "BackendUnavailable",
            ErrorKind::StreamInterrupted => "StreamInterrupted",
            ErrorKind::DecodeFailed => "DecodeFailed",

            ErrorKind::InstallFailed => "InstallFailed",
            ErrorKind::RetriesExhausted => "RetriesExhausted",

            ErrorKind::IoFailed => "IoFailed",
        }
    }

    /// Check if this error kind is retryable by default
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkFailed | ErrorKind::Timeout | ErrorKind::BackendRejected
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_display() {
        assert_eq!(ErrorKind::BackendUnavailable.to_string(), "BackendUnavailable");
        assert_eq!(ErrorKind::InstallFailed.to_string(), "InstallFailed");
    }

    #[test]
    fn test_is_retryable() {
        assert!(ErrorKind::NetworkFailed.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::InstallFailed.is_retryable());
        assert!(!ErrorKind::StreamInterrupted.is_retryable());
    }
}
