//! The main Error type for mender

use crate::{ErrorKind, ErrorStatus};
use std::fmt;

/// The unified error type for all mender operations.
///
/// This error type provides:
/// - `kind`: What type of error occurred
/// - `message`: Human-readable description
/// - `status`: Whether the error is retryable
/// - `operation`: What operation caused the error
/// - `context`: Key-value pairs for debugging
/// - `source`: The underlying error (if any)
///
/// # Example
///
/// ```rust
/// use mender_error::{Error, ErrorKind, ErrorStatus};
///
/// let err = Error::new(ErrorKind::BackendRejected, "status 503")
///     .with_operation("client::send")
///     .with_status(ErrorStatus::Temporary)
///     .with_context("backend", "primary")
///     .with_context("endpoint", "https://api.openai.com/v1/chat/completions");
///
/// assert_eq!(err.kind(), ErrorKind::BackendRejected);
/// assert!(err.status().is_retryable());
/// ```
pub struct Error {
    kind: ErrorKind,
    message: String,
    status: ErrorStatus,
    operation: &'static str,
    context: Vec<(&'static str, String)>,
    source: Option<anyhow::Error>,
}

impl Error {
    /// Create a new error with the given kind and message
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let status = if kind.is_retryable() {
            ErrorStatus::Temporary
        } else {
            ErrorStatus::Permanent
        };

        Self {
            kind,
            message: message.into(),
            status,
            operation: "",
            context: Vec::new(),
            source: None,
        }
    }

    // =========================================================================
    // Getters
    // =========================================================================

    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the error status
    pub fn status(&self) -> ErrorStatus {
        self.status
    }

    /// Get the operation that caused this error
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Get the context key-value pairs
    pub fn context(&self) -> &[(&'static str, String)] {
        &self.context
    }

    /// Get the source error (if any)
    pub fn source_ref(&self) -> Option<&anyhow::Error> {
        self.source.as_ref()
    }

    // =========================================================================
    // Builders (chainable)
    // =========================================================================

    /// Set the error status
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the operation that caused this error.
    ///
    /// If an operation was already set, the previous one is moved to context
    /// as "called" to preserve the call chain.
    pub fn with_operation(mut self, operation: &'static str) -> Self {
        if !self.operation.is_empty() {
            self.context.push(("called", self.operation.to_string()));
        }
        self.operation = operation;
        self
    }

    /// Add context to the error
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    /// Set the source error.
    ///
    /// # Panics (debug only)
    /// Panics in debug mode if source was already set.
    pub fn set_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        debug_assert!(self.source.is_none(), "source error already set");
        self.source = Some(source.into());
        self
    }

    // =========================================================================
    // Status mutations
    // =========================================================================

    /// Mark as persistent after failed retries
    pub fn persist(mut self) -> Self {
        self.status = self.status.persist();
        self
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.status.is_retryable()
    }
}

// =============================================================================
// Display - compact, single-line format for logs
// =============================================================================

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.context.is_empty() {
            write!(f, ", context {{ ")?;
            for (i, (key, value)) in self.context.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", key, value)?;
            }
            write!(f, " }}")?;
        }

        if !self.message.is_empty() {
            write!(f, " => {}", self.message)?;
        }

        Ok(())
    }
}

// =============================================================================
// Debug - verbose, multi-line format for debugging
// =============================================================================

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}) at {}", self.kind, self.status, self.operation)?;

        if !self.message.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Message: {}", self.message)?;
        }

        if !self.context.is_empty() {
            writeln!(f)?;
            writeln!(f, "    Context:")?;
            for (key, value) in &self.context {
                writeln!(f, "        {}: {}", key, value)?;
            }
        }

        if let Some(source) = &self.source {
            writeln!(f)?;
            writeln!(f, "    Source: {:?}", source)?;
        }

        Ok(())
    }
}

// =============================================================================
// std::error::Error implementation
// =============================================================================

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

// =============================================================================
// Convenient From implementations (be careful not to leak raw errors!)
// =============================================================================

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::new(ErrorKind::IoFailed, err.to_string())
            .with_operation("io")
            .set_source(err)
    }
}

// =============================================================================
// Convenience constructors
// =============================================================================

impl Error {
    /// Create an Unexpected error
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }

    /// Create a ConfigInvalid error
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigInvalid, message)
    }

    /// Create a StreamInterrupted error attributed to a backend
    pub fn stream_interrupted(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(ErrorKind::StreamInterrupted, reason)
            .with_context("backend", backend)
    }

    /// Create an InstallFailed error
    pub fn install_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        let module = module.into();
        Self::new(ErrorKind::InstallFailed, reason)
            .with_context("module", module)
    }

    /// Create a RetriesExhausted error
    pub fn retries_exhausted(what: &'static str, max: usize) -> Self {
        Self::new(
            ErrorKind::RetriesExhausted,
            format!("{} exceeded the limit of {}", what, max),
        )
        .with_context("limit", what)
        .with_context("max", max.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::new(ErrorKind::InstallFailed, "npm exited with status 1");
        assert_eq!(err.kind(), ErrorKind::InstallFailed);
        assert_eq!(err.message(), "npm exited with status 1");
        assert_eq!(err.status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_error_with_context() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused")
            .with_operation("client::send")
            .with_context("backend", "primary")
            .with_context("endpoint", "http://127.0.0.1:1");

        assert_eq!(err.operation(), "client::send");
        assert_eq!(err.context().len(), 2);
        assert_eq!(err.context()[0], ("backend", "primary".to_string()));
    }

    #[test]
    fn test_operation_chaining() {
        let err = Error::new(ErrorKind::IoFailed, "write failed")
            .with_operation("executor::write_script")
            .with_operation("orchestrator::execute");

        assert_eq!(err.operation(), "orchestrator::execute");
        assert_eq!(err.context().len(), 1);
        assert_eq!(err.context()[0], ("called", "executor::write_script".to_string()));
    }

    #[test]
    fn test_temporary_status() {
        let err = Error::new(ErrorKind::Timeout, "primary timed out");
        assert!(err.is_retryable());

        let err = Error::new(ErrorKind::InstallFailed, "not found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_persist() {
        let err = Error::new(ErrorKind::NetworkFailed, "connection refused");
        assert!(err.is_retryable());

        let err = err.persist();
        assert!(!err.is_retryable());
        assert_eq!(err.status(), ErrorStatus::Persistent);
    }

    #[test]
    fn test_with_status_overrides_kind_default() {
        let err = Error::new(ErrorKind::BackendRejected, "status 401")
            .with_status(ErrorStatus::Permanent);
        assert!(!err.is_retryable());
        assert_eq!(err.persist().status(), ErrorStatus::Permanent);
    }

    #[test]
    fn test_display() {
        let err = Error::new(ErrorKind::BackendRejected, "status 500")
            .with_operation("client::send")
            .with_context("backend", "secondary")
            .with_context("status", "500");

        let display = format!("{}", err);
        assert!(display.contains("BackendRejected"));
        assert!(display.contains("temporary"));
        assert!(display.contains("client::send"));
        assert!(display.contains("backend: secondary"));
    }

    #[test]
    fn test_convenience_constructors() {
        let err = Error::install_failed("left-pad", "registry unreachable");
        assert_eq!(err.kind(), ErrorKind::InstallFailed);
        assert_eq!(err.context()[0], ("module", "left-pad".to_string()));

        let err = Error::retries_exhausted("regenerations", 3);
        assert_eq!(err.kind(), ErrorKind::RetriesExhausted);
        assert!(err.message().contains("3"));

        let err = Error::stream_interrupted("primary", "connection reset");
        assert_eq!(err.kind(), ErrorKind::StreamInterrupted);
    }

    #[test]
    fn test_io_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "node: not found");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::IoFailed);
        assert!(err.source_ref().is_some());
    }
}
