//! Transport-level error types.
//!
//! Transport errors cover everything that goes wrong before a response can be
//! classified: connection failures, aborted exchanges, timeouts, and bodies that
//! claim to be JSON but are not. The pipeline never retries these itself.

/// Transport failure conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum TransportErrorKind {
    /// The exchange was aborted before a complete response arrived
    #[display("Request aborted on {} {}: {}", method, path, reason)]
    Aborted {
        /// HTTP method of the aborted request
        method: String,
        /// Request path
        path: String,
        /// What interrupted the exchange
        reason: String,
    },
    /// The request exceeded the configured timeout
    #[display("Request timed out (>{}ms) on {} {}", timeout_ms, method, path)]
    Timeout {
        /// Configured timeout in milliseconds
        timeout_ms: u64,
        /// HTTP method of the request
        method: String,
        /// Request path
        path: String,
    },
    /// The request URL could not be built
    #[display("Invalid request URL: {}", _0)]
    InvalidUrl(String),
    /// Could not connect to the remote host
    #[display("Connection failed: {}", _0)]
    Connection(String),
    /// Response body could not be decoded
    #[display("Failed to decode response body: {}", _0)]
    Decode(String),
    /// Request body could not be serialized
    #[display("Failed to serialize request body: {}", _0)]
    Serialize(String),
    /// HTTP client could not be constructed
    #[display("Failed to build HTTP client: {}", _0)]
    Builder(String),
}

impl TransportErrorKind {
    /// Whether a caller could reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransportErrorKind::Aborted { .. }
                | TransportErrorKind::Timeout { .. }
                | TransportErrorKind::Connection(_)
        )
    }
}

/// Transport error with source location tracking.
///
/// # Examples
///
/// ```
/// use cadence_error::{TransportError, TransportErrorKind};
///
/// let err = TransportError::new(TransportErrorKind::Connection("refused".to_string()));
/// assert!(format!("{}", err).contains("Connection failed"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Transport Error: {} at line {} in {}", kind, line, file)]
pub struct TransportError {
    /// The kind of error that occurred
    pub kind: TransportErrorKind,
    /// Line number where error was created
    pub line: u32,
    /// File where error was created
    pub file: &'static str,
}

impl TransportError {
    /// Create a new TransportError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: TransportErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &TransportErrorKind {
        &self.kind
    }
}

impl From<TransportErrorKind> for TransportError {
    #[track_caller]
    fn from(kind: TransportErrorKind) -> Self {
        Self::new(kind)
    }
}
