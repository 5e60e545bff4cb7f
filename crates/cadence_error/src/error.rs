//! Top-level error wrapper types.

use crate::{ApiError, ConfigError, RetryableError, TransportError};

/// Every way a Cadence request can fail.
///
/// # Examples
///
/// ```
/// use cadence_error::{CadenceError, TransportError, TransportErrorKind};
///
/// let transport = TransportError::new(TransportErrorKind::Connection("reset".to_string()));
/// let err: CadenceError = transport.into();
/// assert!(format!("{}", err).contains("Transport Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum CadenceErrorKind {
    /// The exchange never produced a usable response
    #[from(TransportError)]
    Transport(TransportError),
    /// The server answered with a non-retryable failure
    #[from(ApiError)]
    Api(ApiError),
    /// The client configuration was rejected
    #[from(ConfigError)]
    Config(ConfigError),
}

/// Cadence error with kind discrimination.
///
/// # Examples
///
/// ```
/// use cadence_error::{CadenceErrorKind, CadenceResult, TransportError, TransportErrorKind};
///
/// fn send() -> CadenceResult<()> {
///     Err(TransportError::new(TransportErrorKind::Decode("eof".to_string())))?
/// }
///
/// let err = send().unwrap_err();
/// assert!(matches!(err.kind(), CadenceErrorKind::Transport(_)));
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Cadence Error: {}", _0)]
pub struct CadenceError(Box<CadenceErrorKind>);

impl CadenceError {
    /// Create a new error from a kind.
    pub fn new(kind: CadenceErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &CadenceErrorKind {
        &self.0
    }

    /// The classified API error, if the server rejected the request.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self.kind() {
            CadenceErrorKind::Api(err) => Some(err),
            _ => None,
        }
    }

    /// The transport error, if the exchange itself failed.
    pub fn as_transport(&self) -> Option<&TransportError> {
        match self.kind() {
            CadenceErrorKind::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl<T> From<T> for CadenceError
where
    T: Into<CadenceErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

impl RetryableError for CadenceError {
    fn is_retryable(&self) -> bool {
        match self.kind() {
            CadenceErrorKind::Transport(err) => err.kind().is_retryable(),
            CadenceErrorKind::Api(_) | CadenceErrorKind::Config(_) => false,
        }
    }
}

/// Result type for Cadence operations.
pub type CadenceResult<T> = std::result::Result<T, CadenceError>;
