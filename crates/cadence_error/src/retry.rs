//! Caller-side retry classification.

/// Errors that can tell a caller whether repeating the request may help.
///
/// The request pipeline already retries rate limits and gateway errors on its
/// own; anything that reaches the caller is either a transport failure (which
/// may be retried) or a classified API error (which will fail the same way
/// again).
///
/// # Examples
///
/// ```
/// use cadence_error::{CadenceError, RetryableError, TransportError, TransportErrorKind};
///
/// let err: CadenceError = TransportError::new(TransportErrorKind::Timeout {
///     timeout_ms: 15_000,
///     method: "GET".to_string(),
///     path: "/users/@me".to_string(),
/// })
/// .into();
/// assert!(err.is_retryable());
/// ```
pub trait RetryableError {
    /// Returns true if sending the same request again could succeed.
    fn is_retryable(&self) -> bool;
}
