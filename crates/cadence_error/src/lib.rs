//! Error types for the Cadence Discord REST client.
//!
//! # Error Hierarchy
//!
//! Errors follow the `ErrorKind` + wrapper struct pattern:
//! - `TransportError` wraps a `TransportErrorKind` with source location tracking
//! - `ConfigError` wraps a `ConfigErrorKind` with source location tracking
//! - `ApiError` is a classified server failure (HTTP-level or REST-level)
//! - `CadenceError` boxes any of the above behind `CadenceErrorKind`
//!
//! # Examples
//!
//! ```
//! use cadence_error::{CadenceResult, TransportError, TransportErrorKind};
//!
//! fn fetch() -> CadenceResult<String> {
//!     Err(TransportError::new(TransportErrorKind::Connection("refused".to_string())))?
//! }
//!
//! match fetch() {
//!     Ok(body) => println!("Got: {}", body),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod api;
mod config;
mod error;
mod retry;
mod transport;

pub use api::{
    ApiError, ApiErrorKind, RequestContext, ResponseContext, flatten_http_errors,
    flatten_rest_errors,
};
pub use config::{ConfigError, ConfigErrorKind};
pub use error::{CadenceError, CadenceErrorKind, CadenceResult};
pub use retry::RetryableError;
pub use transport::{TransportError, TransportErrorKind};
