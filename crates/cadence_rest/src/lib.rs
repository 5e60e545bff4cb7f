//! Rate-limited request pipeline for the Discord REST API.
//!
//! [`RequestHandler`] turns "call this endpoint" into a paced, retried HTTP
//! exchange:
//!
//! - requests on the same route are sent one at a time, in submission order,
//!   within the quota Discord reports through `x-ratelimit-*` headers
//! - 429 responses are retried transparently, after the server's delay, ahead
//!   of anything else queued on the route
//! - 502 responses are retried with randomized backoff
//! - other failures come back as classified [`cadence_error::ApiError`]s
//!
//! Configuration comes from [`RestConfig`]; diagnostics go to a
//! [`RestObserver`], by default [`TracingObserver`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod handler;
pub mod headers;
mod observer;
mod request;

pub use config::{DEFAULT_API_BASE, RestConfig};
pub use handler::{MAX_BAD_GATEWAY_ATTEMPTS, RequestHandler};
pub use headers::RateLimitHeaders;
pub use observer::{RestObserver, TracingObserver};
pub use request::{Auth, AuthKind, JSON_CONTENT_TYPE, Payload, RequestOptions, ResponseBody};

pub use reqwest::Method;
