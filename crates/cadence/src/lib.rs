//! Rate-limited client for the Discord REST API.
//!
//! Cadence paces requests the way Discord asks: one bucket per route, sized
//! and timed from `x-ratelimit-*` response headers, a global block for
//! account-wide limits, and latency and clock-offset compensation so requests
//! do not fire just before the server's window rolls over.
//!
//! ```no_run
//! use cadence::{Auth, Method, RequestHandler, RequestOptions, RestConfig};
//!
//! # async fn run() -> cadence::CadenceResult<()> {
//! cadence::init_observability().ok();
//!
//! let handler = RequestHandler::new(RestConfig::load()?)?;
//! let me = handler
//!     .request(
//!         Method::GET,
//!         "/users/@me",
//!         None,
//!         RequestOptions::default().with_auth(Auth::bearer("access-token")),
//!     )
//!     .await?;
//! println!("{:?}", me.as_json());
//! # Ok(())
//! # }
//! ```
//!
//! # Crates
//!
//! - `cadence_error`: error types
//! - `cadence_rate_limit`: buckets, latency tracking, route classification
//! - `cadence_rest`: configuration and the request handler

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod observability;

pub use observability::{ObservabilityConfig, init_observability, init_observability_with_config};

pub use cadence_error::{
    ApiError, ApiErrorKind, CadenceError, CadenceErrorKind, CadenceResult, ConfigError,
    ConfigErrorKind, RequestContext, ResponseContext, RetryableError, TransportError,
    TransportErrorKind,
};
pub use cadence_rate_limit::{
    BucketLimits, BucketSnapshot, Clock, GlobalBlock, LatencyReference, RouteRateLimiter,
    SequentialBucket, routefy,
};
pub use cadence_rest::{
    Auth, AuthKind, MAX_BAD_GATEWAY_ATTEMPTS, Method, Payload, RateLimitHeaders, RequestHandler,
    RequestOptions, ResponseBody, RestConfig, RestObserver, TracingObserver,
};
