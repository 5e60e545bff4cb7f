//! Rate-limit scheduling for the Cadence Discord REST client.
//!
//! Discord limits requests per route and tells the client, through response
//! headers, how many requests are left in the current window and when it
//! resets. This crate holds the scheduling side of that contract:
//!
//! - [`routefy`] maps a request path to its rate-limit route
//! - [`SequentialBucket`] admits requests on one route in order, within the
//!   current window's token count
//! - [`LatencyReference`] tracks round-trip latency and clock offset, which
//!   pad bucket timing and correct server timestamps
//! - [`GlobalBlock`] holds authenticated requests after a global rate limit
//! - [`RouteRateLimiter`] ties them together for one request handler
//!
//! The request handler in `cadence_rest` feeds response headers back into
//! these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod bucket;
mod clock;
mod global;
mod latency;
mod limiter;
mod route;

pub use bucket::{Admission, BucketLimits, BucketSlot, BucketSnapshot, SequentialBucket};
pub use clock::Clock;
pub use global::{Deferred, GlobalBlock};
pub use latency::{
    CLOCK_CHECK_INTERVAL_MS, INITIAL_LATENCY_MS, LatencyReference, SAMPLE_WINDOW, SharedLatency,
};
pub use limiter::{DEFAULT_BUCKET_LIMIT, RouteRateLimiter};
pub use route::{ID_PLACEHOLDER, routefy};
