//! The rate-limited request pipeline.
//!
//! [`RequestHandler::request`] runs one logical call to completion:
//!
//! 1. Derive the route and wait for a slot on its bucket (authenticated
//!    requests also wait out any global block).
//! 2. Perform the exchange and measure its latency.
//! 3. Feed the response headers back into the bucket, the latency reference
//!    and, for global limits, the global block.
//! 4. Retry 429s and transient 502s, classify every other failure.
//!
//! The bucket slot is held from dispatch until the response has been
//! accounted for, including the wait before a 429 retry.

use crate::headers::RateLimitHeaders;
use crate::{
    Auth, Payload, RequestOptions, ResponseBody, RestConfig, RestObserver, TracingObserver,
};
use cadence_error::{
    ApiError, CadenceResult, RequestContext, ResponseContext, TransportError, TransportErrorKind,
};
use cadence_rate_limit::{
    BucketSlot, BucketSnapshot, LatencyReference, RouteRateLimiter, SequentialBucket, routefy,
};
use rand::Rng;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::{Instant, sleep};
use tracing::{debug, instrument};

/// Total attempts made for a request that keeps answering 502.
pub const MAX_BAD_GATEWAY_ATTEMPTS: u32 = 4;

const BAD_GATEWAY_BACKOFF_MS: Range<u64> = 100..2000;

// Reaction endpoints report a 1s window that actually rolls over after ~250ms.
const REACTION_ROUTE: &str = "/reactions/:id";
const REACTION_WINDOW_MS: i64 = 1000;
const REACTION_RESET_MS: i64 = 250;

/// Everything needed to send one attempt of a request.
struct Exchange<'a> {
    method: &'a Method,
    url: &'a Url,
    route: &'a str,
    auth: Option<&'a Auth>,
    content_type: Option<&'a str>,
    body: Option<&'a [u8]>,
}

enum Outcome {
    Done(ResponseBody),
    /// Already queued on the bucket; await the receiver for the next slot
    Retry(oneshot::Receiver<BucketSlot>),
}

/// Rate-limited client for the Discord REST API.
///
/// One handler owns the buckets, latency reference and global block for one
/// set of credentials; share it (e.g. behind an `Arc`) rather than creating
/// several against the same account.
///
/// # Example
///
/// ```no_run
/// use cadence_rest::{Auth, RequestHandler, RequestOptions, RestConfig};
/// use reqwest::Method;
///
/// # async fn run() -> cadence_error::CadenceResult<()> {
/// let handler = RequestHandler::new(RestConfig::load()?)?;
/// let guilds = handler
///     .request(
///         Method::GET,
///         "/users/@me/guilds",
///         None,
///         RequestOptions::default().with_auth(Auth::bearer("access-token")),
///     )
///     .await?;
/// println!("{:?}", guilds.as_json());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RequestHandler {
    client: Client,
    config: RestConfig,
    limiter: RouteRateLimiter,
    observer: Arc<dyn RestObserver>,
}

impl RequestHandler {
    /// Create a handler that reports diagnostics through `tracing`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> CadenceResult<Self> {
        Self::with_observer(config, Arc::new(TracingObserver))
    }

    /// Create a handler with a custom diagnostics observer.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client cannot be built.
    pub fn with_observer(
        config: RestConfig,
        observer: Arc<dyn RestObserver>,
    ) -> CadenceResult<Self> {
        config.validate()?;
        let client = build_client(&config)?;
        Self::with_client(config, client, observer)
    }

    /// Create a handler around a preconfigured HTTP client.
    ///
    /// The client's own timeout, proxy and user-agent settings apply; the
    /// configuration still supplies the API base and scheduling parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn with_client(
        config: RestConfig,
        client: Client,
        observer: Arc<dyn RestObserver>,
    ) -> CadenceResult<Self> {
        config.validate()?;
        let reference = LatencyReference::new(
            *config.ratelimiter_offset_ms(),
            !*config.disable_latency_compensation(),
        );
        Ok(Self {
            client,
            config,
            limiter: RouteRateLimiter::new(reference),
            observer,
        })
    }

    /// The configuration this handler was built with.
    pub fn config(&self) -> &RestConfig {
        &self.config
    }

    /// The limiter holding this handler's buckets.
    pub fn limiter(&self) -> &RouteRateLimiter {
        &self.limiter
    }

    /// Current state of the bucket for `route`, if a request has used it.
    pub fn bucket_snapshot(&self, route: &str) -> Option<BucketSnapshot> {
        self.limiter.get(route).map(|bucket| bucket.snapshot())
    }

    /// Whether authenticated requests are currently held by a global rate limit.
    pub fn is_globally_blocked(&self) -> bool {
        self.limiter.global().is_blocked()
    }

    /// Copy of the current latency and clock-offset estimates.
    pub fn latency(&self) -> LatencyReference {
        self.limiter.latency().snapshot()
    }

    /// Perform a rate-limited request.
    ///
    /// 429 responses are retried transparently and 502 responses are retried
    /// with randomized backoff up to [`MAX_BAD_GATEWAY_ATTEMPTS`] in total.
    ///
    /// # Errors
    ///
    /// Returns a transport error for failed or malformed exchanges, or an
    /// [`ApiError`] for any other response with status `>= 300`.
    #[instrument(skip_all, fields(method = %method, path = path))]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Payload>,
        options: RequestOptions,
    ) -> CadenceResult<ResponseBody> {
        let route = options.route.clone().unwrap_or_else(|| routefy(path));
        let url = self.url(path)?;
        let encoded = body.as_ref().map(Payload::encode).transpose()?;
        let content_type = options.content_type.clone().or_else(|| {
            body.as_ref()
                .and_then(Payload::default_content_type)
                .map(str::to_string)
        });
        let exchange = Exchange {
            method: &method,
            url: &url,
            route: &route,
            auth: options.auth.as_ref(),
            content_type: content_type.as_deref(),
            body: encoded.as_deref(),
        };

        let bucket = self.limiter.bucket(&route);
        let mut attempts = options.attempts;
        let mut pending = self
            .limiter
            .enqueue(&bucket, false, exchange.auth.is_some());
        loop {
            let slot = pending.await.map_err(|_| {
                TransportError::new(TransportErrorKind::Aborted {
                    method: method.to_string(),
                    path: url.path().to_string(),
                    reason: "rate limiter dropped the request".to_string(),
                })
            })?;
            match self.attempt(slot, &bucket, &exchange, &mut attempts).await? {
                Outcome::Done(body) => return Ok(body),
                Outcome::Retry(next) => pending = next,
            }
        }
    }

    /// Perform a request and deserialize its JSON response.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus a decode error if the body does not match `T`.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Payload>,
        options: RequestOptions,
    ) -> CadenceResult<T> {
        self.request(method, path, body, options).await?.into_json()
    }

    async fn attempt(
        &self,
        slot: BucketSlot,
        bucket: &Arc<SequentialBucket>,
        exchange: &Exchange<'_>,
        attempts: &mut u32,
    ) -> CadenceResult<Outcome> {
        let mut request = self
            .client
            .request(exchange.method.clone(), exchange.url.clone());
        if let Some(auth) = exchange.auth {
            request = request.header(AUTHORIZATION, auth.header_value());
        }
        if let Some(content_type) = exchange.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = exchange.body {
            request = request.body(body.to_vec());
        }

        let started = Instant::now();
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e, exchange))?;
        let elapsed = started.elapsed().as_millis() as i64;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| self.transport_error(e, exchange))?;

        let rate = RateLimitHeaders::parse(&headers);
        let now = self.limiter.clock().now_ms();
        let (average, correction) = self.record_timing(elapsed, now, &rate);
        self.apply_rate_limits(bucket, exchange, &rate, now, correction);

        let limits = bucket.limits();
        let trace = format!(
            "{now} {} {status}: {elapsed}ms ({average}ms avg) | {}/{} left | Reset {} ({}ms left)",
            exchange.route,
            limits.remaining,
            limits.limit,
            limits.reset,
            limits.reset.saturating_sub(now)
        );

        if status == StatusCode::TOO_MANY_REQUESTS {
            let scope = if rate.global { "Global" } else { "Unexpected" };
            self.observer.debug(&format!(
                "{scope} 429: {}\n{trace}",
                String::from_utf8_lossy(&bytes)
            ));
            if let Some(delay) = rate.retry_after_ms {
                sleep(Duration::from_millis(delay.max(0) as u64)).await;
            }
            let authenticated = exchange.auth.is_some();
            return Ok(Outcome::Retry(self.limiter.readmit(slot, bucket, authenticated)));
        }
        self.observer.debug(&trace);

        if status.as_u16() < 300 {
            let body = ResponseBody::decode(&bytes, rate.content_type.as_deref())?;
            return Ok(Outcome::Done(body));
        }

        if status == StatusCode::BAD_GATEWAY {
            *attempts += 1;
            if *attempts < MAX_BAD_GATEWAY_ATTEMPTS {
                drop(slot);
                let backoff = rand::thread_rng().gen_range(BAD_GATEWAY_BACKOFF_MS);
                debug!(
                    attempts = *attempts,
                    backoff_ms = backoff,
                    route = exchange.route,
                    "Retrying bad gateway"
                );
                sleep(Duration::from_millis(backoff)).await;
                let authenticated = exchange.auth.is_some();
                return Ok(Outcome::Retry(self.limiter.enqueue(bucket, true, authenticated)));
            }
        }

        let body = ResponseBody::decode(&bytes, rate.content_type.as_deref())?;
        let request = RequestContext::new(
            exchange.method.as_str(),
            exchange.url.path(),
            exchange.route,
        );
        let response = ResponseContext::new(
            status.as_u16(),
            status.canonical_reason().unwrap_or_default(),
            headers,
            body.into_value(),
        );
        Err(ApiError::classify(request, response).into())
    }

    /// Fold the exchange's latency and the server clock into the latency
    /// reference. Returns the new average latency and the reset correction.
    fn record_timing(&self, sample: i64, now: i64, rate: &RateLimitHeaders) -> (i64, i64) {
        let mut latency = self.limiter.latency().lock();
        let average = latency.record_latency(sample);
        let skew = rate.server_date_ms.and_then(|server_now| {
            latency.sample_clock(now, server_now, *self.config.latency_threshold_ms())
        });
        let correction = latency.reset_correction();
        drop(latency);

        if let Some(offset) = skew {
            self.observer.warn(&format!(
                "Your clock is {offset}ms ahead of Discord's server. \
                 Check your connection and system time."
            ));
        }
        (average, correction)
    }

    fn apply_rate_limits(
        &self,
        bucket: &SequentialBucket,
        exchange: &Exchange<'_>,
        rate: &RateLimitHeaders,
        now: i64,
        correction: i64,
    ) {
        let limit = bucket.update(|limits| {
            if let Some(limit) = rate.limit {
                limits.limit = limit;
            }
            limits.remaining = rate.remaining.unwrap_or(1);
            limits.limit
        });

        if *exchange.method != Method::GET && rate.missing_bucket_headers() && limit != 1 {
            self.observer.warn(&format!(
                "Missing rate limit headers for rate limited endpoint {} {} (limit {limit})",
                exchange.method, exchange.route
            ));
        }

        if let Some(delay) = rate.retry_after_ms {
            if rate.global {
                self.limiter.global().block_for(delay);
            } else {
                bucket.update(|limits| limits.reset = now.saturating_add(delay));
            }
        } else if let Some(reset) = rate.reset_ms {
            let reaction_quirk = exchange.route.contains(REACTION_ROUTE)
                && rate
                    .server_date_ms
                    .is_some_and(|server_now| {
                        reset.saturating_sub(server_now) == REACTION_WINDOW_MS
                    });
            let reset = if reaction_quirk {
                now.saturating_add(REACTION_RESET_MS).saturating_sub(correction)
            } else {
                reset.saturating_sub(correction)
            };
            bucket.update(|limits| limits.reset = reset.max(now));
        } else {
            bucket.update(|limits| limits.reset = now);
        }
    }

    fn url(&self, path: &str) -> Result<Url, TransportError> {
        let separator = if path.starts_with('/') { "" } else { "/" };
        let raw = format!(
            "{}{separator}{path}",
            self.config.api_base().trim_end_matches('/')
        );
        Url::parse(&raw).map_err(|e| {
            TransportError::new(TransportErrorKind::InvalidUrl(format!("{raw}: {e}")))
        })
    }

    fn transport_error(&self, err: reqwest::Error, exchange: &Exchange<'_>) -> TransportError {
        let method = exchange.method.to_string();
        let path = exchange.url.path().to_string();
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout {
                timeout_ms: *self.config.request_timeout_ms(),
                method,
                path,
            }
        } else if err.is_connect() {
            TransportErrorKind::Connection(err.to_string())
        } else {
            TransportErrorKind::Aborted {
                method,
                path,
                reason: err.to_string(),
            }
        };
        TransportError::new(kind)
    }
}

fn build_client(config: &RestConfig) -> Result<Client, TransportError> {
    let builder_error =
        |e: reqwest::Error| TransportError::new(TransportErrorKind::Builder(e.to_string()));

    let mut builder = Client::builder()
        .user_agent(config.user_agent().as_str())
        .timeout(Duration::from_millis(*config.request_timeout_ms()))
        .gzip(true)
        .deflate(true);
    if let Some(proxy) = config.proxy() {
        builder = builder.proxy(reqwest::Proxy::all(proxy.as_str()).map_err(builder_error)?);
    }
    builder.build().map_err(builder_error)
}
