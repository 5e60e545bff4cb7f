//! Classified API errors.
//!
//! A failed response (status `>= 300` that the pipeline will not retry) is turned
//! into an [`ApiError`]. Discord answers in one of two shapes:
//!
//! - **HTTP-level**: no vendor error code. The error code is the HTTP status and
//!   only array-valued top-level fields are flattened.
//! - **REST-level**: the body carries a vendor `code`. The `errors` tree is
//!   flattened recursively, with nested keys joined by `.`.
//!
//! The original request and response are attached for inspection. They are
//! diagnostic handles, so `ApiError` has no `Serialize` impl.

use derive_getters::Getters;
use reqwest::header::HeaderMap;
use serde_json::Value;

/// Which of the two Discord error shapes a response used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ApiErrorKind {
    /// Generic HTTP failure without a vendor error code
    #[display("Discord HTTP Error")]
    Http,
    /// JSON error body carrying a vendor error code
    #[display("Discord REST Error")]
    Rest,
}

/// The request side of a failed exchange.
#[derive(Debug, Clone, PartialEq, Eq, Getters)]
pub struct RequestContext {
    /// Uppercase HTTP method
    method: String,
    /// Full request path, including the API base path
    path: String,
    /// Rate-limit route the request was scheduled on
    route: String,
}

impl RequestContext {
    /// Describe a request for error reporting.
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        route: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            route: route.into(),
        }
    }
}

/// The response side of a failed exchange.
#[derive(Debug, Clone, Getters)]
pub struct ResponseContext {
    /// HTTP status code
    status: u16,
    /// Canonical reason phrase for the status
    reason: String,
    /// Raw response headers
    headers: HeaderMap,
    /// Parsed JSON body, or the raw text as a JSON string
    body: Value,
}

impl ResponseContext {
    /// Capture a response for error reporting.
    pub fn new(status: u16, reason: impl Into<String>, headers: HeaderMap, body: Value) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers,
            body,
        }
    }
}

/// A failed API response, classified and flattened into readable form.
///
/// # Examples
///
/// ```
/// use cadence_error::{ApiError, ApiErrorKind, RequestContext, ResponseContext};
/// use reqwest::header::HeaderMap;
/// use serde_json::json;
///
/// let request =
///     RequestContext::new("PUT", "/api/v10/guilds/1/members/2", "/guilds/1/members/:id");
/// let response = ResponseContext::new(
///     400,
///     "Bad Request",
///     HeaderMap::new(),
///     json!({
///         "code": 50035,
///         "message": "Invalid Form Body",
///         "errors": { "roles": { "_errors": [{ "message": "Invalid role" }] } }
///     }),
/// );
///
/// let err = ApiError::classify(request, response);
/// assert_eq!(*err.kind(), ApiErrorKind::Rest);
/// assert_eq!(*err.code(), 50035);
/// assert!(err.message().contains("roles: Invalid role"));
/// ```
#[derive(Debug, Clone, Getters, derive_more::Display, derive_more::Error)]
#[display("{}", message)]
pub struct ApiError {
    /// Error shape
    kind: ApiErrorKind,
    /// Vendor error code for REST errors, HTTP status for HTTP errors
    code: i64,
    /// Full human-readable message, flattened errors included
    message: String,
    /// Flattened field errors, one `field: message` entry per line
    errors: Vec<String>,
    /// Request that produced the failure
    request: RequestContext,
    /// Response that carried the failure
    response: ResponseContext,
}

impl ApiError {
    /// Build a classified error from a failed exchange.
    ///
    /// REST-level when the body carries a truthy `code`, HTTP-level otherwise.
    pub fn classify(request: RequestContext, response: ResponseContext) -> Self {
        if response.body.get("code").is_some_and(is_truthy) {
            Self::rest(request, response)
        } else {
            Self::http(request, response)
        }
    }

    /// Build an HTTP-level error.
    pub fn http(request: RequestContext, response: ResponseContext) -> Self {
        let errors = flatten_http_errors(&response.body);
        let mut message = format!(
            "{}: {} {} on {} {}",
            ApiErrorKind::Http,
            response.status,
            response.reason,
            request.method,
            request.path
        );
        append_errors(&mut message, &errors);
        Self {
            kind: ApiErrorKind::Http,
            code: i64::from(response.status),
            message,
            errors,
            request,
            response,
        }
    }

    /// Build a REST-level error.
    pub fn rest(request: RequestContext, response: ResponseContext) -> Self {
        let code = response.body.get("code").and_then(vendor_code).unwrap_or(-1);
        let summary = match response.body.get("message") {
            Some(value) if is_truthy(value) => display_value(value),
            _ => "Unknown error".to_string(),
        };
        let errors = match response.body.get("errors") {
            Some(tree) if is_truthy(tree) => flatten_rest_errors(tree, ""),
            _ => flatten_rest_errors(&response.body, ""),
        };
        let mut message = format!("{} [{}]: {}", ApiErrorKind::Rest, code, summary);
        append_errors(&mut message, &errors);
        Self {
            kind: ApiErrorKind::Rest,
            code,
            message,
            errors,
            request,
            response,
        }
    }

    /// HTTP status of the failed response.
    pub fn status(&self) -> u16 {
        self.response.status
    }
}

/// One-level flattening used for HTTP-level errors.
///
/// Every array-valued top-level field (other than `message` and `code`)
/// contributes one `field: value` line per element.
pub fn flatten_http_errors(body: &Value) -> Vec<String> {
    let Value::Object(fields) = body else {
        return Vec::new();
    };
    fields
        .iter()
        .filter(|(field, _)| !is_reserved(field))
        .filter_map(|(field, value)| value.as_array().map(|items| (field, items)))
        .flat_map(|(field, items)| {
            items
                .iter()
                .map(move |item| format!("{}: {}", field, display_value(item)))
        })
        .collect()
}

/// Recursive flattening used for REST-level errors.
///
/// A node is either an object with an `_errors` array of `{message}` records,
/// an array of strings, or a nested object whose keys are prefixed with
/// `parent.`.
pub fn flatten_rest_errors(errors: &Value, key_prefix: &str) -> Vec<String> {
    let Value::Object(fields) = errors else {
        return Vec::new();
    };
    let mut messages = Vec::new();
    for (field, value) in fields {
        if is_reserved(field) {
            continue;
        }
        let key = format!("{key_prefix}{field}");
        if let Some(records) = value.get("_errors").filter(|v| is_truthy(v)) {
            for record in records.as_array().into_iter().flatten() {
                let text = record
                    .get("message")
                    .map(display_value)
                    .unwrap_or_else(|| display_value(record));
                messages.push(format!("{key}: {text}"));
            }
        } else if let Some(items) = value.as_array() {
            messages.extend(items.iter().map(|item| format!("{key}: {}", display_value(item))));
        } else if value.is_object() {
            messages.extend(flatten_rest_errors(value, &format!("{key}.")));
        }
    }
    messages
}

fn append_errors(message: &mut String, errors: &[String]) {
    if !errors.is_empty() {
        message.push_str("\n  ");
        message.push_str(&errors.join("\n  "));
    }
}

fn is_reserved(field: &str) -> bool {
    field == "message" || field == "code"
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn vendor_code(value: &Value) -> Option<i64> {
    let code = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(true) => Some(1),
        _ => None,
    };
    code.filter(|c| *c != 0)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request() -> RequestContext {
        RequestContext::new("POST", "/api/v10/oauth2/token", "/oauth2/token")
    }

    fn response(status: u16, reason: &str, body: Value) -> ResponseContext {
        ResponseContext::new(status, reason, HeaderMap::new(), body)
    }

    #[test]
    fn test_rest_error_flattens_nested_tree_in_body_order() {
        let body = json!({
            "code": 50035,
            "message": "Invalid Form Body",
            "errors": {
                "roles": { "_errors": [{ "code": "BASE_TYPE", "message": "Invalid role" }] },
                "nick": {
                    "inner": ["too long"]
                }
            }
        });
        let err = ApiError::classify(request(), response(400, "Bad Request", body));

        assert_eq!(err.kind, ApiErrorKind::Rest);
        assert_eq!(err.code, 50035);
        assert_eq!(
            err.errors,
            vec!["roles: Invalid role".to_string(), "nick.inner: too long".to_string()]
        );
        assert!(err.message.starts_with("Discord REST Error [50035]: Invalid Form Body\n  "));
        assert!(err.message.contains("roles: Invalid role"));
    }

    #[test]
    fn test_rest_error_without_errors_tree_flattens_body() {
        let body = json!({ "code": 10004, "message": "Unknown Guild", "guild_id": ["not found"] });
        let err = ApiError::classify(request(), response(404, "Not Found", body));

        assert_eq!(err.code, 10004);
        assert_eq!(err.errors, vec!["guild_id: not found".to_string()]);
    }

    #[test]
    fn test_rest_error_missing_message() {
        let body = json!({ "code": "40001" });
        let err = ApiError::rest(request(), response(401, "Unauthorized", body));

        assert_eq!(err.code, 40001);
        assert_eq!(err.message, "Discord REST Error [40001]: Unknown error");
    }

    #[test]
    fn test_http_error_one_level_flattening() {
        let body = json!({
            "error": "invalid_grant",
            "scope": ["identify", "guilds"],
            "nested": { "ignored": ["yes"] },
            "message": ["skipped"]
        });
        let err = ApiError::classify(request(), response(400, "Bad Request", body));

        assert_eq!(err.kind, ApiErrorKind::Http);
        assert_eq!(err.code, 400);
        assert_eq!(
            err.errors,
            vec!["scope: identify".to_string(), "scope: guilds".to_string()]
        );
        assert_eq!(
            err.message,
            "Discord HTTP Error: 400 Bad Request on POST /api/v10/oauth2/token\n  \
             scope: identify\n  scope: guilds"
        );
    }

    #[test]
    fn test_http_error_for_text_body() {
        let err = ApiError::classify(
            request(),
            response(500, "Internal Server Error", Value::String("oops".to_string())),
        );

        assert_eq!(err.kind, ApiErrorKind::Http);
        assert!(err.errors.is_empty());
        assert_eq!(err.status(), 500);
    }

    #[test]
    fn test_zero_code_is_http_error() {
        let err = ApiError::classify(request(), response(403, "Forbidden", json!({ "code": 0 })));
        assert_eq!(err.kind, ApiErrorKind::Http);
        assert_eq!(err.code, 403);
    }
}
