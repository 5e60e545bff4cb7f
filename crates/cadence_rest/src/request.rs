//! Request options and response bodies.

use cadence_error::{CadenceResult, TransportError, TransportErrorKind};
use derive_setters::Setters;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;

/// Media type that triggers JSON encoding and decoding.
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Authorization scheme placed before the credentials.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum AuthKind {
    /// `Basic` client credentials
    Basic,
    /// `Bearer` OAuth2 access token
    Bearer,
    /// `Bot` token
    Bot,
}

/// Credentials attached to a request.
///
/// Any request carrying `Auth` counts as authenticated and is held back while
/// a global rate limit is in effect.
///
/// # Example
///
/// ```
/// use cadence_rest::Auth;
///
/// let auth = Auth::bearer("abc123");
/// assert_eq!(auth.header_value(), "Bearer abc123");
/// assert!(!format!("{:?}", auth).contains("abc123"));
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Auth {
    kind: AuthKind,
    credentials: String,
}

impl Auth {
    /// Credentials with an explicit scheme.
    pub fn new(kind: AuthKind, credentials: impl Into<String>) -> Self {
        Self {
            kind,
            credentials: credentials.into(),
        }
    }

    /// Basic scheme; `credentials` is the already-encoded `id:secret` pair.
    pub fn basic(credentials: impl Into<String>) -> Self {
        Self::new(AuthKind::Basic, credentials)
    }

    /// Bearer scheme.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(AuthKind::Bearer, token)
    }

    /// Bot scheme.
    pub fn bot(token: impl Into<String>) -> Self {
        Self::new(AuthKind::Bot, token)
    }

    /// The scheme.
    pub fn kind(&self) -> AuthKind {
        self.kind
    }

    /// Value for the `Authorization` header.
    pub fn header_value(&self) -> String {
        format!("{} {}", self.kind, self.credentials)
    }
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auth")
            .field("kind", &self.kind)
            .field("credentials", &"<redacted>")
            .finish()
    }
}

/// Request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Serialized as JSON; implies `application/json` unless overridden
    Json(Value),
    /// Sent verbatim, e.g. a pre-encoded form
    Text(String),
    /// Sent verbatim
    Bytes(Vec<u8>),
}

impl Payload {
    /// Content type used when the caller does not specify one.
    pub fn default_content_type(&self) -> Option<&'static str> {
        match self {
            Payload::Json(_) => Some(JSON_CONTENT_TYPE),
            Payload::Text(_) | Payload::Bytes(_) => None,
        }
    }

    /// Wire encoding of the body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::Serialize`] if JSON encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, TransportError> {
        match self {
            Payload::Json(value) => serde_json::to_vec(value)
                .map_err(|e| TransportError::new(TransportErrorKind::Serialize(e.to_string()))),
            Payload::Text(text) => Ok(text.clone().into_bytes()),
            Payload::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

/// Per-request options.
///
/// # Example
///
/// ```
/// use cadence_rest::{Auth, RequestOptions};
///
/// let options = RequestOptions::default()
///     .with_auth(Auth::bot("token"))
///     .with_content_type("application/x-www-form-urlencoded");
/// assert!(options.auth.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Setters)]
#[setters(prefix = "with_")]
pub struct RequestOptions {
    /// Credentials; their presence marks the request authenticated
    #[setters(strip_option)]
    pub auth: Option<Auth>,
    /// Overrides the payload's default content type
    #[setters(strip_option, into)]
    pub content_type: Option<String>,
    /// 502 retries already spent
    pub attempts: u32,
    /// Schedule on this route instead of the one derived from the path
    #[setters(strip_option, into)]
    pub route: Option<String>,
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Non-empty body served as `application/json`
    Json(Value),
    /// Any other non-empty body
    Text(String),
    /// Zero-length body
    Empty,
}

impl ResponseBody {
    /// Decode a raw body according to its content type.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::Decode`] when a JSON body does not parse.
    pub fn decode(bytes: &[u8], content_type: Option<&str>) -> Result<Self, TransportError> {
        if bytes.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        if content_type.is_some_and(is_json) {
            serde_json::from_slice(bytes)
                .map(ResponseBody::Json)
                .map_err(|e| TransportError::new(TransportErrorKind::Decode(e.to_string())))
        } else {
            Ok(ResponseBody::Text(String::from_utf8_lossy(bytes).into_owned()))
        }
    }

    /// Whether the body was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    /// The JSON value, if the body was JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The body as a JSON value; text becomes a JSON string and empty becomes an empty string.
    pub fn into_value(self) -> Value {
        match self {
            ResponseBody::Json(value) => value,
            ResponseBody::Text(text) => Value::String(text),
            ResponseBody::Empty => Value::String(String::new()),
        }
    }

    /// Deserialize into a typed response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportErrorKind::Decode`] if the value does not match `T`.
    pub fn into_json<T: DeserializeOwned>(self) -> CadenceResult<T> {
        let value = match self {
            ResponseBody::Empty => Value::Null,
            other => other.into_value(),
        };
        Ok(serde_json::from_value(value)
            .map_err(|e| TransportError::new(TransportErrorKind::Decode(e.to_string())))?)
    }
}

fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(JSON_CONTENT_TYPE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_by_content_type() {
        let json_type = Some("application/json; charset=utf-8");
        assert_eq!(
            ResponseBody::decode(br#"{"id":"1"}"#, json_type).unwrap(),
            ResponseBody::Json(json!({ "id": "1" }))
        );
        assert_eq!(
            ResponseBody::decode(b"ok", Some("text/plain")).unwrap(),
            ResponseBody::Text("ok".to_string())
        );
        assert_eq!(
            ResponseBody::decode(b"", Some(JSON_CONTENT_TYPE)).unwrap(),
            ResponseBody::Empty
        );
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        let err = ResponseBody::decode(b"{nope", Some(JSON_CONTENT_TYPE)).unwrap_err();
        assert!(matches!(err.kind(), TransportErrorKind::Decode(_)));
    }

    #[test]
    fn test_into_json_typed() {
        #[derive(serde::Deserialize)]
        struct Token {
            access_token: String,
        }
        let body = ResponseBody::Json(json!({ "access_token": "xyz", "expires_in": 604800 }));
        let token: Token = body.into_json().unwrap();
        assert_eq!(token.access_token, "xyz");
    }

    #[test]
    fn test_auth_kinds() {
        assert_eq!(Auth::basic("aWQ6c2VjcmV0").header_value(), "Basic aWQ6c2VjcmV0");
        assert_eq!(Auth::bot("t").header_value(), "Bot t");
        assert_eq!("Bearer".parse::<AuthKind>().unwrap(), AuthKind::Bearer);
    }

    #[test]
    fn test_payload_content_types() {
        assert_eq!(Payload::Json(json!({})).default_content_type(), Some(JSON_CONTENT_TYPE));
        assert_eq!(Payload::Text("a=b".into()).default_content_type(), None);
        assert_eq!(Payload::Text("a=b".into()).encode().unwrap(), b"a=b".to_vec());
    }
}
