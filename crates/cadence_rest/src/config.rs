//! Client configuration.
//!
//! Sources are merged with later ones taking precedence:
//! - Bundled defaults (`cadence.toml` shipped with the crate)
//! - `~/.config/cadence/cadence.toml`
//! - `./cadence.toml`
//! - `CADENCE_*` environment variables

use cadence_error::{CadenceResult, ConfigError, ConfigErrorKind};
use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

const DEFAULT_CONFIG: &str = include_str!("../cadence.toml");

/// Default Discord API base.
pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Settings for a [`RequestHandler`](crate::RequestHandler).
///
/// # Example
///
/// ```
/// use cadence_rest::RestConfig;
///
/// let config = RestConfig::default()
///     .with_request_timeout_ms(5_000)
///     .with_ratelimiter_offset_ms(50);
/// assert_eq!(*config.request_timeout_ms(), 5_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, Setters)]
#[setters(prefix = "with_")]
pub struct RestConfig {
    /// Base URL that request paths are appended to
    #[serde(default = "default_api_base")]
    #[setters(into)]
    api_base: String,

    /// `User-Agent` sent with every request
    #[serde(default = "default_user_agent")]
    #[setters(into)]
    user_agent: String,

    /// Milliseconds before an exchange is abandoned as timed out
    #[serde(default = "default_request_timeout_ms")]
    request_timeout_ms: u64,

    /// Clock offset, after discounting latency, that triggers a skew warning
    #[serde(default = "default_latency_threshold_ms")]
    latency_threshold_ms: i64,

    /// Extra milliseconds every bucket waits past a reset
    #[serde(default)]
    ratelimiter_offset_ms: i64,

    /// Schedule on the fixed offset alone, ignoring measured latency and clock skew
    #[serde(default)]
    disable_latency_compensation: bool,

    /// Proxy URL for all outbound requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[setters(strip_option, into)]
    proxy: Option<String>,
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_user_agent() -> String {
    format!(
        "Cadence (https://github.com/crumplecup/cadence, {})",
        env!("CARGO_PKG_VERSION")
    )
}

fn default_request_timeout_ms() -> u64 {
    15_000
}

fn default_latency_threshold_ms() -> i64 {
    30_000
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            user_agent: default_user_agent(),
            request_timeout_ms: default_request_timeout_ms(),
            latency_threshold_ms: default_latency_threshold_ms(),
            ratelimiter_offset_ms: 0,
            disable_latency_compensation: false,
            proxy: None,
        }
    }
}

impl RestConfig {
    /// Load configuration from every source, then validate.
    ///
    /// Missing user files are skipped.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a source is malformed or a value is invalid.
    #[instrument]
    pub fn load() -> CadenceResult<Self> {
        debug!("Loading configuration: env > current dir > home dir > bundled defaults");

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        if let Some(home) = dirs::home_dir() {
            let home_config = home.join(".config/cadence/cadence.toml");
            builder = builder.add_source(File::from(home_config).required(false));
        }

        builder = builder
            .add_source(File::with_name("cadence").required(false))
            .add_source(Environment::with_prefix("CADENCE").try_parsing(true));

        Self::finish(builder)
    }

    /// Load configuration from a single file layered over the bundled defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read or holds invalid values.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<std::path::Path>) -> CadenceResult<Self> {
        debug!("Loading configuration from file");

        let builder = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from(path.as_ref()));

        Self::finish(builder)
    }

    fn finish(
        builder: config::builder::ConfigBuilder<config::builder::DefaultState>,
    ) -> CadenceResult<Self> {
        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Load(e.to_string())))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(ConfigErrorKind::Parse(e.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigErrorKind::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        reqwest::Url::parse(&self.api_base).map_err(|e| invalid("api_base", e.to_string()))?;
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", "must be positive"));
        }
        if self.latency_threshold_ms <= 0 {
            return Err(invalid("latency_threshold_ms", "must be positive"));
        }
        if self.ratelimiter_offset_ms < 0 {
            return Err(invalid("ratelimiter_offset_ms", "must not be negative"));
        }
        if let Some(proxy) = &self.proxy {
            reqwest::Url::parse(proxy).map_err(|e| invalid("proxy", e.to_string()))?;
        }
        Ok(())
    }
}

#[track_caller]
fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigErrorKind::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_defaults_match_default_impl() {
        let bundled: RestConfig = Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(bundled, RestConfig::default());
    }

    #[test]
    fn test_user_agent_carries_version() {
        let config = RestConfig::default();
        assert!(
            config
                .user_agent()
                .starts_with("Cadence (https://github.com/crumplecup/cadence, ")
        );
        assert!(config.user_agent().contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let err = RestConfig::default()
            .with_request_timeout_ms(0)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ConfigErrorKind::Invalid { field, .. } if field == "request_timeout_ms"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert!(RestConfig::default().with_api_base("not a url").validate().is_err());
        assert!(RestConfig::default().with_proxy("::::").validate().is_err());
        assert!(
            RestConfig::default()
                .with_proxy("http://127.0.0.1:3128")
                .validate()
                .is_ok()
        );
    }
}
