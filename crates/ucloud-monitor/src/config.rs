//! Process-wide plugin configuration read from the environment.
use std::{collections::HashMap, time::Duration};

use url::Url;

/// The error returned when a configuration option has an invalid value.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid value {value:?} for {key}: {reason}")]
pub struct ConfigError {
    key: String,
    value: String,
    reason: String,
}

impl ConfigError {
    fn new(key: &str, value: &str, reason: impl ToString) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Process-wide plugin configuration, read from the environment at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginConfig {
    /// The UCloud OpenAPI endpoint, without a trailing slash.
    pub api_base_url: String,
    /// Timeout for most UCloud requests.
    pub request_timeout: Duration,
    /// Timeout for the slow `uhost` and `udb` listings.
    pub long_request_timeout: Duration,
}

impl PluginConfig {
    const API_BASE_URL: &'static str = "UCLOUD_API_BASE_URL";
    const REQUEST_TIMEOUT_SECS: &'static str = "UCLOUD_REQUEST_TIMEOUT_SECS";
    const LONG_REQUEST_TIMEOUT_SECS: &'static str = "UCLOUD_LONG_REQUEST_TIMEOUT_SECS";

    const DEFAULT_API_BASE_URL: &'static str = "https://api.ucloud.cn";
    const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    const DEFAULT_LONG_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Read the configuration from the process environment.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_vars(std::env::vars().collect())
    }

    /// Read the configuration from a set of variables; unset options take their defaults.
    pub fn from_vars(vars: HashMap<String, String>) -> ConfigResult<Self> {
        let get = |key: &str| vars.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let secs = |key: &str, default: Duration| -> ConfigResult<Duration> {
            match get(key) {
                None => Ok(default),
                Some(v) => match v.parse::<u64>() {
                    Ok(0) => Err(ConfigError::new(key, v, "timeout must be positive")),
                    Ok(n) => Ok(Duration::from_secs(n)),
                    Err(e) => Err(ConfigError::new(key, v, e)),
                },
            }
        };
        let api_base_url = match get(Self::API_BASE_URL) {
            None => Self::DEFAULT_API_BASE_URL.to_string(),
            Some(v) => {
                let url = Url::parse(v).map_err(|e| ConfigError::new(Self::API_BASE_URL, v, e))?;
                if !matches!(url.scheme(), "http" | "https") {
                    return Err(ConfigError::new(Self::API_BASE_URL, v, "expected an http(s) URL"));
                }
                v.trim_end_matches('/').to_string()
            }
        };
        Ok(Self {
            api_base_url,
            request_timeout: secs(Self::REQUEST_TIMEOUT_SECS, Self::DEFAULT_REQUEST_TIMEOUT)?,
            long_request_timeout: secs(
                Self::LONG_REQUEST_TIMEOUT_SECS,
                Self::DEFAULT_LONG_REQUEST_TIMEOUT,
            )?,
        })
    }

    /// The timeout for a request, depending on whether it is a slow listing.
    pub fn timeout(&self, long_running: bool) -> Duration {
        if long_running {
            self.long_request_timeout
        } else {
            self.request_timeout
        }
    }
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            api_base_url: Self::DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            long_request_timeout: Self::DEFAULT_LONG_REQUEST_TIMEOUT,
        }
    }
}
