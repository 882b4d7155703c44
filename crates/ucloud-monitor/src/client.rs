/*! A minimal UCloud OpenAPI client.

Every UCloud API call is a form-encoded `POST` to a single endpoint. The
`Action` parameter selects the operation and a `Signature` parameter
authenticates it: the SHA-1 hex digest of every other parameter, sorted by
key and concatenated as `key` + `value`, followed by the private key.

Responses are JSON objects carrying a `RetCode`; anything but `0` is a failure
described by `Message`, even when the HTTP status is `200`.
*/
use std::{collections::BTreeMap, fmt, sync::Arc};

use grafana_plugin_sdk::backend;
use serde_json::Value;
use sha1::{Digest, Sha1};
use thiserror::Error;
use tracing::debug;

use crate::{config::PluginConfig, settings::Credentials};

const USER_AGENT: &str = "UCloud-monitor-grafana";

/// A single UCloud API call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
    params: BTreeMap<String, String>,
    long_running: bool,
}

impl ApiRequest {
    /// A request for `action` with no other parameters.
    pub fn new(action: &str) -> Self {
        let mut params = BTreeMap::new();
        params.insert("Action".to_string(), action.to_string());
        Self {
            params,
            long_running: false,
        }
    }

    /// The API action.
    pub fn action(&self) -> &str {
        self.params.get("Action").map(String::as_str).unwrap_or_default()
    }

    /// Set a parameter.
    pub fn param(mut self, key: &str, value: impl fmt::Display) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }

    /// Set a parameter if a value is given.
    pub fn opt_param(self, key: &str, value: Option<impl fmt::Display>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Set an array parameter, flattened to `key.0`, `key.1`, ...
    pub fn list_param<I>(mut self, key: &str, values: I) -> Self
    where
        I: IntoIterator,
        I::Item: fmt::Display,
    {
        for (i, v) in values.into_iter().enumerate() {
            self.params.insert(format!("{key}.{i}"), v.to_string());
        }
        self
    }

    /// Use the long timeout for this request.
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }

    /// Get a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Whether the long timeout applies.
    pub fn is_long_running(&self) -> bool {
        self.long_running
    }
}

/// Errors calling the UCloud API.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UCloudError {
    /// The request could not be sent, timed out, or the response could not be read.
    #[error("error calling {action}: {source}")]
    Transport {
        /// The API action.
        action: String,
        /// The underlying HTTP client error.
        source: reqwest::Error,
    },
    /// The API responded with a non-success HTTP status.
    #[error("{action} returned HTTP status {status}: {body}")]
    Status {
        /// The API action.
        action: String,
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: String,
    },
    /// The response was not the expected JSON.
    #[error("invalid response to {action}: {source}")]
    Decode {
        /// The API action.
        action: String,
        /// The underlying JSON error.
        source: serde_json::Error,
    },
    /// The API reported an error.
    #[error("{action} failed with RetCode {ret_code}: {message}")]
    Api {
        /// The API action.
        action: String,
        /// The UCloud return code.
        ret_code: i64,
        /// The UCloud error message.
        message: String,
    },
}

impl UCloudError {
    pub(crate) fn decode(action: &str, source: serde_json::Error) -> Self {
        Self::Decode {
            action: action.to_string(),
            source,
        }
    }
}

/// The UCloud API, as used by the plugin.
#[backend::async_trait]
pub trait UCloudApi: Send + Sync {
    /// Send `request`, returning the response object on success.
    async fn invoke(&self, request: ApiRequest) -> Result<Value, UCloudError>;
}

/// Compute the request signature for `params` (which must not include `Signature`).
pub fn sign(params: &BTreeMap<String, String>, private_key: &str) -> String {
    let mut hasher = Sha1::new();
    for (k, v) in params {
        hasher.update(k.as_bytes());
        hasher.update(v.as_bytes());
    }
    hasher.update(private_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A [`UCloudApi`] implementation talking to the real API over HTTP.
#[derive(Clone, Debug)]
pub struct UCloudClient {
    http: reqwest::Client,
    config: Arc<PluginConfig>,
    credentials: Credentials,
}

impl UCloudClient {
    /// Create a client signing requests with `credentials`.
    pub fn new(http: reqwest::Client, config: Arc<PluginConfig>, credentials: Credentials) -> Self {
        Self {
            http,
            config,
            credentials,
        }
    }

    /// The final, signed form parameters for `request`.
    fn signed_params(&self, request: ApiRequest) -> BTreeMap<String, String> {
        let mut params = request.params;
        params.insert("PublicKey".to_string(), self.credentials.public_key.clone());
        if let Some(project_id) = self.credentials.project_id() {
            params
                .entry("ProjectId".to_string())
                .or_insert_with(|| project_id.to_string());
        }
        params.remove("Signature");
        let signature = sign(&params, &self.credentials.private_key);
        params.insert("Signature".to_string(), signature);
        params
    }
}

#[backend::async_trait]
impl UCloudApi for UCloudClient {
    async fn invoke(&self, request: ApiRequest) -> Result<Value, UCloudError> {
        let action = request.action().to_string();
        let timeout = self.config.timeout(request.is_long_running());
        let params = self.signed_params(request);
        debug!(%action, ?timeout, "calling UCloud API");
        let transport = |source| UCloudError::Transport {
            action: action.clone(),
            source,
        };
        let response = self
            .http
            .post(&self.config.api_base_url)
            .timeout(timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .form(&params)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(UCloudError::Status {
                action,
                status: status.as_u16(),
                body,
            });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|source| UCloudError::decode(&action, source))?;
        let ret_code = value.get("RetCode").and_then(Value::as_i64).unwrap_or(0);
        if ret_code != 0 {
            let message = value
                .get("Message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            return Err(UCloudError::Api {
                action,
                ret_code,
                message,
            });
        }
        Ok(value)
    }
}
