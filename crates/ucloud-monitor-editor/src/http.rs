//! A [`ResourceFetcher`] that calls datasource resources through Grafana's HTTP API.
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::{error::FetchError, options::ResourceFetcher, params::ParameterObject};

/// Calls `GET {base_url}/api/datasources/uid/{uid}/resources/{name}`.
#[derive(Clone, Debug)]
pub struct GrafanaResourceClient {
    client: reqwest::Client,
    base_url: String,
    datasource_uid: String,
    token: Option<String>,
}

impl GrafanaResourceClient {
    /// Create a client for the datasource `datasource_uid` on the Grafana instance at `base_url`.
    pub fn new(base_url: impl Into<String>, datasource_uid: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, datasource_uid)
    }

    /// Like [`GrafanaResourceClient::new`], reusing an existing HTTP client.
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        datasource_uid: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            datasource_uid: datasource_uid.into(),
            token: None,
        }
    }

    /// Authenticate with a service account token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, name: &str) -> Result<String, FetchError> {
        if self.datasource_uid.is_empty() || self.datasource_uid.contains('/') {
            return Err(FetchError::Url(format!(
                "invalid datasource uid {:?}",
                self.datasource_uid
            )));
        }
        Ok(format!(
            "{}/api/datasources/uid/{}/resources/{}",
            self.base_url,
            self.datasource_uid,
            name.trim_start_matches('/'),
        ))
    }
}

#[async_trait]
impl ResourceFetcher for GrafanaResourceClient {
    async fn fetch_resource(
        &self,
        name: &str,
        params: &ParameterObject,
    ) -> Result<Value, FetchError> {
        let url = self.url(name)?;
        let transport = |source| FetchError::Transport {
            resource: name.to_string(),
            source,
        };
        debug!(%url, params = params.len(), "calling datasource resource");
        let mut request = self.client.get(&url).query(params);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(FetchError::Status {
                resource: name.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|source| FetchError::Decode {
            resource: name.to_string(),
            source,
        })
    }
}
