//! The `generic_api` resource.
use bytes::Bytes;
use grafana_plugin_sdk::backend;
use http::{header, Method, Request, Response, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use ucloud_monitor_editor::GENERIC_API;

use crate::{
    client::UCloudApi,
    lookup::{lookup, LookupError, LookupParams},
    settings::CredentialsError,
    UCloudMonitor,
};

/// Errors returned from resource calls.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// The response could not be built.
    #[error("HTTP error: {0}")]
    Http(#[from] http::Error),

    /// The response could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No such resource.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Grafana didn't send the datasource settings.
    #[error("missing datasource instance settings")]
    MissingInstanceSettings,

    /// The datasource credentials are incomplete.
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// The request body was not a JSON object of parameters.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The lookup failed.
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

impl ResourceError {
    fn status(&self) -> StatusCode {
        match self {
            Self::Http(_) | Self::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Lookup(LookupError::UCloud(_)) => StatusCode::BAD_GATEWAY,
            Self::MissingInstanceSettings
            | Self::Credentials(_)
            | Self::InvalidBody(_)
            | Self::Lookup(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl backend::ErrIntoHttpResponse for ResourceError {
    fn into_http_response(self) -> Result<Response<Bytes>, Box<dyn std::error::Error>> {
        Ok(Response::builder()
            .status(self.status())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Bytes::from(serde_json::to_vec(
                &serde_json::json!({"error": self.to_string()}),
            )?))?)
    }
}

/// Read lookup parameters from the query string and, for `POST`, a JSON object body.
///
/// Body values win over query values. Only the first value of a repeated
/// query parameter is used, and empty values are dropped.
pub fn parse_params(request: &Request<Bytes>) -> Result<LookupParams, ResourceError> {
    let mut params = LookupParams::new();
    if let Some(query) = request.uri().query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            if !v.is_empty() && !params.contains_key(k.as_ref()) {
                params.insert(k.into_owned(), v.into_owned());
            }
        }
    }
    if request.method() == Method::POST && !request.body().is_empty() {
        let body: serde_json::Map<String, Value> = serde_json::from_slice(request.body())
            .map_err(|e| ResourceError::InvalidBody(e.to_string()))?;
        for (k, v) in body {
            let v = match v {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Null => continue,
                Value::Array(_) | Value::Object(_) => {
                    return Err(ResourceError::InvalidBody(format!(
                        "parameter {k} must be a scalar"
                    )))
                }
            };
            if v.is_empty() {
                params.remove(&k);
            } else {
                params.insert(k, v);
            }
        }
    }
    Ok(params)
}

/// Serve a resource request against `api`.
pub async fn handle<A>(api: &A, request: &Request<Bytes>) -> Result<Response<Bytes>, ResourceError>
where
    A: UCloudApi + ?Sized,
{
    let path = request.uri().path().trim_start_matches('/');
    if path != GENERIC_API {
        return Err(ResourceError::NotFound(path.to_string()));
    }
    let params = parse_params(request)?;
    debug!(?params, "generic_api called");
    let values = lookup(api, &params).await.inspect_err(|error| {
        warn!(action = params.get("Action").map(String::as_str), %error, "lookup failed");
    })?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Bytes::from(serde_json::to_vec(&values)?))?)
}

#[backend::async_trait]
impl backend::ResourceService for UCloudMonitor {
    type Error = ResourceError;
    type InitialResponse = Response<Bytes>;
    type Stream = backend::BoxResourceStream<Self::Error>;

    async fn call_resource(
        &self,
        r: backend::CallResourceRequest<Self>,
    ) -> Result<(Self::InitialResponse, Self::Stream), Self::Error> {
        let path = r.request.uri().path().trim_start_matches('/');
        if path != GENERIC_API {
            return Err(ResourceError::NotFound(path.to_string()));
        }
        let settings = r
            .plugin_context
            .instance_settings
            .ok_or(ResourceError::MissingInstanceSettings)?;
        let api = self.client(&settings.json_data, &settings.decrypted_secure_json_data)?;
        let response = handle(&api, &r.request).await?;
        Ok((
            response,
            Box::pin(futures_util::stream::empty()) as Self::Stream,
        ))
    }
}
