//! Health checks.
use grafana_plugin_sdk::backend;
use tracing::{info, warn};

use crate::{
    client::{ApiRequest, UCloudApi},
    UCloudMonitor,
};

/// Verify that `api` accepts the configured credentials, using the cheapest call available.
pub async fn check_api<A>(api: &A) -> backend::CheckHealthResponse
where
    A: UCloudApi + ?Sized,
{
    match api.invoke(ApiRequest::new("GetRegion")).await {
        Ok(_) => backend::CheckHealthResponse::ok("Data source is working".to_string()),
        Err(error) => {
            warn!(%error, "health check failed");
            backend::CheckHealthResponse::error(format!("UCloud API check failed: {error}"))
        }
    }
}

#[backend::async_trait]
impl backend::DiagnosticsService for UCloudMonitor {
    type CheckHealthError = std::convert::Infallible;

    async fn check_health(
        &self,
        request: backend::CheckHealthRequest<Self>,
    ) -> Result<backend::CheckHealthResponse, Self::CheckHealthError> {
        info!("checking health");
        let Some(settings) = request.plugin_context.instance_settings else {
            return Ok(backend::CheckHealthResponse::error(
                "Missing datasource instance settings".to_string(),
            ));
        };
        let api = match self.client(&settings.json_data, &settings.decrypted_secure_json_data) {
            Ok(api) => api,
            Err(error) => return Ok(backend::CheckHealthResponse::error(error.to_string())),
        };
        Ok(check_api(&api).await)
    }

    type CollectMetricsError = std::convert::Infallible;

    async fn collect_metrics(
        &self,
        _request: backend::CollectMetricsRequest<Self>,
    ) -> Result<backend::CollectMetricsResponse, Self::CollectMetricsError> {
        Ok(backend::CollectMetricsResponse::new(None))
    }
}
