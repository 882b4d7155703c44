use grafana_plugin_sdk::backend;
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

use ucloud_monitor::{config::PluginConfig, UCloudMonitor};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listener = backend::initialize().await?;
    tracing_subscriber::registry()
        .with(backend::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = PluginConfig::from_env()?;
    info!(
        api_base_url = %config.api_base_url,
        timeout = ?config.request_timeout,
        long_timeout = ?config.long_request_timeout,
        "starting UCloud monitor plugin",
    );
    let service = UCloudMonitor::new(config);
    backend::Plugin::new()
        .data_service(service.clone())
        .diagnostics_service(service.clone())
        .resource_service(service)
        .start(listener)
        .await?;
    Ok(())
}
