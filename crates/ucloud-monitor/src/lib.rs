/*! A Grafana backend datasource plugin for UCloud monitoring.

The plugin implements three of the backend services:

- [`DataService`][grafana_plugin_sdk::backend::DataService] runs each query
  through UCloud's `GetMetric` action and returns one time series frame per
  metric.
- [`ResourceService`][grafana_plugin_sdk::backend::ResourceService] serves the
  `generic_api` resource, which the query editor uses to populate its
  selectors; see [`lookup`].
- [`DiagnosticsService`][grafana_plugin_sdk::backend::DiagnosticsService]
  checks that the datasource's credentials are set and accepted by UCloud.

Requests to UCloud are signed with the credentials stored in the datasource's
secure settings, so the browser never sees them.
*/
#![deny(missing_docs)]

use std::sync::Arc;

use grafana_plugin_sdk::prelude::*;

pub mod client;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod lookup;
pub mod resource;
pub mod settings;

use crate::{
    client::UCloudClient,
    config::PluginConfig,
    settings::{Credentials, CredentialsError, UCloudJsonData, UCloudSecureJsonData},
};

/// The plugin service.
#[derive(Clone, Debug, GrafanaPlugin)]
#[grafana_plugin(
    plugin_type = "datasource",
    json_data = "UCloudJsonData",
    secure_json_data = "UCloudSecureJsonData"
)]
pub struct UCloudMonitor {
    config: Arc<PluginConfig>,
    http: reqwest::Client,
}

impl UCloudMonitor {
    /// Create the plugin service.
    pub fn new(config: PluginConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }

    /// A UCloud client for one datasource instance.
    fn client(
        &self,
        json_data: &UCloudJsonData,
        secure: &UCloudSecureJsonData,
    ) -> Result<UCloudClient, CredentialsError> {
        let credentials = Credentials::from_settings(json_data, secure)?;
        Ok(UCloudClient::new(
            self.http.clone(),
            Arc::clone(&self.config),
            credentials,
        ))
    }
}
