//! Datasource configuration as edited in the datasource settings page.
//!
//! Secrets are write-only: once saved, the host only reports whether each one
//! is configured. Resetting a secret clears that flag and leaves an empty
//! pending value, so the next save overwrites the stored secret.
use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Non-secret datasource settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceJsonData {
    /// The default UCloud project for queries that don't name one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

/// A secret setting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecretKey {
    /// The UCloud API public key.
    PublicKey,
    /// The UCloud API private key.
    PrivateKey,
    /// Legacy single API key; read as the public key by the backend.
    ApiKey,
}

impl SecretKey {
    /// The key used in Grafana's secure JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublicKey => "publicKey",
            Self::PrivateKey => "privateKey",
            Self::ApiKey => "apiKey",
        }
    }
}

impl fmt::Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SecretKey {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "publicKey" => Ok(Self::PublicKey),
            "privateKey" => Ok(Self::PrivateKey),
            "apiKey" => Ok(Self::ApiKey),
            other => Err(format!("unknown secret key {other}")),
        }
    }
}

/// The datasource settings exchanged with the host's settings page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConfig {
    /// Non-secret settings.
    #[serde(default)]
    pub json_data: DataSourceJsonData,
    /// Which secrets are already stored.
    #[serde(default)]
    secure_json_fields: BTreeMap<String, bool>,
    /// Secret values entered but not yet saved.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    secure_json_data: BTreeMap<String, String>,
}

impl DataSourceConfig {
    /// Set the default project.
    pub fn set_project_id(&mut self, project_id: impl Into<String>) {
        let project_id = project_id.into();
        self.json_data.project_id = (!project_id.is_empty()).then_some(project_id);
    }

    /// Enter a new value for a secret. Other pending secrets are kept.
    pub fn set_secret(&mut self, key: SecretKey, value: impl Into<String>) {
        self.secure_json_data
            .insert(key.as_str().to_string(), value.into());
    }

    /// Reset a secret: it is no longer reported as configured, and its pending value is blank.
    pub fn reset_secret(&mut self, key: SecretKey) {
        self.secure_json_fields.insert(key.as_str().to_string(), false);
        self.secure_json_data
            .insert(key.as_str().to_string(), String::new());
    }

    /// Whether a secret is stored by the host.
    pub fn is_configured(&self, key: SecretKey) -> bool {
        self.secure_json_fields
            .get(key.as_str())
            .copied()
            .unwrap_or(false)
    }

    /// The pending value entered for a secret, or `""` if none.
    pub fn pending_secret(&self, key: SecretKey) -> &str {
        self.secure_json_data
            .get(key.as_str())
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Record that the host has saved the settings.
    ///
    /// Non-empty pending secrets become configured and their values are dropped;
    /// the host never hands them back.
    pub fn mark_saved(&mut self) {
        for (key, value) in std::mem::take(&mut self.secure_json_data) {
            if !value.is_empty() {
                self.secure_json_fields.insert(key, true);
            }
        }
    }
}
