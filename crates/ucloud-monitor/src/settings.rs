//! Per-datasource settings stored by Grafana.
use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// The datasource's `jsonData`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UCloudJsonData {
    /// The project used when a request doesn't name one.
    #[serde(default)]
    pub project_id: Option<String>,
}

/// The datasource's decrypted `secureJsonData`.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UCloudSecureJsonData {
    /// The UCloud API public key.
    #[serde(default)]
    pub public_key: Option<String>,
    /// The UCloud API private key.
    #[serde(default)]
    pub private_key: Option<String>,
    /// Saved by early versions of the config page in place of `publicKey`.
    #[serde(default)]
    pub api_key: Option<String>,
}

impl fmt::Debug for UCloudSecureJsonData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UCloudSecureJsonData")
            .field("public_key", &self.public_key.as_ref().map(|_| "<redacted>"))
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// The credentials are incomplete.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CredentialsError {
    /// Neither `publicKey` nor the legacy `apiKey` is set.
    #[error("Public Key must be set")]
    MissingPublicKey,
    /// `privateKey` is not set.
    #[error("Private Key must be set")]
    MissingPrivateKey,
}

/// Everything needed to sign UCloud API requests for one datasource.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub(crate) public_key: String,
    pub(crate) private_key: String,
    pub(crate) project_id: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|v| !v.is_empty())
}

impl Credentials {
    /// Create credentials directly.
    pub fn new(
        public_key: impl Into<String>,
        private_key: impl Into<String>,
        project_id: Option<String>,
    ) -> Self {
        Self {
            public_key: public_key.into(),
            private_key: private_key.into(),
            project_id: project_id.filter(|p| !p.is_empty()),
        }
    }

    /// Read credentials from the datasource settings.
    ///
    /// Empty values count as missing.
    pub fn from_settings(
        json_data: &UCloudJsonData,
        secure: &UCloudSecureJsonData,
    ) -> Result<Self, CredentialsError> {
        let public_key = non_empty(&secure.public_key)
            .or_else(|| non_empty(&secure.api_key))
            .ok_or(CredentialsError::MissingPublicKey)?;
        let private_key =
            non_empty(&secure.private_key).ok_or(CredentialsError::MissingPrivateKey)?;
        Ok(Self::new(
            public_key.clone(),
            private_key.clone(),
            json_data.project_id.clone(),
        ))
    }

    /// The default project, if configured.
    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("project_id", &self.project_id)
            .finish()
    }
}
