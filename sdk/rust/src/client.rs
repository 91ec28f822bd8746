use std::collections::BTreeMap;

use reqwest::Client;
use serde::Deserialize;

use crate::error::{SdkError, SdkResult};
use crate::store::ConfigState;

/// Body of `GET /api/client/configs/{app}/{env}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfigResponse {
    pub application_id: String,
    pub environment_id: String,
    /// `published` or `live`.
    pub source: String,
    pub snapshot_id: Option<u64>,
    pub version_number: Option<u64>,
    pub config: BTreeMap<String, String>,
}

impl From<ClientConfigResponse> for ConfigState {
    fn from(response: ClientConfigResponse) -> Self {
        ConfigState {
            snapshot_id: response.snapshot_id,
            version_number: response.version_number,
            values: response.config,
        }
    }
}

/// HTTP read client for the configuration a runtime should apply.
#[derive(Debug, Clone)]
pub struct ConfigClient {
    client: Client,
    base_url: String,
}

impl ConfigClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the published configuration of a scope.
    pub async fn fetch(&self, application_id: &str, environment_id: &str) -> SdkResult<ClientConfigResponse> {
        let resp = self
            .client
            .get(format!(
                "{}/api/client/configs/{}/{}",
                self.base_url, application_id, environment_id
            ))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SdkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(resp.json().await?)
    }
}
