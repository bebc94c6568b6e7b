// File: coordinator/src/provider/http.rs
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use super::{InstanceState, Inventory, PowerControl};
use crate::config::ComputeConfig;
use crate::constants::signals;
use crate::errors::{PowerAction, ProviderError};

#[derive(Debug, Deserialize)]
struct InstanceList {
    instances: Vec<InstanceSummary>,
}

#[derive(Debug, Deserialize)]
struct InstanceSummary {
    instance_id: String,
    state: InstanceState,
}

#[derive(Debug, Deserialize)]
struct InstanceStatus {
    #[serde(default)]
    events: Vec<ScheduledEvent>,
}

#[derive(Debug, Deserialize)]
struct ScheduledEvent {
    code: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct PowerRequest {
    dry_run: bool,
}

/// Compute API client (bearer-token authenticated JSON over HTTP)
pub struct HttpComputeClient {
    base_url: String,
    api_token: String,
    client: Client,
}

impl HttpComputeClient {
    pub fn new(config: &ComputeConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        operation: &str,
        instance_id: Option<&str>,
    ) -> Result<T, ProviderError> {
        let url = self.url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            if let Some(instance_id) = instance_id {
                return Err(ProviderError::InstanceNotFound {
                    instance_id: instance_id.to_string(),
                });
            }
        }
        if !response.status().is_success() {
            return Err(Self::api_error(operation, response).await);
        }

        response.json::<T>().await.map_err(|e| ProviderError::Transport {
            endpoint: url,
            reason: format!("failed to parse response: {}", e),
        })
    }

    async fn post_power(
        &self,
        action: PowerAction,
        instance_id: &str,
        dry_run: bool,
    ) -> Result<Response, ProviderError> {
        let url = self.url(&format!("/instances/{}/{}", instance_id, action));
        debug!("POST {} (dry_run: {})", url, dry_run);

        Ok(self
            .client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&PowerRequest { dry_run })
            .send()
            .await?)
    }

    /// Decode an error reply, falling back to the raw text
    async fn api_error(operation: &str, response: Response) -> ProviderError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ApiErrorBody>(&text) {
            Ok(body) => ProviderError::Api {
                operation: operation.to_string(),
                code: body.code,
                message: body.message,
            },
            Err(_) => ProviderError::Api {
                operation: operation.to_string(),
                code: status.as_u16().to_string(),
                message: text,
            },
        }
    }
}

#[async_trait]
impl Inventory for HttpComputeClient {
    async fn list_instances(&self) -> Result<Vec<String>, ProviderError> {
        let list: InstanceList = self
            .get_json("/instances", "describe-instances", None)
            .await?;
        Ok(list
            .instances
            .into_iter()
            .map(|instance| instance.instance_id)
            .collect())
    }

    async fn health_status(&self, instance_id: &str) -> Result<Option<String>, ProviderError> {
        let status: InstanceStatus = self
            .get_json(
                &format!("/instances/{}/status", instance_id),
                "describe-instance-status",
                Some(instance_id),
            )
            .await?;
        // Events are reported newest first
        Ok(status.events.into_iter().next().map(|event| event.code))
    }

    async fn runtime_state(&self, instance_id: &str) -> Result<InstanceState, ProviderError> {
        let summary: InstanceSummary = self
            .get_json(
                &format!("/instances/{}", instance_id),
                "describe-instances",
                Some(instance_id),
            )
            .await?;
        Ok(summary.state)
    }
}

#[async_trait]
impl PowerControl for HttpComputeClient {
    async fn dry_run(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError> {
        let response = self.post_power(action, instance_id, true).await?;
        if response.status().is_success() {
            return Ok(());
        }

        match Self::api_error(&format!("{}-instances", action), response).await {
            ProviderError::Api { code, .. } if code == signals::DRY_RUN_OPERATION => {
                debug!("Dry-run {} confirmed for {}", action, instance_id);
                Ok(())
            }
            ProviderError::Api { code, message, .. } => Err(ProviderError::DryRunDenied {
                action,
                instance_id: instance_id.to_string(),
                reason: format!("{}: {}", code, message),
            }),
            other => Err(other),
        }
    }

    async fn execute(&self, action: PowerAction, instance_id: &str) -> Result<(), ProviderError> {
        let response = self.post_power(action, instance_id, false).await?;
        match response.status() {
            status if status.is_success() => {
                info!("Provider accepted {} for {}", action, instance_id);
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(ProviderError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            }),
            _ => Err(Self::api_error(&format!("{}-instances", action), response).await),
        }
    }
}
