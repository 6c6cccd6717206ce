//! # OpenWhisk Dispatcher
//!
//! Non-blocking action invocation through the OpenWhisk REST API:
//! `POST {api_host}/api/v1/namespaces/{namespace}/actions/{action}?blocking=false`
//! answers `202 Accepted` with an `activationId` once the activation is queued.

use super::{DispatchHandle, Dispatcher};
use crate::config::DispatchConfig;
use crate::error::{PromoteError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivationResponse {
    activation_id: String,
}

#[derive(Debug, Clone)]
pub struct OpenWhiskDispatcher {
    client: Client,
    api_host: String,
    namespace: String,
    user: String,
    password: String,
}

impl OpenWhiskDispatcher {
    pub fn new(config: &DispatchConfig, timeout: Duration) -> Result<Self> {
        let (user, password) = config
            .auth_key
            .split_once(':')
            .ok_or_else(|| PromoteError::configuration("dispatch.auth_key must be 'user:password'"))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PromoteError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_host: config.api_host.trim_end_matches('/').to_string(),
            namespace: config.namespace.clone(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    /// Invocation URL; a package-qualified action keeps its `/` separator
    pub fn action_url(&self, action: &str) -> String {
        format!(
            "{}/api/v1/namespaces/{}/actions/{}?blocking=false&result=false",
            self.api_host,
            self.namespace,
            action.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl Dispatcher for OpenWhiskDispatcher {
    async fn invoke(&self, action: &str, params: Value) -> Result<DispatchHandle> {
        let url = self.action_url(action);
        debug!(action = action, url = %url, "Invoking OpenWhisk action");

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&params)
            .send()
            .await
            .map_err(|e| PromoteError::dispatch(action, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(action = action, status = %status, error = %error_text, "Action invocation rejected");
            return Err(PromoteError::dispatch(
                action,
                format!("HTTP {status}: {error_text}"),
            ));
        }

        let activation: ActivationResponse = response
            .json()
            .await
            .map_err(|e| PromoteError::dispatch(action, format!("Invalid response format: {e}")))?;
        Ok(DispatchHandle::new(activation.activation_id))
    }
}
