use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{WebhookClient, WebhookResponse};
use crate::error::{DoctorError, Result};

/// Webhook delivery over `reqwest` with a per-request timeout.
#[derive(Debug, Clone)]
pub struct ReqwestWebhookClient {
    client: reqwest::Client,
}

impl ReqwestWebhookClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("appdoctor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DoctorError::Probe(format!("cannot build http client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebhookClient for ReqwestWebhookClient {
    async fn post_json(&self, url: &str, payload: &Value) -> Result<WebhookResponse> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DoctorError::Probe(format!("webhook request timed out: {}", e))
                } else {
                    DoctorError::Probe(format!("webhook request failed: {}", e))
                }
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Ok(WebhookResponse { status, body })
    }
}
