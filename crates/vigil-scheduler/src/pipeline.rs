//! HTTP chat pipeline — POSTs dispatch requests to the agent gateway.
//!
//! Request body is the JSON-encoded [`DispatchRequest`]; the response body
//! must be a JSON object with optional `content` and `error` strings.

use std::time::Duration;

use async_trait::async_trait;
use vigil_core::{PipelineConfig, Result, VigilError};

use crate::dispatch::{ChatPipeline, ChatReply, DispatchRequest};

pub struct HttpPipeline {
    client: reqwest::Client,
    url: String,
}

impl HttpPipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VigilError::Pipeline(format!("HTTP client init failed: {e}")))?;
        Ok(Self::with_client(client, &config.url))
    }

    /// Use a preconfigured client (proxies, TLS, headers).
    pub fn with_client(client: reqwest::Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ChatPipeline for HttpPipeline {
    async fn run(&self, request: DispatchRequest) -> Result<ChatReply> {
        let resp = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VigilError::Pipeline(format!("Request to {} failed: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VigilError::Pipeline(format!("Gateway error {status}: {body}")));
        }

        resp.json::<ChatReply>()
            .await
            .map_err(|e| VigilError::Pipeline(format!("Invalid gateway response: {e}")))
    }
}
