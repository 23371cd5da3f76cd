//! HTTP span exporter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::config::AgentspanConfig;
use crate::error::{ExportError, TelemetryError};
use crate::telemetry::export::exporter::{ExportBatch, ExportResult, SpanExporter};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs serialized batches to `{endpoint}/v1/traces` with a bearer credential.
pub struct HttpSpanExporter {
    client: Client,
    url: String,
    api_key: String,
}

impl HttpSpanExporter {
    pub fn new(
        endpoint: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TelemetryError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(request_timeout))
            .timeout(request_timeout)
            .build()
            .map_err(|e| {
                TelemetryError::InvalidConfiguration(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self {
            client,
            url: traces_url(endpoint),
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &AgentspanConfig) -> Result<Self, TelemetryError> {
        let api_key = config.require_api_key()?;
        Self::new(
            &config.endpoint,
            api_key,
            config.exporter.request_timeout(),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send(&self, batch: &ExportBatch) -> Result<(), ExportError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .body(batch.payload().to_vec())
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(spans = batch.len(), status = status.as_u16(), "Span batch accepted");
            return Ok(());
        }
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        Err(ExportError::from_status(status.as_u16(), error_text))
    }
}

#[async_trait]
impl SpanExporter for HttpSpanExporter {
    async fn export(&self, batch: &ExportBatch) -> ExportResult {
        self.send(batch).await.into()
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn traces_url(endpoint: &str) -> String {
    format!("{}/v1/traces", endpoint.trim_end_matches('/'))
}

fn map_http_error(error: reqwest::Error) -> ExportError {
    if let Some(status) = error.status() {
        ExportError::from_status(status.as_u16(), error.to_string())
    } else if error.is_timeout() {
        ExportError::Timeout(error.to_string())
    } else if error.is_connect() {
        ExportError::Connection(error.to_string())
    } else {
        ExportError::Connection(format!("HTTP error: {}", error))
    }
}
