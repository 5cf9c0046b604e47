//! QR decoding adapters

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use courier_core::{CoreError, QrDecoder};

use crate::error::{ServerError, ServerResult};

#[derive(Debug, Deserialize)]
struct DecodeResponse {
    #[serde(default)]
    value: Option<String>,
}

/// Posts image bytes to a decode service that answers `{ "value": string | null }`
#[derive(Debug, Clone)]
pub struct HttpQrDecoder {
    url: String,
    client: Client,
}

impl HttpQrDecoder {
    /// Create a decoder for the service at `url`
    pub fn new(url: impl Into<String>) -> ServerResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ServerError::ConfigurationError(format!("HTTP client: {}", e)))?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl QrDecoder for HttpQrDecoder {
    async fn decode(&self, image: &[u8]) -> Result<Option<String>, CoreError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| CoreError::ExternalDependency(format!("QR decode request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CoreError::ExternalDependency(format!(
                "QR decode service returned {}",
                status
            )));
        }

        let decoded: DecodeResponse = response
            .json()
            .await
            .map_err(|e| CoreError::ExternalDependency(format!("QR decode response: {}", e)))?;
        Ok(decoded.value.filter(|v| !v.trim().is_empty()))
    }
}

/// Used when no decode service is configured; every decode fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableQrDecoder;

#[async_trait]
impl QrDecoder for UnavailableQrDecoder {
    async fn decode(&self, _image: &[u8]) -> Result<Option<String>, CoreError> {
        Err(CoreError::ExternalDependency(
            "No QR decoder configured".to_string(),
        ))
    }
}
