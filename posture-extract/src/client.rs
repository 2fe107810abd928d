use std::time::Duration;

use async_trait::async_trait;
use posture_types::ExtractionPayload;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ExtractError;
use crate::media::ExtractionRequest;
use crate::payload::validate_payload;

/// The extraction capability behind a trait so the pipeline can be driven
/// by the HTTP client in production and by stubs in tests.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionPayload, ExtractError>;
}

/// Wire shape of the extraction request body.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    file_content: &'a str,
    file_type: crate::media::MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    media_type: Option<&'a str>,
}

/// HTTP client for the external extraction service.
pub struct ExtractionClient {
    client: reqwest::Client,
    endpoint: String,
}

impl ExtractionClient {
    /// Create a client with an explicit request timeout. The timeout covers
    /// the whole round trip; the service call is the pipeline's critical
    /// path for AI-extractable files.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ExtractError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("posture-extract/0.1")
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Extractor for ExtractionClient {
    async fn extract(&self, request: ExtractionRequest) -> Result<ExtractionPayload, ExtractError> {
        let body = WireRequest {
            file_content: &request.content,
            file_type: request.kind,
            media_type: request.media_type.as_deref(),
        };

        debug!(endpoint = %self.endpoint, kind = ?request.kind, "calling extraction service");
        let response = self.client.post(&self.endpoint).json(&body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "extraction service returned an error");
            return Err(ExtractError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ExtractError::InvalidPayload(e.to_string()))?;
        validate_payload(value)
    }
}
