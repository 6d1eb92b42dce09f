//! Generic HTTP Recognition Client
//!
//! Wire transport for free-tier recognition providers. The request carries
//! the image as base64 JSON; the response contract is a flat object with a
//! name, optional confidence, and optional string attributes. Provider
//! differences live entirely in config (endpoint, key, extra parameters).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::core::recognition::provider::{ApiRecognitionResult, RecognitionApiClient};
use crate::core::recognition::quota::ProviderConfig;
use crate::core::types::ImageData;
use crate::core::{CoreError, CoreResult};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpRecognitionClient {
    http: reqwest::Client,
}

impl HttpRecognitionClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRecognitionClient {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(alias = "label")]
    name: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[async_trait]
impl RecognitionApiClient for HttpRecognitionClient {
    async fn call(
        &self,
        image: &ImageData,
        provider: &ProviderConfig,
    ) -> CoreResult<ApiRecognitionResult> {
        let endpoint = provider.endpoint.as_deref().ok_or_else(|| {
            CoreError::ValidationError(format!(
                "Provider '{}' has no endpoint configured",
                provider.name
            ))
        })?;

        let mut body = json!({
            "image": BASE64.encode(&image.bytes),
            "mimeType": image.mime,
        });
        // Provider-specific parameters are passed through verbatim.
        if let (Some(map), Some(extra)) = (body.as_object_mut(), provider.extra.as_object()) {
            for (key, value) in extra {
                map.insert(key.clone(), value.clone());
            }
        }

        let timeout = Duration::from_secs(
            provider
                .timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );

        let mut request = self.http.post(endpoint).timeout(timeout).json(&body);
        if let Some(key) = provider.api_key.as_deref() {
            request = request.bearer_auth(key);
        }

        debug!(provider = %provider.name, endpoint = %endpoint, "Dispatching recognition request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CoreError::Timeout(format!("Provider '{}' request timed out", provider.name))
            } else {
                CoreError::Transport(format!("Provider '{}': {}", provider.name, e))
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS
            || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        {
            return Err(CoreError::ProviderUnavailable);
        }
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Transport(format!(
                "Provider '{}' returned {}: {}",
                provider.name,
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let wire: WireResponse = response.json().await.map_err(|e| {
            CoreError::Transport(format!(
                "Provider '{}' sent an unparseable response: {}",
                provider.name, e
            ))
        })?;

        if wire.name.trim().is_empty() {
            return Err(CoreError::Transport(format!(
                "Provider '{}' returned an empty object name",
                provider.name
            )));
        }

        Ok(ApiRecognitionResult {
            name: wire.name,
            confidence: wire.confidence,
            attributes: wire.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_response_accepts_label_alias() {
        let wire: WireResponse =
            serde_json::from_str(r#"{"label": "vase", "confidence": 0.7}"#).unwrap();
        assert_eq!(wire.name, "vase");
        assert_eq!(wire.confidence, Some(0.7));
        assert!(wire.attributes.is_empty());
    }

    #[test]
    fn test_wire_response_keeps_attributes() {
        let wire: WireResponse = serde_json::from_str(
            r#"{"name": "vase", "attributes": {"brand": "Acme", "material": "glass"}}"#,
        )
        .unwrap();
        assert_eq!(wire.attributes.len(), 2);
        assert!(wire.confidence.is_none());
    }

    #[tokio::test]
    async fn test_missing_endpoint_is_rejected_before_network() {
        let client = HttpRecognitionClient::new();
        let provider = ProviderConfig::new("bare", 10, 100);
        let err = client
            .call(&ImageData::jpeg(vec![1, 2, 3]), &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));
    }
}
