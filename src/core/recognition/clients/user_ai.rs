//! User AI Backend Client
//!
//! Talks to whatever OpenAI-compatible chat-completions endpoint the user has
//! configured. The image goes up as a data URL; the model is instructed to
//! answer with a single JSON object, which survives the usual markdown code
//! fencing models wrap around JSON.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::core::recognition::provider::{UserAiClient, UserAiResult};
use crate::core::settings::SettingsManager;
use crate::core::types::ImageData;
use crate::core::{CoreError, CoreResult};

const SYSTEM_PROMPT: &str = "You are an object recognition assistant. Identify the main object \
in the photo and answer with a single JSON object with these fields: \
\"name\" (string), \"description\" (string), \"confidence\" (number between 0 and 1), \
\"summary\" (string), \"funFacts\" (array of strings), \"tips\" (array of strings). \
If you cannot identify the object, answer with {\"name\": \"\"}. \
Answer with JSON only, no other text.";

pub struct OpenAiCompatUserClient {
    http: reqwest::Client,
    store: Arc<SettingsManager>,
}

impl OpenAiCompatUserClient {
    pub fn new(store: Arc<SettingsManager>) -> Self {
        Self {
            http: reqwest::Client::new(),
            store,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelAnswer {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    fun_facts: Vec<String>,
    #[serde(default)]
    tips: Vec<String>,
}

/// Strips a surrounding markdown code fence, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        if let Some(inner) = rest.strip_suffix("```") {
            return inner.trim();
        }
    }
    trimmed
}

#[async_trait]
impl UserAiClient for OpenAiCompatUserClient {
    fn is_configured(&self) -> bool {
        self.store.load().user_ai.is_configured()
    }

    async fn recognize(&self, image: &ImageData) -> CoreResult<Option<UserAiResult>> {
        let user_ai = self.store.load().user_ai;
        let (Some(endpoint), Some(api_key)) = (user_ai.endpoint.clone(), user_ai.api_key.clone())
        else {
            return Err(CoreError::ProviderUnavailable);
        };

        let data_url = format!("data:{};base64,{}", image.mime, BASE64.encode(&image.bytes));
        let body = json!({
            "model": user_ai.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": "What is this object?" },
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ],
            "max_tokens": 1024,
        });

        let url = format!("{}/chat/completions", endpoint.trim_end_matches('/'));
        debug!(model = %user_ai.model, "Dispatching user AI recognition request");

        let response = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(self.store.load().recognition.api_timeout_secs))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CoreError::Timeout("User AI request timed out".to_string())
                } else {
                    CoreError::Transport(format!("User AI endpoint: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Transport(format!(
                "User AI endpoint returned {}: {}",
                status,
                detail.chars().take(200).collect::<String>()
            )));
        }

        let chat: ChatResponse = response.json().await.map_err(|e| {
            CoreError::Transport(format!("User AI endpoint sent an unparseable response: {}", e))
        })?;
        let Some(content) = chat.choices.into_iter().next().map(|c| c.message.content) else {
            return Err(CoreError::Transport(
                "User AI endpoint returned no choices".to_string(),
            ));
        };

        let answer: ModelAnswer = match serde_json::from_str(strip_code_fence(&content)) {
            Ok(answer) => answer,
            Err(e) => {
                warn!("User AI answer was not valid JSON: {}", e);
                return Err(CoreError::Transport(
                    "User AI answer was not valid JSON".to_string(),
                ));
            }
        };

        // A blank name is the model's way of declining.
        if answer.name.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(UserAiResult {
            name: answer.name,
            description: answer.description,
            confidence: answer.confidence,
            summary: answer.summary,
            fun_facts: answer.fun_facts,
            tips: answer.tips,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_strip_code_fence_variants() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
    }

    #[test]
    fn test_model_answer_parses_partial_fields() {
        let answer: ModelAnswer =
            serde_json::from_str(r#"{"name": "sextant", "confidence": 0.9}"#).unwrap();
        assert_eq!(answer.name, "sextant");
        assert!(answer.description.is_none());
        assert!(answer.fun_facts.is_empty());
    }

    #[test]
    fn test_unconfigured_store_reports_not_configured() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SettingsManager::new(dir.path().to_path_buf()));
        let client = OpenAiCompatUserClient::new(store);
        assert!(!client.is_configured());
    }

    #[test]
    fn test_configured_store_reports_configured() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SettingsManager::new(dir.path().to_path_buf()));
        let mut settings = store.load();
        settings.user_ai.endpoint = Some("https://api.example.com/v1".to_string());
        settings.user_ai.api_key = Some("sk-test".to_string());
        store.save(&settings).unwrap();

        let client = OpenAiCompatUserClient::new(store);
        assert!(client.is_configured());
    }
}
