//! Recognition Collaborator Contracts
//!
//! Defines the traits and tier-specific result shapes the orchestration core
//! depends on. The actual inference engine, network transport, and catalog
//! storage live behind these seams.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::quota::ProviderConfig;
use crate::core::{CoreResult, ImageData, ObjectDetails};

// =============================================================================
// Tier Result Shapes
// =============================================================================

/// Result produced by the on-device classifier.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierResult {
    /// Predicted label
    pub label: String,
    /// Classifier confidence (raw, not yet clamped)
    pub confidence: f32,
    /// Details bundled with the model, when the label is in its vocabulary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<ObjectDetails>,
}

/// Result produced by an external recognition API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecognitionResult {
    /// Recognized object name
    pub name: String,
    /// Confidence, when the provider reports one
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Provider-specific attributes (brand, priceRange, material, ...)
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Result produced by the user-supplied AI backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAiResult {
    /// Recognized object name
    pub name: String,
    /// Free-form description of the object
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub fun_facts: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
}

// =============================================================================
// Collaborator Traits
// =============================================================================

/// On-device classifier contract.
#[async_trait]
pub trait LocalClassifier: Send + Sync {
    /// Loads the model. Returns `Ok(false)` when the model cannot be used on
    /// this device; the tier then degrades to perpetually declining.
    async fn initialize(&self) -> CoreResult<bool>;

    /// Classifies an image. `Ok(None)` means "no prediction".
    async fn recognize(&self, image: &ImageData) -> CoreResult<Option<ClassifierResult>>;
}

/// External recognition API transport contract.
///
/// Implementations own the wire format for one family of providers; the core
/// only hands over the image and the selected provider's connection config.
#[async_trait]
pub trait RecognitionApiClient: Send + Sync {
    async fn call(
        &self,
        image: &ImageData,
        provider: &ProviderConfig,
    ) -> CoreResult<ApiRecognitionResult>;
}

/// User-supplied AI backend contract.
#[async_trait]
pub trait UserAiClient: Send + Sync {
    /// Whether the user has configured a reachable backend.
    fn is_configured(&self) -> bool;

    async fn recognize(&self, image: &ImageData) -> CoreResult<Option<UserAiResult>>;
}

/// Knowledge/catalog lookup used for result enrichment.
#[async_trait]
pub trait ObjectCatalog: Send + Sync {
    async fn details_for(&self, label: &str) -> CoreResult<Option<ObjectDetails>>;
}

// =============================================================================
// Mock Collaborators (for testing)
// =============================================================================

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::core::CoreError;

/// Mock classifier that returns a scripted result after an optional delay.
pub struct MockClassifier {
    result: Option<ClassifierResult>,
    init_ok: bool,
    fail: bool,
    delay_ms: u64,
    calls: AtomicUsize,
}

impl MockClassifier {
    pub fn new() -> Self {
        Self {
            result: None,
            init_ok: true,
            fail: false,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_result(mut self, label: &str, confidence: f32) -> Self {
        self.result = Some(ClassifierResult {
            label: label.to_string(),
            confidence,
            details: None,
        });
        self
    }

    pub fn with_init_ok(mut self, ok: bool) -> Self {
        self.init_ok = ok;
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalClassifier for MockClassifier {
    async fn initialize(&self) -> CoreResult<bool> {
        Ok(self.init_ok)
    }

    async fn recognize(&self, _image: &ImageData) -> CoreResult<Option<ClassifierResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(CoreError::Internal("classifier exploded".to_string()));
        }
        Ok(self.result.clone())
    }
}

/// Mock API client that replays a scripted sequence of outcomes, one per call.
pub struct MockApiClient {
    script: Mutex<std::collections::VecDeque<CoreResult<ApiRecognitionResult>>>,
    calls: AtomicUsize,
}

impl MockApiClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(std::collections::VecDeque::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn then_ok(self, name: &str, confidence: f32) -> Self {
        self.script.lock().unwrap().push_back(Ok(ApiRecognitionResult {
            name: name.to_string(),
            confidence: Some(confidence),
            attributes: HashMap::new(),
        }));
        self
    }

    pub fn then_err(self, err: CoreError) -> Self {
        self.script.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockApiClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecognitionApiClient for MockApiClient {
    async fn call(
        &self,
        _image: &ImageData,
        _provider: &ProviderConfig,
    ) -> CoreResult<ApiRecognitionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Err(CoreError::Transport("mock script exhausted".to_string())),
        }
    }
}

/// Mock user-AI client.
pub struct MockUserAiClient {
    configured: bool,
    result: Option<UserAiResult>,
    calls: AtomicUsize,
}

impl MockUserAiClient {
    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            result: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_result(name: &str, description: &str) -> Self {
        Self {
            configured: true,
            result: Some(UserAiResult {
                name: name.to_string(),
                description: Some(description.to_string()),
                confidence: Some(0.9),
                summary: None,
                fun_facts: Vec::new(),
                tips: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    /// Configured backend that declines every request.
    pub fn declining() -> Self {
        Self {
            configured: true,
            result: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserAiClient for MockUserAiClient {
    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn recognize(&self, _image: &ImageData) -> CoreResult<Option<UserAiResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.result.clone())
    }
}

/// Mock catalog backed by an in-memory map.
pub struct MockCatalog {
    entries: HashMap<String, ObjectDetails>,
}

impl MockCatalog {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with_entry(mut self, label: &str, details: ObjectDetails) -> Self {
        self.entries.insert(label.to_string(), details);
        self
    }
}

#[async_trait]
impl ObjectCatalog for MockCatalog {
    async fn details_for(&self, label: &str) -> CoreResult<Option<ObjectDetails>> {
        Ok(self.entries.get(label).cloned())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_classifier_scripting() {
        let classifier = MockClassifier::new().with_result("teapot", 0.8);
        assert!(classifier.initialize().await.unwrap());

        let result = classifier
            .recognize(&ImageData::jpeg(vec![1, 2, 3]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.label, "teapot");
        assert_eq!(classifier.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_api_client_replays_script_in_order() {
        let client = MockApiClient::new()
            .then_err(CoreError::Timeout("slow".into()))
            .then_ok("jade pendant", 0.7);
        let image = ImageData::jpeg(vec![0]);
        let provider = ProviderConfig::new("p1", 10, 100);

        assert!(client.call(&image, &provider).await.is_err());
        let ok = client.call(&image, &provider).await.unwrap();
        assert_eq!(ok.name, "jade pendant");
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_catalog_lookup() {
        let catalog =
            MockCatalog::empty().with_entry("teapot", ObjectDetails::placeholder("teapot"));

        assert!(catalog.details_for("teapot").await.unwrap().is_some());
        assert!(catalog.details_for("spaceship").await.unwrap().is_none());
    }

    #[test]
    fn test_user_ai_result_description_is_optional() {
        let result: UserAiResult = serde_json::from_str(r#"{"name": "bronze coin"}"#).unwrap();
        assert_eq!(result.name, "bronze coin");
        assert!(result.description.is_none());

        let mock = MockUserAiClient::with_result("coin", "An old coin.");
        assert_eq!(
            mock.result.as_ref().unwrap().description.as_deref(),
            Some("An old coin.")
        );
    }

    #[test]
    fn test_api_result_deserializes_with_missing_fields() {
        let json = r#"{"name": "bronze coin"}"#;
        let result: ApiRecognitionResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.name, "bronze coin");
        assert!(result.confidence.is_none());
        assert!(result.attributes.is_empty());
    }
}
