//! Shared types for the recognition core.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// Recognition Method
// =============================================================================

/// A recognition strategy tried by the engine, in user-configured order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionMethod {
    /// On-device classifier
    LocalClassifier,
    /// Pool of quota-limited third-party recognition APIs
    FreeApi,
    /// User-supplied AI backend
    UserAi,
}

impl RecognitionMethod {
    /// All methods, in the default priority order.
    pub const ALL: [RecognitionMethod; 3] = [
        RecognitionMethod::LocalClassifier,
        RecognitionMethod::FreeApi,
        RecognitionMethod::UserAi,
    ];
}

impl std::fmt::Display for RecognitionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionMethod::LocalClassifier => write!(f, "local_classifier"),
            RecognitionMethod::FreeApi => write!(f, "free_api"),
            RecognitionMethod::UserAi => write!(f, "user_ai"),
        }
    }
}

impl std::str::FromStr for RecognitionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local_classifier" | "local" => Ok(RecognitionMethod::LocalClassifier),
            "free_api" | "api" => Ok(RecognitionMethod::FreeApi),
            "user_ai" => Ok(RecognitionMethod::UserAi),
            _ => Err(format!("Unknown recognition method: {}", s)),
        }
    }
}

// =============================================================================
// Recognition Source
// =============================================================================

/// Which tier produced a canonical result.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognitionSource {
    LocalClassifier,
    FreeApi,
    UserAi,
    /// Fallback tag for results whose textual source is not recognized.
    #[default]
    Unknown,
}

impl RecognitionSource {
    /// Maps a textual source tag, falling back to `Unknown` for anything
    /// outside the known set.
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_lowercase().as_str() {
            "local_classifier" | "local" => RecognitionSource::LocalClassifier,
            "free_api" | "api" => RecognitionSource::FreeApi,
            "user_ai" => RecognitionSource::UserAi,
            _ => RecognitionSource::Unknown,
        }
    }
}

impl From<RecognitionMethod> for RecognitionSource {
    fn from(method: RecognitionMethod) -> Self {
        match method {
            RecognitionMethod::LocalClassifier => RecognitionSource::LocalClassifier,
            RecognitionMethod::FreeApi => RecognitionSource::FreeApi,
            RecognitionMethod::UserAi => RecognitionSource::UserAi,
        }
    }
}

impl std::fmt::Display for RecognitionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecognitionSource::LocalClassifier => write!(f, "local_classifier"),
            RecognitionSource::FreeApi => write!(f, "free_api"),
            RecognitionSource::UserAi => write!(f, "user_ai"),
            RecognitionSource::Unknown => write!(f, "unknown"),
        }
    }
}

// =============================================================================
// Image Data
// =============================================================================

/// An image handed to the recognition pipeline.
///
/// The core never decodes pixels; the buffer is passed through to whichever
/// tier ends up handling the request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageData {
    /// Encoded image bytes (JPEG, PNG, ...)
    pub bytes: Vec<u8>,
    /// MIME type hint, e.g. "image/jpeg"
    pub mime: String,
}

impl ImageData {
    pub fn new(bytes: Vec<u8>, mime: &str) -> Self {
        Self {
            bytes,
            mime: mime.to_string(),
        }
    }

    /// Convenience constructor for JPEG payloads.
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self::new(bytes, "image/jpeg")
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// =============================================================================
// Object Details
// =============================================================================

/// Placeholder text for missing descriptive fields. Downstream consumers must
/// never observe a blank required field, so every fallback is non-blank.
pub const PLACEHOLDER_NAME: &str = "Unknown object";
pub const PLACEHOLDER_ORIGIN: &str = "No origin information available";
pub const PLACEHOLDER_USAGE: &str = "No usage information available";
pub const PLACEHOLDER_CATEGORY: &str = "Uncategorized";

/// Descriptive payload for a recognized object.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectDetails {
    /// Display name
    pub name: String,
    /// English name
    pub name_en: String,
    /// Alternative names, ordered by preference
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Origin / provenance text
    pub origin: String,
    /// Typical usage text
    pub usage: String,
    /// Category label
    pub category: String,
}

impl ObjectDetails {
    /// Canonical "empty" details: every required field carries a non-blank
    /// placeholder so consumers never see blank text.
    pub fn placeholder(label: &str) -> Self {
        let name = if label.trim().is_empty() {
            PLACEHOLDER_NAME.to_string()
        } else {
            label.trim().to_string()
        };
        Self {
            name_en: name.clone(),
            name,
            aliases: Vec::new(),
            origin: PLACEHOLDER_ORIGIN.to_string(),
            usage: PLACEHOLDER_USAGE.to_string(),
            category: PLACEHOLDER_CATEGORY.to_string(),
        }
    }

    /// Whether all required text fields are non-blank.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
            && !self.name_en.trim().is_empty()
            && !self.origin.trim().is_empty()
            && !self.usage.trim().is_empty()
            && !self.category.trim().is_empty()
    }
}

// =============================================================================
// Canonical Object Info
// =============================================================================

/// Canonical object-info record all tiers are normalized into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Unique record ID
    pub id: String,
    /// Display name
    pub name: String,
    /// English name
    pub name_en: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub origin: String,
    pub usage: String,
    pub category: String,
    /// Confidence in [0.0, 1.0]
    pub confidence: f32,
    /// Which tier produced this result
    pub source: RecognitionSource,
    // Extended fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<String>,
    // Enrichment fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default)]
    pub fun_facts: Vec<String>,
    #[serde(default)]
    pub tips: Vec<String>,
    /// Free-form extension values a tier supplied but the model doesn't name.
    #[serde(default)]
    pub extra: HashMap<String, String>,
}

impl ObjectInfo {
    /// Creates a record from details, clamping confidence into [0, 1].
    pub fn new(details: ObjectDetails, confidence: f32, source: RecognitionSource) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            name: details.name,
            name_en: details.name_en,
            aliases: details.aliases,
            origin: details.origin,
            usage: details.usage,
            category: details.category,
            confidence: clamp_confidence(confidence),
            source,
            brand: None,
            price_range: None,
            summary: None,
            fun_facts: Vec::new(),
            tips: Vec::new(),
            extra: HashMap::new(),
        }
    }
}

/// Clamps a confidence score to [0, 1]. Non-finite values collapse to 0.
pub fn clamp_confidence(value: f32) -> f32 {
    if !value.is_finite() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

// =============================================================================
// Recognition State
// =============================================================================

/// Observable state of the recognition engine.
///
/// Transitions: Idle -> InProgress -> {Succeeded, Failed} -> Idle (explicit
/// reset only). Published through a single-writer watch channel.
#[derive(Clone, Debug, PartialEq)]
pub enum RecognitionState {
    Idle,
    InProgress,
    Succeeded(ObjectInfo),
    Failed(String),
}

impl RecognitionState {
    pub fn is_in_progress(&self) -> bool {
        matches!(self, RecognitionState::InProgress)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RecognitionState::Succeeded(_) | RecognitionState::Failed(_)
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_display_and_parse() {
        for method in RecognitionMethod::ALL {
            let round_trip: RecognitionMethod = method.to_string().parse().unwrap();
            assert_eq!(round_trip, method);
        }
        assert!("telepathy".parse::<RecognitionMethod>().is_err());
    }

    #[test]
    fn test_source_from_unknown_tag_falls_back() {
        assert_eq!(
            RecognitionSource::from_tag("local_classifier"),
            RecognitionSource::LocalClassifier
        );
        assert_eq!(
            RecognitionSource::from_tag("something-new"),
            RecognitionSource::Unknown
        );
    }

    #[test]
    fn test_source_from_method() {
        assert_eq!(
            RecognitionSource::from(RecognitionMethod::FreeApi),
            RecognitionSource::FreeApi
        );
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(0.5), 0.5);
        assert_eq!(clamp_confidence(-1.0), 0.0);
        assert_eq!(clamp_confidence(3.5), 1.0);
        assert_eq!(clamp_confidence(f32::NAN), 0.0);
    }

    #[test]
    fn test_placeholder_details_are_complete() {
        let details = ObjectDetails::placeholder("Bronze mirror");
        assert!(details.is_complete());
        assert_eq!(details.name, "Bronze mirror");

        let blank = ObjectDetails::placeholder("   ");
        assert!(blank.is_complete());
        assert_eq!(blank.name, PLACEHOLDER_NAME);
    }

    #[test]
    fn test_object_info_clamps_confidence() {
        let info = ObjectInfo::new(
            ObjectDetails::placeholder("vase"),
            1.7,
            RecognitionSource::FreeApi,
        );
        assert_eq!(info.confidence, 1.0);
        assert!(!info.id.is_empty());
    }

    #[test]
    fn test_state_predicates() {
        assert!(RecognitionState::InProgress.is_in_progress());
        assert!(!RecognitionState::Idle.is_terminal());
        assert!(RecognitionState::Failed("x".into()).is_terminal());
    }
}
