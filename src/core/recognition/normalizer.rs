//! Result Normalization
//!
//! Each tier reports recognition in its own shape. The formatter folds all
//! three into one canonical [`ObjectInfo`], enriching sparse results from the
//! object catalog and guaranteeing that every display field comes back
//! non-blank.

use std::sync::Arc;

use tracing::warn;

use crate::core::recognition::provider::{
    ApiRecognitionResult, ClassifierResult, ObjectCatalog, UserAiResult,
};
use crate::core::types::{
    clamp_confidence, ObjectDetails, ObjectInfo, RecognitionSource,
};

/// Confidence assigned when a tier reports none. Tiers that accept
/// unconditionally are treated as fully confident.
const ASSUMED_CONFIDENCE: f32 = 1.0;

/// Builds canonical [`ObjectInfo`] values from raw tier results.
pub struct ResultFormatter {
    catalog: Arc<dyn ObjectCatalog>,
}

impl ResultFormatter {
    pub fn new(catalog: Arc<dyn ObjectCatalog>) -> Self {
        Self { catalog }
    }

    /// Canonicalizes a local classifier hit.
    ///
    /// Classifier labels are terse, so the catalog supplies origin, usage and
    /// category when it knows the label. Fields the catalog cannot fill fall
    /// back to placeholders.
    pub async fn from_classifier(&self, raw: &ClassifierResult) -> ObjectInfo {
        let supplied = raw.details.clone();
        let details = self.enrich(&raw.label, supplied).await;
        ObjectInfo::new(
            details,
            clamp_confidence(raw.confidence),
            RecognitionSource::LocalClassifier,
        )
    }

    /// Canonicalizes a free-API result.
    ///
    /// Well-known attribute keys are lifted into their dedicated fields; the
    /// remainder is preserved verbatim so nothing a provider reported is
    /// lost.
    pub async fn from_api(&self, raw: &ApiRecognitionResult) -> ObjectInfo {
        let details = self.enrich(&raw.name, None).await;
        let confidence = clamp_confidence(raw.confidence.unwrap_or(ASSUMED_CONFIDENCE));
        let mut info = ObjectInfo::new(details, confidence, RecognitionSource::FreeApi);

        for (key, value) in &raw.attributes {
            if value.trim().is_empty() {
                continue;
            }
            match key.as_str() {
                "brand" => info.brand = Some(value.clone()),
                "priceRange" | "price_range" => info.price_range = Some(value.clone()),
                "category" => info.category = value.clone(),
                "origin" => info.origin = value.clone(),
                "usage" => info.usage = value.clone(),
                _ => {
                    info.extra.insert(key.clone(), value.clone());
                }
            }
        }
        info
    }

    /// Canonicalizes a user-AI answer.
    ///
    /// The model's free-text description doubles as the summary when no
    /// explicit summary came back.
    pub async fn from_user_ai(&self, raw: &UserAiResult) -> ObjectInfo {
        let details = self.enrich(&raw.name, None).await;
        let confidence = clamp_confidence(raw.confidence.unwrap_or(ASSUMED_CONFIDENCE));
        let mut info = ObjectInfo::new(details, confidence, RecognitionSource::UserAi);

        info.summary = raw
            .summary
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| raw.description.clone().filter(|s| !s.trim().is_empty()));
        info.fun_facts = raw.fun_facts.clone();
        info.tips = raw.tips.clone();
        info
    }

    /// Merges supplied details with catalog knowledge, field by field.
    /// Preference order: supplied value, catalog value, placeholder.
    async fn enrich(&self, label: &str, supplied: Option<ObjectDetails>) -> ObjectDetails {
        let from_catalog = match self.catalog.details_for(label).await {
            Ok(found) => found,
            Err(e) => {
                warn!(label = %label, "Catalog lookup failed: {}", e);
                None
            }
        };

        let fallback = ObjectDetails::placeholder(label);
        // Absent supplied details must stay blank here; placeholders are
        // non-blank and would shadow the catalog in the merge below.
        let supplied = supplied.unwrap_or_else(|| ObjectDetails {
            name: String::new(),
            name_en: String::new(),
            aliases: Vec::new(),
            origin: String::new(),
            usage: String::new(),
            category: String::new(),
        });
        let catalog = from_catalog.unwrap_or_else(|| fallback.clone());

        ObjectDetails {
            name: pick(&supplied.name, &catalog.name, &fallback.name),
            name_en: pick(&supplied.name_en, &catalog.name_en, &fallback.name_en),
            aliases: if !supplied.aliases.is_empty() {
                supplied.aliases
            } else {
                catalog.aliases
            },
            origin: pick(&supplied.origin, &catalog.origin, &fallback.origin),
            usage: pick(&supplied.usage, &catalog.usage, &fallback.usage),
            category: pick(&supplied.category, &catalog.category, &fallback.category),
        }
    }
}

fn pick(supplied: &str, catalog: &str, fallback: &str) -> String {
    if !supplied.trim().is_empty() {
        supplied.to_string()
    } else if !catalog.trim().is_empty() {
        catalog.to_string()
    } else {
        fallback.to_string()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::recognition::provider::MockCatalog;
    use crate::core::types::{PLACEHOLDER_ORIGIN, PLACEHOLDER_USAGE};
    use std::collections::HashMap;

    fn formatter_with_catalog(catalog: MockCatalog) -> ResultFormatter {
        ResultFormatter::new(Arc::new(catalog))
    }

    #[tokio::test]
    async fn test_classifier_result_enriched_from_catalog() {
        let details = ObjectDetails {
            name: "Teacup".to_string(),
            name_en: "Teacup".to_string(),
            aliases: vec!["cup".to_string()],
            origin: "China, Han dynasty".to_string(),
            usage: "Drinking tea".to_string(),
            category: "Tableware".to_string(),
        };
        let formatter = formatter_with_catalog(MockCatalog::empty().with_entry("teacup", details));

        let raw = ClassifierResult {
            label: "teacup".to_string(),
            confidence: 0.92,
            details: None,
        };
        let info = formatter.from_classifier(&raw).await;

        assert_eq!(info.name, "Teacup");
        assert_eq!(info.origin, "China, Han dynasty");
        assert_eq!(info.category, "Tableware");
        assert_eq!(info.source, RecognitionSource::LocalClassifier);
        assert!((info.confidence - 0.92).abs() < f32::EPSILON);
        assert!(!info.id.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_label_gets_placeholders() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let raw = ClassifierResult {
            label: "widget".to_string(),
            confidence: 0.6,
            details: None,
        };
        let info = formatter.from_classifier(&raw).await;

        assert_eq!(info.name, "widget");
        assert_eq!(info.origin, PLACEHOLDER_ORIGIN);
        assert_eq!(info.usage, PLACEHOLDER_USAGE);
        assert!(!info.name.trim().is_empty());
        assert!(!info.category.trim().is_empty());
    }

    #[tokio::test]
    async fn test_supplied_details_win_over_catalog() {
        let catalog_entry = ObjectDetails {
            origin: "Catalog origin".to_string(),
            ..ObjectDetails::placeholder("bowl")
        };
        let formatter =
            formatter_with_catalog(MockCatalog::empty().with_entry("bowl", catalog_entry));

        let supplied = ObjectDetails {
            origin: "Classifier origin".to_string(),
            ..ObjectDetails::placeholder("bowl")
        };
        let raw = ClassifierResult {
            label: "bowl".to_string(),
            confidence: 0.5,
            details: Some(supplied),
        };
        let info = formatter.from_classifier(&raw).await;
        assert_eq!(info.origin, "Classifier origin");
    }

    #[tokio::test]
    async fn test_api_result_enriched_from_catalog() {
        let entry = ObjectDetails {
            name: "Celadon vase".to_string(),
            name_en: "Celadon vase".to_string(),
            aliases: vec![],
            origin: "Korea, Goryeo dynasty".to_string(),
            usage: "Decorative vessel".to_string(),
            category: "Ceramics".to_string(),
        };
        let formatter = formatter_with_catalog(MockCatalog::empty().with_entry("vase", entry));

        let raw = ApiRecognitionResult {
            name: "vase".to_string(),
            confidence: Some(0.8),
            attributes: HashMap::new(),
        };
        let info = formatter.from_api(&raw).await;

        assert_eq!(info.name, "Celadon vase");
        assert_eq!(info.origin, "Korea, Goryeo dynasty");
        assert_eq!(info.usage, "Decorative vessel");
        assert_eq!(info.category, "Ceramics");
    }

    #[tokio::test]
    async fn test_api_attributes_lifted_and_preserved() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let mut attributes = HashMap::new();
        attributes.insert("brand".to_string(), "Acme".to_string());
        attributes.insert("priceRange".to_string(), "$10-$20".to_string());
        attributes.insert("material".to_string(), "ceramic".to_string());
        attributes.insert("blank".to_string(), "  ".to_string());

        let raw = ApiRecognitionResult {
            name: "mug".to_string(),
            confidence: Some(0.75),
            attributes,
        };
        let info = formatter.from_api(&raw).await;

        assert_eq!(info.brand.as_deref(), Some("Acme"));
        assert_eq!(info.price_range.as_deref(), Some("$10-$20"));
        assert_eq!(info.extra.get("material").map(String::as_str), Some("ceramic"));
        assert!(!info.extra.contains_key("blank"));
        assert_eq!(info.source, RecognitionSource::FreeApi);
    }

    #[tokio::test]
    async fn test_missing_confidence_defaults_to_full() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let raw = ApiRecognitionResult {
            name: "chair".to_string(),
            confidence: None,
            attributes: HashMap::new(),
        };
        let info = formatter.from_api(&raw).await;
        assert!((info.confidence - 1.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_out_of_range_confidence_clamped() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let raw = ApiRecognitionResult {
            name: "chair".to_string(),
            confidence: Some(3.5),
            attributes: HashMap::new(),
        };
        let info = formatter.from_api(&raw).await;
        assert!((info.confidence - 1.0).abs() < f32::EPSILON);

        let raw = ClassifierResult {
            label: "chair".to_string(),
            confidence: -0.2,
            details: None,
        };
        let info = formatter.from_classifier(&raw).await;
        assert_eq!(info.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_user_ai_description_becomes_summary() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let raw = UserAiResult {
            name: "astrolabe".to_string(),
            description: Some("A medieval astronomical instrument.".to_string()),
            confidence: Some(0.88),
            summary: None,
            fun_facts: vec!["Used for navigation.".to_string()],
            tips: vec![],
        };
        let info = formatter.from_user_ai(&raw).await;

        assert_eq!(
            info.summary.as_deref(),
            Some("A medieval astronomical instrument.")
        );
        assert_eq!(info.fun_facts.len(), 1);
        assert_eq!(info.source, RecognitionSource::UserAi);
    }

    #[tokio::test]
    async fn test_explicit_summary_preferred_over_description() {
        let formatter = formatter_with_catalog(MockCatalog::empty());
        let raw = UserAiResult {
            name: "astrolabe".to_string(),
            description: Some("long form".to_string()),
            confidence: None,
            summary: Some("short form".to_string()),
            fun_facts: vec![],
            tips: vec![],
        };
        let info = formatter.from_user_ai(&raw).await;
        assert_eq!(info.summary.as_deref(), Some("short form"));
    }
}
