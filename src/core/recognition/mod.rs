//! Tiered Object Recognition
//!
//! The recognition pipeline tries the local classifier, then the free-API
//! provider pool, then the user's own AI backend, in configurable priority
//! order. [`RecognitionEngine`] orchestrates the tiers; [`PriorityManager`]
//! owns the ordering, [`QuotaTracker`] the per-provider budgets, and
//! [`ResultFormatter`] folds every tier's output into one canonical shape.

pub mod clients;
pub mod engine;
pub mod normalizer;
pub mod priority;
pub mod provider;
pub mod quota;
pub mod selector;

pub use clients::{HttpRecognitionClient, OpenAiCompatUserClient};
pub use engine::RecognitionEngine;
pub use normalizer::ResultFormatter;
pub use priority::{PriorityConfig, PriorityEntry, PriorityManager};
pub use provider::{
    ApiRecognitionResult, ClassifierResult, LocalClassifier, ObjectCatalog,
    RecognitionApiClient, UserAiClient, UserAiResult,
};
pub use quota::{ProviderConfig, QuotaState, QuotaStatus, QuotaTracker};
pub use selector::{ApiManager, ApiOutcome};
