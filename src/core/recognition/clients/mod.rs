//! Wire clients for the external recognition tiers.

pub mod http;
pub mod user_ai;

pub use http::HttpRecognitionClient;
pub use user_ai::OpenAiCompatUserClient;
