//! Curioscan Error Definitions
//!
//! Defines error types used throughout the recognition core.

use thiserror::Error;

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to save settings: {0}")]
    SettingsSaveFailed(String),

    #[error("Corrupt persisted state: {0}")]
    CorruptState(String),

    // =========================================================================
    // Recognition Errors
    // =========================================================================
    #[error("Recognition already in progress")]
    Busy,

    #[error("No recognition provider has available quota")]
    ProviderUnavailable,

    #[error("All enabled recognition tiers declined: {0}")]
    Exhausted(String),

    #[error("Recognition cancelled")]
    Cancelled,

    // =========================================================================
    // Provider Call Errors
    // =========================================================================
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Whether this error only disqualifies a single tier rather than the
    /// whole recognition attempt.
    pub fn is_tier_skip(&self) -> bool {
        matches!(
            self,
            CoreError::Transport(_) | CoreError::Timeout(_) | CoreError::ProviderUnavailable
        )
    }
}
