//! Provider Selection and Dispatch
//!
//! Bridges quota eligibility and the wire client: picks the highest-priority
//! provider with quota, dispatches the call with a timeout, and retries the
//! next eligible provider on transient failure. Quota is only spent after a
//! confirmed success, and a provider that failed once in a call is not
//! retried within the same call.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::core::recognition::provider::{ApiRecognitionResult, RecognitionApiClient};
use crate::core::recognition::quota::{ProviderConfig, QuotaStatus, QuotaTracker};
use crate::core::types::ImageData;
use crate::core::{CoreError, CoreResult};

/// Fallback per-call timeout when a provider carries no override.
const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;

/// A successful dispatch, tagged with the provider that produced it.
#[derive(Clone, Debug)]
pub struct ApiOutcome {
    pub provider: String,
    pub result: ApiRecognitionResult,
}

/// Coordinates the free-API tier.
pub struct ApiManager {
    quota: Arc<QuotaTracker>,
    client: Arc<dyn RecognitionApiClient>,
    default_timeout_secs: u64,
}

impl ApiManager {
    pub fn new(quota: Arc<QuotaTracker>, client: Arc<dyn RecognitionApiClient>) -> Self {
        Self {
            quota,
            client,
            default_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
        }
    }

    pub fn with_default_timeout_secs(mut self, secs: u64) -> Self {
        self.default_timeout_secs = secs.max(1);
        self
    }

    /// True iff at least one provider currently has quota. Costs no network
    /// traffic.
    pub fn has_available_api(&self) -> bool {
        self.quota.next_available_api().is_some()
    }

    /// Quota snapshots for every configured provider.
    pub fn api_status(&self) -> Vec<QuotaStatus> {
        self.quota.all_quota_status()
    }

    /// Attempts recognition through the provider pool.
    ///
    /// Returns `Ok(None)` when no provider has quota left, before any network
    /// traffic. Tier-level failures (transport, timeout, unavailable) move on
    /// to the next eligible provider; a provider that failed is excluded for
    /// the remainder of this call. Quota is decremented exactly once, after
    /// the winning call returns.
    pub async fn try_recognize(&self, image: &ImageData) -> CoreResult<Option<ApiOutcome>> {
        let mut failed: HashSet<String> = HashSet::new();

        loop {
            let Some(provider) = self.quota.next_available_api_excluding(&failed) else {
                if failed.is_empty() {
                    info!("No provider with available quota, skipping API tier");
                }
                return Ok(None);
            };

            match self.call_provider(&provider, image).await {
                Ok(result) => {
                    self.quota.decrement_quota(&provider.name)?;
                    info!(provider = %provider.name, "API recognition succeeded");
                    return Ok(Some(ApiOutcome {
                        provider: provider.name,
                        result,
                    }));
                }
                Err(e) if e.is_tier_skip() => {
                    warn!(provider = %provider.name, "Provider failed, trying next: {}", e);
                    failed.insert(provider.name);
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_provider(
        &self,
        provider: &ProviderConfig,
        image: &ImageData,
    ) -> CoreResult<ApiRecognitionResult> {
        let timeout = Duration::from_secs(
            provider.timeout_secs.unwrap_or(self.default_timeout_secs),
        );

        match tokio::time::timeout(timeout, self.client.call(image, provider)).await {
            Ok(result) => result,
            Err(_) => Err(CoreError::Timeout(format!(
                "Provider '{}' did not answer within {}s",
                provider.name,
                timeout.as_secs()
            ))),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
