//! Recognition Engine
//!
//! Orchestrates the tiered recognition pipeline: local classifier first,
//! then the free-API pool, then the user's own AI endpoint, in the order the
//! priority configuration dictates. A single call is in flight at a time;
//! state transitions are published on a watch channel so observers can render
//! progress without polling.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify};
use tracing::{info, warn};

use crate::core::recognition::normalizer::ResultFormatter;
use crate::core::recognition::priority::PriorityManager;
use crate::core::recognition::provider::{LocalClassifier, UserAiClient};
use crate::core::recognition::selector::ApiManager;
use crate::core::settings::SettingsManager;
use crate::core::types::{ImageData, ObjectInfo, RecognitionMethod, RecognitionState};
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Engine
// =============================================================================

pub struct RecognitionEngine {
    store: Arc<SettingsManager>,
    priority: Arc<PriorityManager>,
    classifier: Arc<dyn LocalClassifier>,
    api: ApiManager,
    user_ai: Arc<dyn UserAiClient>,
    formatter: ResultFormatter,

    /// Single-flight latch; a second `recognize` while set fails fast.
    in_flight: AtomicBool,
    cancel_requested: AtomicBool,
    cancel: Notify,
    /// Classifier readiness, resolved once on first use. `Some(false)` means
    /// initialization failed and the local tier declines from then on.
    classifier_ready: Mutex<Option<bool>>,
    state_tx: watch::Sender<RecognitionState>,
}

impl RecognitionEngine {
    pub fn new(
        store: Arc<SettingsManager>,
        priority: Arc<PriorityManager>,
        classifier: Arc<dyn LocalClassifier>,
        api: ApiManager,
        user_ai: Arc<dyn UserAiClient>,
        formatter: ResultFormatter,
    ) -> Self {
        let (state_tx, _) = watch::channel(RecognitionState::Idle);
        Self {
            store,
            priority,
            classifier,
            api,
            user_ai,
            formatter,
            in_flight: AtomicBool::new(false),
            cancel_requested: AtomicBool::new(false),
            cancel: Notify::new(),
            classifier_ready: Mutex::new(None),
            state_tx,
        }
    }

    /// Current state snapshot.
    pub fn state(&self) -> RecognitionState {
        self.state_tx.borrow().clone()
    }

    /// Watch channel carrying every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<RecognitionState> {
        self.state_tx.subscribe()
    }

    /// Minimum local-classifier confidence for unconditional acceptance.
    pub fn confidence_threshold(&self) -> f32 {
        self.store.load().recognition.confidence_threshold
    }

    /// Requests cancellation of the in-flight call, if any. The cancelled
    /// call returns [`CoreError::Cancelled`] and spends no quota.
    pub fn cancel(&self) {
        if self.in_flight.load(Ordering::SeqCst) {
            info!("Cancellation requested");
            self.cancel_requested.store(true, Ordering::SeqCst);
            self.cancel.notify_waiters();
        }
    }

    /// Returns a terminal state to `Idle`. Fails with [`CoreError::Busy`]
    /// while a call is in flight.
    pub fn reset_state(&self) -> CoreResult<()> {
        if self.in_flight.load(Ordering::SeqCst) {
            return Err(CoreError::Busy);
        }
        self.state_tx.send_replace(RecognitionState::Idle);
        Ok(())
    }

    /// Runs the tiered pipeline for one image.
    ///
    /// Tiers are attempted in priority order; each tier either produces the
    /// final result or declines with a reason. When every enabled tier has
    /// declined the call fails with [`CoreError::Exhausted`] carrying the
    /// collected reasons.
    pub async fn recognize(&self, image: &ImageData) -> CoreResult<ObjectInfo> {
        if image.is_empty() {
            return Err(CoreError::ValidationError(
                "Image payload is empty".to_string(),
            ));
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CoreError::Busy);
        }
        let _guard = FlightGuard { flag: &self.in_flight };
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.state_tx.send_replace(RecognitionState::InProgress);

        match self.run_pipeline(image).await {
            Ok(info) => {
                self.state_tx
                    .send_replace(RecognitionState::Succeeded(info.clone()));
                Ok(info)
            }
            Err(CoreError::Cancelled) => {
                info!("Recognition cancelled");
                self.state_tx.send_replace(RecognitionState::Idle);
                Err(CoreError::Cancelled)
            }
            Err(e) => {
                self.state_tx
                    .send_replace(RecognitionState::Failed(e.to_string()));
                Err(e)
            }
        }
    }

    async fn run_pipeline(&self, image: &ImageData) -> CoreResult<ObjectInfo> {
        let methods = self.priority.enabled_methods();
        if methods.is_empty() {
            return Err(CoreError::Exhausted(
                "All recognition methods are disabled".to_string(),
            ));
        }

        let mut reasons: Vec<String> = Vec::new();

        for method in methods {
            let attempt = match method {
                RecognitionMethod::LocalClassifier => self.try_local(image).await,
                RecognitionMethod::FreeApi => self.try_api(image).await,
                RecognitionMethod::UserAi => self.try_user_ai(image).await,
            };

            match attempt {
                Ok(info) => return Ok(info),
                Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
                Err(e) => {
                    reasons.push(format!("{}: {}", method, e));
                }
            }
        }

        let summary = reasons.join("; ");
        warn!("All recognition tiers declined: {}", summary);
        Err(CoreError::Exhausted(summary))
    }

    async fn try_local(&self, image: &ImageData) -> CoreResult<ObjectInfo> {
        if !self.ensure_classifier().await {
            return Err(CoreError::ProviderUnavailable);
        }

        let result = self
            .guarded(self.classifier.recognize(image))
            .await?
            .ok_or(CoreError::ProviderUnavailable)?;

        let threshold = self.confidence_threshold();
        if result.confidence < threshold {
            return Err(CoreError::ValidationError(format!(
                "Confidence {:.2} below threshold {:.2}",
                result.confidence, threshold
            )));
        }

        info!(label = %result.label, confidence = result.confidence, "Local classifier hit");
        Ok(self.formatter.from_classifier(&result).await)
    }

    async fn try_api(&self, image: &ImageData) -> CoreResult<ObjectInfo> {
        let outcome = match self.guarded(self.api.try_recognize(image)).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Err(CoreError::Exhausted("No provider available".to_string())),
            Err(CoreError::Cancelled) => return Err(CoreError::Cancelled),
            // Post-success bookkeeping errors decline the tier rather than
            // aborting the whole call.
            Err(e) => return Err(e),
        };

        Ok(self.formatter.from_api(&outcome.result).await)
    }

    async fn try_user_ai(&self, image: &ImageData) -> CoreResult<ObjectInfo> {
        if !self.user_ai.is_configured() {
            return Err(CoreError::ProviderUnavailable);
        }

        let result = self
            .guarded(self.user_ai.recognize(image))
            .await?
            .ok_or(CoreError::ProviderUnavailable)?;

        info!(name = %result.name, "User AI recognition succeeded");
        Ok(self.formatter.from_user_ai(&result).await)
    }

    /// Initializes the local classifier once. A failed initialization is
    /// remembered and the tier declines for the rest of the process.
    async fn ensure_classifier(&self) -> bool {
        let mut ready = self.classifier_ready.lock().await;
        if let Some(ok) = *ready {
            return ok;
        }
        let ok = match self.classifier.initialize().await {
            Ok(ok) => ok,
            Err(e) => {
                warn!("Local classifier initialization failed: {}", e);
                false
            }
        };
        *ready = Some(ok);
        ok
    }

    /// Races a tier future against cancellation. Dropping the future before
    /// completion is what guarantees a cancelled call never spends quota.
    async fn guarded<T>(
        &self,
        fut: impl std::future::Future<Output = CoreResult<T>>,
    ) -> CoreResult<T> {
        if self.cancel_requested.load(Ordering::SeqCst) {
            return Err(CoreError::Cancelled);
        }
        tokio::select! {
            _ = self.cancel.notified() => Err(CoreError::Cancelled),
            result = fut => result,
        }
    }
}

struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

// =============================================================================
// Tests
// =============================================================================
