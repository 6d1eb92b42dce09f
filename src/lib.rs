//! CurioScan — tiered object recognition engine.
//!
//! Point the camera at an object, get back a structured description. The
//! pipeline runs up to three recognition tiers in configurable priority
//! order: an on-device classifier, a pool of free-tier recognition APIs with
//! per-provider daily and monthly quotas, and the user's own OpenAI-compatible
//! AI backend. Whatever tier answers first wins, and every answer is
//! normalized into the same [`ObjectInfo`](core::ObjectInfo) shape.

pub mod core;

pub use crate::core::recognition::{
    ApiManager, PriorityConfig, PriorityManager, ProviderConfig, QuotaStatus, QuotaTracker,
    RecognitionEngine, ResultFormatter,
};
pub use crate::core::settings::{AppSettings, SettingsManager};
pub use crate::core::{
    CoreError, CoreResult, ImageData, ObjectInfo, RecognitionMethod, RecognitionSource,
    RecognitionState,
};

/// Initializes the tracing subscriber.
///
/// Filter defaults to `info` for this crate and can be overridden with the
/// standard `RUST_LOG` environment variable. Safe to call more than once;
/// later calls are no-ops.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,curioscan=debug"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false);

    // try_init fails if a subscriber is already installed, which is fine.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
