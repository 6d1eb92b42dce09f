//! Provider Quota Tracking
//!
//! Persistent per-provider usage counters with calendar-day and
//! calendar-month reset windows. The tracker owns the ledger exclusively;
//! every eligibility decision runs a refresh pass first so stale usage never
//! blocks a provider whose window has rolled over.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::settings::SettingsManager;
use crate::core::{CoreError, CoreResult};

// =============================================================================
// Provider Configuration
// =============================================================================

/// Configuration for one external recognition provider.
///
/// Connection parameters are opaque to the core; they are passed through to
/// the `RecognitionApiClient` that owns the wire format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Unique provider key
    pub name: String,
    /// Calls allowed per calendar day
    pub daily_limit: u32,
    /// Calls allowed per calendar month
    pub monthly_limit: u32,
    /// Endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,
    /// API key / token
    #[serde(default)]
    pub api_key: Option<String>,
    /// Per-call timeout override, in seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Additional provider-specific parameters
    #[serde(default)]
    pub extra: serde_json::Value,
}

impl ProviderConfig {
    pub fn new(name: &str, daily_limit: u32, monthly_limit: u32) -> Self {
        Self {
            name: name.to_string(),
            daily_limit,
            monthly_limit,
            endpoint: None,
            api_key: None,
            timeout_secs: None,
            extra: serde_json::Value::Null,
        }
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = Some(endpoint.to_string());
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }
}

// =============================================================================
// Quota State
// =============================================================================

/// Persisted usage counters for one provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaState {
    pub daily_used: u32,
    pub daily_limit: u32,
    pub monthly_used: u32,
    pub monthly_limit: u32,
    pub last_daily_reset: DateTime<Utc>,
    pub last_monthly_reset: DateTime<Utc>,
}

impl QuotaState {
    /// Fresh state for a newly configured provider.
    pub fn new_for(provider: &ProviderConfig, now: DateTime<Utc>) -> Self {
        Self {
            daily_used: 0,
            daily_limit: provider.daily_limit,
            monthly_used: 0,
            monthly_limit: provider.monthly_limit,
            last_daily_reset: now,
            last_monthly_reset: now,
        }
    }

    /// Whether another call fits in both windows.
    pub fn has_available(&self) -> bool {
        self.daily_used < self.daily_limit && self.monthly_used < self.monthly_limit
    }

    /// Zeroes the used counters for any window whose calendar boundary has
    /// been crossed since its last reset, and advances the reset timestamp.
    /// The two windows reset independently.
    pub fn apply_resets(&mut self, now: DateTime<Utc>) -> bool {
        let mut changed = false;

        if crossed_day(self.last_daily_reset, now) {
            self.daily_used = 0;
            self.last_daily_reset = now;
            changed = true;
        }

        if crossed_month(self.last_monthly_reset, now) {
            self.monthly_used = 0;
            self.last_monthly_reset = now;
            changed = true;
        }

        changed
    }

    /// Re-applies limits from config, clamping used counters so the
    /// ledger invariant holds even after a limit was lowered.
    fn sync_limits(&mut self, provider: &ProviderConfig) {
        self.daily_limit = provider.daily_limit;
        self.monthly_limit = provider.monthly_limit;
        self.daily_used = self.daily_used.min(self.daily_limit);
        self.monthly_used = self.monthly_used.min(self.monthly_limit);
    }
}

fn crossed_day(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now.date_naive() > last.date_naive()
}

fn crossed_month(last: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    (now.year(), now.month()) > (last.year(), last.month())
}

/// Read-only quota snapshot for display.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaStatus {
    pub name: String,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub monthly_used: u32,
    pub monthly_limit: u32,
    pub has_available: bool,
}

// =============================================================================
// Quota Tracker
// =============================================================================

struct QuotaInner {
    /// Providers in selection priority order
    providers: Vec<ProviderConfig>,
    ledger: HashMap<String, QuotaState>,
}

/// Decides provider eligibility and owns the persisted quota ledger.
///
/// All ledger access is serialized through one mutex, so a scan-and-pick is
/// atomic with respect to concurrent decrements: two callers can never both
/// claim a provider's last remaining unit inside the same critical section.
pub struct QuotaTracker {
    store: Arc<SettingsManager>,
    inner: Mutex<QuotaInner>,
}

impl QuotaTracker {
    /// Restores the ledger from the settings store and reconciles it with the
    /// configured provider pool.
    pub fn new(store: Arc<SettingsManager>) -> Self {
        let settings = store.load();
        let providers = settings.recognition.providers.clone();
        let mut ledger = settings.quota_ledger;
        reconcile(&mut ledger, &providers);

        Self {
            store,
            inner: Mutex::new(QuotaInner { providers, ledger }),
        }
    }

    /// Replaces the configured provider pool, pruning ledger entries for
    /// removed providers, and persists the result.
    pub fn set_providers(&self, providers: Vec<ProviderConfig>) -> CoreResult<()> {
        let mut inner = self.lock();
        let mut ledger = std::mem::take(&mut inner.ledger);
        reconcile(&mut ledger, &providers);
        inner.ledger = ledger;
        inner.providers = providers;
        self.persist(&inner)?;
        info!("Provider pool updated: {} providers", inner.providers.len());
        Ok(())
    }

    /// Runs the reset pass over every tracked provider.
    ///
    /// Called transitively before any eligibility decision; reset counters
    /// are persisted lazily with the next decrement, which is safe because
    /// the reset is recomputed from the stored timestamps on restart.
    pub fn check_and_reset_quotas(&self) {
        let mut inner = self.lock();
        Self::reset_pass(&mut inner);
    }

    /// True iff the provider has room in both windows after a refresh pass.
    pub fn has_available_quota(&self, name: &str) -> bool {
        let mut inner = self.lock();
        Self::reset_pass(&mut inner);
        inner
            .ledger
            .get(name)
            .map(QuotaState::has_available)
            .unwrap_or(false)
    }

    /// Scans providers in configured priority order, returning the first with
    /// available quota. The refresh, scan, and pick happen in one critical
    /// section.
    pub fn next_available_api(&self) -> Option<ProviderConfig> {
        self.next_available_api_excluding(&HashSet::new())
    }

    /// Same as [`next_available_api`](Self::next_available_api), skipping the
    /// named providers. Used for per-call failure memory.
    pub fn next_available_api_excluding(
        &self,
        exclude: &HashSet<String>,
    ) -> Option<ProviderConfig> {
        let mut inner = self.lock();
        Self::reset_pass(&mut inner);

        for provider in &inner.providers {
            if exclude.contains(&provider.name) {
                continue;
            }
            if inner
                .ledger
                .get(&provider.name)
                .map(QuotaState::has_available)
                .unwrap_or(false)
            {
                debug!(provider = %provider.name, "Selected provider with available quota");
                return Some(provider.clone());
            }
        }
        None
    }

    /// Atomically spends one unit of daily and monthly quota.
    ///
    /// Only called after a confirmed successful recognition call. The
    /// increment and its persistence form one unit under the ledger lock;
    /// persistence failures propagate.
    pub fn decrement_quota(&self, name: &str) -> CoreResult<()> {
        let mut inner = self.lock();

        let entry = inner.ledger.get_mut(name).ok_or_else(|| {
            CoreError::ValidationError(format!("Unknown provider: {}", name))
        })?;
        entry.daily_used += 1;
        entry.monthly_used += 1;
        debug!(
            provider = %name,
            daily = entry.daily_used,
            monthly = entry.monthly_used,
            "Quota spent"
        );

        self.persist(&inner)
    }

    /// Read-only snapshot for every tracked provider, in priority order.
    pub fn all_quota_status(&self) -> Vec<QuotaStatus> {
        let mut inner = self.lock();
        Self::reset_pass(&mut inner);

        inner
            .providers
            .iter()
            .filter_map(|p| inner.ledger.get(&p.name).map(|s| snapshot(&p.name, s)))
            .collect()
    }

    /// Read-only snapshot for one provider.
    pub fn quota_status(&self, name: &str) -> Option<QuotaStatus> {
        let mut inner = self.lock();
        Self::reset_pass(&mut inner);
        inner.ledger.get(name).map(|s| snapshot(name, s))
    }

    fn reset_pass(inner: &mut QuotaInner) {
        let now = Utc::now();
        for (name, state) in inner.ledger.iter_mut() {
            if state.apply_resets(now) {
                info!(provider = %name, "Quota window rolled over, counters reset");
            }
        }
    }

    fn persist(&self, inner: &QuotaInner) -> CoreResult<()> {
        let mut settings = self.store.load();
        settings.quota_ledger = inner.ledger.clone();
        settings.recognition.providers = inner.providers.clone();
        self.store.save(&settings).map(|_| ()).map_err(|e| {
            warn!("Failed to persist quota ledger: {}", e);
            e
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QuotaInner> {
        self.inner.lock().expect("quota ledger lock poisoned")
    }
}

fn reconcile(ledger: &mut HashMap<String, QuotaState>, providers: &[ProviderConfig]) {
    let now = Utc::now();
    let known: HashSet<&str> = providers.iter().map(|p| p.name.as_str()).collect();
    ledger.retain(|name, _| known.contains(name.as_str()));

    for provider in providers {
        ledger
            .entry(provider.name.clone())
            .and_modify(|state| state.sync_limits(provider))
            .or_insert_with(|| QuotaState::new_for(provider, now));
    }
}

fn snapshot(name: &str, state: &QuotaState) -> QuotaStatus {
    QuotaStatus {
        name: name.to_string(),
        daily_used: state.daily_used,
        daily_limit: state.daily_limit,
        monthly_used: state.monthly_used,
        monthly_limit: state.monthly_limit,
        has_available: state.has_available(),
    }
}

// =============================================================================
// Tests
// =============================================================================
