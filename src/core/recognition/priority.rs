//! Recognition Method Priority
//!
//! Owns the ordered, enable-flagged list of recognition methods and its
//! persistence. The effective order decides which tier the engine tries
//! first; disabled methods are invisible to the tier loop.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

use crate::core::settings::SettingsManager;
use crate::core::{CoreError, CoreResult, RecognitionMethod};

// =============================================================================
// Priority Config
// =============================================================================

/// One entry in the priority order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityEntry {
    pub method: RecognitionMethod,
    pub enabled: bool,
}

impl PriorityEntry {
    pub fn enabled(method: RecognitionMethod) -> Self {
        Self {
            method,
            enabled: true,
        }
    }

    pub fn disabled(method: RecognitionMethod) -> Self {
        Self {
            method,
            enabled: false,
        }
    }
}

/// Ordered sequence of (method, enabled) pairs.
///
/// A valid config contains exactly one entry per method. The config is always
/// replaced as a whole, never patched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityConfig {
    pub entries: Vec<PriorityEntry>,
}

impl Default for PriorityConfig {
    /// Default order: local classifier, free API, user AI — all enabled.
    fn default() -> Self {
        Self {
            entries: RecognitionMethod::ALL
                .into_iter()
                .map(PriorityEntry::enabled)
                .collect(),
        }
    }
}

impl PriorityConfig {
    /// Validates the invariant: exactly one entry per method, no duplicates.
    pub fn validate(&self) -> CoreResult<()> {
        if self.entries.len() != RecognitionMethod::ALL.len() {
            return Err(CoreError::ValidationError(format!(
                "Priority config must have exactly {} entries, got {}",
                RecognitionMethod::ALL.len(),
                self.entries.len()
            )));
        }

        for method in RecognitionMethod::ALL {
            let count = self.entries.iter().filter(|e| e.method == method).count();
            if count != 1 {
                return Err(CoreError::ValidationError(format!(
                    "Priority config must list {} exactly once, found {} times",
                    method, count
                )));
            }
        }

        Ok(())
    }

    /// Enabled methods, preserving order.
    pub fn enabled_methods(&self) -> Vec<RecognitionMethod> {
        self.entries
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.method)
            .collect()
    }
}

// =============================================================================
// Priority Manager
// =============================================================================

/// Manages the effective ordered list of enabled recognition methods.
///
/// The persisted config (or the fixed default) is cached in memory; every
/// successful save is pushed to subscribers through a watch channel.
pub struct PriorityManager {
    store: Arc<SettingsManager>,
    current: RwLock<PriorityConfig>,
    tx: watch::Sender<PriorityConfig>,
}

impl PriorityManager {
    /// Creates a manager, restoring the persisted order when one exists.
    pub fn new(store: Arc<SettingsManager>) -> Self {
        let config = store.load().priority.unwrap_or_default();
        let (tx, _rx) = watch::channel(config.clone());
        Self {
            store,
            current: RwLock::new(config),
            tx,
        }
    }

    /// Returns the current config (persisted or default).
    pub fn get_config(&self) -> PriorityConfig {
        self.current.read().expect("priority lock poisoned").clone()
    }

    /// Validates and persists a new config, replacing the old one wholesale.
    pub fn save_config(&self, config: PriorityConfig) -> CoreResult<()> {
        config.validate()?;

        let mut settings = self.store.load();
        settings.priority = Some(config.clone());
        self.store.save(&settings)?;

        *self.current.write().expect("priority lock poisoned") = config.clone();
        self.tx.send_replace(config);
        info!("Recognition priority order updated");
        Ok(())
    }

    /// Enabled methods in precedence order; disabled entries are filtered out.
    pub fn enabled_methods(&self) -> Vec<RecognitionMethod> {
        self.get_config().enabled_methods()
    }

    /// Overwrites the persisted order with the default.
    pub fn reset_to_default(&self) -> CoreResult<()> {
        self.save_config(PriorityConfig::default())
    }

    /// Subscribes to config changes; the receiver observes every successful
    /// save, starting from the current value.
    pub fn subscribe(&self) -> watch::Receiver<PriorityConfig> {
        self.tx.subscribe()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Arc<SettingsManager>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(SettingsManager::new(dir.path().to_path_buf()));
        (dir, store)
    }

    #[test]
    fn test_default_order() {
        let config = PriorityConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.enabled_methods(),
            vec![
                RecognitionMethod::LocalClassifier,
                RecognitionMethod::FreeApi,
                RecognitionMethod::UserAi,
            ]
        );
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let config = PriorityConfig {
            entries: vec![
                PriorityEntry::enabled(RecognitionMethod::FreeApi),
                PriorityEntry::enabled(RecognitionMethod::FreeApi),
                PriorityEntry::enabled(RecognitionMethod::UserAi),
            ],
        };
        assert!(matches!(
            config.validate(),
            Err(CoreError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_missing_method() {
        let config = PriorityConfig {
            entries: vec![PriorityEntry::enabled(RecognitionMethod::LocalClassifier)],
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_save_and_restore_round_trip() {
        let (_dir, store) = store();
        let manager = PriorityManager::new(store.clone());

        let config = PriorityConfig {
            entries: vec![
                PriorityEntry::enabled(RecognitionMethod::FreeApi),
                PriorityEntry::disabled(RecognitionMethod::LocalClassifier),
                PriorityEntry::enabled(RecognitionMethod::UserAi),
            ],
        };
        manager.save_config(config.clone()).unwrap();
        assert_eq!(manager.get_config(), config);

        // A fresh manager on the same store restores the persisted order.
        let restored = PriorityManager::new(store);
        assert_eq!(restored.get_config(), config);
        assert_eq!(
            restored.enabled_methods(),
            vec![RecognitionMethod::FreeApi, RecognitionMethod::UserAi]
        );
    }

    #[test]
    fn test_invalid_save_leaves_config_untouched() {
        let (_dir, store) = store();
        let manager = PriorityManager::new(store);

        let bad = PriorityConfig { entries: vec![] };
        assert!(manager.save_config(bad).is_err());
        assert_eq!(manager.get_config(), PriorityConfig::default());
    }

    #[test]
    fn test_reset_to_default() {
        let (_dir, store) = store();
        let manager = PriorityManager::new(store);

        let config = PriorityConfig {
            entries: vec![
                PriorityEntry::disabled(RecognitionMethod::UserAi),
                PriorityEntry::enabled(RecognitionMethod::FreeApi),
                PriorityEntry::enabled(RecognitionMethod::LocalClassifier),
            ],
        };
        manager.save_config(config).unwrap();

        manager.reset_to_default().unwrap();
        assert_eq!(
            manager.enabled_methods(),
            vec![
                RecognitionMethod::LocalClassifier,
                RecognitionMethod::FreeApi,
                RecognitionMethod::UserAi,
            ]
        );
    }

    #[tokio::test]
    async fn test_subscribe_observes_saves() {
        let (_dir, store) = store();
        let manager = PriorityManager::new(store);
        let mut rx = manager.subscribe();

        let config = PriorityConfig {
            entries: vec![
                PriorityEntry::enabled(RecognitionMethod::UserAi),
                PriorityEntry::enabled(RecognitionMethod::FreeApi),
                PriorityEntry::enabled(RecognitionMethod::LocalClassifier),
            ],
        };
        manager.save_config(config.clone()).unwrap();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), config);
    }
}
