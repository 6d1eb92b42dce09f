//! Settings Persistence System
//!
//! Provides persistent engine settings with:
//! - Atomic file writes (temp file + rename)
//! - Schema validation with defaults
//! - Migration support for schema changes
//!
//! Storage location: {app_data_dir}/curioscan.json
//!
//! The settings file is the single persisted document for the engine: it holds
//! the recognition tuning knobs, the method priority order, the per-provider
//! quota ledger, and the user-AI backend configuration.

use std::collections::HashMap;
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::recognition::priority::PriorityConfig;
use crate::core::recognition::quota::{ProviderConfig, QuotaState};
use crate::core::{CoreError, CoreResult};

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "curioscan.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const SETTINGS_LOCK_FILE: &str = "curioscan.json.lock";

// =============================================================================
// Settings Schema
// =============================================================================

/// Persisted engine settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Recognition tuning and provider pool
    #[serde(default)]
    pub recognition: RecognitionSettings,

    /// Persisted method priority order; `None` means "use the default order"
    #[serde(default)]
    pub priority: Option<PriorityConfig>,

    /// Per-provider usage counters and reset timestamps
    #[serde(default)]
    pub quota_ledger: HashMap<String, QuotaState>,

    /// User-supplied AI backend configuration
    #[serde(default)]
    pub user_ai: UserAiSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl AppSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// This is intentionally tolerant: it corrects bad values instead of
    /// failing, so corrupted/old configs don't brick the engine.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;
        self.recognition.normalize();

        if let Some(priority) = &self.priority {
            // A malformed persisted order is dropped rather than repaired so
            // the default order takes over.
            if priority.validate().is_err() {
                warn!("Persisted priority config is invalid, falling back to default order");
                self.priority = None;
            }
        }
    }
}

/// Recognition tuning knobs and the external provider pool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionSettings {
    /// Minimum local-classifier confidence accepted without falling through
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Default timeout for external provider calls, in seconds
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,

    /// External providers, in selection priority order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            api_timeout_secs: default_api_timeout(),
            providers: Vec::new(),
        }
    }
}

fn default_confidence_threshold() -> f32 {
    0.5
}

fn default_api_timeout() -> u64 {
    30
}

impl RecognitionSettings {
    /// Normalize and clamp values to valid ranges.
    pub fn normalize(&mut self) {
        if !self.confidence_threshold.is_finite() {
            self.confidence_threshold = default_confidence_threshold();
        }
        self.confidence_threshold = self.confidence_threshold.clamp(0.0, 1.0);

        self.api_timeout_secs = self.api_timeout_secs.clamp(1, 300);

        // Provider names are unique keys; keep the first occurrence.
        let mut seen = std::collections::HashSet::new();
        self.providers
            .retain(|p| !p.name.trim().is_empty() && seen.insert(p.name.clone()));
    }
}

/// User-AI backend configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserAiSettings {
    /// Chat-completions compatible endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// API key for the endpoint
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name sent with each request
    #[serde(default = "default_user_ai_model")]
    pub model: String,
}

impl Default for UserAiSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            model: default_user_ai_model(),
        }
    }
}

fn default_user_ai_model() -> String {
    "gpt-4o-mini".to_string()
}

impl UserAiSettings {
    /// Whether the user has supplied enough to reach their backend.
    pub fn is_configured(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
            && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

// =============================================================================
// Settings Manager
// =============================================================================

/// Settings manager for loading, saving, and resetting settings
pub struct SettingsManager {
    settings_path: PathBuf,
}

impl SettingsManager {
    /// Create a new settings manager with the given app data directory
    pub fn new(app_data_dir: PathBuf) -> Self {
        Self {
            settings_path: app_data_dir.join(SETTINGS_FILE),
        }
    }

    /// Create a manager rooted at the platform data directory.
    pub fn with_default_location() -> Self {
        let dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("curioscan");
        Self::new(dir)
    }

    fn lock_path(&self) -> PathBuf {
        self.settings_path
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join(SETTINGS_LOCK_FILE)
    }

    fn with_lock<T>(
        &self,
        exclusive: bool,
        op: impl FnOnce() -> CoreResult<T>,
    ) -> CoreResult<T> {
        // Ensure parent directory exists so the lock file can be created.
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to create settings directory: {}", e))
            })?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())
            .map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to open settings lock file: {}", e))
            })?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file).map_err(|e| {
                CoreError::SettingsSaveFailed(format!(
                    "Failed to lock settings file (exclusive): {}",
                    e
                ))
            })?;
        } else {
            fs2::FileExt::lock_shared(&lock_file).map_err(|e| {
                CoreError::SettingsSaveFailed(format!(
                    "Failed to lock settings file (shared): {}",
                    e
                ))
            })?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock settings lock file: {}", e);
        }

        result
    }

    /// Get the settings file path
    pub fn settings_path(&self) -> &PathBuf {
        &self.settings_path
    }

    /// Load settings from disk, returning defaults if file doesn't exist.
    ///
    /// Read failures fall back to defaults with a warning; a missing or
    /// unreadable settings file must never take the engine down.
    pub fn load(&self) -> AppSettings {
        let result = self.with_lock(false, || {
            if !self.settings_path.exists() {
                info!("Settings file not found, using defaults");
                return Ok(AppSettings::default_normalized());
            }

            let content = fs::read_to_string(&self.settings_path)?;
            let mut settings = serde_json::from_str::<AppSettings>(&content)?;

            // Run migrations if needed
            if settings.version < SETTINGS_VERSION {
                info!(
                    "Migrating settings from version {} to {}",
                    settings.version, SETTINGS_VERSION
                );
                settings = self.migrate(settings);
            }

            settings.normalize();
            Ok(settings)
        });

        match result {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Failed to load settings, using defaults: {}", e);
                AppSettings::default_normalized()
            }
        }
    }

    /// Save settings to disk using atomic write (temp file + rename).
    ///
    /// Save failures propagate to the caller.
    pub fn save(&self, settings: &AppSettings) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            // Normalize before persisting.
            let mut normalized = settings.clone();
            normalized.normalize();

            let content = serde_json::to_string_pretty(&normalized).map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to serialize settings: {}", e))
            })?;

            // Atomic write: write to temp file, then rename.
            // Note: std::fs::rename does not overwrite on Windows.
            let temp_path = self.settings_path.with_extension("json.tmp");
            if temp_path.exists() {
                let _ = fs::remove_file(&temp_path);
            }

            let mut file = fs::File::create(&temp_path).map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to create temp settings file: {}", e))
            })?;
            file.write_all(content.as_bytes()).map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to write settings: {}", e))
            })?;
            file.sync_all().map_err(|e| {
                CoreError::SettingsSaveFailed(format!("Failed to sync settings file: {}", e))
            })?;

            if cfg!(windows) {
                // Windows: rename does not overwrite, so we use a backup-then-swap.
                let backup_path = self.settings_path.with_extension("json.bak");
                if backup_path.exists() {
                    let _ = fs::remove_file(&backup_path);
                }

                if self.settings_path.exists() {
                    fs::rename(&self.settings_path, &backup_path).map_err(|e| {
                        CoreError::SettingsSaveFailed(format!(
                            "Failed to backup existing settings file: {}",
                            e
                        ))
                    })?;
                }

                match fs::rename(&temp_path, &self.settings_path) {
                    Ok(()) => {
                        if backup_path.exists() {
                            let _ = fs::remove_file(&backup_path);
                        }
                    }
                    Err(e) => {
                        // Best-effort restore.
                        if backup_path.exists() {
                            let _ = fs::rename(&backup_path, &self.settings_path);
                        }
                        return Err(CoreError::SettingsSaveFailed(format!(
                            "Failed to finalize settings file: {}",
                            e
                        )));
                    }
                }
            } else {
                fs::rename(&temp_path, &self.settings_path).map_err(|e| {
                    CoreError::SettingsSaveFailed(format!("Failed to finalize settings file: {}", e))
                })?;
            }

            info!("Settings saved to {:?}", self.settings_path);
            Ok(normalized)
        })
    }

    /// Reset settings to defaults and delete the settings file
    pub fn reset(&self) -> CoreResult<AppSettings> {
        self.with_lock(true, || {
            if self.settings_path.exists() {
                fs::remove_file(&self.settings_path).map_err(|e| {
                    CoreError::SettingsSaveFailed(format!("Failed to delete settings file: {}", e))
                })?;
                info!("Settings file deleted");
            }
            Ok(AppSettings::default_normalized())
        })
    }

    /// Migrate settings from older version
    fn migrate(&self, mut settings: AppSettings) -> AppSettings {
        // Future migrations would go here.
        settings.version = SETTINGS_VERSION;
        settings
    }
}

impl AppSettings {
    fn default_normalized() -> Self {
        let mut settings = AppSettings::default();
        settings.normalize();
        settings
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager() -> (TempDir, SettingsManager) {
        let dir = TempDir::new().unwrap();
        let manager = SettingsManager::new(dir.path().to_path_buf());
        (dir, manager)
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let (_dir, manager) = manager();
        let settings = manager.load();

        assert_eq!(settings.version, SETTINGS_VERSION);
        assert!((settings.recognition.confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert!(settings.priority.is_none());
        assert!(settings.quota_ledger.is_empty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let (_dir, manager) = manager();

        let mut settings = AppSettings::default();
        settings.recognition.confidence_threshold = 0.8;
        settings.user_ai.endpoint = Some("https://ai.example.com/v1".to_string());
        settings.user_ai.api_key = Some("sk-test".to_string());

        let saved = manager.save(&settings).unwrap();
        let loaded = manager.load();

        assert_eq!(saved, loaded);
        assert!((loaded.recognition.confidence_threshold - 0.8).abs() < f32::EPSILON);
        assert!(loaded.user_ai.is_configured());
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let (_dir, manager) = manager();
        fs::create_dir_all(manager.settings_path().parent().unwrap()).unwrap();
        fs::write(manager.settings_path(), "not json {{{{").unwrap();

        let settings = manager.load();
        assert_eq!(settings.version, SETTINGS_VERSION);
    }

    #[test]
    fn test_normalize_clamps_values() {
        let mut settings = AppSettings::default();
        settings.recognition.confidence_threshold = 3.0;
        settings.recognition.api_timeout_secs = 0;
        settings.normalize();

        assert!((settings.recognition.confidence_threshold - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.recognition.api_timeout_secs, 1);
    }

    #[test]
    fn test_normalize_handles_nan_threshold() {
        let mut settings = AppSettings::default();
        settings.recognition.confidence_threshold = f32::NAN;
        settings.normalize();

        assert!((settings.recognition.confidence_threshold - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_normalize_deduplicates_providers() {
        let mut settings = AppSettings::default();
        settings.recognition.providers = vec![
            ProviderConfig::new("alpha", 100, 3000),
            ProviderConfig::new("alpha", 5, 10),
            ProviderConfig::new("", 1, 1),
            ProviderConfig::new("beta", 50, 1500),
        ];
        settings.normalize();

        let names: Vec<_> = settings
            .recognition
            .providers
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        assert_eq!(settings.recognition.providers[0].daily_limit, 100);
    }

    #[test]
    fn test_reset_deletes_file() {
        let (_dir, manager) = manager();
        manager.save(&AppSettings::default()).unwrap();
        assert!(manager.settings_path().exists());

        let settings = manager.reset().unwrap();
        assert!(!manager.settings_path().exists());
        assert_eq!(settings.version, SETTINGS_VERSION);
    }

    #[test]
    fn test_user_ai_configured_requires_both_fields() {
        let mut user_ai = UserAiSettings::default();
        assert!(!user_ai.is_configured());

        user_ai.endpoint = Some("https://ai.example.com".to_string());
        assert!(!user_ai.is_configured());

        user_ai.api_key = Some("key".to_string());
        assert!(user_ai.is_configured());

        user_ai.api_key = Some("   ".to_string());
        assert!(!user_ai.is_configured());
    }
}
