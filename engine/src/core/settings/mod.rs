//! Configuration Persistence
//!
//! Provides the engine configuration with:
//! - Atomic file writes (temp file + rename)
//! - Serde defaults for every field, so partial files load
//! - Normalisation that clamps bad values instead of failing
//! - Environment overrides for secrets and binary paths
//!
//! Storage location: {data_dir}/config.json

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::ffmpeg::EncodeSettings;
use crate::core::fs::atomic_write_json_pretty;
use crate::core::jobs::{JobTimeouts, WorkerPoolConfig};
use crate::core::translation::{ProviderConfig, ProviderKind, TranslationSettings, MAX_BATCH_SIZE};
use crate::core::{CoreError, CoreResult};

/// Config schema version for migration support
pub const CONFIG_VERSION: u32 = 1;

/// Config file name
pub const CONFIG_FILE: &str = "config.json";

/// Lock file name (advisory lock to prevent concurrent writers)
pub const CONFIG_LOCK_FILE: &str = "config.json.lock";

pub const ENV_TRANSLATION_API_KEY: &str = "SUBBURN_TRANSLATION_API_KEY";
pub const ENV_FFMPEG_PATH: &str = "SUBBURN_FFMPEG_PATH";
pub const ENV_LOG: &str = "SUBBURN_LOG";

/// Default data directory: `{platform data dir}/subburn`
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("subburn"))
        .unwrap_or_else(|| PathBuf::from(".subburn"))
}

// =============================================================================
// AppConfig
// =============================================================================

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub transcoder: TranscoderConfig,

    #[serde(default)]
    pub jobs: JobsConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: StorageConfig::default(),
            transcoder: TranscoderConfig::default(),
            jobs: JobsConfig::default(),
            translation: TranslationConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Clamps every field into its valid range.
    ///
    /// Tolerant by design of old or hand-edited files: bad values are
    /// corrected, never rejected.
    pub fn normalize(&mut self) {
        self.version = CONFIG_VERSION;

        let t = &mut self.transcoder;
        t.software_preset = normalize_enum(&t.software_preset, X264_PRESETS, default_software_preset());
        t.crf = t.crf.min(51);
        t.encode_retries = t.encode_retries.min(5);
        t.ffmpeg_path = t.ffmpeg_path.take().filter(|p| !p.as_os_str().is_empty());
        t.ffprobe_path = t.ffprobe_path.take().filter(|p| !p.as_os_str().is_empty());

        let j = &mut self.jobs;
        // 0 means "one per CPU".
        if j.workers == 0 {
            j.workers = default_workers();
        }
        j.workers = j.workers.clamp(1, 64);
        j.max_queue_size = j.max_queue_size.clamp(1, 10_000);
        j.burn_timeout_secs = j.burn_timeout_secs.clamp(60, 4 * 60 * 60);
        j.translation_timeout_secs = j.translation_timeout_secs.clamp(30, 60 * 60);
        j.progress_retention_secs = j.progress_retention_secs.clamp(60, 7 * 24 * 60 * 60);

        let tr = &mut self.translation;
        tr.base_url = non_empty(tr.base_url.take());
        tr.api_key = non_empty(tr.api_key.take());
        tr.timeout_secs = tr.timeout_secs.clamp(1, 600);
        tr.batch_size = tr.batch_size.clamp(1, MAX_BATCH_SIZE);
        tr.max_retries = tr.max_retries.min(10);
        if !tr.cost_per_million_chars.is_finite() || tr.cost_per_million_chars < 0.0 {
            tr.cost_per_million_chars = default_cost_per_million();
        }
        if tr.account_id.trim().is_empty() {
            tr.account_id = default_account_id();
        }

        self.logging.level = normalize_level(&self.logging.level);
    }

    /// Applies `SUBBURN_*` environment overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Applies overrides from `lookup`; empty values are ignored
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_TRANSLATION_API_KEY) {
            self.translation.api_key = Some(key.trim().to_string());
        }
        if let Some(path) = get(ENV_FFMPEG_PATH) {
            self.transcoder.ffmpeg_path = Some(PathBuf::from(path.trim()));
        }
        if let Some(level) = get(ENV_LOG) {
            self.logging.level = level.trim().to_string();
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_enum(value: &str, allowed: &[&str], fallback: String) -> String {
    if allowed.iter().any(|v| v.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        fallback
    }
}

/// Plain levels are lower-cased; anything else is kept as a filter directive
fn normalize_level(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        return default_level();
    }
    if LEVELS.iter().any(|l| l.eq_ignore_ascii_case(value)) {
        value.to_ascii_lowercase()
    } else {
        value.to_string()
    }
}

const X264_PRESETS: &[&str] = &[
    "ultrafast",
    "superfast",
    "veryfast",
    "faster",
    "fast",
    "medium",
    "slow",
    "slower",
    "veryslow",
];

const LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

// =============================================================================
// Sections
// =============================================================================

/// Where data lives. Unset paths resolve under the data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Root of source videos and published outputs
    #[serde(default)]
    pub media_root: Option<PathBuf>,

    /// Parent of per-burn scratch directories
    #[serde(default)]
    pub temp_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| data_dir.join("subburn.db"))
    }

    pub fn media_root(&self, data_dir: &Path) -> PathBuf {
        self.media_root
            .clone()
            .unwrap_or_else(|| data_dir.join("media"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscoderConfig {
    /// Explicit ffmpeg binary; PATH lookup when unset
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub prefer_hardware: bool,

    #[serde(default = "default_software_preset")]
    pub software_preset: String,

    #[serde(default = "default_crf")]
    pub crf: u8,

    /// Automatic retries after a failed encode
    #[serde(default = "default_encode_retries")]
    pub encode_retries: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            prefer_hardware: true,
            software_preset: default_software_preset(),
            crf: default_crf(),
            encode_retries: default_encode_retries(),
        }
    }
}

impl TranscoderConfig {
    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            prefer_hardware: self.prefer_hardware,
            software_preset: self.software_preset.clone(),
            crf: self.crf,
            available_hardware: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_software_preset() -> String {
    "veryfast".to_string()
}

fn default_crf() -> u8 {
    23
}

fn default_encode_retries() -> u32 {
    2
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobsConfig {
    /// Concurrent jobs; bounds simultaneous transcodes
    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    #[serde(default = "default_burn_timeout")]
    pub burn_timeout_secs: u64,

    #[serde(default = "default_translation_timeout")]
    pub translation_timeout_secs: u64,

    /// How long terminal job states stay pollable
    #[serde(default = "default_retention")]
    pub progress_retention_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_queue_size: default_max_queue_size(),
            burn_timeout_secs: default_burn_timeout(),
            translation_timeout_secs: default_translation_timeout(),
            progress_retention_secs: default_retention(),
        }
    }
}

impl JobsConfig {
    pub fn worker_pool_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig {
            num_workers: self.workers.max(1),
            max_queue_size: self.max_queue_size.max(1),
            timeouts: JobTimeouts {
                burn: Duration::from_secs(self.burn_timeout_secs),
                translation: Duration::from_secs(self.translation_timeout_secs),
            },
            retention: Duration::from_secs(self.progress_retention_secs),
        }
    }
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

fn default_max_queue_size() -> usize {
    100
}

fn default_burn_timeout() -> u64 {
    20 * 60
}

fn default_translation_timeout() -> u64 {
    5 * 60
}

fn default_retention() -> u64 {
    60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranslationConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub base_url: Option<String>,

    /// Usually supplied through SUBBURN_TRANSLATION_API_KEY
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_translation_request_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Characters per calendar month; unlimited when unset
    #[serde(default)]
    pub monthly_quota: Option<u64>,

    #[serde(default = "default_cost_per_million")]
    pub cost_per_million_chars: f64,

    #[serde(default = "default_account_id")]
    pub account_id: String,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: None,
            api_key: None,
            timeout_secs: default_translation_request_timeout(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            monthly_quota: None,
            cost_per_million_chars: default_cost_per_million(),
            account_id: default_account_id(),
        }
    }
}

impl TranslationConfig {
    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            kind: self.provider,
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            timeout_secs: Some(self.timeout_secs),
        }
    }

    pub fn coordinator_settings(&self) -> TranslationSettings {
        TranslationSettings {
            batch_size: self.batch_size,
            max_retries: self.max_retries,
            cost_per_million_chars: self.cost_per_million_chars,
            account_id: self.account_id.clone(),
            ..TranslationSettings::default()
        }
    }
}

fn default_translation_request_timeout() -> u64 {
    60
}

fn default_batch_size() -> usize {
    MAX_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    3
}

fn default_cost_per_million() -> f64 {
    20.0
}

fn default_account_id() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// Daily log files go here; stdout only when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Level or `EnvFilter` directive
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

// =============================================================================
// ConfigManager
// =============================================================================

/// Loads, saves and resets the config file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_path: data_dir.into().join(CONFIG_FILE),
        }
    }

    /// Uses an explicit file instead of `{data_dir}/config.json`
    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn lock_path(&self) -> PathBuf {
        self.config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(CONFIG_LOCK_FILE)
    }

    fn with_lock<T>(&self, exclusive: bool, op: impl FnOnce() -> CoreResult<T>) -> CoreResult<T> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path())?;

        if exclusive {
            fs2::FileExt::lock_exclusive(&lock_file)?;
        } else {
            fs2::FileExt::lock_shared(&lock_file)?;
        }

        let result = op();

        if let Err(e) = fs2::FileExt::unlock(&lock_file) {
            warn!("Failed to unlock config lock file: {}", e);
        }

        result
    }

    /// Loads the config file, returning defaults if it is missing or corrupt
    pub fn load(&self) -> AppConfig {
        let result = self.with_lock(false, || {
            if !self.config_path.exists() {
                info!("Config file not found, using defaults");
                return Ok(AppConfig::default());
            }

            let content = fs::read_to_string(&self.config_path)?;
            let mut config = serde_json::from_str::<AppConfig>(&content)?;
            config.normalize();
            Ok(config)
        });

        match result {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config, using defaults: {}", e);
                AppConfig::default()
            }
        }
    }

    /// The file config with environment overrides applied on top
    pub fn load_effective(&self) -> AppConfig {
        let mut config = self.load();
        config.apply_env_overrides();
        config.normalize();
        config
    }

    /// Saves normalised config atomically and returns what was written
    pub fn save(&self, config: &AppConfig) -> CoreResult<AppConfig> {
        self.with_lock(true, || {
            let mut normalized = config.clone();
            normalized.normalize();
            atomic_write_json_pretty(&self.config_path, &normalized)?;
            info!(path = %self.config_path.display(), "Config saved");
            Ok(normalized)
        })
    }

    /// Deletes the config file and returns defaults
    pub fn reset(&self) -> CoreResult<AppConfig> {
        self.with_lock(true, || {
            if self.config_path.exists() {
                fs::remove_file(&self.config_path).map_err(|e| {
                    CoreError::Internal(format!("Failed to delete config file: {}", e))
                })?;
                info!("Config file deleted");
            }
            Ok(AppConfig::default())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.transcoder.encode_retries, 2);
        assert_eq!(config.transcoder.crf, 23);
        assert_eq!(config.jobs.burn_timeout_secs, 1200);
        assert_eq!(config.jobs.translation_timeout_secs, 300);
        assert_eq!(config.translation.batch_size, 100);
        assert_eq!(config.translation.provider, ProviderKind::None);
        assert!(config.translation.monthly_quota.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: AppConfig = serde_json::from_str(
            r#"{"translation": {"provider": "libretranslate", "monthlyQuota": 500000}}"#,
        )
        .unwrap();

        assert_eq!(config.translation.provider, ProviderKind::LibreTranslate);
        assert_eq!(config.translation.monthly_quota, Some(500_000));
        assert_eq!(config.translation.max_retries, 3);
        assert_eq!(config.jobs, JobsConfig::default());
    }

    #[test]
    fn test_normalize_clamps() {
        let mut config = AppConfig::default();
        config.transcoder.crf = 80;
        config.transcoder.software_preset = "Warp".into();
        config.jobs.workers = 0;
        config.jobs.burn_timeout_secs = 1;
        config.translation.batch_size = 500;
        config.translation.cost_per_million_chars = f64::NAN;
        config.translation.account_id = "  ".into();
        config.translation.api_key = Some(" ".into());
        config.logging.level = "DEBUG".into();

        config.normalize();

        assert_eq!(config.transcoder.crf, 51);
        assert_eq!(config.transcoder.software_preset, "veryfast");
        assert!(config.jobs.workers >= 1);
        assert_eq!(config.jobs.burn_timeout_secs, 60);
        assert_eq!(config.translation.batch_size, 100);
        assert_eq!(config.translation.cost_per_million_chars, 20.0);
        assert_eq!(config.translation.account_id, "default");
        assert!(config.translation.api_key.is_none());
        assert_eq!(config.logging.level, "debug");

        config.translation.batch_size = 0;
        config.normalize();
        assert_eq!(config.translation.batch_size, 1);
    }

    #[test]
    fn test_filter_directive_level_is_kept() {
        let mut config = AppConfig::default();
        config.logging.level = "subburn_lib=debug,info".into();
        config.normalize();
        assert_eq!(config.logging.level, "subburn_lib=debug,info");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_TRANSLATION_API_KEY, "secret"),
            (ENV_FFMPEG_PATH, "/opt/ffmpeg/bin/ffmpeg"),
            (ENV_LOG, ""),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides_from(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.translation.api_key.as_deref(), Some("secret"));
        assert_eq!(
            config.transcoder.ffmpeg_path,
            Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg"))
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_section_conversions() {
        let mut config = AppConfig::default();
        config.jobs.workers = 3;
        config.translation.provider = ProviderKind::LibreTranslate;
        config.translation.base_url = Some("http://localhost:5000".into());
        config.translation.batch_size = 25;

        let pool = config.jobs.worker_pool_config();
        assert_eq!(pool.num_workers, 3);
        assert_eq!(pool.timeouts.burn, Duration::from_secs(1200));

        let provider = config.translation.provider_config();
        assert_eq!(provider.kind, ProviderKind::LibreTranslate);
        assert_eq!(provider.timeout_secs, Some(60));

        let settings = config.translation.coordinator_settings();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.max_retries, 3);

        let dir = Path::new("/data");
        assert_eq!(config.storage.database_path(dir), dir.join("subburn.db"));
        assert_eq!(config.storage.media_root(dir), dir.join("media"));
    }

    #[test]
    fn test_manager_roundtrip() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp.path());

        let mut config = AppConfig::default();
        config.jobs.workers = 2;
        config.translation.monthly_quota = Some(1_000);
        config.transcoder.crf = 99;

        let saved = manager.save(&config).unwrap();
        assert_eq!(saved.transcoder.crf, 51);

        let loaded = manager.load();
        assert_eq!(loaded, saved);
        assert!(manager.config_path().exists());
    }

    #[test]
    fn test_manager_missing_and_corrupt_files() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp.path());
        assert_eq!(manager.load(), AppConfig::default());

        fs::write(manager.config_path(), "{ not json").unwrap();
        assert_eq!(manager.load(), AppConfig::default());
    }

    #[test]
    fn test_manager_reset() {
        let temp = TempDir::new().unwrap();
        let manager = ConfigManager::new(temp.path());
        manager.save(&AppConfig::default()).unwrap();

        let config = manager.reset().unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(!manager.config_path().exists());
    }
}
