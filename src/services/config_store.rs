// Configuration Storage Service
// Handles config file read/write, env overrides and version backup

use crate::models::{default_categories, CategoryLabel, ChunkPolicy, FailurePolicy, ThresholdTable, UnitMode};
use crate::services::analysis::{threshold_preset, AnalysisError, PipelineSettings, Sensitivity};
use crate::services::providers::{
    DEFAULT_TIMEOUT_SECS, TOXICITY_DEFAULT_URL, TRANSLATION_DEFAULT_URL, ZERO_SHOT_DEFAULT_URL,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub services: ServicesConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub translation: TranslationConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            services: ServicesConfig::default(),
            analysis: AnalysisConfig::default(),
            translation: TranslationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub enabled: bool,
    pub http: Option<String>,
    pub https: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL to use, preferring https; None when disabled.
    pub fn url(&self) -> Option<&str> {
        if !self.enabled {
            return None;
        }
        self.https
            .as_deref()
            .or(self.http.as_deref())
            .filter(|u| !u.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicesConfig {
    #[serde(default = "default_toxicity_url")]
    pub toxicity_url: String,
    #[serde(default = "default_zero_shot_url")]
    pub zero_shot_url: String,
    #[serde(default = "default_translation_url")]
    pub translation_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_translation_max_length")]
    pub translation_max_length: u32,
    #[serde(default)]
    pub proxy: Option<ProxyConfig>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            toxicity_url: default_toxicity_url(),
            zero_shot_url: default_zero_shot_url(),
            translation_url: default_translation_url(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            max_input_chars: default_max_input_chars(),
            translation_max_length: default_translation_max_length(),
            proxy: None,
        }
    }
}

impl ServicesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    #[serde(default)]
    pub unit_mode: UnitMode,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: i32,
    #[serde(default)]
    pub chunk_policy: ChunkPolicy,
    /// Named preset ("low" | "medium" | "high"); replaces `thresholds` when set.
    #[serde(default)]
    pub sensitivity: Option<String>,
    #[serde(default)]
    pub thresholds: ThresholdTable,
    #[serde(default = "default_true")]
    pub score_categories: bool,
    #[serde(default = "default_categories")]
    pub categories: Vec<CategoryLabel>,
    #[serde(default)]
    pub on_classifier_failure: FailurePolicy,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            unit_mode: UnitMode::Sentence,
            chunk_size_chars: default_chunk_size(),
            chunk_policy: ChunkPolicy::Average,
            sensitivity: None,
            thresholds: ThresholdTable::default(),
            score_categories: true,
            categories: default_categories(),
            on_classifier_failure: FailurePolicy::MarkError,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_chunk_size")]
    pub chunk_size_chars: i32,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            chunk_size_chars: default_chunk_size(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    /// Defaults to the input file's directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub write_xlsx: bool,
    #[serde(default = "default_true")]
    pub write_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            write_xlsx: true,
            write_json: true,
        }
    }
}

fn default_version() -> String { env!("CARGO_PKG_VERSION").to_string() }
fn default_toxicity_url() -> String { TOXICITY_DEFAULT_URL.to_string() }
fn default_zero_shot_url() -> String { ZERO_SHOT_DEFAULT_URL.to_string() }
fn default_translation_url() -> String { TRANSLATION_DEFAULT_URL.to_string() }
fn default_timeout_secs() -> u64 { DEFAULT_TIMEOUT_SECS }
fn default_max_attempts() -> u32 { 2 }
fn default_max_input_chars() -> usize { 2000 }
fn default_translation_max_length() -> u32 { 500 }
fn default_chunk_size() -> i32 { 400 }
fn default_true() -> bool { true }

fn positive_chunk_size(value: i32, field: &str) -> Result<usize, AnalysisError> {
    if value <= 0 {
        return Err(AnalysisError::InvalidConfiguration(format!(
            "{} must be positive, got {}",
            field, value
        )));
    }
    Ok(value as usize)
}

impl AppConfig {
    /// Apply TOXISCAN_* environment overrides for service URLs.
    pub fn apply_env_overrides(&mut self) {
        let overrides = [
            ("TOXISCAN_TOXICITY_URL", &mut self.services.toxicity_url),
            ("TOXISCAN_ZERO_SHOT_URL", &mut self.services.zero_shot_url),
            ("TOXISCAN_TRANSLATION_URL", &mut self.services.translation_url),
        ];
        for (key, target) in overrides {
            if let Ok(val) = env::var(key) {
                let v = val.trim();
                if !v.is_empty() {
                    *target = v.to_string();
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.services.timeout_secs == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "services.timeoutSecs must be positive".to_string(),
            ));
        }
        if self.services.max_attempts == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "services.maxAttempts must be at least 1".to_string(),
            ));
        }
        if self.services.max_input_chars == 0 {
            return Err(AnalysisError::InvalidConfiguration(
                "services.maxInputChars must be positive".to_string(),
            ));
        }
        if self.translation.enabled {
            positive_chunk_size(self.translation.chunk_size_chars, "translation.chunkSizeChars")?;
        }
        self.pipeline_settings()?.validate()
    }

    /// Resolve the analysis section into pipeline settings.
    pub fn pipeline_settings(&self) -> Result<PipelineSettings, AnalysisError> {
        let analysis = &self.analysis;
        let thresholds = match analysis.sensitivity.as_deref() {
            Some(name) => {
                let sensitivity = Sensitivity::parse(name).ok_or_else(|| {
                    AnalysisError::InvalidConfiguration(format!("unknown sensitivity '{}'", name))
                })?;
                threshold_preset(sensitivity)
            }
            None => analysis.thresholds.clone(),
        };

        Ok(PipelineSettings {
            unit_mode: analysis.unit_mode,
            chunk_size: positive_chunk_size(analysis.chunk_size_chars, "analysis.chunkSizeChars")?,
            chunk_policy: analysis.chunk_policy,
            thresholds,
            categories: analysis.categories.clone(),
            score_categories: analysis.score_categories,
            on_failure: analysis.on_classifier_failure,
        })
    }

    pub fn translation_chunk_size(&self) -> Result<usize, AnalysisError> {
        positive_chunk_size(self.translation.chunk_size_chars, "translation.chunkSizeChars")
    }
}

pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
}

impl ConfigStore {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_file = config_dir.join("config.json");
        Self { config_dir, config_file }
    }

    /// Store backed by an explicit file path.
    pub fn at_file(config_file: PathBuf) -> Self {
        let config_dir = config_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self { config_dir, config_file }
    }

    /// Get default config directory
    pub fn default_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("toxiscan"))
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// Ensure config directory exists
    pub fn ensure_dir(&self) -> Result<(), String> {
        fs::create_dir_all(&self.config_dir)
            .map_err(|e| format!("Failed to create config dir: {}", e))
    }

    /// Load configuration from file; a missing file yields defaults.
    pub fn load(&self) -> Result<AppConfig, String> {
        if !self.config_file.exists() {
            return Ok(AppConfig::default());
        }

        let content = fs::read_to_string(&self.config_file)
            .map_err(|e| format!("Failed to read config: {}", e))?;

        serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))
    }

    /// Save configuration to file
    pub fn save(&self, config: &AppConfig) -> Result<(), String> {
        self.ensure_dir()?;

        // Create backup if file exists
        if self.config_file.exists() {
            self.create_backup()?;
        }

        let content = serde_json::to_string_pretty(config)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;

        fs::write(&self.config_file, content)
            .map_err(|e| format!("Failed to write config: {}", e))
    }

    /// Create a backup of current config
    fn create_backup(&self) -> Result<(), String> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir)
            .map_err(|e| format!("Failed to create backup dir: {}", e))?;

        let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%.3f");
        let backup_file = backup_dir.join(format!("config_{}.json", timestamp));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| format!("Failed to create backup: {}", e))?;

        // Keep only last 10 backups
        self.cleanup_old_backups(&backup_dir, 10)?;

        Ok(())
    }

    /// Remove old backups, keeping only the most recent N
    fn cleanup_old_backups(&self, backup_dir: &Path, keep: usize) -> Result<(), String> {
        let mut entries: Vec<_> = fs::read_dir(backup_dir)
            .map_err(|e| format!("Failed to read backup dir: {}", e))?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .collect();

        if entries.len() <= keep {
            return Ok(());
        }

        // File names embed the timestamp, so name order is age order
        entries.sort_by_key(|e| e.file_name());

        for entry in entries.iter().take(entries.len() - keep) {
            let _ = fs::remove_file(entry.path());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeverityVerdict;

    fn temp_store() -> (ConfigStore, PathBuf) {
        let dir = std::env::temp_dir().join(format!("toxiscan-config-{}", uuid::Uuid::new_v4()));
        (ConfigStore::new(dir.clone()), dir)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.analysis.chunk_size_chars, 400);
        assert_eq!(config.analysis.chunk_policy, ChunkPolicy::Average);
        assert_eq!(config.analysis.thresholds.threshold("toxic"), 0.3);
        assert_eq!(config.analysis.categories.len(), 3);
        assert!(!config.translation.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let json = r#"{"analysis":{"chunkPolicy":"any_chunk","thresholds":{"toxic":0.8}}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.analysis.chunk_policy, ChunkPolicy::AnyChunk);
        assert_eq!(config.analysis.thresholds.threshold("toxic"), 0.8);
        assert_eq!(config.analysis.thresholds.threshold("insult"), 0.0);
        assert_eq!(config.services.timeout_secs, 30);
        assert!(config.output.write_xlsx);
    }

    #[test]
    fn test_sensitivity_overrides_thresholds() {
        let mut config = AppConfig::default();
        config.analysis.sensitivity = Some("low".to_string());
        let settings = config.pipeline_settings().unwrap();
        assert_eq!(settings.thresholds.threshold("toxic"), 0.8);

        config.analysis.sensitivity = Some("bogus".to_string());
        assert!(matches!(
            config.pipeline_settings(),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_non_positive_chunk_size_is_invalid() {
        let mut config = AppConfig::default();
        config.analysis.chunk_size_chars = 0;
        assert!(config.validate().is_err());
        config.analysis.chunk_size_chars = -5;
        assert!(matches!(
            config.pipeline_settings(),
            Err(AnalysisError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_zero_timeout_is_invalid() {
        let mut config = AppConfig::default();
        config.services.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_proxy_url() {
        let proxy = ProxyConfig {
            enabled: true,
            http: Some("http://proxy:8080".to_string()),
            https: None,
        };
        assert_eq!(proxy.url(), Some("http://proxy:8080"));
        let disabled = ProxyConfig { enabled: false, ..proxy };
        assert_eq!(disabled.url(), None);
    }

    #[test]
    fn test_config_serialization() {
        let mut config = AppConfig::default();
        config.analysis.thresholds.set("toxic", 0.65);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.analysis.thresholds.threshold("toxic"), 0.65);
        assert_eq!(
            crate::services::analysis::aggregate(
                &[("toxic".to_string(), 0.7)].into_iter().collect(),
                &parsed.analysis.thresholds
            ),
            SeverityVerdict::Mild
        );
    }

    #[test]
    fn test_store_load_missing_file_returns_defaults() {
        let (store, _dir) = temp_store();
        let config = store.load().unwrap();
        assert_eq!(config.analysis.chunk_size_chars, 400);
    }

    #[test]
    fn test_store_save_creates_backup() {
        let (store, dir) = temp_store();
        let mut config = AppConfig::default();
        store.save(&config).unwrap();
        config.analysis.chunk_size_chars = 800;
        store.save(&config).unwrap();

        assert_eq!(store.load().unwrap().analysis.chunk_size_chars, 800);
        let backups = fs::read_dir(dir.join("backups")).unwrap().count();
        assert_eq!(backups, 1);
        fs::remove_dir_all(&dir).unwrap();
    }
}
