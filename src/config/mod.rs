//! Configuration management for profitiq
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Owner identity stamped on projects and checked on every operation.
    /// The hosted deployment derives this from the session; the CLI derives
    /// it from config.
    #[serde(default = "default_owner")]
    pub owner: String,

    /// Extraction model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Extraction model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend base URL (structured-extraction generate endpoint)
    #[serde(default = "default_model_backend_url")]
    pub backend_url: String,

    /// Model name/identifier
    #[serde(default = "default_model_name")]
    pub name: String,

    /// Maximum tokens for the extraction response
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,

    /// Request ceiling in seconds; exceeding it marks the document failed
    #[serde(default = "default_model_timeout")]
    pub timeout_secs: u64,

    /// Prompt identifier recorded with each telemetry entry
    #[serde(default = "default_prompt_id")]
    pub prompt_id: String,
}

/// Document and email ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Email attachments below this size are discarded (signature images)
    #[serde(default = "default_min_attachment_bytes")]
    pub min_attachment_bytes: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for profitiq data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,

    /// Root directory for stored document blobs
    pub blob_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            model: ModelConfig::default(),
            ingest: IngestConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend_url: default_model_backend_url(),
            name: default_model_name(),
            max_tokens: default_model_max_tokens(),
            timeout_secs: default_model_timeout(),
            prompt_id: default_prompt_id(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            min_attachment_bytes: default_min_attachment_bytes(),
        }
    }
}

impl Config {
    /// Get the default base directory for profitiq (~/.profitiq)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".profitiq")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("profitiq.db"),
            blob_dir: base.join("blobs"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("profitiq.db"),
            blob_dir: base.join("blobs"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location
    pub fn load_default() -> Result<Self> {
        Self::load(&Self::default_config_path())
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Check if profitiq is initialized (config and DB exist)
    pub fn is_initialized(&self) -> bool {
        self.paths.config_file.exists() && self.paths.db_file.exists()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.owner.trim().is_empty() {
            return Err(Error::Config("owner must not be empty".to_string()));
        }

        if self.model.timeout_secs == 0 {
            return Err(Error::Config(
                "model.timeout_secs must be positive".to_string(),
            ));
        }

        if self.model.max_tokens == 0 {
            return Err(Error::Config(
                "model.max_tokens must be positive".to_string(),
            ));
        }

        if self.ingest.max_upload_bytes == 0 {
            return Err(Error::Config(
                "ingest.max_upload_bytes must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.owner, "default");
        assert_eq!(config.model.timeout_secs, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.model.name = "test-extraction-model".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&config.paths.config_file).unwrap();
        assert_eq!(loaded.model.name, "test-extraction-model");
        assert_eq!(loaded.paths.blob_dir, tmp.path().join("blobs"));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.owner = "  ".to_string();
        assert!(config.validate().is_err());

        config.owner = "contractor".to_string();
        assert!(config.validate().is_ok());

        config.model.timeout_secs = 0;
        assert!(config.validate().is_err());
    }
}
