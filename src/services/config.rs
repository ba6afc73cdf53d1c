use crate::error::{KioskError, Result};
use crate::models::config::AppConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration manager for kiosk settings
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager rooted in the platform config directory
    ///
    /// This will create the config directory if it doesn't exist.
    pub fn new() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| KioskError::Config("Failed to determine config directory".to_string()))?
            .join("kiosk-checkout");

        Self::with_dir(config_dir)
    }

    /// Create a manager rooted at an explicit directory
    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Result<Self> {
        let config_dir = config_dir.into();
        fs::create_dir_all(&config_dir)
            .map_err(|e| KioskError::Config(format!("Failed to create config directory: {}", e)))?;

        let config_path = config_dir.join("config.json");
        debug!(path = %config_path.display(), "config manager ready");

        Ok(Self {
            config_dir,
            config_path,
        })
    }

    /// Load from an explicit file, e.g. one passed on the command line
    pub fn load_file(path: &Path) -> Result<AppConfig> {
        let content = fs::read_to_string(path)
            .map_err(|e| KioskError::Config(format!("Failed to read config file: {}", e)))?;
        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<AppConfig> {
        let config: AppConfig = serde_json::from_str(content)
            .map_err(|e| KioskError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate().map_err(KioskError::Config)?;
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self, config: &AppConfig) -> Result<()> {
        config.validate().map_err(KioskError::Config)?;

        fs::create_dir_all(&self.config_dir)
            .map_err(|e| KioskError::Config(format!("Failed to create config directory: {}", e)))?;

        // Pretty print for hand editing on the kiosk
        let json = serde_json::to_string_pretty(config)
            .map_err(|e| KioskError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(&self.config_path, json)
            .map_err(|e| KioskError::Config(format!("Failed to write config file: {}", e)))?;

        info!(path = %self.config_path.display(), "configuration saved");
        Ok(())
    }

    /// Load configuration from disk
    ///
    /// If config file doesn't exist, returns default configuration
    pub fn load(&self) -> Result<AppConfig> {
        if !self.config_exists() {
            debug!("no config file, using defaults");
            return Ok(AppConfig::default());
        }

        Self::load_file(&self.config_path)
    }

    pub fn config_file_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn config_exists(&self) -> bool {
        self.config_path.exists()
    }
}
