use crate::models::config::AppConfig;
use crate::services::config::ConfigManager;
use std::path::PathBuf;
use std::sync::Mutex;

/// State wrapper for configuration manager
pub type ConfigManagerState = Mutex<ConfigManager>;

/// Initialize config manager state
pub fn init_config_manager() -> Result<ConfigManagerState, String> {
    let manager = ConfigManager::new().map_err(|e| e.to_string())?;
    Ok(Mutex::new(manager))
}

/// Config manager rooted at an explicit directory
pub fn init_config_manager_at(dir: PathBuf) -> Result<ConfigManagerState, String> {
    let manager = ConfigManager::with_dir(dir).map_err(|e| e.to_string())?;
    Ok(Mutex::new(manager))
}

/// Save complete configuration
pub fn save_config(state: &ConfigManagerState, config: AppConfig) -> Result<(), String> {
    let manager = state
        .lock()
        .map_err(|e| format!("Failed to lock config manager: {}", e))?;

    manager.save(&config).map_err(|e| e.to_string())
}

/// Load complete configuration
pub fn load_config(state: &ConfigManagerState) -> Result<AppConfig, String> {
    let manager = state
        .lock()
        .map_err(|e| format!("Failed to lock config manager: {}", e))?;

    manager.load().map_err(|e| e.to_string())
}

/// Get config file path
pub fn get_config_path(state: &ConfigManagerState) -> Result<String, String> {
    let manager = state
        .lock()
        .map_err(|e| format!("Failed to lock config manager: {}", e))?;

    Ok(manager.config_file_path().display().to_string())
}

/// Change the kiosk uuid and persist it
pub fn set_kiosk_uuid(state: &ConfigManagerState, uuid: String) -> Result<AppConfig, String> {
    let manager = state
        .lock()
        .map_err(|e| format!("Failed to lock config manager: {}", e))?;

    let mut config = manager.load().map_err(|e| e.to_string())?;
    config.kiosk.uuid = uuid;
    manager.save(&config).map_err(|e| e.to_string())?;
    Ok(config)
}
