use serde::{Deserialize, Serialize};

/// Inference / menu backend connection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    /// Inference on a busy GPU box takes far longer than a menu lookup
    pub inference_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7500".to_string(),
            timeout_secs: 5,
            inference_timeout_secs: 60,
        }
    }
}

/// Realtime (Socket.IO) channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RealtimeConfig {
    pub url: String,
    pub enabled: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7500".to_string(),
            enabled: true,
        }
    }
}

/// Identity of this kiosk terminal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KioskConfig {
    /// Room the kiosk joins; also part of the redirect path
    pub uuid: String,
    /// Pause between the checkout event and the redirect
    pub redirect_delay_ms: u64,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            uuid: "1234".to_string(),
            redirect_delay_ms: 1000,
        }
    }
}

/// Interaction tuning for the correction screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionConfig {
    pub highlight_ms: u64,
    pub search_debounce_ms: u64,
    /// Size of a region placed for a manually added item
    pub default_region_width: f64,
    pub default_region_height: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            highlight_ms: 500,
            search_debounce_ms: 300,
            default_region_width: 100.0,
            default_region_height: 100.0,
        }
    }
}

/// Log output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` filter directive, overridden by `RUST_LOG`
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub realtime: RealtimeConfig,
    pub kiosk: KioskConfig,
    pub interaction: InteractionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.server.base_url.starts_with("http://") && !self.server.base_url.starts_with("https://") {
            return Err(format!("Server URL must be http(s): {}", self.server.base_url));
        }
        if self.realtime.enabled
            && !self.realtime.url.starts_with("ws://")
            && !self.realtime.url.starts_with("wss://")
        {
            return Err(format!("Realtime URL must be ws(s): {}", self.realtime.url));
        }
        if self.kiosk.uuid.trim().is_empty() {
            return Err("Kiosk uuid must not be empty".to_string());
        }
        if self.interaction.default_region_width <= 0.0 || self.interaction.default_region_height <= 0.0 {
            return Err("Default region size must be positive".to_string());
        }
        Ok(())
    }
}
