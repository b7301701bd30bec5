use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::core::bluetooth::constants::{
    DEFAULT_SCAN_TIMEOUT_MS, DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SETTLE_DELAY_MS, DEVICE_NAME,
};
use crate::core::bluetooth::error::{BpError, BpResult};
use crate::core::session::SessionTiming;
use crate::utils::ensure_directory_exists;

pub const CONFIG_FILE_NAME: &str = "bpmon.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Advertised name the scanner matches exactly
    pub device_name: String,

    /// How long a scan listens for the cuff before giving up
    pub scan_timeout_ms: u64,

    /// Pause after the final frame so the cuff can deflate before we let go
    pub settle_delay_ms: u64,

    /// Whole-session deadline. A reading that never completes is stopped after this
    pub session_timeout_secs: u64,

    /// Drop the link once a measurement has been taken
    pub disconnect_after_measurement: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        MonitorConfig {
            device_name: DEVICE_NAME.to_string(),
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            disconnect_after_measurement: true,
        }
    }
}

impl MonitorConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn session_timing(&self) -> SessionTiming {
        SessionTiming {
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            deadline: Duration::from_secs(self.session_timeout_secs),
        }
    }

    /// Rejects values the monitor cannot work with.
    pub fn validate(&self) -> BpResult<()> {
        if self.device_name.trim().is_empty() {
            return Err(BpError::Config("device_name must not be empty".into()));
        }
        if self.scan_timeout_ms == 0 {
            return Err(BpError::Config("scan_timeout_ms must be positive".into()));
        }
        if self.session_timeout_secs == 0 {
            return Err(BpError::Config("session_timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Loads the config from a configuration file.
    pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file_path = path.as_ref();

        if !file_path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(file_path).await?;
        let config: Self = serde_json::from_str(&config_json)?;
        config.validate()?;

        info!("Config loaded from {:?}", file_path);
        Ok(config)
    }

    /// Saves the current config to a configuration file.
    pub async fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file_path = path.as_ref();
        if let Some(config_dir) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_directory_exists(config_dir).await?;
        }

        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize monitor config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(file_path, config_json).await?;

        info!("Monitor config saved to {:?}.", file_path);
        Ok(())
    }
}
