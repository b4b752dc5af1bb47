//! Orchestrator settings management

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default settings file looked up in the base directory
pub const SETTINGS_FILE: &str = "orchestrator.toml";

const DEFAULT_RELEASE_BASE: &str =
    "https://github.com/Swofty-Developments/HypixelSkyBlock/releases/download/latest";

/// Orchestrator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Layout
    /// Directory holding proxy/, limbo/, services/, gameserver/, configuration/ and logs/
    pub base_directory: Option<PathBuf>,

    // Transport
    /// Address the control API binds to
    pub bind_address: String,
    /// Port the control API listens on
    pub port: u16,

    // Launching
    /// Java binary used to launch every jar
    pub java_path: PathBuf,
    /// Initial heap for service processes
    pub service_heap_min: String,
    /// Maximum heap for service processes
    pub service_heap_max: String,
    /// Initial heap for game-server instances
    pub server_heap_min: String,
    /// Maximum heap for game-server instances
    pub server_heap_max: String,

    // Lifecycle
    /// Grace period between SIGTERM and a forced kill
    pub stop_timeout_secs: u32,
    /// Delay before a status broadcast after a lifecycle change
    pub settle_delay_ms: u32,
    /// Delay between services in the startup sequence
    pub service_stagger_ms: u32,
    /// Delay between game-server instances in the startup sequence
    pub server_stagger_ms: u32,
    /// Kill stray `java -jar` processes on shutdown
    pub sweep_leftovers: bool,

    // Assets
    /// Release URL the downloader fetches jars from
    pub release_base_url: String,
    /// Default number of log lines returned by the log endpoints
    pub log_lines: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            // Layout
            base_directory: None,

            // Transport
            bind_address: "0.0.0.0".to_string(),
            port: 5000,

            // Launching
            java_path: PathBuf::from("java"),
            service_heap_min: "256M".to_string(),
            service_heap_max: "512M".to_string(),
            server_heap_min: "1G".to_string(),
            server_heap_max: "2G".to_string(),

            // Lifecycle
            stop_timeout_secs: 10,
            settle_delay_ms: 500,
            service_stagger_ms: 1000,
            server_stagger_ms: 5000,
            sweep_leftovers: true,

            // Assets
            release_base_url: DEFAULT_RELEASE_BASE.to_string(),
            log_lines: 500,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let mut settings: Settings = toml::from_str(&raw)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        settings.validate();

        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Get the base directory, using the working directory if not set
    pub fn get_base_directory(&self) -> PathBuf {
        self.base_directory
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    pub fn config_dir(&self) -> PathBuf {
        self.get_base_directory().join("configuration")
    }

    pub fn proxy_dir(&self) -> PathBuf {
        self.get_base_directory().join("proxy")
    }

    pub fn limbo_dir(&self) -> PathBuf {
        self.get_base_directory().join("limbo")
    }

    pub fn services_dir(&self) -> PathBuf {
        self.get_base_directory().join("services")
    }

    pub fn gameserver_dir(&self) -> PathBuf {
        self.get_base_directory().join("gameserver")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.get_base_directory().join("logs")
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.get_base_directory().join("downloads")
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs as u64)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms as u64)
    }

    /// Validate settings and fix any invalid values
    pub fn validate(&mut self) {
        self.stop_timeout_secs = self.stop_timeout_secs.clamp(1, 300);
        self.settle_delay_ms = self.settle_delay_ms.min(10_000);
        self.log_lines = self.log_lines.max(1);
        while self.release_base_url.ends_with('/') {
            self.release_base_url.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings.port, 5000);
        assert_eq!(settings.stop_timeout(), Duration::from_secs(10));
        assert_eq!(settings.settle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            "port = 8080\nstop_timeout_secs = 0\nrelease_base_url = \"http://mirror/\"\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.port, 8080);
        assert_eq!(settings.stop_timeout_secs, 1);
        assert_eq!(settings.release_base_url, "http://mirror");
        assert_eq!(settings.service_heap_max, "512M");
    }

    #[test]
    fn unit_directories_hang_off_the_base() {
        let settings = Settings {
            base_directory: Some(PathBuf::from("/srv/fleet")),
            ..Default::default()
        };
        assert_eq!(settings.logs_dir(), PathBuf::from("/srv/fleet/logs"));
        assert_eq!(settings.gameserver_dir(), PathBuf::from("/srv/fleet/gameserver"));
    }
}
