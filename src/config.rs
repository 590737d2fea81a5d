//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::commands::CommandMap;

/// Level at or above which a sample counts as noise
pub const ENDPOINT_THRESHOLD: u32 = 5;

/// Uninterrupted silence required before capture is stopped
pub const ENDPOINT_QUIET_PERIOD: Duration = Duration::from_secs(2);

/// Time a session may wait for an assistant outcome before it is abandoned
pub const LISTEN_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_COMPANION_URL: &str = "https://localhost:3000";
const DEFAULT_PRODUCT_ID: &str = "smart_mirror";
const DEFAULT_DSN: &str = "mirror-0001";

/// Endpointing and session timing parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointSettings {
    /// Level threshold separating silence from noise
    pub threshold: u32,
    /// Quiet period after which recording is stopped
    pub quiet_period: Duration,
    /// Listen watchdog for sessions that never resolve
    pub listen_timeout: Duration,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            threshold: ENDPOINT_THRESHOLD,
            quiet_period: ENDPOINT_QUIET_PERIOD,
            listen_timeout: LISTEN_TIMEOUT,
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Base URL of the companion authentication service
    pub companion_url: String,

    /// Product identifier registered with the companion service
    pub product_id: String,

    /// Device serial number presented during registration
    pub dsn: String,

    /// Endpointing parameters (fixed, not read from the environment)
    pub endpoint: EndpointSettings,

    /// Spoken command table
    pub commands: CommandMap,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        let home = std::env::var("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("mirror-voice");

        let socket_path = std::env::var_os("MIRROR_SOCKET")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let companion_url = env_or("MIRROR_COMPANION_URL", DEFAULT_COMPANION_URL)
            .trim_end_matches('/')
            .to_string();

        let commands_path = std::env::var_os("MIRROR_COMMANDS")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("commands.json"));
        let commands = CommandMap::load(&commands_path)?;

        Ok(Self {
            socket_path,
            data_dir,
            companion_url,
            product_id: env_or("MIRROR_PRODUCT_ID", DEFAULT_PRODUCT_ID),
            dsn: env_or("MIRROR_DSN", DEFAULT_DSN),
            endpoint: EndpointSettings::default(),
            commands,
        })
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)
            .with_context(|| format!("failed to create {}", self.data_dir.display()))?;
        Ok(())
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_load() {
        let config = Config::load().unwrap();
        assert!(config.data_dir.to_string_lossy().contains("mirror-voice"));
        assert!(!config.companion_url.ends_with('/'));
    }

    #[test]
    fn test_endpoint_defaults() {
        let settings = EndpointSettings::default();
        assert_eq!(settings.threshold, 5);
        assert_eq!(settings.quiet_period, Duration::from_secs(2));
        assert_eq!(settings.listen_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_env_or_falls_back_on_unset() {
        assert_eq!(
            env_or("MIRROR_TEST_SURELY_UNSET_VARIABLE", "fallback"),
            "fallback"
        );
    }
}
