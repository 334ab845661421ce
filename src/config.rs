// Configuration save/restore functionality

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backends::firewall::DEFAULT_RULE_TAG;

const APP_DIR: &str = "chadwall";
const CONFIG_FILE: &str = "config.json";

/// Name substrings of applications that mostly do network I/O
pub const DEFAULT_NETWORK_HEAVY_PATTERNS: &[&str] = &[
    // Browsers
    "chrome",
    "firefox",
    "msedge",
    "opera",
    "brave",
    "iexplore",
    // Chat and voice
    "discord",
    "teams",
    "slack",
    "zoom",
    "skype",
    // Streaming and game launchers
    "spotify",
    "steam",
    "epicgameslauncher",
    "origin",
    // Torrent clients
    "qbittorrent",
    "utorrent",
    "transmission",
    "bittorrent",
    // Cloud sync
    "dropbox",
    "onedrive",
    "googledrivesync",
    "backup",
    // Mail
    "outlook",
    "thunderbird",
    "mailbird",
    // Dev tools and runtimes
    "vscodium",
    "code",
    "devenv",
    "rider",
    "node",
    "python",
    "java",
    "dotnet",
];

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Interface and process I/O sampling period
    #[serde(default = "default_interval_ms")]
    pub sample_interval_ms: u64,

    /// Connection table sampling period
    #[serde(default = "default_interval_ms")]
    pub connection_interval_ms: u64,

    /// Samples closer together than this keep their previous rates
    #[serde(default = "default_min_elapsed_secs")]
    pub min_elapsed_secs: f64,

    /// Share of raw I/O attributed to network for network-heavy processes
    #[serde(default = "default_network_factor")]
    pub network_factor: f64,

    /// Share of raw I/O attributed to network for everything else
    #[serde(default = "default_default_factor")]
    pub default_factor: f64,

    /// Case-insensitive name substrings that select `network_factor`
    #[serde(default = "default_network_heavy_patterns")]
    pub network_heavy_patterns: Vec<String>,

    /// Report counter decreases as zero instead of negative rates
    #[serde(default = "default_clamp_negative_rates")]
    pub clamp_negative_rates: bool,

    /// Leading field of every firewall rule name we own
    #[serde(default = "default_rule_tag")]
    pub rule_tag: String,

    /// Sample this interface instead of auto-selecting one
    #[serde(default)]
    pub preferred_interface: Option<String>,

    /// Preferred socket mapper backend
    #[serde(default)]
    pub preferred_socket_mapper: Option<String>,

    /// Preferred firewall backend ("netsh", "nftables")
    #[serde(default)]
    pub preferred_firewall_backend: Option<String>,

    /// Command prefix for firewall tooling, e.g. ["sudo", "-n"]
    #[serde(default)]
    pub elevation_command: Option<Vec<String>>,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_min_elapsed_secs() -> f64 {
    0.1
}

fn default_network_factor() -> f64 {
    0.3
}

fn default_default_factor() -> f64 {
    0.1
}

fn default_network_heavy_patterns() -> Vec<String> {
    DEFAULT_NETWORK_HEAVY_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_clamp_negative_rates() -> bool {
    true
}

fn default_rule_tag() -> String {
    DEFAULT_RULE_TAG.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_interval_ms: default_interval_ms(),
            connection_interval_ms: default_interval_ms(),
            min_elapsed_secs: default_min_elapsed_secs(),
            network_factor: default_network_factor(),
            default_factor: default_default_factor(),
            network_heavy_patterns: default_network_heavy_patterns(),
            clamp_negative_rates: default_clamp_negative_rates(),
            rule_tag: default_rule_tag(),
            preferred_interface: None,
            preferred_socket_mapper: None,
            preferred_firewall_backend: None,
            elevation_command: None,
        }
    }
}

impl Config {
    /// Per-user application directory, created on demand
    pub fn app_dir() -> Result<PathBuf> {
        let base = dirs::config_dir().context("Could not determine user config directory")?;
        let dir = base.join(APP_DIR);

        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {:?}", dir))?;

        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join(CONFIG_FILE))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Minimum sample spacing; out-of-range values fall back to the default
    pub fn min_elapsed(&self) -> Duration {
        Duration::try_from_secs_f64(self.min_elapsed_secs.max(0.0)).unwrap_or_else(|e| {
            log::warn!("Ignoring min_elapsed_secs = {}: {}", self.min_elapsed_secs, e);
            Duration::from_secs_f64(default_min_elapsed_secs())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{ "rule_tag": "NetGuard" }"#).unwrap();

        assert_eq!(config.rule_tag, "NetGuard");
        assert_eq!(config.sample_interval_ms, 1000);
        assert_eq!(config.network_factor, 0.3);
        assert_eq!(config.default_factor, 0.1);
        assert!(config.clamp_negative_rates);
        assert!(config.network_heavy_patterns.contains(&"firefox".to_string()));
        assert!(config.elevation_command.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.preferred_interface = Some("wlan0".to_string());
        config.elevation_command = Some(vec!["sudo".to_string(), "-n".to_string()]);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.preferred_interface.as_deref(), Some("wlan0"));
        assert_eq!(loaded.elevation_command.unwrap(), ["sudo", "-n"]);
    }

    #[test]
    fn test_min_elapsed_out_of_range_uses_default() {
        let config: Config = serde_json::from_str(r#"{ "min_elapsed_secs": 1e30 }"#).unwrap();
        assert_eq!(config.min_elapsed(), Duration::from_millis(100));

        let config: Config = serde_json::from_str(r#"{ "min_elapsed_secs": -3.0 }"#).unwrap();
        assert_eq!(config.min_elapsed(), Duration::ZERO);

        let config: Config = serde_json::from_str(r#"{ "min_elapsed_secs": 0.25 }"#).unwrap();
        assert_eq!(config.min_elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.rule_tag, DEFAULT_RULE_TAG);
    }
}
