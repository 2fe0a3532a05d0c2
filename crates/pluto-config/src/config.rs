//! Settings sections, their defaults, and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the settings file inside the config directory.
pub const CONFIG_FILE: &str = "pluto.ron";

/// All persistent settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Connection and hosting.
    pub network: NetworkConfig,
    /// New-game and player settings.
    pub game: GameConfig,
    /// Master server listing.
    pub master: MasterConfig,
    /// Logging and diagnostics.
    pub debug: DebugConfig,
}

/// Connection and hosting settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address a client connects to when none is given.
    pub server_address: String,
    /// Port used for hosting and as the default when joining.
    pub server_port: u16,
    /// How long a connection attempt may take.
    pub connect_timeout_ms: u64,
    /// How long a new client has to complete the handshake.
    pub handshake_timeout_ms: u64,
    /// Highest number of clients a host admits, its own included.
    pub max_players: u32,
    /// Bytes a single peer may have queued before it is dropped.
    pub outgoing_queue_max: usize,
    /// Interval between echo requests. Zero disables them.
    pub echo_rate_ms: u64,
    /// Trace every message sent and received.
    pub debug_net: bool,
}

/// New-game settings and the local player's identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    /// Name requested when joining.
    pub player_name: String,
    /// Game length in minutes. Zero means no limit.
    pub time_limit_min: u32,
    /// Seed for globe generation.
    pub globe_seed: u32,
    /// Globe subdivision level.
    pub globe_subdiv4: u8,
    /// Island count. Zero picks one from the globe size.
    pub islands: u32,
    /// Island size. Zero picks one from the globe size.
    pub island_size: u32,
    /// Island size variance. Negative picks the default.
    pub island_variance: f32,
}

/// Master server used to advertise hosted games.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MasterConfig {
    /// Master host, optionally with `:port`. Empty disables publishing.
    pub server: String,
    /// Path that receives heartbeats.
    pub url: String,
    /// Seconds between heartbeats.
    pub publish_interval_s: u64,
    /// Upper bound on a single heartbeat exchange.
    pub timeout_ms: u64,
}

/// Logging and diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log filter, e.g. `"info"` or `"pluto_sync=debug"`.
    pub log_level: String,
    /// Directory for log files. `None` uses the platform default.
    pub log_dir: Option<PathBuf>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            server_address: "127.0.0.1".to_string(),
            server_port: 32500,
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 10_000,
            max_players: 12,
            outgoing_queue_max: 32_000,
            echo_rate_ms: 10_000,
            debug_net: false,
        }
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            player_name: "Newbie".to_string(),
            time_limit_min: 45,
            globe_seed: 0,
            globe_subdiv4: 4,
            islands: 0,
            island_size: 0,
            island_variance: -1.0,
        }
    }
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            server: "master.plutocracy.ca".to_string(),
            url: "/".to_string(),
            publish_interval_s: 300,
            timeout_ms: 1_000,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Platform config directory for Pluto, if there is one.
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pluto"))
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

impl Config {
    /// Loads `pluto.ron` from `config_dir`, writing defaults if it is missing.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        if !path.exists() {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Wrote default settings to {}", path.display());
            return Ok(config);
        }
        let config = Self::read(&path)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(config)
    }

    /// Writes `pluto.ron` into `config_dir`, creating the directory.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let path = config_dir.join(CONFIG_FILE);
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(2)
            .enumerate_arrays(false);
        let text = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Serialize)?;

        std::fs::write(&path, text).map_err(|source| ConfigError::Write { path, source })
    }

    /// Re-reads the file and returns the new settings if they differ.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let fresh = Self::read(&config_dir.join(CONFIG_FILE))?;
        if &fresh == self {
            return Ok(None);
        }
        log::info!("Settings changed on disk");
        Ok(Some(fresh))
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
