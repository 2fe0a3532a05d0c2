//! Configuration for Pluto hosts and clients.
//!
//! Settings persist to disk as a RON file and can be overridden from the
//! command line. Sections missing from the file fall back to their defaults,
//! so older files keep loading as new settings are added.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    CONFIG_FILE, Config, DebugConfig, GameConfig, MasterConfig, NetworkConfig, default_config_dir,
};
pub use error::ConfigError;
