//! Command-line overrides.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Options shared by the Pluto binaries. Anything given here wins over
/// `pluto.ron` for this run only.
#[derive(Parser, Debug, Default)]
#[command(name = "pluto-server", about = "Dedicated Pluto host")]
pub struct CliArgs {
    /// Address to join.
    #[arg(long)]
    pub server: Option<String>,

    /// Port to host on.
    #[arg(long)]
    pub port: Option<u16>,

    /// Player cap, the host's own client included.
    #[arg(long)]
    pub players: Option<u32>,

    /// Player name.
    #[arg(long)]
    pub name: Option<String>,

    /// Log filter (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Master server, or an empty string to stay unlisted.
    #[arg(long)]
    pub master: Option<String>,

    /// Directory holding `pluto.ron`.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl CliArgs {
    /// Directory to load settings from.
    pub fn config_dir(&self) -> Option<PathBuf> {
        self.config.clone().or_else(crate::default_config_dir)
    }
}

impl Config {
    /// Applies command-line overrides on top of loaded settings.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(server) = &args.server {
            self.network.server_address = server.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
        }
        if let Some(players) = args.players {
            self.network.max_players = players;
        }
        if let Some(name) = &args.name {
            self.game.player_name = name.clone();
        }
        if let Some(level) = &args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(master) = &args.master {
            self.master.server = master.clone();
        }
    }
}
