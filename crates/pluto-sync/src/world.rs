//! The game-layer interface the session consumes.
//!
//! The session never owns game state. It asks a [`GameWorld`] whether ids
//! and tiles named in received commands are valid, collects the snapshot a
//! newly accepted peer needs, and hands world parameters to the client side
//! when a host assigns them.

use std::time::Duration;

use pluto_config::GameConfig;
use pluto_net::{PEERS_MAX, PeerId};

use crate::messages::ServerMessage;
use crate::protocol::{AggregateKey, EntityId};

/// Smallest and largest globe subdivision a session accepts.
pub const SUBDIV4_MIN: u8 = 3;
pub const SUBDIV4_MAX: u8 = 5;

/// Tiles on a globe with the given subdivision level.
pub fn globe_tiles(subdiv4: u8) -> usize {
    20 << (2 * u32::from(subdiv4))
}

/// Parameters a host sends each client in `Init`.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldParams {
    pub max_players: u8,
    pub globe_subdiv4: u8,
    pub globe_seed: u32,
    pub islands: u16,
    pub island_size: u16,
    pub island_variance: f32,
    pub solar_angle: f32,
    /// Remaining game time, `None` when unlimited.
    pub time_left: Option<Duration>,
}

impl WorldParams {
    /// New-game parameters from settings. A zero seed is replaced by a
    /// random one.
    pub fn from_config(game: &GameConfig, max_players: u32) -> Self {
        let globe_seed = match game.globe_seed {
            0 => rand::random(),
            seed => seed,
        };
        let time_left = (game.time_limit_min > 0)
            .then(|| Duration::from_secs(u64::from(game.time_limit_min) * 60));
        Self {
            max_players: max_players.clamp(1, PEERS_MAX as u32) as u8,
            globe_subdiv4: game.globe_subdiv4.clamp(SUBDIV4_MIN, SUBDIV4_MAX),
            globe_seed,
            islands: u16::try_from(game.islands).unwrap_or(u16::MAX),
            island_size: u16::try_from(game.island_size).unwrap_or(u16::MAX),
            island_variance: game.island_variance,
            solar_angle: 0.0,
            time_left,
        }
    }

    pub fn tile_count(&self) -> usize {
        globe_tiles(self.globe_subdiv4)
    }
}

impl Default for WorldParams {
    fn default() -> Self {
        Self {
            max_players: 12,
            globe_subdiv4: 4,
            globe_seed: 0,
            islands: 0,
            island_size: 0,
            island_variance: -1.0,
            solar_angle: 0.0,
            time_left: None,
        }
    }
}

/// Everything a new peer must be told about one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct EntitySnapshot {
    pub key: AggregateKey,
    /// The spawn message. Sent before any update for any entity.
    pub spawn: ServerMessage,
    /// Follow-up state such as names and health.
    pub updates: Vec<ServerMessage>,
}

/// Game rules and state, as seen by the session.
pub trait GameWorld {
    /// Tiles on the globe. Zero until a globe exists.
    fn tile_count(&self) -> usize;

    fn ship_exists(&self, ship: EntityId) -> bool;

    /// Whether `peer` may command `ship`.
    fn ship_controlled_by(&self, ship: EntityId, peer: PeerId) -> bool;

    fn building_exists(&self, building: EntityId) -> bool;

    /// Score shown in the player list.
    fn score(&self, _peer: PeerId) -> i32 {
        0
    }

    fn solar_angle(&self) -> f32 {
        0.0
    }

    /// Every entity a newly accepted peer needs to know about.
    fn snapshot(&self) -> Vec<EntitySnapshot>;

    /// Client side: build the world described by a host's `Init`.
    fn configure(&mut self, params: &WorldParams);
}

/// A world with a globe and nothing on it. Used by the dedicated host until
/// game rules are attached, and by tests.
#[derive(Debug, Clone, Default)]
pub struct HeadlessWorld {
    params: Option<WorldParams>,
}

impl HeadlessWorld {
    pub fn new(params: WorldParams) -> Self {
        Self {
            params: Some(params),
        }
    }

    pub fn params(&self) -> Option<&WorldParams> {
        self.params.as_ref()
    }
}

impl GameWorld for HeadlessWorld {
    fn tile_count(&self) -> usize {
        self.params.as_ref().map_or(0, WorldParams::tile_count)
    }

    fn ship_exists(&self, _ship: EntityId) -> bool {
        false
    }

    fn ship_controlled_by(&self, _ship: EntityId, _peer: PeerId) -> bool {
        false
    }

    fn building_exists(&self, _building: EntityId) -> bool {
        false
    }

    fn snapshot(&self) -> Vec<EntitySnapshot> {
        Vec::new()
    }

    fn configure(&mut self, params: &WorldParams) {
        self.params = Some(params.clone());
    }
}
