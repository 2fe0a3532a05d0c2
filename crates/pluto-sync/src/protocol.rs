//! Token tables and enumerated argument types shared by both ends.
//!
//! Client-to-server and server-to-client tokens are separate enums so a
//! message can only ever be interpreted by the role it was meant for. Both
//! tables are tied to [`PROTOCOL_VERSION`]: changing a token or a field list
//! means bumping it.

use std::fmt;

/// Exchanged at handshake. Peers with different versions never share a session.
pub const PROTOCOL_VERSION: u16 = 7;

/// Longest player or ship name in bytes.
pub const NAME_MAX: usize = 15;

/// Longest chat line in bytes.
pub const CHAT_MAX: usize = 255;

/// Number of ring icons a client may place on a tile.
pub const RING_ICONS: u8 = 30;

/// Name given to players who do not pick one.
pub const DEFAULT_NAME: &str = "Newbie";

macro_rules! token_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)* }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum $name {
            $($(#[$vmeta])* $variant = $value,)*
        }

        impl TryFrom<u8> for $name {
            type Error = u8;

            fn try_from(value: u8) -> Result<Self, u8> {
                match value {
                    $($value => Ok(Self::$variant),)*
                    other => Err(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(token: $name) -> u8 {
                token as u8
            }
        }
    };
}

token_enum! {
    /// Commands a client sends to the server.
    ClientToken {
        /// Protocol version and requested name, sent once on connect.
        Hello = 1,
        Affiliate = 2,
        Name = 3,
        EchoBack = 4,
        Chat = 5,
        Privmsg = 6,
        ShipMove = 7,
        ShipName = 8,
        ShipPrices = 9,
        ShipBuy = 10,
        ShipDrop = 11,
        TileRing = 12,
    }
}

token_enum! {
    /// Notifications the server sends to clients.
    ServerToken {
        /// Protocol version, assigned id and world parameters.
        Init = 1,
        /// One roster entry of the initial snapshot.
        Client = 2,
        /// End of the initial snapshot.
        Ready = 3,
        EchoRequest = 4,
        Affiliate = 5,
        Connected = 6,
        Disconnected = 7,
        Name = 8,
        GameOver = 9,
        ClientUpdate = 10,
        Chat = 11,
        Privmsg = 12,
        Popup = 13,
        ShipSpawn = 14,
        ShipName = 15,
        ShipOwner = 16,
        ShipState = 17,
        ShipDespawn = 18,
        ShipCargo = 19,
        BuildingSpawn = 20,
        BuildingCargo = 21,
    }
}

impl ClientToken {
    /// Whether the server still accepts this command after the game ended.
    pub fn allowed_after_game_over(self) -> bool {
        matches!(self, Self::Hello | Self::Chat | Self::Name)
    }
}

impl ServerToken {
    /// Messages about ships and buildings. The host's own client already
    /// shares the authoritative world and skips them.
    pub fn is_entity(self) -> bool {
        matches!(
            self,
            Self::ShipSpawn
                | Self::ShipName
                | Self::ShipOwner
                | Self::ShipState
                | Self::ShipDespawn
                | Self::ShipCargo
                | Self::BuildingSpawn
                | Self::BuildingCargo
        )
    }
}

token_enum! {
    /// Player factions.
    Nation {
        None = 0,
        Red = 1,
        Green = 2,
        Blue = 3,
        Pirate = 4,
    }
}

impl Default for Nation {
    fn default() -> Self {
        Self::None
    }
}

token_enum! {
    /// Tradeable goods, in cargo manifest order.
    Cargo {
        Gold = 0,
        Crew = 1,
        Rations = 2,
        Wood = 3,
        Iron = 4,
    }
}

impl Cargo {
    /// Number of cargo kinds.
    pub const COUNT: usize = 5;

    /// All kinds in manifest order.
    pub const ALL: [Cargo; Cargo::COUNT] = [
        Cargo::Gold,
        Cargo::Crew,
        Cargo::Rations,
        Cargo::Wood,
        Cargo::Iron,
    ];
}

/// Identifier of a ship or building, unique within its kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u16);

impl EntityId {
    /// Wire value meaning "no entity" where one is optional.
    pub const NONE: u16 = u16::MAX;
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Names a replicated aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateKey {
    /// A ship's cargo manifest.
    Ship(EntityId),
    /// A building's store.
    Building(EntityId),
}
