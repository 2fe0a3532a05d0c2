//! Typed messages and their field layouts.
//!
//! Each variant lists its fields in wire order. `encode` and `decode` are
//! written side by side so the two ends of every token stay in step. Decoding
//! validates as it goes and returns the whole message or nothing.

use std::time::Duration;

use pluto_net::{CodecError, MessageWriter, Packet, PeerId};

use crate::cargo::{CargoManifest, CargoSlot};
use crate::protocol::{
    AggregateKey, CHAT_MAX, Cargo, ClientToken, EntityId, NAME_MAX, Nation, PROTOCOL_VERSION,
    RING_ICONS, ServerToken,
};
use crate::receive::{Corrupt, Receive};
use crate::replication::FieldUpdate;
use crate::world::{SUBDIV4_MAX, SUBDIV4_MIN, WorldParams};

/// Longest popup token in bytes.
pub const POPUP_TOKEN_MAX: usize = 31;

fn opt_tile(tile: Option<u16>) -> i16 {
    tile.and_then(|t| i16::try_from(t).ok()).unwrap_or(-1)
}

fn opt_peer(peer: Option<PeerId>) -> u8 {
    peer.unwrap_or(PeerId::INVALID).0
}

fn opt_price(price: Option<i16>) -> i16 {
    price.unwrap_or(-1)
}

// ---------------------------------------------------------------------------
// Client to server
// ---------------------------------------------------------------------------

/// Commands sent by clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Hello { protocol: u16, name: String },
    Affiliate { nation: Nation },
    Name { name: String },
    EchoBack { data: u32 },
    Chat { text: String },
    Privmsg { recipients: u32, text: String },
    ShipMove { ship: EntityId, tile: u16 },
    ShipName { ship: EntityId, name: String },
    ShipPrices {
        ship: EntityId,
        cargo: Cargo,
        buy: Option<i16>,
        sell: Option<i16>,
        minimum: i16,
        maximum: i16,
    },
    ShipBuy {
        ship: EntityId,
        tile: u16,
        cargo: Cargo,
        amount: i16,
    },
    ShipDrop {
        ship: EntityId,
        cargo: Cargo,
        amount: i16,
    },
    TileRing { tile: u16, icon: u8 },
}

impl ClientMessage {
    /// The handshake greeting for this build.
    pub fn hello(name: &str) -> Self {
        Self::Hello {
            protocol: PROTOCOL_VERSION,
            name: name.to_string(),
        }
    }

    pub fn token(&self) -> ClientToken {
        match self {
            Self::Hello { .. } => ClientToken::Hello,
            Self::Affiliate { .. } => ClientToken::Affiliate,
            Self::Name { .. } => ClientToken::Name,
            Self::EchoBack { .. } => ClientToken::EchoBack,
            Self::Chat { .. } => ClientToken::Chat,
            Self::Privmsg { .. } => ClientToken::Privmsg,
            Self::ShipMove { .. } => ClientToken::ShipMove,
            Self::ShipName { .. } => ClientToken::ShipName,
            Self::ShipPrices { .. } => ClientToken::ShipPrices,
            Self::ShipBuy { .. } => ClientToken::ShipBuy,
            Self::ShipDrop { .. } => ClientToken::ShipDrop,
            Self::TileRing { .. } => ClientToken::TileRing,
        }
    }

    /// The ship this command is about, if any.
    pub fn ship(&self) -> Option<EntityId> {
        match self {
            Self::ShipMove { ship, .. }
            | Self::ShipName { ship, .. }
            | Self::ShipPrices { ship, .. }
            | Self::ShipBuy { ship, .. }
            | Self::ShipDrop { ship, .. } => Some(*ship),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Packet, CodecError> {
        let mut w = MessageWriter::new(self.token().into());
        match self {
            Self::Hello { protocol, name } => {
                w.u16(*protocol).string(name);
            }
            Self::Affiliate { nation } => {
                w.u8((*nation).into());
            }
            Self::Name { name } => {
                w.string(name);
            }
            Self::EchoBack { data } => {
                w.u32(*data);
            }
            Self::Chat { text } => {
                w.string(text);
            }
            Self::Privmsg { recipients, text } => {
                w.u32(*recipients).string(text);
            }
            Self::ShipMove { ship, tile } => {
                w.u16(ship.0).u16(*tile);
            }
            Self::ShipName { ship, name } => {
                w.u16(ship.0).string(name);
            }
            Self::ShipPrices {
                ship,
                cargo,
                buy,
                sell,
                minimum,
                maximum,
            } => {
                w.u16(ship.0)
                    .u8((*cargo).into())
                    .i16(opt_price(*buy))
                    .i16(opt_price(*sell))
                    .i16(*minimum)
                    .i16(*maximum);
            }
            Self::ShipBuy {
                ship,
                tile,
                cargo,
                amount,
            } => {
                w.u16(ship.0).u16(*tile).u8((*cargo).into()).i16(*amount);
            }
            Self::ShipDrop {
                ship,
                cargo,
                amount,
            } => {
                w.u16(ship.0).u8((*cargo).into()).i16(*amount);
            }
            Self::TileRing { tile, icon } => {
                w.u16(*tile).u8(*icon);
            }
        }
        w.finish()
    }

    /// Reads the fields of a `token` message from a client.
    ///
    /// Ship ids are only range-free reads here. Whether the sender controls
    /// the ship is a game rule checked by the server before acting.
    pub fn decode(token: ClientToken, r: &mut Receive<'_>) -> Result<Self, Corrupt> {
        Ok(match token {
            ClientToken::Hello => Self::Hello {
                protocol: r.u16(),
                name: r.string(NAME_MAX),
            },
            ClientToken::Affiliate => Self::Affiliate {
                nation: r.nation()?,
            },
            ClientToken::Name => Self::Name {
                name: r.string(NAME_MAX),
            },
            ClientToken::EchoBack => Self::EchoBack { data: r.u32() },
            ClientToken::Chat => Self::Chat {
                text: r.string(CHAT_MAX),
            },
            // Recipients may have left while this was in flight; the host
            // filters the mask against its own roster.
            ClientToken::Privmsg => Self::Privmsg {
                recipients: r.u32(),
                text: r.string(CHAT_MAX),
            },
            ClientToken::ShipMove => Self::ShipMove {
                ship: r.entity(),
                tile: r.tile()?,
            },
            ClientToken::ShipName => Self::ShipName {
                ship: r.entity(),
                name: r.string(NAME_MAX),
            },
            ClientToken::ShipPrices => Self::ShipPrices {
                ship: r.entity(),
                cargo: r.cargo()?,
                buy: price(r.i16()),
                sell: price(r.i16()),
                minimum: r.i16(),
                maximum: r.i16(),
            },
            ClientToken::ShipBuy => Self::ShipBuy {
                ship: r.entity(),
                tile: r.tile()?,
                cargo: r.cargo()?,
                amount: r.i16(),
            },
            ClientToken::ShipDrop => Self::ShipDrop {
                ship: r.entity(),
                cargo: r.cargo()?,
                amount: r.i16(),
            },
            ClientToken::TileRing => Self::TileRing {
                tile: r.tile()?,
                icon: r.range(RING_ICONS, "ring icon")?,
            },
        })
    }
}

fn price(value: i16) -> Option<i16> {
    (value >= 0).then_some(value)
}

// ---------------------------------------------------------------------------
// Server to client
// ---------------------------------------------------------------------------

/// Handshake parameters for one client.
#[derive(Debug, Clone, PartialEq)]
pub struct Init {
    /// The id the host assigned.
    pub peer: PeerId,
    pub params: WorldParams,
}

/// One row of the periodic player list update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub peer: PeerId,
    pub gold: i32,
    /// Round-trip time in milliseconds.
    pub ping: u16,
}

/// Notifications sent by the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Init(Init),
    /// An `Init` from a host running a different protocol. Only the version
    /// is read, since nothing else about the message can be trusted.
    InitIncompatible {
        protocol: u16,
    },
    Client {
        peer: PeerId,
        nation: Nation,
        name: String,
    },
    Ready,
    EchoRequest {
        data: u32,
    },
    Affiliate {
        peer: PeerId,
        nation: Nation,
        focus: Option<u16>,
    },
    Connected {
        peer: PeerId,
    },
    Disconnected {
        peer: PeerId,
        kicked: bool,
    },
    Name {
        peer: PeerId,
        name: String,
    },
    GameOver {
        nation: Nation,
        winner: Option<PeerId>,
    },
    ClientUpdate {
        stats: Vec<ClientStats>,
    },
    Chat {
        /// `None` for messages from the host itself.
        from: Option<PeerId>,
        text: String,
    },
    Privmsg {
        from: PeerId,
        recipients: u32,
        text: String,
    },
    Popup {
        focus: Option<u16>,
        token: String,
        message: String,
    },
    ShipSpawn {
        ship: EntityId,
        owner: Option<PeerId>,
        tile: u16,
        class: u8,
    },
    ShipName {
        ship: EntityId,
        name: String,
    },
    ShipOwner {
        ship: EntityId,
        owner: Option<PeerId>,
    },
    ShipState {
        ship: EntityId,
        health: u8,
        crew: i16,
        boarding: u8,
        boarding_ship: Option<EntityId>,
    },
    ShipDespawn {
        ship: EntityId,
    },
    ShipCargo {
        ship: EntityId,
        update: FieldUpdate<CargoSlot>,
    },
    BuildingSpawn {
        building: EntityId,
        tile: u16,
        class: u8,
        owner: Option<PeerId>,
    },
    BuildingCargo {
        building: EntityId,
        update: FieldUpdate<CargoSlot>,
    },
}

impl ServerMessage {
    /// A popup with no map focus.
    pub fn popup(token: &str, message: &str) -> Self {
        Self::Popup {
            focus: None,
            token: token.to_string(),
            message: message.to_string(),
        }
    }

    /// A cargo update for the aggregate named by `key`.
    pub fn cargo(key: AggregateKey, update: FieldUpdate<CargoSlot>) -> Self {
        match key {
            AggregateKey::Ship(ship) => Self::ShipCargo { ship, update },
            AggregateKey::Building(building) => Self::BuildingCargo { building, update },
        }
    }

    pub fn token(&self) -> ServerToken {
        match self {
            Self::Init(_) | Self::InitIncompatible { .. } => ServerToken::Init,
            Self::Client { .. } => ServerToken::Client,
            Self::Ready => ServerToken::Ready,
            Self::EchoRequest { .. } => ServerToken::EchoRequest,
            Self::Affiliate { .. } => ServerToken::Affiliate,
            Self::Connected { .. } => ServerToken::Connected,
            Self::Disconnected { .. } => ServerToken::Disconnected,
            Self::Name { .. } => ServerToken::Name,
            Self::GameOver { .. } => ServerToken::GameOver,
            Self::ClientUpdate { .. } => ServerToken::ClientUpdate,
            Self::Chat { .. } => ServerToken::Chat,
            Self::Privmsg { .. } => ServerToken::Privmsg,
            Self::Popup { .. } => ServerToken::Popup,
            Self::ShipSpawn { .. } => ServerToken::ShipSpawn,
            Self::ShipName { .. } => ServerToken::ShipName,
            Self::ShipOwner { .. } => ServerToken::ShipOwner,
            Self::ShipState { .. } => ServerToken::ShipState,
            Self::ShipDespawn { .. } => ServerToken::ShipDespawn,
            Self::ShipCargo { .. } => ServerToken::ShipCargo,
            Self::BuildingSpawn { .. } => ServerToken::BuildingSpawn,
            Self::BuildingCargo { .. } => ServerToken::BuildingCargo,
        }
    }

    /// The entity this message is about, if any.
    pub fn entity(&self) -> Option<AggregateKey> {
        match self {
            Self::ShipSpawn { ship, .. }
            | Self::ShipName { ship, .. }
            | Self::ShipOwner { ship, .. }
            | Self::ShipState { ship, .. }
            | Self::ShipDespawn { ship }
            | Self::ShipCargo { ship, .. } => Some(AggregateKey::Ship(*ship)),
            Self::BuildingSpawn { building, .. } | Self::BuildingCargo { building, .. } => {
                Some(AggregateKey::Building(*building))
            }
            _ => None,
        }
    }

    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::ShipSpawn { .. } | Self::BuildingSpawn { .. })
    }

    pub fn encode(&self) -> Result<Packet, CodecError> {
        let mut w = MessageWriter::new(self.token().into());
        match self {
            Self::Init(init) => {
                let p = &init.params;
                let time_left = p
                    .time_left
                    .map_or(-1, |t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX));
                w.u16(PROTOCOL_VERSION)
                    .u8(init.peer.0)
                    .u8(p.max_players)
                    .u8(p.globe_subdiv4)
                    .u32(p.globe_seed)
                    .u16(p.islands)
                    .u16(p.island_size)
                    .f32(p.island_variance)
                    .f32(p.solar_angle)
                    .i32(time_left);
            }
            Self::InitIncompatible { protocol } => {
                w.u16(*protocol);
            }
            Self::Client { peer, nation, name } => {
                w.u8(peer.0).u8((*nation).into()).string(name);
            }
            Self::Ready => {}
            Self::EchoRequest { data } => {
                w.u32(*data);
            }
            Self::Affiliate {
                peer,
                nation,
                focus,
            } => {
                w.u8(peer.0).u8((*nation).into()).i16(opt_tile(*focus));
            }
            Self::Connected { peer } => {
                w.u8(peer.0);
            }
            Self::Disconnected { peer, kicked } => {
                w.u8(peer.0).u8(u8::from(*kicked));
            }
            Self::Name { peer, name } => {
                w.u8(peer.0).string(name);
            }
            Self::GameOver { nation, winner } => {
                w.u8((*nation).into()).u8(opt_peer(*winner));
            }
            Self::ClientUpdate { stats } => {
                let mask = stats.iter().fold(0, |mask, s| mask | s.peer.bit());
                w.u32(mask);
                for peer in PeerId::iter_mask(mask) {
                    if let Some(s) = stats.iter().find(|s| s.peer == peer) {
                        w.i32(s.gold).u16(s.ping);
                    }
                }
            }
            Self::Chat { from, text } => {
                w.u8(opt_peer(*from)).string(text);
            }
            Self::Privmsg {
                from,
                recipients,
                text,
            } => {
                w.u8(from.0).u32(*recipients).string(text);
            }
            Self::Popup {
                focus,
                token,
                message,
            } => {
                w.i16(opt_tile(*focus)).string(token).string(message);
            }
            Self::ShipSpawn {
                ship,
                owner,
                tile,
                class,
            } => {
                w.u16(ship.0).u8(opt_peer(*owner)).u16(*tile).u8(*class);
            }
            Self::ShipName { ship, name } => {
                w.u16(ship.0).string(name);
            }
            Self::ShipOwner { ship, owner } => {
                w.u16(ship.0).u8(opt_peer(*owner));
            }
            Self::ShipState {
                ship,
                health,
                crew,
                boarding,
                boarding_ship,
            } => {
                w.u16(ship.0)
                    .u8(*health)
                    .i16(*crew)
                    .u8(*boarding)
                    .u16(boarding_ship.map_or(EntityId::NONE, |s| s.0));
            }
            Self::ShipDespawn { ship } => {
                w.u16(ship.0);
            }
            Self::ShipCargo { ship, update } => {
                w.u16(ship.0);
                update.write(&mut w);
            }
            Self::BuildingSpawn {
                building,
                tile,
                class,
                owner,
            } => {
                w.u16(building.0).u16(*tile).u8(*class).u8(opt_peer(*owner));
            }
            Self::BuildingCargo { building, update } => {
                w.u16(building.0);
                update.write(&mut w);
            }
        }
        w.finish()
    }

    /// Reads the fields of a `token` message from the server.
    pub fn decode(token: ServerToken, r: &mut Receive<'_>) -> Result<Self, Corrupt> {
        Ok(match token {
            ServerToken::Init => {
                let protocol = r.u16();
                if protocol != PROTOCOL_VERSION {
                    return Ok(Self::InitIncompatible { protocol });
                }
                Self::Init(decode_init(r)?)
            }
            ServerToken::Client => Self::Client {
                peer: r.client_id()?,
                nation: r.nation()?,
                name: r.string(NAME_MAX),
            },
            ServerToken::Ready => Self::Ready,
            ServerToken::EchoRequest => Self::EchoRequest { data: r.u32() },
            ServerToken::Affiliate => Self::Affiliate {
                peer: r.peer()?,
                nation: r.nation()?,
                focus: r.tile_or_none()?,
            },
            ServerToken::Connected => Self::Connected {
                peer: r.client_id()?,
            },
            ServerToken::Disconnected => Self::Disconnected {
                peer: r.peer()?,
                kicked: r.bool(),
            },
            ServerToken::Name => Self::Name {
                peer: r.peer()?,
                name: r.string(NAME_MAX),
            },
            ServerToken::GameOver => Self::GameOver {
                nation: r.nation()?,
                winner: r.client_id_or_none()?,
            },
            ServerToken::ClientUpdate => {
                let mask = r.peer_mask()?;
                let stats = PeerId::iter_mask(mask)
                    .map(|peer| ClientStats {
                        peer,
                        gold: r.i32(),
                        ping: r.u16(),
                    })
                    .collect();
                Self::ClientUpdate { stats }
            }
            ServerToken::Chat => Self::Chat {
                from: r.client_id_or_none()?,
                text: r.string(CHAT_MAX),
            },
            ServerToken::Privmsg => Self::Privmsg {
                from: r.client_id()?,
                recipients: r.peer_mask()?,
                text: r.string(CHAT_MAX),
            },
            ServerToken::Popup => Self::Popup {
                focus: r.tile_or_none()?,
                token: r.string(POPUP_TOKEN_MAX),
                message: r.string(CHAT_MAX),
            },
            ServerToken::ShipSpawn => {
                let ship = r.entity();
                if ship.0 == EntityId::NONE {
                    return Err(Corrupt::new("ship id"));
                }
                Self::ShipSpawn {
                    ship,
                    owner: r.client_id_or_none()?,
                    tile: r.tile()?,
                    class: r.u8(),
                }
            }
            ServerToken::ShipName => Self::ShipName {
                ship: r.ship()?,
                name: r.string(NAME_MAX),
            },
            ServerToken::ShipOwner => Self::ShipOwner {
                ship: r.ship()?,
                owner: r.client_id_or_none()?,
            },
            ServerToken::ShipState => Self::ShipState {
                ship: r.ship()?,
                health: r.u8(),
                crew: r.i16(),
                boarding: r.u8(),
                boarding_ship: r.ship_or_none()?,
            },
            ServerToken::ShipDespawn => Self::ShipDespawn { ship: r.ship()? },
            ServerToken::ShipCargo => Self::ShipCargo {
                ship: r.ship()?,
                update: FieldUpdate::read::<CargoManifest>(r)?,
            },
            ServerToken::BuildingSpawn => {
                let building = r.entity();
                if building.0 == EntityId::NONE {
                    return Err(Corrupt::new("building id"));
                }
                Self::BuildingSpawn {
                    building,
                    tile: r.tile()?,
                    class: r.u8(),
                    owner: r.client_id_or_none()?,
                }
            }
            ServerToken::BuildingCargo => Self::BuildingCargo {
                building: r.building()?,
                update: FieldUpdate::read::<CargoManifest>(r)?,
            },
        })
    }
}

/// The rest of an `Init` once the protocol version matched.
fn decode_init(r: &mut Receive<'_>) -> Result<Init, Corrupt> {
    let peer = r.client_id()?;
    let max_players = r.u8();
    if max_players == 0 || usize::from(max_players) > pluto_net::PEERS_MAX {
        return Err(Corrupt::new("player limit"));
    }
    let globe_subdiv4 = r.u8();
    if !(SUBDIV4_MIN..=SUBDIV4_MAX).contains(&globe_subdiv4) {
        return Err(Corrupt::new("globe size"));
    }
    let params = WorldParams {
        max_players,
        globe_subdiv4,
        globe_seed: r.u32(),
        islands: r.u16(),
        island_size: r.u16(),
        island_variance: r.f32(),
        solar_angle: r.f32(),
        time_left: u64::try_from(r.i32()).ok().map(Duration::from_millis),
    };
    Ok(Init { peer, params })
}
