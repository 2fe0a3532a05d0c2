//! Validated reads of peer-controlled fields.
//!
//! Every field that came off the network and names something (a peer, a
//! tile, an entity, an enumerated kind) is read through [`Receive`], which
//! checks it against the local view of the session and turns a bad value
//! into [`Corrupt`]. Handlers propagate it with `?`, so a message that fails
//! any check is never partially applied. What happens to the sender is
//! decided in one place by the session.

use std::panic::Location;

use pluto_net::{MessageReader, PeerId};

use crate::protocol::{Cargo, EntityId, Nation};

/// A message failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid {what} (checked at {location})")]
pub struct Corrupt {
    /// The field or condition that did not hold.
    pub what: &'static str,
    /// Where the check was made.
    pub location: &'static Location<'static>,
}

impl Corrupt {
    #[track_caller]
    pub fn new(what: &'static str) -> Self {
        Self {
            what,
            location: Location::caller(),
        }
    }
}

/// The local facts a received field is checked against.
pub trait Lookup {
    /// Number of tiles on the globe.
    fn tile_count(&self) -> usize;
    /// Whether `peer` is currently part of the session.
    fn peer_connected(&self, peer: PeerId) -> bool;
    /// Whether a ship with this id exists.
    fn ship_exists(&self, ship: EntityId) -> bool;
    /// Whether a building with this id exists.
    fn building_exists(&self, building: EntityId) -> bool;
}

/// A decode cursor for one received message, bound to its sender.
pub struct Receive<'a> {
    reader: MessageReader<'a>,
    from: PeerId,
    lookup: &'a dyn Lookup,
}

impl<'a> Receive<'a> {
    pub fn new(reader: MessageReader<'a>, from: PeerId, lookup: &'a dyn Lookup) -> Self {
        Self {
            reader,
            from,
            lookup,
        }
    }

    /// Who sent the message.
    pub fn sender(&self) -> PeerId {
        self.from
    }

    pub fn lookup(&self) -> &dyn Lookup {
        self.lookup
    }

    /// Whether a read ran past the end of the message.
    pub fn overrun(&self) -> bool {
        self.reader.overrun()
    }

    // -- unchecked --------------------------------------------------------------

    pub fn u8(&mut self) -> u8 {
        self.reader.u8()
    }

    pub fn u16(&mut self) -> u16 {
        self.reader.u16()
    }

    pub fn i16(&mut self) -> i16 {
        self.reader.i16()
    }

    pub fn u32(&mut self) -> u32 {
        self.reader.u32()
    }

    pub fn i32(&mut self) -> i32 {
        self.reader.i32()
    }

    pub fn f32(&mut self) -> f32 {
        self.reader.f32()
    }

    pub fn bool(&mut self) -> bool {
        self.reader.u8() != 0
    }

    /// Reads a string and cuts it to at most `max` bytes on a character
    /// boundary. Over-long strings are truncated, not rejected.
    pub fn string(&mut self, max: usize) -> String {
        let mut value = self.reader.string();
        if value.len() > max {
            let mut end = max;
            while !value.is_char_boundary(end) {
                end -= 1;
            }
            value.truncate(end);
        }
        value
    }

    /// An entity id whose existence is checked by the caller.
    pub fn entity(&mut self) -> EntityId {
        EntityId(self.reader.u16())
    }

    // -- checked ------------------------------------------------------------------

    /// A byte in `0..end`.
    #[track_caller]
    pub fn range(&mut self, end: u8, what: &'static str) -> Result<u8, Corrupt> {
        let value = self.reader.u8();
        if value < end {
            Ok(value)
        } else {
            Err(Corrupt::new(what))
        }
    }

    #[track_caller]
    pub fn nation(&mut self) -> Result<Nation, Corrupt> {
        Nation::try_from(self.reader.u8()).map_err(|_| Corrupt::new("nation"))
    }

    #[track_caller]
    pub fn cargo(&mut self) -> Result<Cargo, Corrupt> {
        Cargo::try_from(self.reader.u8()).map_err(|_| Corrupt::new("cargo"))
    }

    /// A client id in range, connected or not. Used where the message itself
    /// introduces the peer.
    #[track_caller]
    pub fn client_id(&mut self) -> Result<PeerId, Corrupt> {
        let peer = PeerId(self.reader.u8());
        if peer.is_client() {
            Ok(peer)
        } else {
            Err(Corrupt::new("peer id"))
        }
    }

    /// A client id in range, or `None` for [`PeerId::INVALID`].
    #[track_caller]
    pub fn client_id_or_none(&mut self) -> Result<Option<PeerId>, Corrupt> {
        let peer = PeerId(self.reader.u8());
        if peer == PeerId::INVALID {
            Ok(None)
        } else if peer.is_client() {
            Ok(Some(peer))
        } else {
            Err(Corrupt::new("peer id"))
        }
    }

    /// A currently connected peer.
    #[track_caller]
    pub fn peer(&mut self) -> Result<PeerId, Corrupt> {
        let peer = PeerId(self.reader.u8());
        if peer.is_client() && self.lookup.peer_connected(peer) {
            Ok(peer)
        } else {
            Err(Corrupt::new("peer"))
        }
    }

    /// A connected peer, or `None` for [`PeerId::INVALID`].
    #[track_caller]
    pub fn peer_or_none(&mut self) -> Result<Option<PeerId>, Corrupt> {
        let peer = PeerId(self.reader.u8());
        if peer == PeerId::INVALID {
            return Ok(None);
        }
        if peer.is_client() && self.lookup.peer_connected(peer) {
            Ok(Some(peer))
        } else {
            Err(Corrupt::new("peer"))
        }
    }

    /// A mask in which every set bit is a currently connected peer.
    #[track_caller]
    pub fn peer_mask(&mut self) -> Result<u32, Corrupt> {
        let mask = self.reader.u32();
        if PeerId::iter_mask(mask).all(|peer| self.lookup.peer_connected(peer)) {
            Ok(mask)
        } else {
            Err(Corrupt::new("peer mask"))
        }
    }

    /// A tile index on the globe.
    #[track_caller]
    pub fn tile(&mut self) -> Result<u16, Corrupt> {
        let tile = self.reader.u16();
        if usize::from(tile) < self.lookup.tile_count() {
            Ok(tile)
        } else {
            Err(Corrupt::new("tile"))
        }
    }

    /// A tile index, or `None` for the wire value `-1`.
    #[track_caller]
    pub fn tile_or_none(&mut self) -> Result<Option<u16>, Corrupt> {
        let tile = self.reader.i16();
        if tile == -1 {
            return Ok(None);
        }
        match u16::try_from(tile) {
            Ok(tile) if usize::from(tile) < self.lookup.tile_count() => Ok(Some(tile)),
            _ => Err(Corrupt::new("tile")),
        }
    }

    /// An existing ship.
    #[track_caller]
    pub fn ship(&mut self) -> Result<EntityId, Corrupt> {
        let ship = self.entity();
        if self.lookup.ship_exists(ship) {
            Ok(ship)
        } else {
            Err(Corrupt::new("ship"))
        }
    }

    /// An existing ship, or `None` for the wire value `-1`.
    #[track_caller]
    pub fn ship_or_none(&mut self) -> Result<Option<EntityId>, Corrupt> {
        let ship = self.entity();
        if ship.0 == EntityId::NONE {
            return Ok(None);
        }
        if self.lookup.ship_exists(ship) {
            Ok(Some(ship))
        } else {
            Err(Corrupt::new("ship"))
        }
    }

    /// An existing building.
    #[track_caller]
    pub fn building(&mut self) -> Result<EntityId, Corrupt> {
        let building = self.entity();
        if self.lookup.building_exists(building) {
            Ok(building)
        } else {
            Err(Corrupt::new("building"))
        }
    }
}
