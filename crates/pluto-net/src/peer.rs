//! Peer identifiers and send addressing.
//!
//! A session has [`PEERS_MAX`] client slots. Slot 0 is always the host's own
//! client; the remaining ids above the client range are reserved addressing
//! constants that never name a socket of their own (except [`PeerId::SERVER`],
//! which is the slot a client uses for its connection to the host).

use std::fmt;

/// Number of client slots in a session.
pub const PEERS_MAX: usize = 32;

static_assertions::const_assert!(PEERS_MAX <= 32);

/// A small integer naming a session participant.
///
/// On the wire a peer id is a single byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u8);

impl PeerId {
    /// The host's own local client.
    pub const HOST: PeerId = PeerId(0);
    /// The server, as seen from a client.
    pub const SERVER: PeerId = PeerId(PEERS_MAX as u8);
    /// Connected to a server but not yet told its id.
    pub const UNASSIGNED: PeerId = PeerId(PEERS_MAX as u8 + 1);
    /// Every connected peer.
    pub const BROADCAST: PeerId = PeerId(PEERS_MAX as u8 + 2);
    /// Every peer whose selected flag is set.
    pub const SELECTED: PeerId = PeerId(PEERS_MAX as u8 + 3);
    /// No peer.
    pub const INVALID: PeerId = PeerId(u8::MAX);

    /// Returns `true` for ids `0..PEERS_MAX`.
    pub fn is_client(self) -> bool {
        (self.0 as usize) < PEERS_MAX
    }

    /// The client slot index for this id.
    ///
    /// # Panics
    ///
    /// Panics if the id is one of the reserved constants. Using an addressing
    /// constant as an index is a programming error, never peer input.
    pub fn index(self) -> usize {
        assert!(
            self.is_client(),
            "reserved peer id {self} used as a client index"
        );
        self.0 as usize
    }

    /// Bit for this peer in a per-peer `u32` mask.
    pub fn bit(self) -> u32 {
        1 << self.index()
    }

    /// Iterates the client ids whose bits are set in `mask`.
    pub fn iter_mask(mask: u32) -> impl Iterator<Item = PeerId> {
        (0..PEERS_MAX as u8)
            .map(PeerId)
            .filter(move |peer| mask & peer.bit() != 0)
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            PeerId::SERVER => f.write_str("server"),
            PeerId::UNASSIGNED => f.write_str("unassigned"),
            PeerId::BROADCAST => f.write_str("broadcast"),
            PeerId::SELECTED => f.write_str("selected"),
            PeerId::INVALID => f.write_str("invalid"),
            PeerId(id) => write!(f, "peer {id}"),
        }
    }
}

/// Where a send goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A single peer (or [`PeerId::SERVER`] from a client).
    Peer(PeerId),
    /// Every connected client slot.
    Broadcast,
    /// Every connected client slot except one.
    BroadcastExcept(PeerId),
    /// Every connected client slot with its selected flag set.
    Selected,
}

impl From<PeerId> for Target {
    fn from(peer: PeerId) -> Self {
        match peer {
            PeerId::BROADCAST => Target::Broadcast,
            PeerId::SELECTED => Target::Selected,
            peer => Target::Peer(peer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids_are_not_clients() {
        for id in [
            PeerId::SERVER,
            PeerId::UNASSIGNED,
            PeerId::BROADCAST,
            PeerId::SELECTED,
            PeerId::INVALID,
        ] {
            assert!(!id.is_client(), "{id} should be reserved");
        }
        assert!(PeerId::HOST.is_client());
        assert!(PeerId(31).is_client());
    }

    #[test]
    #[should_panic(expected = "reserved peer id")]
    fn test_reserved_id_as_index_panics() {
        let _ = PeerId::BROADCAST.index();
    }

    #[test]
    fn test_iter_mask_ascending() {
        let peers: Vec<_> = PeerId::iter_mask(0b1010_0001).collect();
        assert_eq!(peers, vec![PeerId(0), PeerId(5), PeerId(7)]);
        assert_eq!(PeerId::iter_mask(0).count(), 0);
        assert_eq!(PeerId::iter_mask(u32::MAX).count(), PEERS_MAX);
    }

    #[test]
    fn test_target_from_constants() {
        assert_eq!(Target::from(PeerId::BROADCAST), Target::Broadcast);
        assert_eq!(Target::from(PeerId::SELECTED), Target::Selected);
        assert_eq!(Target::from(PeerId(3)), Target::Peer(PeerId(3)));
    }
}
