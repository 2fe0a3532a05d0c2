//! Message dispatch: turn a received packet into a typed message for the
//! role that should handle it.
//!
//! A server only ever looks packets up in [`ClientToken`] and a client only in
//! [`ServerToken`], so neither side can be made to run the other's handlers.
//! Unknown tokens are logged at trace level and skipped. Known tokens whose
//! fields fail validation come back as [`Corrupt`] for the session to act on.

use pluto_net::{Packet, PeerId};

use crate::messages::{ClientMessage, ServerMessage};
use crate::protocol::{ClientToken, ServerToken};
use crate::receive::{Corrupt, Lookup, Receive};

// ---------------------------------------------------------------------------
// Routing outcome
// ---------------------------------------------------------------------------

/// What became of one received packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed<M> {
    /// A complete, validated message.
    Message(M),
    /// The token is not one this side knows.
    Unknown(u8),
    /// The token is known but not accepted in the current state.
    Gated(u8),
}

impl<M> Routed<M> {
    /// The message, if there is one to handle.
    pub fn into_message(self) -> Option<M> {
        match self {
            Self::Message(message) => Some(message),
            Self::Unknown(_) | Self::Gated(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Server side
// ---------------------------------------------------------------------------

/// Routes a packet a client sent to the server.
///
/// After game over only tokens on the [`ClientToken::allowed_after_game_over`]
/// list get through.
pub fn route_client(
    packet: &Packet,
    from: PeerId,
    lookup: &dyn Lookup,
    game_over: bool,
) -> Result<Routed<ClientMessage>, Corrupt> {
    let raw = packet.token();
    let Ok(token) = ClientToken::try_from(raw) else {
        tracing::trace!("Ignoring unknown token {raw} from {from}");
        return Ok(Routed::Unknown(raw));
    };
    if game_over && !token.allowed_after_game_over() {
        tracing::trace!("Ignoring {token:?} from {from} after game over");
        return Ok(Routed::Gated(raw));
    }
    let mut r = Receive::new(packet.reader(), from, lookup);
    let message = ClientMessage::decode(token, &mut r)?;
    if r.overrun() {
        return Err(Corrupt::new("message length"));
    }
    Ok(Routed::Message(message))
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Routes a packet the server sent to this client.
pub fn route_server(packet: &Packet, lookup: &dyn Lookup) -> Result<Routed<ServerMessage>, Corrupt> {
    let raw = packet.token();
    let Ok(token) = ServerToken::try_from(raw) else {
        tracing::trace!("Ignoring unknown token {raw} from server");
        return Ok(Routed::Unknown(raw));
    };
    let mut r = Receive::new(packet.reader(), PeerId::SERVER, lookup);
    let message = ServerMessage::decode(token, &mut r)?;
    if r.overrun() {
        return Err(Corrupt::new("message length"));
    }
    Ok(Routed::Message(message))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::tests::{client_samples, sample_lookup, server_samples};
    use pluto_net::MessageWriter;

    fn raw(token: u8, build: impl FnOnce(&mut MessageWriter)) -> Packet {
        let mut w = MessageWriter::new(token);
        build(&mut w);
        w.finish().unwrap()
    }

    #[test]
    fn test_unknown_token_is_ignored() {
        let lookup = sample_lookup();
        let packet = raw(200, |w| {
            w.u32(7);
        });
        assert_eq!(
            route_client(&packet, PeerId(1), &lookup, false).unwrap(),
            Routed::Unknown(200)
        );
        assert_eq!(route_server(&packet, &lookup).unwrap(), Routed::Unknown(200));
    }

    #[test]
    fn test_tables_are_disjoint_by_role() {
        // Server token 18 (ShipDespawn) has no client counterpart.
        let lookup = sample_lookup();
        let packet = ServerMessage::ShipDespawn {
            ship: crate::protocol::EntityId(3),
        }
        .encode()
        .unwrap();
        assert!(matches!(
            route_client(&packet, PeerId(1), &lookup, false).unwrap(),
            Routed::Unknown(_)
        ));
    }

    #[test]
    fn test_game_over_gates_all_but_allow_list() {
        let lookup = sample_lookup();
        for message in client_samples() {
            let packet = message.encode().unwrap();
            let routed = route_client(&packet, PeerId(1), &lookup, true).unwrap();
            if message.token().allowed_after_game_over() {
                assert_eq!(routed, Routed::Message(message));
            } else {
                assert_eq!(routed, Routed::Gated(message.token().into()));
            }
        }
    }

    #[test]
    fn test_truncated_message_is_corrupt() {
        let lookup = sample_lookup();
        let packet = raw(ClientToken::EchoBack.into(), |w| {
            w.u16(1);
        });
        let err = route_client(&packet, PeerId(1), &lookup, false).unwrap_err();
        assert_eq!(err.what, "message length");
    }

    #[test]
    fn test_trailing_bytes_are_tolerated() {
        let lookup = sample_lookup();
        let packet = raw(ServerToken::EchoRequest.into(), |w| {
            w.u32(5).u8(9);
        });
        assert_eq!(
            route_server(&packet, &lookup).unwrap(),
            Routed::Message(ServerMessage::EchoRequest { data: 5 })
        );
    }

    #[test]
    fn test_every_server_sample_routes() {
        let lookup = sample_lookup();
        for message in server_samples() {
            let packet = message.encode().unwrap();
            let routed = route_server(&packet, &lookup).unwrap();
            assert_eq!(routed.into_message(), Some(message));
        }
    }
}
