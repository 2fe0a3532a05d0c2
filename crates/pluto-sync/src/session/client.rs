//! The client half of a session. Everything the server says is validated
//! against what this client has been told so far, and anything that does
//! not check out ends the session.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use pluto_net::{NetEvent, Packet, PeerId};

use super::{DisconnectReason, Session, SessionEvent, SessionState, post_client};
use crate::cargo::CargoManifest;
use crate::dispatch::{Routed, route_server};
use crate::messages::{ClientMessage, ServerMessage};
use crate::protocol::{AggregateKey, EntityId, PROTOCOL_VERSION, ServerToken};
use crate::receive::{Corrupt, Lookup};
use crate::roster::Roster;
use crate::world::{GameWorld, WorldParams};

pub(super) struct ClientSide {
    pub(super) state: SessionState,
    pub(super) id: Option<PeerId>,
    pub(super) params: Option<WorldParams>,
    pub(super) roster: Roster,
    pub(super) replicas: BTreeMap<AggregateKey, CargoManifest>,
    /// Entities the server has spawned and not despawned.
    known: BTreeSet<AggregateKey>,
    /// When the socket connected, for the handshake deadline.
    since: Option<Instant>,
    pub(super) game_over: bool,
}

impl Default for ClientSide {
    fn default() -> Self {
        Self {
            state: SessionState::Invalid,
            id: None,
            params: None,
            roster: Roster::new(),
            replicas: BTreeMap::new(),
            known: BTreeSet::new(),
            since: None,
            game_over: false,
        }
    }
}

impl ClientSide {
    pub(super) fn begin(&mut self) {
        self.clear();
        self.state = SessionState::Connecting;
    }

    pub(super) fn clear(&mut self) {
        *self = Self::default();
    }

    fn is_live(&self) -> bool {
        matches!(
            self.state,
            SessionState::Connected | SessionState::Assigned | SessionState::Active
        )
    }
}

impl Lookup for ClientSide {
    fn tile_count(&self) -> usize {
        self.params.as_ref().map_or(0, WorldParams::tile_count)
    }

    fn peer_connected(&self, peer: PeerId) -> bool {
        self.roster.contains(peer)
    }

    fn ship_exists(&self, ship: EntityId) -> bool {
        self.known.contains(&AggregateKey::Ship(ship))
    }

    fn building_exists(&self, building: EntityId) -> bool {
        self.known.contains(&AggregateKey::Building(building))
    }
}

impl Session {
    pub(super) fn client_event(&mut self, event: NetEvent, world: &mut dyn GameWorld) {
        match event {
            NetEvent::Connected(PeerId::SERVER) => self.server_connected(),
            NetEvent::Connected(_) => {}
            NetEvent::ConnectFailed => {
                if self.client.state == SessionState::Connecting {
                    self.client.state = SessionState::Disconnected;
                    self.events.push(SessionEvent::ConnectFailed);
                }
            }
            NetEvent::Disconnected(_) => self.end_client(DisconnectReason::Lost),
            NetEvent::Message(_, packet) => self.client_message(&packet, world),
        }
    }

    fn server_connected(&mut self) {
        if self.client.state != SessionState::Connecting {
            return;
        }
        self.client.state = SessionState::Connected;
        self.client.since = Some(Instant::now());
        let hello = ClientMessage::hello(&self.config.player_name);
        post_client(&mut self.transport, self.config.debug_net, &hello);
        self.events.push(SessionEvent::Connected);
    }

    /// Moves to Disconnected and reports why, once.
    fn end_client(&mut self, reason: DisconnectReason) {
        if matches!(
            self.client.state,
            SessionState::Invalid | SessionState::Disconnected
        ) {
            return;
        }
        match reason {
            DisconnectReason::Local | DisconnectReason::Lost => {
                tracing::info!("Disconnected from server")
            }
            _ => tracing::warn!("Leaving session: {reason:?}"),
        }
        self.client.state = SessionState::Disconnected;
        self.events.push(SessionEvent::Disconnected { reason });
    }

    fn client_message(&mut self, packet: &Packet, world: &mut dyn GameWorld) {
        if !self.client.is_live() {
            return;
        }
        // The host's own client shares the authoritative world.
        if self.transport.is_host()
            && ServerToken::try_from(packet.token()).is_ok_and(ServerToken::is_entity)
        {
            return;
        }

        let message = match route_server(packet, &self.client) {
            Ok(Routed::Message(message)) => message,
            Ok(_) => return,
            Err(corrupt) => {
                self.server_corrupt(corrupt);
                return;
            }
        };
        if self.config.debug_net {
            tracing::debug!("server -> {message:?}");
        }
        if let Err(corrupt) = self.server_notification(message, world) {
            self.server_corrupt(corrupt);
        }
    }

    fn server_corrupt(&mut self, corrupt: Corrupt) {
        tracing::error!("Server sent invalid data: {corrupt}");
        self.events.push(SessionEvent::Popup {
            focus: None,
            token: "g-client-invalid".to_string(),
            message: "Server sent invalid data.".to_string(),
        });
        self.end_client(DisconnectReason::Corrupt);
        self.transport.disconnect();
    }

    fn server_notification(
        &mut self,
        message: ServerMessage,
        world: &mut dyn GameWorld,
    ) -> Result<(), Corrupt> {
        match message {
            ServerMessage::Init(init) => {
                if self.client.state != SessionState::Connected {
                    return Err(Corrupt::new("repeated init"));
                }
                if !self.transport.is_host() {
                    world.configure(&init.params);
                }
                tracing::info!(
                    "Joined as {} ({} tiles, up to {} players)",
                    init.peer,
                    init.params.tile_count(),
                    init.params.max_players
                );
                self.client.id = Some(init.peer);
                self.client.params = Some(init.params.clone());
                self.client.state = SessionState::Assigned;
                self.events.push(SessionEvent::Joined {
                    id: init.peer,
                    params: init.params,
                });
            }

            ServerMessage::InitIncompatible { protocol } => {
                self.events.push(SessionEvent::Popup {
                    focus: None,
                    token: "g-incompatible".to_string(),
                    message: format!(
                        "Server uses protocol {protocol}, this client uses {PROTOCOL_VERSION}."
                    ),
                });
                self.end_client(DisconnectReason::Incompatible(protocol));
                self.transport.disconnect();
            }

            ServerMessage::Ready => {
                if self.client.state != SessionState::Assigned {
                    return Err(Corrupt::new("ready before init"));
                }
                self.client.state = SessionState::Active;
                self.events.push(SessionEvent::Ready);
            }

            ServerMessage::EchoRequest { data } => {
                let reply = ClientMessage::EchoBack { data };
                post_client(&mut self.transport, self.config.debug_net, &reply);
            }

            ServerMessage::Connected { peer } => {
                self.client.roster.join(peer);
                self.events.push(SessionEvent::PlayerConnected { peer });
            }

            ServerMessage::Client { peer, nation, name } => {
                let entry = self.client.roster.join(peer);
                entry.nation = nation;
                entry.name = name;
            }

            ServerMessage::Disconnected { peer, kicked } => {
                self.client.roster.leave(peer);
                self.events.push(SessionEvent::PlayerLeft { peer, kicked });
            }

            ServerMessage::Name { peer, name } => {
                if let Some(entry) = self.client.roster.get_mut(peer) {
                    entry.name = name.clone();
                }
                self.events.push(SessionEvent::Renamed { peer, name });
            }

            ServerMessage::Affiliate { peer, nation, focus } => {
                if let Some(entry) = self.client.roster.get_mut(peer) {
                    entry.nation = nation;
                }
                self.events.push(SessionEvent::Affiliated { peer, nation, focus });
            }

            ServerMessage::GameOver { nation, winner } => {
                self.client.game_over = true;
                self.events.push(SessionEvent::GameOver { nation, winner });
            }

            ServerMessage::ClientUpdate { stats } => {
                for row in &stats {
                    if let Some(entry) = self.client.roster.get_mut(row.peer) {
                        entry.gold = row.gold;
                        entry.ping = row.ping;
                    }
                }
                self.events.push(SessionEvent::ClientUpdate(stats));
            }

            ServerMessage::Chat { from, text } => {
                self.events.push(SessionEvent::Chat { from, text });
            }

            ServerMessage::Privmsg { from, text, .. } => {
                self.events.push(SessionEvent::Private { from, text });
            }

            ServerMessage::Popup {
                focus,
                token,
                message,
            } => {
                self.events.push(SessionEvent::Popup {
                    focus,
                    token,
                    message,
                });
            }

            entity => self.entity_notification(entity),
        }
        Ok(())
    }

    /// Tracks which entities exist and applies replicated cargo.
    fn entity_notification(&mut self, message: ServerMessage) {
        let Some(key) = message.entity() else {
            return;
        };
        match &message {
            ServerMessage::ShipSpawn { .. } | ServerMessage::BuildingSpawn { .. } => {
                self.client.known.insert(key);
            }
            ServerMessage::ShipDespawn { .. } => {
                self.client.known.remove(&key);
                self.client.replicas.remove(&key);
            }
            ServerMessage::ShipCargo { update, .. } | ServerMessage::BuildingCargo { update, .. } => {
                update.apply(self.client.replicas.entry(key).or_default());
                self.events.push(SessionEvent::Replicated(key));
                return;
            }
            _ => {}
        }
        self.events.push(SessionEvent::World(message));
    }

    pub(super) fn client_update(&mut self) {
        if !matches!(
            self.client.state,
            SessionState::Connected | SessionState::Assigned
        ) {
            return;
        }
        if let Some(since) = self.client.since
            && since.elapsed() > self.config.handshake_timeout
        {
            self.end_client(DisconnectReason::Timeout);
            self.transport.disconnect();
        }
    }
}
