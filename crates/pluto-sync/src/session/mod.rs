//! Session lifecycle for a host-authoritative game.
//!
//! A [`Session`] owns the [`Transport`] and both halves of the protocol:
//! the server half (admission, roster, telemetry, replication) is active
//! while hosting, and the client half runs in every session, including the
//! host's own client which talks to its server over loopback.
//!
//! Client states move Invalid → Connecting → Connected → Assigned → Active
//! and end in Disconnected, from which [`Session::join`] or
//! [`Session::host`] starts over.
//!
//! Once per tick the owner calls [`Session::poll`] to handle everything that
//! arrived and [`Session::update`] to run timers, replication and flushing.
//! Neither call blocks.

mod client;
mod server;


use std::net::SocketAddr;
use std::time::Duration;

use pluto_config::Config;
use pluto_net::{PeerId, Target, Transport, TransportConfig, TransportError};

use crate::cargo::CargoManifest;
use crate::messages::{ClientMessage, ClientStats, ServerMessage};
use crate::protocol::{AggregateKey, Nation};
use crate::replication::AggregateRegistry;
use crate::roster::Roster;
use crate::world::{GameWorld, WorldParams};

use client::ClientSide;
use server::ServerSide;

// ---------------------------------------------------------------------------
// States, events, errors
// ---------------------------------------------------------------------------

/// Where the local client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never started.
    Invalid,
    /// Waiting for the socket to connect.
    Connecting,
    /// Socket up, `Hello` sent, no id yet.
    Connected,
    /// `Init` received; the snapshot is arriving.
    Assigned,
    /// `Ready` received. Commands may be sent.
    Active,
    /// Over. The reason was reported in [`SessionEvent::Disconnected`].
    Disconnected,
}

/// Why the local client left its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// [`Session::leave`] was called.
    Local,
    /// The connection closed or failed.
    Lost,
    /// The server sent something that failed validation.
    Corrupt,
    /// The server speaks another protocol version.
    Incompatible(u16),
    /// The handshake did not complete in time.
    Timeout,
}

/// What a poll observed, for the game and its interface.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    // -- local client lifecycle --
    /// The socket to the server connected.
    Connected,
    /// The connection attempt failed.
    ConnectFailed,
    /// The host assigned an id and world parameters.
    Joined { id: PeerId, params: WorldParams },
    /// The initial snapshot is complete.
    Ready,
    Disconnected { reason: DisconnectReason },

    // -- host side --
    /// A peer completed its greeting.
    PeerJoined { peer: PeerId, name: String },
    /// A peer left the hosted game. Its visibility is already gone.
    PeerLeft { peer: PeerId, kicked: bool },
    /// A validated command for the game rules.
    Command { peer: PeerId, command: ClientMessage },

    // -- client side --
    PlayerConnected { peer: PeerId },
    PlayerLeft { peer: PeerId, kicked: bool },
    Renamed { peer: PeerId, name: String },
    Affiliated {
        peer: PeerId,
        nation: Nation,
        focus: Option<u16>,
    },
    Chat { from: Option<PeerId>, text: String },
    Private { from: PeerId, text: String },
    Popup {
        focus: Option<u16>,
        token: String,
        message: String,
    },
    GameOver {
        nation: Nation,
        winner: Option<PeerId>,
    },
    ClientUpdate(Vec<ClientStats>),
    /// A validated entity message from the host.
    World(ServerMessage),
    /// A replica was updated.
    Replicated(AggregateKey),
}

/// Errors returned by [`Session`] operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation needs the client in another state.
    #[error("session is {actual:?}, expected {expected:?}")]
    WrongState {
        expected: SessionState,
        actual: SessionState,
    },

    /// The operation is only available while hosting.
    #[error("not hosting")]
    NotHosting,

    /// No admitted peer has this id.
    #[error("no such peer {0}")]
    UnknownPeer(PeerId),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Session tunables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name requested in `Hello`.
    pub player_name: String,
    /// Time a peer has to greet, and a client has to become active.
    pub handshake_timeout: Duration,
    /// Ping period; `None` disables pings.
    pub echo_rate: Option<Duration>,
    /// Period of the player list broadcast.
    pub update_rate: Duration,
    /// Log every message sent and received.
    pub debug_net: bool,
    /// World parameters used when hosting. `max_players` is the admission cap.
    pub world: WorldParams,
    pub transport: TransportConfig,
}

impl SessionConfig {
    pub fn from_config(config: &Config) -> Self {
        let network = &config.network;
        Self {
            player_name: config.game.player_name.clone(),
            handshake_timeout: Duration::from_millis(network.handshake_timeout_ms),
            echo_rate: (network.echo_rate_ms > 0)
                .then(|| Duration::from_millis(network.echo_rate_ms)),
            update_rate: Duration::from_secs(1),
            debug_net: network.debug_net,
            world: WorldParams::from_config(&config.game, network.max_players),
            transport: TransportConfig::from_network(network),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            player_name: crate::protocol::DEFAULT_NAME.to_string(),
            handshake_timeout: Duration::from_secs(10),
            echo_rate: Some(Duration::from_secs(10)),
            update_rate: Duration::from_secs(1),
            debug_net: false,
            world: WorldParams::default(),
            transport: TransportConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

/// Encodes and queues a server message. Encoding only fails for oversized
/// messages, which are logged and skipped.
fn post_server(transport: &mut Transport, debug_net: bool, target: Target, message: &ServerMessage) {
    match message.encode() {
        Ok(packet) => {
            if debug_net {
                tracing::debug!("{target:?} <- {message:?}");
            }
            transport.send(target, &packet);
        }
        Err(e) => tracing::warn!("Not sending {:?}: {e}", message.token()),
    }
}

/// Sends to exactly the peers in `mask`.
fn post_server_mask(transport: &mut Transport, debug_net: bool, mask: u32, message: &ServerMessage) {
    match mask.count_ones() {
        0 => {}
        1 => post_server(
            transport,
            debug_net,
            PeerId(mask.trailing_zeros() as u8).into(),
            message,
        ),
        _ => {
            transport.select_mask(mask);
            post_server(transport, debug_net, Target::Selected, message);
        }
    }
}

fn post_client(transport: &mut Transport, debug_net: bool, message: &ClientMessage) {
    match message.encode() {
        Ok(packet) => {
            if debug_net {
                tracing::debug!("server <- {message:?}");
            }
            transport.send(PeerId::SERVER, &packet);
        }
        Err(e) => tracing::warn!("Not sending {:?}: {e}", message.token()),
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One process's view of a game session.
pub struct Session {
    config: SessionConfig,
    transport: Transport,
    server: ServerSide,
    client: ClientSide,
    events: Vec<SessionEvent>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let transport = Transport::new(config.transport.clone());
        let server = ServerSide::new(&config);
        Self {
            config,
            transport,
            server,
            client: ClientSide::default(),
            events: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts hosting on `addr`. The host's own client joins over loopback
    /// during the following polls. Returns the bound address.
    pub fn host(&mut self, addr: SocketAddr) -> Result<SocketAddr, SessionError> {
        self.reset();
        let local = self.transport.start_server(addr)?;
        self.server.start();
        self.client.begin();
        Ok(local)
    }

    /// Starts connecting to a remote host.
    pub fn join(&mut self, address: &str) -> Result<(), SessionError> {
        self.reset();
        self.transport.connect(address)?;
        self.client.begin();
        Ok(())
    }

    /// Leaves the session, or stops hosting it.
    pub fn leave(&mut self) {
        let was_live = !matches!(
            self.client.state,
            SessionState::Invalid | SessionState::Disconnected
        );
        self.reset();
        if was_live {
            self.client.state = SessionState::Disconnected;
            self.events.push(SessionEvent::Disconnected {
                reason: DisconnectReason::Local,
            });
        }
    }

    /// Tears down the transport and both halves without reporting anything.
    fn reset(&mut self) {
        self.transport.disconnect();
        // Events for the connection just closed are stale.
        self.transport.poll_server();
        self.transport.poll_client();
        self.server.clear();
        self.client.clear();
    }

    /// Handles everything that arrived since the last poll.
    pub fn poll(&mut self, world: &mut dyn GameWorld) -> Vec<SessionEvent> {
        for event in self.transport.poll_server() {
            self.server_event(event, &*world);
        }
        for event in self.transport.poll_client() {
            self.client_event(event, world);
        }
        std::mem::take(&mut self.events)
    }

    /// Runs per-tick work: handshake timeouts, pings, the player list,
    /// replication, and flushing.
    pub fn update(&mut self, world: &dyn GameWorld) {
        if self.transport.is_host() {
            self.server_update(world);
        }
        self.client_update();
        self.transport.flush();
    }

    // -- client commands ----------------------------------------------------

    /// Sends a command to the host. Requires an active session.
    pub fn send_command(&mut self, command: &ClientMessage) -> Result<(), SessionError> {
        if self.client.state != SessionState::Active {
            return Err(SessionError::WrongState {
                expected: SessionState::Active,
                actual: self.client.state,
            });
        }
        post_client(&mut self.transport, self.config.debug_net, command);
        Ok(())
    }

    pub fn chat(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_command(&ClientMessage::Chat {
            text: text.to_string(),
        })
    }

    pub fn private_message(&mut self, recipients: u32, text: &str) -> Result<(), SessionError> {
        self.send_command(&ClientMessage::Privmsg {
            recipients,
            text: text.to_string(),
        })
    }

    pub fn rename(&mut self, name: &str) -> Result<(), SessionError> {
        self.config.player_name = name.to_string();
        self.send_command(&ClientMessage::Name {
            name: name.to_string(),
        })
    }

    pub fn affiliate(&mut self, nation: Nation) -> Result<(), SessionError> {
        self.send_command(&ClientMessage::Affiliate { nation })
    }

    // -- host commands ------------------------------------------------------

    fn require_host(&self) -> Result<(), SessionError> {
        if self.transport.is_host() {
            Ok(())
        } else {
            Err(SessionError::NotHosting)
        }
    }

    /// Sends a notification to every connected peer.
    pub fn broadcast(&mut self, message: &ServerMessage) -> Result<(), SessionError> {
        self.require_host()?;
        post_server(&mut self.transport, self.config.debug_net, Target::Broadcast, message);
        Ok(())
    }

    /// Sends a notification to one admitted peer.
    pub fn send_to(&mut self, peer: PeerId, message: &ServerMessage) -> Result<(), SessionError> {
        self.require_host()?;
        if !self.server.is_admitted(peer) {
            return Err(SessionError::UnknownPeer(peer));
        }
        post_server(&mut self.transport, self.config.debug_net, peer.into(), message);
        Ok(())
    }

    /// A chat line from the host itself rather than its player.
    pub fn announce(&mut self, text: &str) -> Result<(), SessionError> {
        self.broadcast(&ServerMessage::Chat {
            from: None,
            text: crate::roster::sanitize_chat(text),
        })
    }

    /// Removes a remote peer, telling it why.
    pub fn kick(&mut self, peer: PeerId) -> Result<(), SessionError> {
        self.require_host()?;
        if peer == PeerId::HOST || !self.server.is_admitted(peer) {
            return Err(SessionError::UnknownPeer(peer));
        }
        self.server.mark_kicked(peer);
        tracing::info!("Kicking {peer}");
        self.farewell(peer, &ServerMessage::popup("g-host-kicked", "Kicked by host."));
        Ok(())
    }

    /// Ends the game for everyone. Afterwards only greetings, chat and
    /// renames are accepted from clients.
    pub fn end_game(&mut self, nation: Nation, winner: Option<PeerId>) -> Result<(), SessionError> {
        self.require_host()?;
        self.server.game_over = true;
        tracing::info!("Game over, {nation:?} wins");
        post_server(
            &mut self.transport,
            self.config.debug_net,
            Target::Broadcast,
            &ServerMessage::GameOver { nation, winner },
        );
        Ok(())
    }

    // -- replication ----------------------------------------------------------

    /// Cargo aggregates replicated by this host.
    pub fn aggregates(&self) -> &AggregateRegistry<CargoManifest> {
        &self.server.aggregates
    }

    pub fn aggregates_mut(&mut self) -> &mut AggregateRegistry<CargoManifest> {
        &mut self.server.aggregates
    }

    /// This client's copy of a replicated manifest.
    pub fn replica(&self, key: AggregateKey) -> Option<&CargoManifest> {
        self.client.replicas.get(&key)
    }

    // -- queries ----------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.client.state
    }

    /// The id the host assigned to this client.
    pub fn local_id(&self) -> Option<PeerId> {
        self.client.id
    }

    pub fn is_hosting(&self) -> bool {
        self.transport.is_host()
    }

    pub fn is_game_over(&self) -> bool {
        self.server.game_over || self.client.game_over
    }

    /// World parameters received from the host.
    pub fn params(&self) -> Option<&WorldParams> {
        self.client.params.as_ref()
    }

    /// Players as this client knows them.
    pub fn roster(&self) -> &Roster {
        &self.client.roster
    }

    /// Players as the host knows them.
    pub fn players(&self) -> &Roster {
        &self.server.roster
    }

    /// Last measured round-trip time to a peer, while hosting.
    pub fn ping(&self, peer: PeerId) -> Option<Duration> {
        self.server.echo.rtt(peer)
    }

    /// Remaining game time while hosting, `None` when unlimited.
    pub fn time_left(&self) -> Option<Duration> {
        self.server.time_left(&self.config.world)
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }
}
