//! Non-blocking TCP transport with a loopback shortcut for the host.
//!
//! [`Transport`] never awaits. Once per tick the owner calls
//! [`Transport::poll_server`] and/or [`Transport::poll_client`], which accept
//! pending connections, flush queued bytes, read whatever is available and
//! return complete messages plus lifecycle events. Sockets are Tokio types
//! driven through `try_read`/`try_write` and futures polled with a no-op
//! waker, so the owning task must yield to the runtime between ticks for
//! readiness to advance.
//!
//! A hosting process owns two special slots: [`PeerId::HOST`] (its own
//! client) and [`PeerId::SERVER`]. Traffic between them goes through the
//! [`Loopback`] mailboxes instead of a socket.
//!
//! The transport reports faults as [`NetEvent::Disconnected`]; what a lost
//! peer means for the game is decided by the caller.

use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::net::{IpAddr, Shutdown, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use futures::FutureExt;
use futures::task::noop_waker_ref;
use socket2::SockRef;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::Packet;
use crate::framing::FrameCodec;
use crate::loopback::Loopback;
use crate::peer::{PEERS_MAX, PeerId, Target};
use crate::platform::{SocketConfig, configure_stream, create_listener};

/// Slot index used for the connection to the server.
const SERVER_SLOT: usize = PEERS_MAX;

/// Slot index of the host's own client.
const HOST_SLOT: usize = 0;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Tunables for [`Transport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Bytes a peer's outgoing queue may hold before the peer is dropped.
    pub outgoing_max: usize,
    /// Bytes read from one socket per poll.
    pub read_budget: usize,
    /// How long an outgoing connection may take.
    pub connect_timeout: Duration,
    /// How long a dropped peer's farewell message may take to flush.
    pub linger: Duration,
    /// Port used when a connect address names none.
    pub default_port: u16,
    /// Socket options.
    pub socket: SocketConfig,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            outgoing_max: 32_000,
            read_budget: 64 * 1024,
            connect_timeout: Duration::from_millis(5000),
            linger: Duration::from_secs(2),
            default_port: 32500,
            socket: SocketConfig::default(),
        }
    }
}

impl TransportConfig {
    /// Transport settings from the `network` section of the config file.
    pub fn from_network(network: &pluto_config::NetworkConfig) -> Self {
        Self {
            outgoing_max: network.outgoing_queue_max,
            connect_timeout: Duration::from_millis(network.connect_timeout_ms),
            default_port: network.server_port,
            ..Default::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Events, errors, stats
// ---------------------------------------------------------------------------

/// What a poll observed.
#[derive(Debug, Clone, PartialEq)]
pub enum NetEvent {
    /// A peer slot came up: a remote client was accepted, or (client side)
    /// the connection to the server completed.
    Connected(PeerId),
    /// An outgoing connection could not be established.
    ConnectFailed,
    /// A peer slot went away for any reason.
    Disconnected(PeerId),
    /// A complete message arrived from a peer.
    Message(PeerId, Packet),
}

/// Errors returned by [`Transport`] setup calls.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The listening socket could not be created.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// The connect address could not be understood.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),
}

/// Which side of a session this transport is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Neither hosting nor connected.
    Idle,
    /// Listening for clients, with a loopback local client.
    Host,
    /// Connecting or connected to a remote host.
    Client,
}

/// Byte and message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Bytes handed to sockets.
    pub bytes_sent: u64,
    /// Bytes read from sockets.
    pub bytes_received: u64,
    /// Messages queued, loopback included.
    pub messages_sent: u64,
    /// Messages delivered to the caller, loopback included.
    pub messages_received: u64,
}

// ---------------------------------------------------------------------------
// Slots
// ---------------------------------------------------------------------------

#[derive(Default)]
struct PeerSlot {
    stream: Option<TcpStream>,
    addr: Option<SocketAddr>,
    connected: bool,
    selected: bool,
    outgoing: BytesMut,
    incoming: BytesMut,
}

/// A dropped peer whose farewell message is still draining.
struct Lingering {
    stream: TcpStream,
    outgoing: BytesMut,
    shut: bool,
    deadline: Instant,
}

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>>>>;

struct Connecting {
    future: ConnectFuture,
    address: String,
    deadline: Instant,
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Per-process peer table and socket pump.
pub struct Transport {
    config: TransportConfig,
    role: Role,
    slots: Vec<PeerSlot>,
    listener: Option<TcpListener>,
    connecting: Option<Connecting>,
    loopback: Loopback,
    lingering: Vec<Lingering>,
    server_events: VecDeque<NetEvent>,
    client_events: VecDeque<NetEvent>,
    codec: FrameCodec,
    stats: TransportStats,
}

impl Transport {
    /// An idle transport.
    pub fn new(config: TransportConfig) -> Self {
        Self {
            config,
            role: Role::Idle,
            slots: (0..=PEERS_MAX).map(|_| PeerSlot::default()).collect(),
            listener: None,
            connecting: None,
            loopback: Loopback::default(),
            lingering: Vec::new(),
            server_events: VecDeque::new(),
            client_events: VecDeque::new(),
            codec: FrameCodec::new(),
            stats: TransportStats::default(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// The address the listener is bound to while hosting.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    // -- lifecycle ----------------------------------------------------------

    /// Starts listening and brings up the host's loopback client.
    ///
    /// The host slot and the server slot report [`NetEvent::Connected`] on
    /// the next server and client poll respectively. Must be called from
    /// within a Tokio runtime.
    pub fn start_server(&mut self, addr: SocketAddr) -> Result<SocketAddr, TransportError> {
        if self.role == Role::Host
            && let Some(local) = self.local_addr()
        {
            return Ok(local);
        }
        self.disconnect();

        let listener = create_listener(addr, &self.config.socket)
            .map_err(|source| TransportError::Bind { addr, source })?;
        let local = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { addr, source })?;

        self.reset_slots();
        self.listener = Some(listener);
        self.role = Role::Host;
        self.slots[HOST_SLOT].connected = true;
        self.slots[SERVER_SLOT].connected = true;
        self.server_events.push_back(NetEvent::Connected(PeerId::HOST));
        self.client_events.push_back(NetEvent::Connected(PeerId::SERVER));

        tracing::info!("Hosting on {local}");
        Ok(local)
    }

    /// Stops hosting and closes every remote connection.
    pub fn stop_server(&mut self) {
        if self.role != Role::Host {
            return;
        }
        self.listener = None;
        self.reset_slots();
        self.role = Role::Idle;
        self.server_events.push_back(NetEvent::Disconnected(PeerId::HOST));
        self.client_events.push_back(NetEvent::Disconnected(PeerId::SERVER));
        tracing::info!("Stopped hosting");
    }

    /// Begins connecting to a remote host. The result arrives as
    /// [`NetEvent::Connected`] or [`NetEvent::ConnectFailed`] from
    /// [`poll_client`](Self::poll_client).
    pub fn connect(&mut self, address: &str) -> Result<(), TransportError> {
        let target = with_default_port(address, self.config.default_port)?;
        self.disconnect();
        self.reset_slots();

        let future: ConnectFuture = Box::pin(TcpStream::connect(target.clone()));
        tracing::info!("Connecting to {target}");
        self.connecting = Some(Connecting {
            future,
            address: target,
            deadline: Instant::now() + self.config.connect_timeout,
        });
        self.role = Role::Client;
        Ok(())
    }

    /// Leaves whatever session this transport is part of.
    pub fn disconnect(&mut self) {
        match self.role {
            Role::Host => self.stop_server(),
            Role::Client => {
                let event = if self.connecting.take().is_some() {
                    NetEvent::ConnectFailed
                } else {
                    NetEvent::Disconnected(PeerId::SERVER)
                };
                self.slots[SERVER_SLOT] = PeerSlot::default();
                self.role = Role::Idle;
                self.client_events.push_back(event);
                tracing::info!("Disconnected from server");
            }
            Role::Idle => {}
        }
    }

    /// Removes a peer. On a client this leaves the session.
    ///
    /// Anything still queued for the peer is discarded. A `farewell` message
    /// is flushed on the following polls before the socket is closed.
    pub fn drop_peer(&mut self, peer: PeerId, farewell: Option<&Packet>) {
        match self.role {
            Role::Host => {
                let index = peer.index();
                if index == HOST_SLOT {
                    tracing::warn!("Host client dropped, stopping server");
                    self.stop_server();
                    return;
                }
                if !self.slots[index].connected {
                    return;
                }
                let slot = std::mem::take(&mut self.slots[index]);
                if let (Some(stream), Some(packet)) = (slot.stream, farewell) {
                    let mut outgoing = BytesMut::new();
                    if self.codec.encode(packet, &mut outgoing).is_ok() {
                        self.lingering.push(Lingering {
                            stream,
                            outgoing,
                            shut: false,
                            deadline: Instant::now() + self.config.linger,
                        });
                    }
                }
                tracing::info!("Dropped {peer}");
                self.server_events.push_back(NetEvent::Disconnected(peer));
            }
            Role::Client => self.disconnect(),
            Role::Idle => {}
        }
    }

    // -- polling ------------------------------------------------------------

    /// Server half of a tick: accepts, flushes and reads every client slot and
    /// drains the host client's loopback mailbox.
    pub fn poll_server(&mut self) -> Vec<NetEvent> {
        let mut events: Vec<NetEvent> = self.server_events.drain(..).collect();
        if self.role != Role::Host {
            return events;
        }

        self.accept_pending(&mut events);

        for index in HOST_SLOT + 1..PEERS_MAX {
            if self.slots[index].connected && !self.service(index, &mut events) {
                self.slots[index] = PeerSlot::default();
                events.push(NetEvent::Disconnected(PeerId(index as u8)));
            }
        }

        for packet in self.loopback.to_server.drain() {
            self.stats.messages_received += 1;
            events.push(NetEvent::Message(PeerId::HOST, packet));
        }

        self.flush_lingering();
        events
    }

    /// Client half of a tick: completes a pending connect, then reads from the
    /// server (or, when hosting, drains the loopback mailbox).
    pub fn poll_client(&mut self) -> Vec<NetEvent> {
        let mut events: Vec<NetEvent> = self.client_events.drain(..).collect();
        match self.role {
            Role::Host => {
                for packet in self.loopback.to_client.drain() {
                    self.stats.messages_received += 1;
                    events.push(NetEvent::Message(PeerId::SERVER, packet));
                }
            }
            Role::Client if self.connecting.is_some() => self.poll_connect(&mut events),
            Role::Client => {
                if !self.service(SERVER_SLOT, &mut events) {
                    self.slots[SERVER_SLOT] = PeerSlot::default();
                    self.role = Role::Idle;
                    events.push(NetEvent::Disconnected(PeerId::SERVER));
                }
            }
            Role::Idle => {}
        }
        events
    }

    /// Pushes queued bytes out without reading. Called at the end of a tick.
    pub fn flush(&mut self) {
        match self.role {
            Role::Host => {
                for index in HOST_SLOT + 1..PEERS_MAX {
                    if self.slots[index].connected && self.flush_slot(index).is_err() {
                        self.slots[index] = PeerSlot::default();
                        self.server_events
                            .push_back(NetEvent::Disconnected(PeerId(index as u8)));
                    }
                }
                self.flush_lingering();
            }
            Role::Client if self.connecting.is_none() => {
                if self.flush_slot(SERVER_SLOT).is_err() {
                    self.disconnect();
                }
            }
            _ => {}
        }
    }

    fn accept_pending(&mut self, events: &mut Vec<NetEvent>) {
        let Some(listener) = &self.listener else {
            return;
        };
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut accepted = Vec::new();
        loop {
            match listener.poll_accept(&mut cx) {
                Poll::Ready(Ok(conn)) => accepted.push(conn),
                Poll::Ready(Err(e)) => {
                    tracing::warn!("Accept failed: {e}");
                    break;
                }
                Poll::Pending => break,
            }
        }
        for (stream, addr) in accepted {
            self.admit(stream, addr, events);
        }
    }

    fn admit(&mut self, stream: TcpStream, addr: SocketAddr, events: &mut Vec<NetEvent>) {
        let Some(index) = (HOST_SLOT + 1..PEERS_MAX).find(|&i| !self.slots[i].connected) else {
            tracing::warn!("No free peer slot, rejecting {addr}");
            return;
        };
        if let Err(e) = configure_stream(&stream, &self.config.socket) {
            tracing::warn!("Failed to configure socket for {addr}: {e}");
        }
        self.slots[index] = PeerSlot {
            stream: Some(stream),
            addr: Some(addr),
            connected: true,
            ..Default::default()
        };
        tracing::info!("Accepted {addr} as peer {index}");
        events.push(NetEvent::Connected(PeerId(index as u8)));
    }

    fn poll_connect(&mut self, events: &mut Vec<NetEvent>) {
        let Some(connecting) = self.connecting.as_mut() else {
            return;
        };
        let mut cx = Context::from_waker(noop_waker_ref());
        let result = connecting.future.poll_unpin(&mut cx);
        let expired = Instant::now() >= connecting.deadline;
        let address = connecting.address.clone();

        match result {
            Poll::Ready(Ok(stream)) => {
                self.connecting = None;
                if let Err(e) = configure_stream(&stream, &self.config.socket) {
                    tracing::warn!("Failed to configure socket for {address}: {e}");
                }
                self.slots[SERVER_SLOT] = PeerSlot {
                    addr: stream.peer_addr().ok(),
                    stream: Some(stream),
                    connected: true,
                    ..Default::default()
                };
                tracing::info!("Connected to {address}");
                events.push(NetEvent::Connected(PeerId::SERVER));
            }
            Poll::Ready(Err(e)) => {
                tracing::warn!("Failed to connect to {address}: {e}");
                self.connect_failed(events);
            }
            Poll::Pending if expired => {
                tracing::warn!("Connection to {address} timed out");
                self.connect_failed(events);
            }
            Poll::Pending => {}
        }
    }

    fn connect_failed(&mut self, events: &mut Vec<NetEvent>) {
        self.connecting = None;
        self.role = Role::Idle;
        events.push(NetEvent::ConnectFailed);
    }

    /// Flushes, reads and splits one socket slot. Returns `false` when the
    /// peer should be dropped.
    fn service(&mut self, index: usize, events: &mut Vec<NetEvent>) -> bool {
        let from = if index == SERVER_SLOT {
            PeerId::SERVER
        } else {
            PeerId(index as u8)
        };

        if let Err(e) = self.flush_slot(index) {
            tracing::warn!("Send to {from} failed: {e}");
            return false;
        }

        let budget = self.config.read_budget;
        let slot = &mut self.slots[index];
        let Some(stream) = slot.stream.as_ref() else {
            return true;
        };
        let closed = match fill(stream, &mut slot.incoming, budget, &mut self.stats) {
            Ok(closed) => closed,
            Err(e) => {
                tracing::warn!("Receive from {from} failed: {e}");
                return false;
            }
        };

        loop {
            match self.codec.decode(&mut slot.incoming) {
                Ok(Some(packet)) => {
                    self.stats.messages_received += 1;
                    events.push(NetEvent::Message(from, packet));
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("Bad frame from {from}: {e}");
                    return false;
                }
            }
        }

        if closed {
            tracing::info!("{from} closed the connection");
            return false;
        }
        true
    }

    fn flush_slot(&mut self, index: usize) -> io::Result<()> {
        let slot = &mut self.slots[index];
        match slot.stream.as_ref() {
            Some(stream) => flush(stream, &mut slot.outgoing, &mut self.stats),
            None => Ok(()),
        }
    }

    fn flush_lingering(&mut self) {
        let now = Instant::now();
        let stats = &mut self.stats;
        self.lingering.retain_mut(|l| {
            if now >= l.deadline || flush(&l.stream, &mut l.outgoing, stats).is_err() {
                return false;
            }
            if !l.outgoing.is_empty() {
                return true;
            }
            if !l.shut {
                l.shut = true;
                if SockRef::from(&l.stream).shutdown(Shutdown::Write).is_err() {
                    return false;
                }
            }
            // Wait for the peer to close its side; anything it still sends is ignored.
            let mut scratch = BytesMut::new();
            matches!(fill(&l.stream, &mut scratch, usize::MAX, stats), Ok(false))
        });
    }

    // -- sending ------------------------------------------------------------

    /// Queues a message for one or more peers and flushes opportunistically.
    ///
    /// Clients may only address [`PeerId::SERVER`]. A queue that would grow
    /// past [`TransportConfig::outgoing_max`] drops that peer.
    pub fn send(&mut self, target: impl Into<Target>, packet: &Packet) {
        let target = target.into();
        match self.role {
            Role::Idle => {}
            Role::Client => {
                if target != Target::Peer(PeerId::SERVER) {
                    tracing::warn!("Client cannot address {target:?}");
                    return;
                }
                if self.connecting.is_some() {
                    return;
                }
                self.deliver(SERVER_SLOT, packet);
            }
            Role::Host => match target {
                Target::Peer(PeerId::SERVER) => {
                    self.stats.messages_sent += 1;
                    self.loopback.to_server.post(packet);
                }
                Target::Peer(peer) => {
                    let index = peer.index();
                    if self.slots[index].connected {
                        self.deliver(index, packet);
                    } else {
                        tracing::debug!("Send to unconnected {peer} ignored");
                    }
                }
                Target::Broadcast => self.deliver_where(packet, |_, _| true),
                Target::BroadcastExcept(except) => {
                    self.deliver_where(packet, |peer, _| peer != except)
                }
                Target::Selected => self.deliver_where(packet, |_, slot| slot.selected),
            },
        }
    }

    fn deliver_where(&mut self, packet: &Packet, include: impl Fn(PeerId, &PeerSlot) -> bool) {
        for index in 0..PEERS_MAX {
            let slot = &self.slots[index];
            if slot.connected && include(PeerId(index as u8), slot) {
                self.deliver(index, packet);
            }
        }
    }

    fn deliver(&mut self, index: usize, packet: &Packet) {
        self.stats.messages_sent += 1;
        if index == HOST_SLOT && self.role == Role::Host {
            self.loopback.to_client.post(packet);
            return;
        }

        let slot = &mut self.slots[index];
        if slot.outgoing.len() + packet.len() > self.config.outgoing_max {
            tracing::warn!(
                "Outgoing queue for slot {index} overflowed ({} + {} bytes), dropping",
                slot.outgoing.len(),
                packet.len()
            );
            self.fail_slot(index);
            return;
        }
        if let Err(e) = self.codec.encode(packet, &mut slot.outgoing) {
            tracing::warn!("Refusing to queue {packet:?}: {e}");
            return;
        }
        if let Err(e) = self.flush_slot(index) {
            tracing::warn!("Send on slot {index} failed: {e}");
            self.fail_slot(index);
        }
    }

    fn fail_slot(&mut self, index: usize) {
        if index == SERVER_SLOT {
            self.disconnect();
        } else {
            self.slots[index] = PeerSlot::default();
            self.server_events
                .push_back(NetEvent::Disconnected(PeerId(index as u8)));
        }
    }

    // -- selection and queries ------------------------------------------------

    /// Sets or clears a peer's selected flag for [`Target::Selected`] sends.
    pub fn select(&mut self, peer: PeerId, selected: bool) {
        self.slots[peer.index()].selected = selected;
    }

    /// Selects exactly the peers whose bits are set in `mask`.
    pub fn select_mask(&mut self, mask: u32) {
        for (index, slot) in self.slots.iter_mut().take(PEERS_MAX).enumerate() {
            slot.selected = mask & (1 << index) != 0;
        }
    }

    pub fn is_connected(&self, peer: PeerId) -> bool {
        match peer {
            PeerId::SERVER => self.slots[SERVER_SLOT].connected,
            peer if peer.is_client() => self.slots[peer.index()].connected,
            _ => false,
        }
    }

    /// Bitmask of connected client slots.
    pub fn connected_mask(&self) -> u32 {
        self.slots
            .iter()
            .take(PEERS_MAX)
            .enumerate()
            .filter(|(_, slot)| slot.connected)
            .fold(0, |mask, (index, _)| mask | 1 << index)
    }

    /// Number of connected client slots, the host's own client included.
    pub fn population(&self) -> usize {
        self.connected_mask().count_ones() as usize
    }

    pub fn peer_addr(&self, peer: PeerId) -> Option<SocketAddr> {
        match peer {
            PeerId::SERVER => self.slots[SERVER_SLOT].addr,
            peer if peer.is_client() => self.slots[peer.index()].addr,
            _ => None,
        }
    }

    /// Bytes queued but not yet handed to the peer's socket.
    pub fn pending_bytes(&self, peer: PeerId) -> usize {
        match peer {
            PeerId::SERVER => self.slots[SERVER_SLOT].outgoing.len(),
            PeerId::HOST if self.role == Role::Host => self.loopback.to_client.pending_bytes(),
            peer if peer.is_client() => self.slots[peer.index()].outgoing.len(),
            _ => 0,
        }
    }

    fn reset_slots(&mut self) {
        for slot in &mut self.slots {
            *slot = PeerSlot::default();
        }
        self.loopback.clear();
        self.lingering.clear();
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(TransportConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Socket helpers
// ---------------------------------------------------------------------------

/// Writes as much of `outgoing` as the socket accepts right now.
fn flush(stream: &TcpStream, outgoing: &mut BytesMut, stats: &mut TransportStats) -> io::Result<()> {
    while !outgoing.is_empty() {
        match stream.try_write(outgoing) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                outgoing.advance(n);
                stats.bytes_sent += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Reads up to `budget` bytes. Returns `true` if the peer shut down.
fn fill(
    stream: &TcpStream,
    incoming: &mut BytesMut,
    budget: usize,
    stats: &mut TransportStats,
) -> io::Result<bool> {
    let mut read = 0;
    while read < budget {
        incoming.reserve(4096);
        match stream.try_read_buf(incoming) {
            Ok(0) => return Ok(true),
            Ok(n) => {
                read += n;
                stats.bytes_received += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}

/// Appends `default_port` to an address that does not name one.
pub fn with_default_port(address: &str, default_port: u16) -> Result<String, TransportError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(TransportError::InvalidAddress(address.to_string()));
    }
    if address.parse::<SocketAddr>().is_ok() {
        return Ok(address.to_string());
    }
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port).to_string());
    }
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            Ok(address.to_string())
        }
        Some(_) => Err(TransportError::InvalidAddress(address.to_string())),
        None => Ok(format!("{address}:{default_port}")),
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
