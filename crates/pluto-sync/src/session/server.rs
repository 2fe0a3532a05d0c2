//! The hosting half of a session: admission, greetings, client commands,
//! telemetry and replication.

use std::time::{Duration, Instant};

use pluto_net::{NetEvent, PEERS_MAX, Packet, PeerId, Target};

use super::{Session, SessionConfig, SessionEvent, post_server, post_server_mask};
use crate::cargo::CargoManifest;
use crate::dispatch::{Routed, route_client};
use crate::messages::{ClientMessage, ClientStats, Init, ServerMessage};
use crate::protocol::{EntityId, PROTOCOL_VERSION};
use crate::receive::{Corrupt, Lookup};
use crate::replication::AggregateRegistry;
use crate::roster::{Roster, sanitize_chat};
use crate::telemetry::{EchoTracker, Ticker};
use crate::world::{GameWorld, WorldParams};

/// A peer that got past the population cap.
#[derive(Debug, Clone, Copy)]
struct Admission {
    since: Instant,
    greeted: bool,
    kicked: bool,
}

pub(super) struct ServerSide {
    admitted: [Option<Admission>; PEERS_MAX],
    pub(super) roster: Roster,
    pub(super) aggregates: AggregateRegistry<CargoManifest>,
    pub(super) echo: EchoTracker,
    echo_rate: Option<Duration>,
    update: Ticker,
    started: Option<Instant>,
    pub(super) game_over: bool,
}

impl ServerSide {
    pub(super) fn new(config: &SessionConfig) -> Self {
        Self {
            admitted: [None; PEERS_MAX],
            roster: Roster::new(),
            aggregates: AggregateRegistry::new(),
            echo: EchoTracker::new(config.echo_rate),
            echo_rate: config.echo_rate,
            update: Ticker::new(config.update_rate),
            started: None,
            game_over: false,
        }
    }

    pub(super) fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub(super) fn clear(&mut self) {
        self.admitted = [None; PEERS_MAX];
        self.roster.clear();
        self.aggregates.clear();
        self.echo = EchoTracker::new(self.echo_rate);
        self.update.reset();
        self.started = None;
        self.game_over = false;
    }

    pub(super) fn is_admitted(&self, peer: PeerId) -> bool {
        peer.is_client() && self.admitted[peer.index()].is_some()
    }

    fn admission_mut(&mut self, peer: PeerId) -> Option<&mut Admission> {
        if !peer.is_client() {
            return None;
        }
        self.admitted[peer.index()].as_mut()
    }

    pub(super) fn mark_kicked(&mut self, peer: PeerId) {
        if let Some(admission) = self.admission_mut(peer) {
            admission.kicked = true;
        }
    }

    fn mask_where(&self, include: impl Fn(&Admission) -> bool) -> u32 {
        self.admitted
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(&include))
            .fold(0, |mask, (index, _)| mask | 1 << index)
    }

    fn admitted_mask(&self) -> u32 {
        self.mask_where(|_| true)
    }

    fn greeted_mask(&self) -> u32 {
        self.mask_where(|admission| admission.greeted)
    }

    pub(super) fn time_left(&self, world: &WorldParams) -> Option<Duration> {
        let limit = world.time_left?;
        let elapsed = self.started.map_or(Duration::ZERO, |started| started.elapsed());
        Some(limit.saturating_sub(elapsed))
    }
}

/// What client commands are checked against on the host.
struct ServerView<'a> {
    world: &'a dyn GameWorld,
    admitted: u32,
}

impl Lookup for ServerView<'_> {
    fn tile_count(&self) -> usize {
        self.world.tile_count()
    }

    fn peer_connected(&self, peer: PeerId) -> bool {
        self.admitted & peer.bit() != 0
    }

    fn ship_exists(&self, ship: EntityId) -> bool {
        self.world.ship_exists(ship)
    }

    fn building_exists(&self, building: EntityId) -> bool {
        self.world.building_exists(building)
    }
}

impl Session {
    pub(super) fn server_event(&mut self, event: NetEvent, world: &dyn GameWorld) {
        match event {
            NetEvent::Connected(peer) => self.accept(peer, world),
            NetEvent::Disconnected(peer) => self.peer_left(peer),
            NetEvent::Message(peer, packet) => self.server_message(peer, &packet, world),
            NetEvent::ConnectFailed => {}
        }
    }

    /// Drops a peer after queueing one last message for it.
    pub(super) fn farewell(&mut self, peer: PeerId, message: &ServerMessage) {
        match message.encode() {
            Ok(packet) => self.transport.drop_peer(peer, Some(&packet)),
            Err(e) => {
                tracing::warn!("Farewell to {peer} not sent: {e}");
                self.transport.drop_peer(peer, None);
            }
        }
    }

    /// Admits a new connection and sends it everything it needs to join.
    fn accept(&mut self, peer: PeerId, world: &dyn GameWorld) {
        // Only peers already admitted count, so peers arriving in the same
        // poll are admitted in slot order until the cap is reached.
        let cap = usize::from(self.config.world.max_players);
        if self.server.admitted_mask().count_ones() as usize >= cap {
            tracing::warn!("Rejecting {peer}, server is full ({cap} players)");
            self.farewell(peer, &ServerMessage::popup("g-host-full", "Server is full."));
            return;
        }

        self.server.admitted[peer.index()] = Some(Admission {
            since: Instant::now(),
            greeted: false,
            kicked: false,
        });
        self.server.roster.join(peer);
        tracing::info!("Admitted {peer}");

        let debug = self.config.debug_net;
        let transport = &mut self.transport;
        post_server(transport, debug, Target::Broadcast, &ServerMessage::Connected { peer });

        let mut params = self.config.world.clone();
        params.solar_angle = world.solar_angle();
        params.time_left = self.server.time_left(&self.config.world);
        post_server(transport, debug, peer.into(), &ServerMessage::Init(Init { peer, params }));

        for (other, entry) in self.server.roster.iter().filter(|(other, _)| *other != peer) {
            let message = ServerMessage::Client {
                peer: other,
                nation: entry.nation,
                name: entry.name.clone(),
            };
            post_server(transport, debug, peer.into(), &message);
        }

        // The host's own client shares the authoritative world.
        if peer != PeerId::HOST {
            let mut snapshot = world.snapshot();
            snapshot.sort_by_key(|entity| entity.key);
            for entity in &snapshot {
                post_server(transport, debug, peer.into(), &entity.spawn);
            }
            for update in snapshot.iter().flat_map(|entity| &entity.updates) {
                post_server(transport, debug, peer.into(), update);
            }
        }

        post_server(transport, debug, peer.into(), &ServerMessage::Ready);
    }

    fn peer_left(&mut self, peer: PeerId) {
        if !peer.is_client() {
            return;
        }
        if peer == PeerId::HOST {
            // Only reported when hosting stopped.
            self.server.clear();
            return;
        }
        let Some(admission) = self.server.admitted[peer.index()].take() else {
            return;
        };
        let kicked = admission.kicked;
        self.server.aggregates.forget_peer(peer);
        self.server.echo.forget(peer);
        let name = self.server.roster.leave(peer).map(|entry| entry.name);
        tracing::info!("{peer} ({}) left", name.as_deref().unwrap_or("unnamed"));

        post_server(
            &mut self.transport,
            self.config.debug_net,
            Target::Broadcast,
            &ServerMessage::Disconnected { peer, kicked },
        );
        self.events.push(SessionEvent::PeerLeft { peer, kicked });
    }

    fn server_message(&mut self, peer: PeerId, packet: &Packet, world: &dyn GameWorld) {
        // A peer dropped earlier in this poll may still have messages queued.
        if !self.transport.is_connected(peer) {
            return;
        }
        let Some(greeted) = self.server.admission_mut(peer).map(|a| a.greeted) else {
            return;
        };

        let view = ServerView {
            world,
            admitted: self.server.admitted_mask(),
        };
        let message = match route_client(packet, peer, &view, self.server.game_over) {
            Ok(Routed::Message(message)) => message,
            Ok(_) => return,
            Err(corrupt) => {
                self.client_corrupt(peer, corrupt);
                return;
            }
        };
        if self.config.debug_net {
            tracing::debug!("{peer} -> {message:?}");
        }

        if !greeted && !matches!(message, ClientMessage::Hello { .. }) {
            tracing::trace!("Ignoring {:?} from {peer} before its greeting", message.token());
            return;
        }
        self.client_command(peer, message, world);
    }

    fn client_corrupt(&mut self, peer: PeerId, corrupt: Corrupt) {
        if peer == PeerId::HOST {
            tracing::error!("Own client sent invalid data: {corrupt}");
            self.transport.stop_server();
            return;
        }
        tracing::warn!("{peer} sent invalid data: {corrupt}");
        self.farewell(
            peer,
            &ServerMessage::popup("g-host-invalid", "Your client sent invalid data."),
        );
    }

    fn client_command(&mut self, peer: PeerId, message: ClientMessage, world: &dyn GameWorld) {
        let debug = self.config.debug_net;
        match message {
            ClientMessage::Hello { protocol, name } => self.greet(peer, protocol, &name),

            ClientMessage::Name { name } => {
                let claimed = self.server.roster.claim_name(peer, &name);
                match self.server.roster.get_mut(peer) {
                    Some(entry) if entry.name != claimed => {
                        tracing::info!("{peer} renamed from {:?} to {claimed:?}", entry.name);
                        entry.name = claimed.clone();
                    }
                    _ => return,
                }
                let message = ServerMessage::Name { peer, name: claimed };
                post_server(&mut self.transport, debug, Target::Broadcast, &message);
            }

            ClientMessage::Affiliate { nation } => {
                if let Some(entry) = self.server.roster.get_mut(peer) {
                    entry.nation = nation;
                }
                let message = ServerMessage::Affiliate {
                    peer,
                    nation,
                    focus: None,
                };
                post_server(&mut self.transport, debug, Target::Broadcast, &message);
                self.events.push(SessionEvent::Command {
                    peer,
                    command: ClientMessage::Affiliate { nation },
                });
            }

            ClientMessage::EchoBack { data } => {
                if let Some(rtt) = self.server.echo.reply(peer, data, Instant::now()) {
                    tracing::trace!("{peer} round trip {rtt:?}");
                    let ping = self.server.echo.ping_ms(peer);
                    if let Some(entry) = self.server.roster.get_mut(peer) {
                        entry.ping = ping;
                    }
                }
            }

            ClientMessage::Chat { text } => {
                let text = sanitize_chat(&text);
                if text.is_empty() {
                    return;
                }
                let message = ServerMessage::Chat {
                    from: Some(peer),
                    text,
                };
                post_server(&mut self.transport, debug, Target::BroadcastExcept(peer), &message);
            }

            ClientMessage::Privmsg { recipients, text } => {
                let mask = recipients & self.server.greeted_mask() & !peer.bit();
                let text = sanitize_chat(&text);
                if mask == 0 || text.is_empty() {
                    return;
                }
                let message = ServerMessage::Privmsg {
                    from: peer,
                    recipients: mask,
                    text,
                };
                post_server_mask(&mut self.transport, debug, mask, &message);
            }

            command => {
                // Ship ids are not checked on decode since the ship may have
                // sunk while the command was in flight.
                if let Some(ship) = command.ship()
                    && !(world.ship_exists(ship) && world.ship_controlled_by(ship, peer))
                {
                    tracing::debug!("Ignoring {:?} from {peer} for ship {ship}", command.token());
                    return;
                }
                self.events.push(SessionEvent::Command { peer, command });
            }
        }
    }

    fn greet(&mut self, peer: PeerId, protocol: u16, requested: &str) {
        if self.server.admission_mut(peer).is_none_or(|a| a.greeted) {
            tracing::trace!("Ignoring repeated greeting from {peer}");
            return;
        }
        if protocol != PROTOCOL_VERSION {
            tracing::warn!("{peer} uses protocol {protocol}, expected {PROTOCOL_VERSION}");
            let text = format!(
                "Server uses protocol {PROTOCOL_VERSION}, your client uses {protocol}."
            );
            self.farewell(peer, &ServerMessage::popup("g-incompatible", &text));
            return;
        }

        let name = self.server.roster.claim_name(peer, requested);
        if let Some(admission) = self.server.admission_mut(peer) {
            admission.greeted = true;
        }
        if let Some(entry) = self.server.roster.get_mut(peer) {
            entry.name = name.clone();
        }
        tracing::info!("{peer} joined as {name:?}");

        let message = ServerMessage::Name {
            peer,
            name: name.clone(),
        };
        post_server(&mut self.transport, self.config.debug_net, Target::Broadcast, &message);
        self.events.push(SessionEvent::PeerJoined { peer, name });
    }

    pub(super) fn server_update(&mut self, world: &dyn GameWorld) {
        let now = Instant::now();
        let debug = self.config.debug_net;

        let timeout = self.config.handshake_timeout;
        let late: Vec<PeerId> = self
            .server
            .admitted
            .iter()
            .enumerate()
            .skip(PeerId::HOST.index() + 1)
            .filter_map(|(index, slot)| {
                let admission = slot.as_ref()?;
                let overdue = !admission.greeted && now.duration_since(admission.since) > timeout;
                overdue.then_some(PeerId(index as u8))
            })
            .collect();
        for peer in late {
            if self.transport.is_connected(peer) {
                tracing::warn!("{peer} did not greet within {timeout:?}");
                self.transport.drop_peer(peer, None);
            }
        }

        let greeted = self.server.greeted_mask();
        if !self.server.game_over && self.server.echo.due(now) && greeted != 0 {
            let data: u32 = rand::random();
            post_server_mask(
                &mut self.transport,
                debug,
                greeted,
                &ServerMessage::EchoRequest { data },
            );
            self.server.echo.sent(greeted, data, now);
        }

        if self.server.update.due(now) && greeted != 0 {
            let stats: Vec<ClientStats> = PeerId::iter_mask(greeted)
                .map(|peer| ClientStats {
                    peer,
                    gold: world.score(peer),
                    ping: self.server.echo.ping_ms(peer),
                })
                .collect();
            for row in &stats {
                if let Some(entry) = self.server.roster.get_mut(row.peer) {
                    entry.gold = row.gold;
                    entry.ping = row.ping;
                }
            }
            post_server(
                &mut self.transport,
                debug,
                Target::Broadcast,
                &ServerMessage::ClientUpdate { stats },
            );
        }

        let active =
            self.server.admitted_mask() & self.transport.connected_mask() & !PeerId::HOST.bit();
        for (key, sync) in self.server.aggregates.take_syncs(active) {
            if debug {
                let kind = if sync.full { "full" } else { "delta" };
                tracing::debug!("Replicating {key:?} ({kind}) to {:#x}", sync.peers);
            }
            post_server_mask(
                &mut self.transport,
                debug,
                sync.peers,
                &ServerMessage::cargo(key, sync.update),
            );
        }
    }
}
