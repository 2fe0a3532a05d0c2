//! Dedicated Pluto host.
//!
//! Hosts a game on the configured port, advertises it to the master server
//! and runs the session at a fixed tick until interrupted.
//!
//! Run with: `cargo run -p pluto-server -- --port 32500 --players 8`

use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use pluto_config::{CliArgs, Config};
use pluto_net::{PeerId, host_bind_address};
use pluto_sync::{
    HeadlessWorld, Listing, MasterPublisher, Nation, Roster, Session, SessionConfig, SessionEvent,
};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

/// Session tick.
const TICK: Duration = Duration::from_millis(100);

fn load_config(args: &CliArgs) -> Config {
    let mut config = match args.config_dir() {
        Some(dir) => Config::load_or_create(&dir).unwrap_or_else(|e| {
            eprintln!("Using default settings: {e}");
            Config::default()
        }),
        None => Config::default(),
    };
    config.apply_cli_overrides(args);
    config
}

/// The heartbeat contents for the current state of `session`.
fn listing(session: &Session) -> Listing {
    Listing {
        name: session.config().player_name.clone(),
        players: session.players().len(),
        max_players: usize::from(session.config().world.max_players),
        time_left: session.time_left(),
        game_over: session.is_game_over(),
    }
}

/// Who wins when time runs out. Nations compete on the total gold of their
/// players and pirates each on their own; only a pirate win names a player.
/// A tie for the lead has no winner.
fn leader(players: &Roster) -> (Nation, Option<PeerId>) {
    let mut nations: Vec<(Nation, i32)> = Vec::new();
    let mut contenders: Vec<(Nation, Option<PeerId>, i32)> = Vec::new();
    for (peer, entry) in players.iter() {
        match entry.nation {
            Nation::None => {}
            Nation::Pirate => contenders.push((Nation::Pirate, Some(peer), entry.gold)),
            nation => match nations.iter_mut().find(|(n, _)| *n == nation) {
                Some((_, gold)) => *gold = gold.saturating_add(entry.gold),
                None => nations.push((nation, entry.gold)),
            },
        }
    }
    contenders.extend(nations.into_iter().map(|(nation, gold)| (nation, None, gold)));

    let Some(best) = contenders.iter().map(|(_, _, gold)| *gold).max() else {
        return (Nation::None, None);
    };
    let mut leaders = contenders.into_iter().filter(|(_, _, gold)| *gold == best);
    match (leaders.next(), leaders.next()) {
        (Some((nation, winner, _)), None) => (nation, winner),
        _ => (Nation::None, None),
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::PeerJoined { peer, name } => info!("{name} joined as {peer}"),
        SessionEvent::PeerLeft { peer, kicked: true } => info!("{peer} was kicked"),
        SessionEvent::PeerLeft { peer, .. } => info!("{peer} left"),
        SessionEvent::Chat {
            from: Some(peer),
            text,
        } => info!("<{peer}> {text}"),
        SessionEvent::Disconnected { reason } => warn!("Host session ended: {reason:?}"),
        _ => {}
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    let config = load_config(&args);
    pluto_log::init_logging(&config.debug);

    let session_config = SessionConfig::from_config(&config);
    let mut world = HeadlessWorld::new(session_config.world.clone());
    let mut session = Session::new(session_config);
    let addr = match session.host(host_bind_address(config.network.server_port)) {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to host: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(
        "Hosting on {addr} for up to {} players",
        session.config().world.max_players
    );

    let mut master = MasterPublisher::new(&config.master, addr.port());
    if let Some(master) = &master {
        info!("Publishing to {}", master.server());
    }

    let mut interval = tokio::time::interval(TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Received CTRL+C, shutting down");
                break;
            }
            _ = interval.tick() => {
                for event in session.poll(&mut world) {
                    log_event(&event);
                }
                if session.time_left() == Some(Duration::ZERO) && !session.is_game_over() {
                    let (nation, winner) = leader(session.players());
                    info!("Time is up");
                    if let Err(e) = session.end_game(nation, winner) {
                        warn!("Could not end the game: {e}");
                    }
                }
                session.update(&world);
                if let Some(master) = &mut master {
                    master.publish_alive(Instant::now(), &listing(&session));
                }
            }
        }
    }

    session.leave();
    if let Some(master) = &master
        && let Err(e) = master.publish_dead().await
    {
        warn!("Could not remove listing: {e}");
    }
    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affiliate(players: &mut Roster, peer: u8, nation: Nation, gold: i32) {
        let entry = players.join(PeerId(peer));
        entry.nation = nation;
        entry.gold = gold;
    }

    #[test]
    fn test_leader_ignores_unaffiliated_players() {
        let mut players = Roster::new();
        players.join(PeerId(0)).gold = 900;
        affiliate(&mut players, 1, Nation::Red, 40);
        affiliate(&mut players, 2, Nation::Blue, 70);
        assert_eq!(leader(&players), (Nation::Blue, None));
    }

    #[test]
    fn test_leader_totals_gold_per_nation() {
        let mut players = Roster::new();
        affiliate(&mut players, 0, Nation::Red, 60);
        affiliate(&mut players, 1, Nation::Red, 60);
        affiliate(&mut players, 2, Nation::Blue, 100);
        assert_eq!(leader(&players), (Nation::Red, None));
    }

    #[test]
    fn test_tied_lead_has_no_winner() {
        let mut players = Roster::new();
        affiliate(&mut players, 1, Nation::Red, 100);
        affiliate(&mut players, 2, Nation::Blue, 100);
        assert_eq!(leader(&players), (Nation::None, None));

        affiliate(&mut players, 3, Nation::Pirate, 100);
        assert_eq!(leader(&players), (Nation::None, None));
    }

    #[test]
    fn test_pirates_win_individually() {
        let mut players = Roster::new();
        affiliate(&mut players, 1, Nation::Pirate, 90);
        affiliate(&mut players, 2, Nation::Pirate, 90);
        affiliate(&mut players, 3, Nation::Green, 100);
        assert_eq!(leader(&players), (Nation::Green, None));

        affiliate(&mut players, 2, Nation::Pirate, 150);
        assert_eq!(leader(&players), (Nation::Pirate, Some(PeerId(2))));
    }

    #[test]
    fn test_leader_of_empty_roster() {
        assert_eq!(leader(&Roster::new()), (Nation::None, None));
    }

    #[test]
    fn test_listing_for_new_session() {
        let session = Session::new(SessionConfig::default());
        let listing = listing(&session);
        assert_eq!(listing.players, 0);
        assert_eq!(listing.max_players, 12);
        assert!(!listing.game_over);
    }

    #[test]
    fn test_cli_overrides_apply_to_loaded_settings() {
        let temp = tempfile::tempdir().unwrap();
        let dir = temp.path().join("settings");
        let args = CliArgs::parse_from([
            "pluto-server",
            "--port",
            "40001",
            "--config",
            dir.to_str().unwrap(),
        ]);
        let config = load_config(&args);
        assert_eq!(config.network.server_port, 40001);
        assert!(dir.join(pluto_config::CONFIG_FILE).exists());
    }
}
