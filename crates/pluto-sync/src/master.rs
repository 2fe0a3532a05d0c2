//! Advertising a hosted game on the master server.
//!
//! While a game is running the host posts a heartbeat every publish
//! interval on a spawned task, so the tick never waits on it. When hosting
//! ends a final "dead" heartbeat carrying only the port is awaited with a
//! short timeout, so the listing disappears promptly.

use std::time::{Duration, Instant};

use pluto_config::MasterConfig;
use pluto_net::{HttpError, post_form};
use tokio::task::JoinHandle;

use crate::protocol::PROTOCOL_VERSION;
use crate::telemetry::Ticker;

/// What a heartbeat says about the game.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub name: String,
    pub players: usize,
    pub max_players: usize,
    pub time_left: Option<Duration>,
    pub game_over: bool,
}

impl Listing {
    /// The human-readable summary shown in server browsers.
    pub fn info(&self) -> String {
        let minutes = self.time_left.map_or(0, |t| t.as_secs() / 60);
        format!("{}/{}, {} min", self.players, self.max_players, minutes)
    }
}

/// Sends heartbeats for one hosted game.
#[derive(Debug)]
pub struct MasterPublisher {
    server: String,
    path: String,
    timeout: Duration,
    port: u16,
    ticker: Ticker,
}

impl MasterPublisher {
    /// Returns `None` when no master server is configured.
    pub fn new(master: &MasterConfig, port: u16) -> Option<Self> {
        let server = master.server.trim();
        if server.is_empty() {
            return None;
        }
        Some(Self {
            server: server.to_string(),
            path: if master.url.is_empty() {
                "/".to_string()
            } else {
                master.url.clone()
            },
            timeout: Duration::from_millis(master.timeout_ms),
            port,
            ticker: Ticker::new(Duration::from_secs(master.publish_interval_s.max(1))),
        })
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// Form fields of a live heartbeat.
    pub fn alive_fields(&self, listing: &Listing) -> Vec<(&'static str, String)> {
        vec![
            ("protocol", PROTOCOL_VERSION.to_string()),
            ("name", listing.name.clone()),
            ("info", listing.info()),
            ("port", self.port.to_string()),
        ]
    }

    /// Form fields of the final heartbeat.
    pub fn dead_fields(&self) -> Vec<(&'static str, String)> {
        vec![("port", self.port.to_string())]
    }

    /// Spawns a heartbeat if one is due and the game is still running.
    /// Must be called from within a Tokio runtime.
    pub fn publish_alive(&mut self, now: Instant, listing: &Listing) -> Option<JoinHandle<()>> {
        if listing.game_over || !self.ticker.due(now) {
            return None;
        }
        let fields = self.alive_fields(listing);
        let server = self.server.clone();
        let path = self.path.clone();
        let timeout = self.timeout;
        Some(tokio::spawn(async move {
            match post_form(&server, &path, &fields, timeout).await {
                Ok(status) => tracing::debug!("Heartbeat to {server} answered {status}"),
                Err(e) => tracing::warn!("Heartbeat to {server} failed: {e}"),
            }
        }))
    }

    /// Tells the master server the game is gone, waiting at most the
    /// configured timeout.
    pub async fn publish_dead(&self) -> Result<u16, HttpError> {
        let status = post_form(&self.server, &self.path, &self.dead_fields(), self.timeout).await?;
        tracing::info!("Removed listing from {}", self.server);
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn listing() -> Listing {
        Listing {
            name: "Open Sea".into(),
            players: 3,
            max_players: 12,
            time_left: Some(Duration::from_secs(40 * 60 + 30)),
            game_over: false,
        }
    }

    fn master(server: &str) -> MasterConfig {
        MasterConfig {
            server: server.into(),
            url: "/list".into(),
            publish_interval_s: 300,
            timeout_ms: 1000,
        }
    }

    /// Accepts one request and returns its text.
    async fn capture_one(listener: TcpListener) -> String {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut received = Vec::new();
        let mut chunk = [0u8; 512];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            received.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&received);
            if n == 0 || text.contains("port=32500") {
                break;
            }
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n")
            .await
            .unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    #[test]
    fn test_blank_server_disables_publishing() {
        assert!(MasterPublisher::new(&master("  "), 32500).is_none());
    }

    #[test]
    fn test_info_summarizes_players_and_minutes() {
        assert_eq!(listing().info(), "3/12, 40 min");
        let unlimited = Listing {
            time_left: None,
            ..listing()
        };
        assert_eq!(unlimited.info(), "3/12, 0 min");
    }

    #[test]
    fn test_alive_and_dead_fields() {
        let publisher = MasterPublisher::new(&master("m.example"), 32500).unwrap();
        let alive = publisher.alive_fields(&listing());
        let keys: Vec<_> = alive.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, ["protocol", "name", "info", "port"]);
        assert_eq!(alive[0].1, "7");
        assert_eq!(publisher.dead_fields(), [("port", "32500".to_string())]);
    }

    #[tokio::test]
    async fn test_alive_heartbeat_is_rate_limited_and_skipped_after_game_over() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(capture_one(listener));

        let mut publisher = MasterPublisher::new(&master(&addr.to_string()), 32500).unwrap();
        let now = Instant::now();
        let handle = publisher.publish_alive(now, &listing()).unwrap();
        assert!(publisher.publish_alive(now, &listing()).is_none());
        handle.await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /list HTTP/1.1"));
        assert!(request.contains("name=Open+Sea"));
        assert!(request.contains("info=3%2F12%2C+40+min"));

        let over = Listing {
            game_over: true,
            ..listing()
        };
        let later = now + Duration::from_secs(301);
        assert!(publisher.publish_alive(later, &over).is_none());
    }

    #[tokio::test]
    async fn test_dead_heartbeat_is_awaited() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(capture_one(listener));

        let publisher = MasterPublisher::new(&master(&addr.to_string()), 32500).unwrap();
        assert_eq!(publisher.publish_dead().await.unwrap(), 200);
        let request = server.await.unwrap();
        assert!(request.ends_with("\r\n\r\nport=32500"));
    }
}
