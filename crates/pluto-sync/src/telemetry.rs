//! Round-trip measurement and periodic timers.
//!
//! The server periodically sends every peer an echo request carrying a
//! random value and times the matching reply. The numbers only feed the
//! player list; a slow or silent peer is never dropped for it.

use std::time::{Duration, Instant};

use pluto_net::{PEERS_MAX, PeerId};

/// Shortest echo interval accepted from settings.
pub const ECHO_RATE_MIN: Duration = Duration::from_millis(100);

/// Fires once every `period`.
#[derive(Debug, Clone)]
pub struct Ticker {
    period: Duration,
    next: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    /// Returns `true` at most once per period. The first call fires.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.next {
            Some(next) if now < next => false,
            _ => {
                self.next = Some(now + self.period);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.next = None;
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct EchoState {
    outstanding: Option<(u32, Instant)>,
    rtt: Option<Duration>,
}

/// Echo bookkeeping for every client slot.
#[derive(Debug, Clone)]
pub struct EchoTracker {
    ticker: Option<Ticker>,
    echoes: [EchoState; PEERS_MAX],
}

impl EchoTracker {
    /// `None` disables echo requests. Shorter rates are raised to
    /// [`ECHO_RATE_MIN`].
    pub fn new(rate: Option<Duration>) -> Self {
        Self {
            ticker: rate.map(|rate| Ticker::new(rate.max(ECHO_RATE_MIN))),
            echoes: [EchoState::default(); PEERS_MAX],
        }
    }

    /// Whether a new round of requests should go out.
    pub fn due(&mut self, now: Instant) -> bool {
        self.ticker.as_mut().is_some_and(|ticker| ticker.due(now))
    }

    /// Records that `data` was sent to every peer in `mask` at `now`.
    pub fn sent(&mut self, mask: u32, data: u32, now: Instant) {
        for peer in PeerId::iter_mask(mask) {
            self.echoes[peer.index()].outstanding = Some((data, now));
        }
    }

    /// Handles a reply. Returns the new round-trip time if `data` answers
    /// the request outstanding for `peer`.
    pub fn reply(&mut self, peer: PeerId, data: u32, now: Instant) -> Option<Duration> {
        let echo = &mut self.echoes[peer.index()];
        match echo.outstanding {
            Some((sent, at)) if sent == data => {
                echo.outstanding = None;
                let rtt = now.saturating_duration_since(at);
                echo.rtt = Some(rtt);
                Some(rtt)
            }
            _ => None,
        }
    }

    pub fn rtt(&self, peer: PeerId) -> Option<Duration> {
        self.echoes[peer.index()].rtt
    }

    /// Round-trip time in whole milliseconds for the wire, zero if unknown.
    pub fn ping_ms(&self, peer: PeerId) -> u16 {
        self.rtt(peer)
            .map_or(0, |rtt| u16::try_from(rtt.as_millis()).unwrap_or(u16::MAX))
    }

    pub fn forget(&mut self, peer: PeerId) {
        self.echoes[peer.index()] = EchoState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_fires_once_per_period() {
        let start = Instant::now();
        let mut ticker = Ticker::new(Duration::from_secs(1));
        assert!(ticker.due(start));
        assert!(!ticker.due(start + Duration::from_millis(999)));
        assert!(ticker.due(start + Duration::from_secs(1)));
    }

    #[test]
    fn test_matching_reply_sets_rtt() {
        let start = Instant::now();
        let mut echo = EchoTracker::new(Some(Duration::from_secs(10)));
        echo.sent(0b11, 77, start);
        assert_eq!(echo.reply(PeerId(1), 76, start), None);
        assert_eq!(
            echo.reply(PeerId(1), 77, start + Duration::from_millis(40)),
            Some(Duration::from_millis(40))
        );
        assert_eq!(echo.ping_ms(PeerId(1)), 40);
        assert_eq!(echo.ping_ms(PeerId(0)), 0);
        // A second identical reply is stale.
        assert_eq!(echo.reply(PeerId(1), 77, start), None);
    }

    #[test]
    fn test_disabled_echo_never_due() {
        let mut echo = EchoTracker::new(None);
        assert!(!echo.due(Instant::now()));
    }

    #[test]
    fn test_rate_is_clamped() {
        let start = Instant::now();
        let mut echo = EchoTracker::new(Some(Duration::from_millis(1)));
        assert!(echo.due(start));
        assert!(!echo.due(start + Duration::from_millis(50)));
        assert!(echo.due(start + ECHO_RATE_MIN));
    }

    #[test]
    fn test_forget_clears_peer() {
        let start = Instant::now();
        let mut echo = EchoTracker::new(Some(ECHO_RATE_MIN));
        echo.sent(0b1, 5, start);
        echo.reply(PeerId(0), 5, start);
        echo.forget(PeerId(0));
        assert_eq!(echo.rtt(PeerId(0)), None);
    }
}
