//! Player names and the per-peer player list.

use pluto_net::{PEERS_MAX, PeerId};

use crate::protocol::{CHAT_MAX, DEFAULT_NAME, NAME_MAX, Nation};

fn truncate_on_boundary(text: &mut String, max: usize) {
    if text.len() > max {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
    }
}

fn strip_controls(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Cleans a requested player name. Empty names become [`DEFAULT_NAME`].
pub fn sanitize_name(raw: &str) -> String {
    let mut name = strip_controls(raw);
    truncate_on_boundary(&mut name, NAME_MAX);
    let name = name.trim_end().to_string();
    if name.is_empty() {
        DEFAULT_NAME.to_string()
    } else {
        name
    }
}

/// Cleans a chat line. May return an empty string.
pub fn sanitize_chat(raw: &str) -> String {
    let mut text = strip_controls(raw);
    truncate_on_boundary(&mut text, CHAT_MAX);
    text
}

/// Returns `wanted`, or `wanted` with the lowest free " 2", " 3", ... suffix
/// if `taken` reports it in use. The result never exceeds [`NAME_MAX`].
pub fn unique_name(wanted: &str, taken: impl Fn(&str) -> bool) -> String {
    if !taken(wanted) {
        return wanted.to_string();
    }
    let mut n = 2;
    loop {
        let suffix = format!(" {n}");
        let mut base = wanted.to_string();
        truncate_on_boundary(&mut base, NAME_MAX.saturating_sub(suffix.len()));
        let candidate = format!("{}{suffix}", base.trim_end());
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// What everyone knows about one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerEntry {
    /// Empty until the player's greeting has been accepted.
    pub name: String,
    pub nation: Nation,
    pub gold: i32,
    /// Round-trip time in milliseconds.
    pub ping: u16,
}

/// One optional entry per client slot.
#[derive(Debug, Clone)]
pub struct Roster {
    entries: Vec<Option<PlayerEntry>>,
}

impl Roster {
    pub fn new() -> Self {
        Self {
            entries: vec![None; PEERS_MAX],
        }
    }

    /// Adds an empty entry, replacing whatever was in the slot.
    pub fn join(&mut self, peer: PeerId) -> &mut PlayerEntry {
        self.entries[peer.index()].insert(PlayerEntry::default())
    }

    pub fn leave(&mut self, peer: PeerId) -> Option<PlayerEntry> {
        self.entries[peer.index()].take()
    }

    pub fn contains(&self, peer: PeerId) -> bool {
        peer.is_client() && self.entries[peer.index()].is_some()
    }

    pub fn get(&self, peer: PeerId) -> Option<&PlayerEntry> {
        if !peer.is_client() {
            return None;
        }
        self.entries[peer.index()].as_ref()
    }

    pub fn get_mut(&mut self, peer: PeerId) -> Option<&mut PlayerEntry> {
        if !peer.is_client() {
            return None;
        }
        self.entries[peer.index()].as_mut()
    }

    /// Present peers in id order.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, &PlayerEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, entry)| entry.as_ref().map(|e| (PeerId(i as u8), e)))
    }

    /// Bitmask of present peers.
    pub fn mask(&self) -> u32 {
        self.iter().fold(0, |mask, (peer, _)| mask | peer.bit())
    }

    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a player other than `except` already uses `name`, ignoring case.
    pub fn name_taken(&self, name: &str, except: PeerId) -> bool {
        self.iter()
            .any(|(peer, entry)| peer != except && same_name(&entry.name, name))
    }

    /// Sanitizes and deduplicates `raw` for `peer`.
    pub fn claim_name(&self, peer: PeerId, raw: &str) -> String {
        unique_name(&sanitize_name(raw), |name| self.name_taken(name, peer))
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }
}

impl Default for Roster {
    fn default() -> Self {
        Self::new()
    }
}
