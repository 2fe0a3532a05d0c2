//! In-process delivery between a host and its own client.
//!
//! When the local process hosts, messages from the server to the host's
//! client (and back) never touch a socket. They are appended to a mailbox in
//! wire form and split again with the same [`FrameCodec`] the socket path
//! uses, so boundaries and ordering match exactly.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::Packet;
use crate::framing::FrameCodec;

/// One direction of loopback traffic.
#[derive(Debug, Default)]
pub struct Mailbox {
    bytes: BytesMut,
    codec: FrameCodec,
}

impl Mailbox {
    /// An empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a message.
    pub fn post(&mut self, packet: &Packet) {
        // Packets built by MessageWriter always fit the default codec.
        if let Err(e) = self.codec.encode(packet, &mut self.bytes) {
            tracing::warn!("Loopback refused {packet:?}: {e}");
        }
    }

    /// Removes every complete message, oldest first. A bad frame discards
    /// everything after it, since the stream cannot be resynchronized.
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        loop {
            match self.codec.decode(&mut self.bytes) {
                Ok(Some(packet)) => packets.push(packet),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        "Bad loopback frame, discarding {} bytes: {e}",
                        self.bytes.len()
                    );
                    self.bytes.clear();
                    break;
                }
            }
        }
        packets
    }

    /// Bytes waiting for delivery.
    pub fn pending_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Discards everything.
    pub fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Both loopback directions for a hosting process.
#[derive(Debug, Default)]
pub struct Loopback {
    /// Server to host client.
    pub to_client: Mailbox,
    /// Host client to server.
    pub to_server: Mailbox,
}

impl Loopback {
    /// Discards both directions.
    pub fn clear(&mut self) {
        self.to_client.clear();
        self.to_server.clear();
    }
}
