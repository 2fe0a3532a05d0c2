//! Splitting a byte stream back into messages.
//!
//! The first two bytes of every message hold its total length, prefix
//! included (see [`crate::codec`]). [`FrameCodec`] peeks at that prefix and
//! only yields a message once all of its bytes have arrived; partial messages
//! stay in the buffer for the next call. The same codec splits bytes read from
//! sockets and bytes written to the loopback mailbox, so both paths see
//! identical message boundaries.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{LENGTH_PREFIX, MESSAGE_MAX, MESSAGE_MIN, Packet};

/// Errors that can occur while splitting frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length prefix is smaller than a token-bearing message or larger
    /// than the configured maximum.
    #[error("frame length {len} outside {min}..={max}")]
    InvalidLength {
        /// The declared length.
        len: usize,
        /// Smallest allowed length.
        min: usize,
        /// Largest allowed length.
        max: usize,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Length-prefix framing for the game protocol.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame: usize,
}

impl FrameCodec {
    /// A codec accepting frames up to [`MESSAGE_MAX`].
    pub fn new() -> Self {
        Self {
            max_frame: MESSAGE_MAX,
        }
    }

    /// A codec with a smaller upper bound.
    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            max_frame: max_frame.clamp(MESSAGE_MIN, MESSAGE_MAX),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Packet;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>, FrameError> {
        if src.len() < LENGTH_PREFIX {
            return Ok(None);
        }

        let len = u16::from_le_bytes([src[0], src[1]]) as usize;
        if !(MESSAGE_MIN..=self.max_frame).contains(&len) {
            return Err(FrameError::InvalidLength {
                len,
                min: MESSAGE_MIN,
                max: self.max_frame,
            });
        }

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }

        Ok(Some(Packet::from_frame(src.split_to(len).freeze())))
    }
}

impl Encoder<&Packet> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, packet: &Packet, dst: &mut BytesMut) -> Result<(), FrameError> {
        if packet.len() > self.max_frame {
            return Err(FrameError::InvalidLength {
                len: packet.len(),
                min: MESSAGE_MIN,
                max: self.max_frame,
            });
        }
        dst.extend_from_slice(packet.as_bytes());
        Ok(())
    }
}
