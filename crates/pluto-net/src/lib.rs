//! Networking for Pluto: the wire codec, stream framing, and a poll-driven
//! TCP transport with an in-process loopback path for the host's own client.
//!
//! Nothing here knows what a message means. Token tables, validation and
//! replication live in `pluto-sync`.

pub mod codec;
pub mod framing;
pub mod http;
pub mod loopback;
pub mod peer;
pub mod platform;
pub mod transport;

pub use codec::{
    CodecError, Field, FieldType, LENGTH_PREFIX, MESSAGE_MAX, MESSAGE_MIN, MessageReader,
    MessageWriter, Packet,
};
pub use framing::{FrameCodec, FrameError};
pub use http::{HttpError, post_form};
pub use loopback::{Loopback, Mailbox};
pub use peer::{PEERS_MAX, PeerId, Target};
pub use platform::{SocketConfig, host_bind_address};
pub use transport::{NetEvent, Role, Transport, TransportConfig, TransportError, TransportStats};
