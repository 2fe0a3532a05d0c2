//! Host-authoritative game synchronization on top of `pluto-net`.
//!
//! - [`protocol`] and [`messages`]: token tables and typed message layouts.
//! - [`receive`]: validated reads that turn bad peer input into [`Corrupt`].
//! - [`dispatch`]: routes packets to the table for the receiving role.
//! - [`replication`] and [`cargo`]: per-field change and visibility tracking.
//! - [`session`]: the lifecycle that ties it together.

pub mod cargo;
pub mod dispatch;
pub mod master;
pub mod messages;
pub mod protocol;
pub mod receive;
pub mod replication;
pub mod roster;
pub mod session;
pub mod telemetry;
pub mod world;

pub use cargo::{CargoManifest, CargoSlot};
pub use master::{Listing, MasterPublisher};
pub use messages::{ClientMessage, ClientStats, Init, ServerMessage};
pub use protocol::{AggregateKey, Cargo, EntityId, Nation, PROTOCOL_VERSION};
pub use receive::{Corrupt, Lookup};
pub use replication::{Aggregate, AggregateRegistry, FieldUpdate, Replicable, WireField};
pub use roster::{PlayerEntry, Roster};
pub use session::{
    DisconnectReason, Session, SessionConfig, SessionError, SessionEvent, SessionState,
};
pub use world::{EntitySnapshot, GameWorld, HeadlessWorld, WorldParams};
