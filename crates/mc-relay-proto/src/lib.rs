//! Wire protocol between the relay and the upstream telemetry service.
//!
//! Two message kinds travel over text frames: position snapshots go out,
//! teleport commands come in. Anything else the upstream sends is classified
//! as [`Incoming::Ignored`] so newer services can add message kinds without
//! breaking older relays.

pub mod codec;
pub mod error;
pub mod types;

pub use codec::{decode_incoming, encode_snapshot, Incoming, TELEPORT_KIND};
pub use error::{DecodeError, EncodeError};
pub use types::{PositionSnapshot, TeleportCommand};
