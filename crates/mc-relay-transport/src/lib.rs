//! WebSocket client transport with buffered sends and automatic reconnect.

pub mod backoff;
pub mod connection;
pub mod constants;
pub mod error;
pub mod outbox;

pub use backoff::Backoff;
pub use connection::{
    parse_ws_url, ConnectionState, Frame, FrameSink, MessageHandler, OverflowPolicy, StatsSnapshot,
    Transport, TransportConfig, TransportHandle, TransportStats,
};
pub use error::{ConnectError, SendError};
pub use outbox::Outbox;
