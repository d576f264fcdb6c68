//! Relay core: command dispatch, telemetry publishing, and the supervisor
//! that wires them to the transport.

pub mod dispatcher;
pub mod publisher;
pub mod roster;
pub mod supervisor;

pub use dispatcher::{CommandDispatcher, DispatchError, DispatchMiss, DispatchSnapshot, FrameOutcome};
pub use publisher::{TelemetryPublisher, TickReport};
pub use roster::Roster;
pub use supervisor::{Relay, RelayConfig, RelayError, RelayStats};
