use std::time::Duration;

/// Frames buffered while the link is down before the oldest are evicted.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

/// Upper bound of the first reconnect delay.
pub const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Smallest base accepted by `Backoff::new`, so reconnects never spin.
pub const BACKOFF_FLOOR: Duration = Duration::from_millis(10);

/// Reconnect delays never exceed this.
pub const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// How long `close` waits for the peer to acknowledge a close frame.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
