use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("unsupported URL scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("transport already started")]
    AlreadyStarted,

    #[error("transport is closed")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("not connected")]
    NotConnected,

    #[error("transport is closed")]
    Closed,
}
