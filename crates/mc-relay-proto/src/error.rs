//! Codec errors.

use thiserror::Error;

/// Why an inbound frame could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The `type` tag is present but is not a string, so the frame cannot be
    /// classified at all.
    #[error("message type tag must be a string, got {found}")]
    WrongType { found: &'static str },

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{field}` must be {expected}, got {found}")]
    BadType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Why a snapshot could not be written to the wire.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("coordinate `{field}` is not finite")]
    NonFinite { field: &'static str },
}
