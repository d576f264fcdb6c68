//! Domain values carried by the protocol.

/// Point-in-time copy of one entity's position, built fresh every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionSnapshot {
    pub entity_id: String,
    pub display_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionSnapshot {
    pub fn new(
        entity_id: impl Into<String>,
        display_name: impl Into<String>,
        x: f64,
        y: f64,
        z: f64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            display_name: display_name.into(),
            x,
            y,
            z,
        }
    }
}

/// Request from upstream to move the named entity. Only produced by
/// [`decode_incoming`](crate::decode_incoming).
#[derive(Debug, Clone, PartialEq)]
pub struct TeleportCommand {
    pub target_name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
