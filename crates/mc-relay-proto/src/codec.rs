//! Text encoding for outbound snapshots and decoding for inbound commands.
//!
//! Outbound frames have a fixed field order and two decimal places per
//! coordinate:
//!
//! ```text
//! {"uuid":"<id>","name":"<name>","x":1.00,"y":64.00,"z":-3.25}
//! ```
//!
//! Inbound frames are JSON objects tagged with `type`. Only `"teleport"` is
//! acted on; every other tag decodes to [`Incoming::Ignored`].

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::error::{DecodeError, EncodeError};
use crate::types::{PositionSnapshot, TeleportCommand};

/// Type tag of the only inbound message kind the relay executes.
pub const TELEPORT_KIND: &str = "teleport";

/// Result of decoding a well-formed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Teleport(TeleportCommand),
    /// A valid message of a kind this relay does not handle.
    Ignored { kind: String },
}

/// Encode a snapshot as one outbound text frame.
pub fn encode_snapshot(snapshot: &PositionSnapshot) -> Result<String, EncodeError> {
    for (field, value) in [("x", snapshot.x), ("y", snapshot.y), ("z", snapshot.z)] {
        if !value.is_finite() {
            return Err(EncodeError::NonFinite { field });
        }
    }

    let mut out = String::with_capacity(64 + snapshot.entity_id.len() + snapshot.display_name.len());
    out.push_str("{\"uuid\":");
    push_json_string(&mut out, &snapshot.entity_id);
    out.push_str(",\"name\":");
    push_json_string(&mut out, &snapshot.display_name);
    let coordinates = [
        (",\"x\":", snapshot.x),
        (",\"y\":", snapshot.y),
        (",\"z\":", snapshot.z),
    ];
    for (key, value) in coordinates {
        out.push_str(key);
        push_coordinate(&mut out, value);
    }
    out.push('}');
    Ok(out)
}

/// Decode one inbound frame.
///
/// Coordinates are parsed at full `f64` precision; the two-decimal rounding
/// only applies to outbound snapshots.
pub fn decode_incoming(frame: &[u8]) -> Result<Incoming, DecodeError> {
    let value: Value =
        serde_json::from_slice(frame).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let message = match value {
        Value::Object(message) => message,
        other => {
            return Err(DecodeError::Malformed(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };

    let kind = match message.get("type") {
        Some(Value::String(kind)) => kind,
        Some(other) => {
            return Err(DecodeError::WrongType {
                found: json_kind(other),
            })
        }
        None => return Err(DecodeError::MissingField("type")),
    };

    if kind != TELEPORT_KIND {
        return Ok(Incoming::Ignored { kind: kind.clone() });
    }

    Ok(Incoming::Teleport(TeleportCommand {
        target_name: string_field(&message, "target")?,
        x: number_field(&message, "x")?,
        y: number_field(&message, "y")?,
        z: number_field(&message, "z")?,
    }))
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn push_json_string(out: &mut String, s: &str) {
    // Display for Value emits a correctly escaped JSON string literal.
    let _ = write!(out, "{}", Value::from(s));
}

/// Two decimals, rounding exact ties away from zero (`64.125` -> `64.13`).
/// `{:.2}` alone would round those ties to even.
fn push_coordinate(out: &mut String, value: f64) {
    if !is_hundredths_tie(value) {
        // Writing into a String cannot fail.
        let _ = write!(out, "{value:.2}");
        return;
    }
    // Ties are odd multiples of 1/8, so the exact three-decimal text ends in
    // .125, .375, .625 or .875 and bumping the hundredths digit never carries.
    let exact = format!("{value:.3}");
    let kept = &exact[..exact.len() - 1];
    let (head, last) = kept.split_at(kept.len() - 1);
    out.push_str(head);
    out.push(match last.as_bytes()[0] {
        b'2' => '3',
        b'7' => '8',
        other => other as char,
    });
}

/// True when `value` lies exactly halfway between two hundredths, i.e. it is
/// an odd multiple of 1/200. For a binary float that means an odd multiple of
/// 1/8: mantissa `m * 2^e` with `m` odd and `e == -3`.
fn is_hundredths_tie(value: f64) -> bool {
    let bits = value.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if exp_bits == 0 {
        (fraction, -1074)
    } else {
        (fraction | (1u64 << 52), exp_bits - 1075)
    };
    if mantissa == 0 || exp_bits == 0x7ff {
        return false;
    }
    mantissa.trailing_zeros() as i32 + exp == -3
}

fn string_field(message: &Map<String, Value>, field: &'static str) -> Result<String, DecodeError> {
    match message.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(DecodeError::BadType {
            field,
            expected: "a string",
            found: json_kind(other),
        }),
        None => Err(DecodeError::MissingField(field)),
    }
}

fn number_field(message: &Map<String, Value>, field: &'static str) -> Result<f64, DecodeError> {
    match message.get(field) {
        Some(Value::Number(n)) => n.as_f64().ok_or(DecodeError::BadType {
            field,
            expected: "a finite number",
            found: "number",
        }),
        Some(other) => Err(DecodeError::BadType {
            field,
            expected: "a number",
            found: json_kind(other),
        }),
        None => Err(DecodeError::MissingField(field)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
