use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A jog direction the gimbal understands.
///
/// The wire form is the lowercase name (`"up"`, `"down"`, ...). `"stop"` is
/// deliberately not a variant: stopping clears the active command rather than
/// selecting a new one, so it must never reach code that expects a direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Every variant, in a fixed order. Used to validate exhaustive mappings.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Parse the lowercase wire form. Anything else, including `"stop"`,
    /// returns `None`.
    pub fn parse(s: &str) -> Option<Direction> {
        match s {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            "left" => Some(Direction::Left),
            "right" => Some(Direction::Right),
            _ => None,
        }
    }

    /// The lowercase wire form of this direction.
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable mapping from [`Direction`] to the opaque vendor frame written to
/// the gimbal for that direction.
///
/// Construction is the validation point: every direction must map to a
/// non-empty frame, so a gap surfaces when configuration is loaded instead of
/// on a delivery tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTable {
    frames: HashMap<Direction, Vec<u8>>,
}

impl CommandTable {
    /// Build a table, verifying that every [`Direction`] has a non-empty frame.
    ///
    /// # Errors
    ///
    /// Returns [`SwivelError::Config`] naming the first direction that is
    /// missing or mapped to an empty frame.
    pub fn new(frames: HashMap<Direction, Vec<u8>>) -> Result<Self, SwivelError> {
        for direction in Direction::ALL {
            match frames.get(&direction) {
                None => {
                    return Err(SwivelError::Config(format!(
                        "no command frame configured for '{direction}'"
                    )));
                }
                Some(frame) if frame.is_empty() => {
                    return Err(SwivelError::Config(format!(
                        "empty command frame configured for '{direction}'"
                    )));
                }
                Some(_) => {}
            }
        }
        Ok(Self { frames })
    }

    /// The frame for `direction`, if present. Tables built through
    /// [`CommandTable::new`] always have one; the option is kept so callers
    /// decide how severe a gap is.
    pub fn frame(&self, direction: Direction) -> Option<&[u8]> {
        self.frames.get(&direction).map(Vec::as_slice)
    }
}

/// One accepted frame from the command channel, stamped with an id and a
/// receive time so a command can be traced from broker to gimbal write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: Uuid,
    pub received_at: DateTime<Utc>,
    /// e.g., "gimbal/commands"
    pub topic: String,
    pub payload: String,
}

impl InboundMessage {
    /// Wrap a raw payload received on `topic`.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            received_at: Utc::now(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Global error type spanning link transport, broker intake, and configuration.
#[derive(Error, Debug)]
pub enum SwivelError {
    #[error("Link Error on {device}: {details}")]
    Link { device: String, details: String },

    #[error("Connect to {device} timed out after {seconds}s")]
    ConnectTimeout { device: String, seconds: u64 },

    #[error("Capability {capability} not found on {device}")]
    CapabilityNotFound { device: String, capability: String },

    #[error("Link Not Ready: {0}")]
    NotReady(String),

    #[error("Write to {device} failed: {details}")]
    WriteFailed { device: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Wire Serialization Error: {0}")]
    Serialization(String),
}

// ---------------------------------------------------------------------------
// Hex helpers
// ---------------------------------------------------------------------------

/// Render bytes as contiguous lowercase hex (`[0x24, 0x3a]` becomes `"243a"`).
pub fn hex_string(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Parse hex text into bytes. Whitespace between byte pairs is allowed so
/// configured frames can be grouped for readability.
///
/// # Errors
///
/// Returns [`SwivelError::Config`] on odd length or a non-hex character.
pub fn parse_hex(s: &str) -> Result<Vec<u8>, SwivelError> {
    let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(compact).map_err(|e| SwivelError::Config(format!("invalid hex '{s}': {e}")))
}
