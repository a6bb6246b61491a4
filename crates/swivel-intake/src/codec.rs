//! Inbound payload decoding.
//!
//! The broker delivers command payloads as free text. [`decode`] normalizes
//! one payload and classifies it; it never fails, unrecognized text simply
//! comes back as [`DecodedCommand::Unknown`] for the caller to log.

use swivel_types::Direction;

/// Classification of one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedCommand {
    /// A recognized movement command.
    Move(Direction),
    /// The explicit stop request.
    Halt,
    /// Anything else, carrying the normalized text for logging.
    Unknown(String),
}

/// Trim, lowercase and classify one payload.
pub fn decode(payload: &str) -> DecodedCommand {
    let normalized = payload.trim().to_lowercase();
    if normalized == "stop" {
        return DecodedCommand::Halt;
    }
    match Direction::parse(&normalized) {
        Some(direction) => DecodedCommand::Move(direction),
        None => DecodedCommand::Unknown(normalized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_every_direction() {
        for direction in Direction::ALL {
            assert_eq!(decode(direction.as_str()), DecodedCommand::Move(direction));
        }
    }

    #[test]
    fn normalizes_case_and_padding() {
        assert_eq!(decode("  RIGHT \n"), DecodedCommand::Move(Direction::Right));
        assert_eq!(decode("Up"), DecodedCommand::Move(Direction::Up));
    }

    #[test]
    fn stop_decodes_to_halt() {
        assert_eq!(decode("stop"), DecodedCommand::Halt);
        assert_eq!(decode(" STOP "), DecodedCommand::Halt);
    }

    #[test]
    fn unrecognized_text_is_unknown() {
        assert_eq!(
            decode("wiggle"),
            DecodedCommand::Unknown("wiggle".to_string())
        );
    }

    #[test]
    fn empty_payload_is_unknown() {
        assert_eq!(decode(""), DecodedCommand::Unknown(String::new()));
        assert_eq!(decode("   "), DecodedCommand::Unknown(String::new()));
    }
}
