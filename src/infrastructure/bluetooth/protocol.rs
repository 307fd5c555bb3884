//! MDASP Device Protocol
//!
//! Write-command format understood by the MDASP DSP board. Every write is a
//! 2-byte big-endian register address ("location") followed by a payload
//! whose encoding depends on the register.

use crate::domain::device::{Location, Payload, PayloadKind};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("parameter record size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("location {location} does not accept a {kind:?} payload")]
    UnsupportedPayloadType {
        location: Location,
        kind: PayloadKind,
    },
}

/// Build a write command for one register.
///
/// # Command Structure
///
/// ```text
/// [0-1]   : Location (u16 big-endian)
/// [2..]   : Payload
///           Float -> 4 bytes IEEE-754 little-endian
///           Bool  -> 1 byte, 0x01 / 0x00
///           Int   -> 4 bytes i32 little-endian
///           None  -> nothing
/// ```
///
/// A payload that does not match the register's kind is a caller bug.
pub fn encode_command(location: Location, payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let checked = check_payload(location, payload);
    debug_assert!(checked.is_ok(), "payload kind mismatch for {location}");
    checked?;

    let mut bytes = Vec::with_capacity(6);
    bytes.extend_from_slice(&location.address().to_be_bytes());
    match payload {
        Payload::Float(value) => bytes.extend_from_slice(&value.to_le_bytes()),
        Payload::Bool(value) => bytes.push(u8::from(*value)),
        Payload::Int(value) => bytes.extend_from_slice(&value.to_le_bytes()),
        Payload::None => {}
    }
    Ok(bytes)
}

/// Reject a payload the register does not accept
pub fn check_payload(location: Location, payload: &Payload) -> Result<(), CodecError> {
    let kind = payload.kind();
    if kind != location.payload_kind() {
        return Err(CodecError::UnsupportedPayloadType { location, kind });
    }
    Ok(())
}

/// Format bytes as space-separated hex for trace logging
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_command_bytes() {
        let bytes = encode_command(Location::EqPassthrough, &Payload::Bool(false)).unwrap();
        assert_eq!(bytes, vec![0x00, 0x00, 0x00]);

        let bytes = encode_command(Location::CompressorMakeupGain, &Payload::Bool(true)).unwrap();
        assert_eq!(bytes, vec![0x01, 0x0E, 0x01]);
    }

    #[test]
    fn test_float_command_is_little_endian() {
        let bytes = encode_command(Location::CompressorPregain, &Payload::Float(1.0)).unwrap();
        assert_eq!(bytes, vec![0x01, 0x01, 0x00, 0x00, 0x80, 0x3F]);
    }

    #[test]
    fn test_delay_command_is_i32_little_endian() {
        let bytes = encode_command(Location::Delay, &Payload::Int(300)).unwrap();
        assert_eq!(bytes, vec![0x03, 0x00, 0x2C, 0x01, 0x00, 0x00]);
    }

    #[test]
    fn test_save_default_has_no_payload() {
        let bytes = encode_command(Location::SaveAsDefault, &Payload::None).unwrap();
        assert_eq!(bytes, vec![0xCA, 0xFE]);
    }

    #[test]
    fn test_mismatched_payload_is_rejected() {
        let err = check_payload(Location::Volume, &Payload::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnsupportedPayloadType {
                location: Location::Volume,
                kind: PayloadKind::Bool,
            }
        );
        assert!(check_payload(Location::Delay, &Payload::Int(5)).is_ok());
        assert!(check_payload(Location::SaveAsDefault, &Payload::Float(0.0)).is_err());
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_mismatched_payload_is_not_encoded() {
        assert!(encode_command(Location::Volume, &Payload::Bool(true)).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "payload kind mismatch")]
    fn test_mismatched_payload_fails_fast() {
        let _ = encode_command(Location::Volume, &Payload::Bool(true));
    }
}
