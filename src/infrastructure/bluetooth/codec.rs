//! Parameter Record Codec
//!
//! Converts between [`AudioParameterRecord`] and the fixed-layout block the
//! device returns when the parameter characteristic is read.
//!
//! # Record Layout (little-endian)
//!
//! ```text
//! [0]       : EQ passthrough (u8, non-zero = true)
//! [1]       : EQ high-pass enable
//! [2]       : EQ high-shelf enable
//! [3]       : EQ band-reject enable
//! [4]       : EQ low-pass enable
//! [5]       : EQ low-shelf enable
//! [6-7]     : Padding
//! [8-43]    : EQ gain, hp/hs/br/lp/ls frequency, hs/br/ls amount (9 x f32)
//! [44]      : Compressor passthrough
//! [45]      : Compressor makeup-gain enable
//! [46-47]   : Padding
//! [48-99]   : pregain, threshold, knee, ratio, attack, release, predelay,
//!             release zone 1-4, postgain, wet (13 x f32)
//! [100-103] : Volume (f32, dB)            - V104 and later
//! [104-107] : Delay (i32, milliseconds)   - V108
//! ```
//!
//! Frequencies are stored as a fraction of the 48 kHz reference.

use crate::domain::device::{field_mut, field_value, FieldRef, Location, Payload, WireVersion};
use crate::domain::models::AudioParameterRecord;
use crate::infrastructure::bluetooth::protocol::CodecError;
use tracing::trace;

/// Fields present in a record version, with their byte offsets
pub fn layout(version: WireVersion) -> &'static [(Location, usize)] {
    match version {
        WireVersion::V100 => &LAYOUT[..LAYOUT.len() - 2],
        WireVersion::V104 => &LAYOUT[..LAYOUT.len() - 1],
        WireVersion::V108 => LAYOUT,
    }
}

/// Field table for the record block. Each entry names the register that
/// addresses the field and its offset; the register's payload kind gives
/// the field's width.
pub const LAYOUT: &[(Location, usize)] = &[
    (Location::EqPassthrough, 0),
    (Location::EqHighPass, 1),
    (Location::EqHighShelf, 2),
    (Location::EqBandReject, 3),
    (Location::EqLowPass, 4),
    (Location::EqLowShelf, 5),
    (Location::EqGain, 8),
    (Location::EqHighPassFreq, 12),
    (Location::EqHighShelfFreq, 16),
    (Location::EqBandRejectFreq, 20),
    (Location::EqLowPassFreq, 24),
    (Location::EqLowShelfFreq, 28),
    (Location::EqHighShelfAmount, 32),
    (Location::EqBandRejectAmount, 36),
    (Location::EqLowShelfAmount, 40),
    (Location::CompressorPassthrough, 44),
    (Location::CompressorMakeupGain, 45),
    (Location::CompressorPregain, 48),
    (Location::CompressorThreshold, 52),
    (Location::CompressorKnee, 56),
    (Location::CompressorRatio, 60),
    (Location::CompressorAttack, 64),
    (Location::CompressorRelease, 68),
    (Location::CompressorPredelay, 72),
    (Location::CompressorReleaseZone1, 76),
    (Location::CompressorReleaseZone2, 80),
    (Location::CompressorReleaseZone3, 84),
    (Location::CompressorReleaseZone4, 88),
    (Location::CompressorPostgain, 92),
    (Location::CompressorWet, 96),
    (Location::Volume, 100),
    (Location::Delay, 104),
];

fn read_4(bytes: &[u8], offset: usize) -> [u8; 4] {
    [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]
}

/// Decode a parameter record read from the device.
///
/// The buffer must be exactly `version.record_size()` bytes. On mismatch
/// nothing is produced; fields the version does not carry keep their
/// defaults.
pub fn decode_record(
    version: WireVersion,
    bytes: &[u8],
) -> Result<AudioParameterRecord, CodecError> {
    let expected = version.record_size();
    if bytes.len() != expected {
        return Err(CodecError::SizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }

    trace!("Raw record: {:02X?}", bytes);

    let mut record = AudioParameterRecord::default();
    for &(location, offset) in layout(version) {
        match field_mut(&mut record, location) {
            Some(FieldRef::Bool(v)) => *v = bytes[offset] != 0,
            Some(FieldRef::Float(v)) => *v = f32::from_le_bytes(read_4(bytes, offset)),
            Some(FieldRef::Int(v)) => *v = i32::from_le_bytes(read_4(bytes, offset)),
            None => {}
        }
    }

    Ok(record)
}

/// Encode a full record image, padding zeroed.
pub fn encode_record(version: WireVersion, record: &AudioParameterRecord) -> Vec<u8> {
    let mut bytes = vec![0u8; version.record_size()];
    for &(location, offset) in layout(version) {
        match field_value(record, location) {
            Payload::Bool(v) => bytes[offset] = u8::from(v),
            Payload::Float(v) => bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes()),
            Payload::Int(v) => bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes()),
            Payload::None => {}
        }
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::NormalizedFrequency;
    use crate::domain::device::PayloadKind;

    fn sample_record() -> AudioParameterRecord {
        let mut record = AudioParameterRecord::default();
        record.eq.hp = true;
        record.eq.ls = true;
        record.eq.gain = 0.8;
        record.eq.hp_freq = NormalizedFrequency::from_hz(80.0);
        record.eq.ls_freq = NormalizedFrequency::from_hz(15_000.0);
        record.eq.ls_amount = 0.5;
        record.compressor.makeup_gain = true;
        record.compressor.threshold = -24.0;
        record.compressor.ratio = 4.0;
        record.compressor.release_zone3 = 0.125;
        record.compressor.wet = 1.0;
        record.volume = -12.5;
        record.delay = 250;
        record
    }

    #[test]
    fn test_layout_is_contiguous_and_fits() {
        for version in [WireVersion::V100, WireVersion::V104, WireVersion::V108] {
            let mut covered = vec![false; version.record_size()];
            for &(location, offset) in layout(version) {
                let width = match location.payload_kind() {
                    PayloadKind::Bool => 1,
                    _ => 4,
                };
                for slot in &mut covered[offset..offset + width] {
                    assert!(!*slot, "overlap at {location}");
                    *slot = true;
                }
            }
            let padding: Vec<usize> = covered
                .iter()
                .enumerate()
                .filter(|(_, c)| !**c)
                .map(|(i, _)| i)
                .collect();
            assert_eq!(padding, vec![6, 7, 46, 47]);
        }
    }

    #[test]
    fn test_round_trip_is_bit_exact() {
        let record = sample_record();
        let bytes = encode_record(WireVersion::V108, &record);
        assert_eq!(bytes.len(), 108);
        let decoded = decode_record(WireVersion::V108, &bytes).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.eq.hp_freq.raw().to_bits(), record.eq.hp_freq.raw().to_bits());
    }

    #[test]
    fn test_round_trip_odd_floats() {
        let mut record = sample_record();
        record.compressor.knee = f32::MIN_POSITIVE / 2.0;
        record.compressor.attack = -0.0;
        record.eq.br_amount = f32::MAX;
        let decoded = decode_record(WireVersion::V108, &encode_record(WireVersion::V108, &record))
            .unwrap();
        assert_eq!(decoded.compressor.knee.to_bits(), record.compressor.knee.to_bits());
        assert_eq!(decoded.compressor.attack.to_bits(), (-0.0f32).to_bits());
        assert_eq!(decoded.eq.br_amount, f32::MAX);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        for len in [0, 51, 100, 104, 107, 109] {
            let err = decode_record(WireVersion::V108, &vec![0u8; len]).unwrap_err();
            assert_eq!(
                err,
                CodecError::SizeMismatch {
                    expected: 108,
                    actual: len
                }
            );
        }
    }

    #[test]
    fn test_passthrough_only_buffer() {
        let mut bytes = vec![0u8; 108];
        bytes[0] = 0x01;
        let record = decode_record(WireVersion::V108, &bytes).unwrap();
        assert!(record.eq.passthrough);
        assert!(!record.eq.hp && !record.eq.hs && !record.eq.lp && !record.eq.ls);
        assert_eq!(record.eq.gain, 0.0);
        assert_eq!(record.compressor.wet, 0.0);
        assert_eq!(record.volume, 0.0);
        assert_eq!(record.delay, 0);
    }

    #[test]
    fn test_nonzero_byte_is_true() {
        let mut bytes = vec![0u8; 108];
        bytes[45] = 0x7F;
        let record = decode_record(WireVersion::V108, &bytes).unwrap();
        assert!(record.compressor.makeup_gain);
        assert!(!record.compressor.passthrough);
    }

    #[test]
    fn test_padding_is_ignored() {
        let mut bytes = encode_record(WireVersion::V108, &sample_record());
        bytes[6] = 0xAA;
        bytes[47] = 0x55;
        assert_eq!(decode_record(WireVersion::V108, &bytes).unwrap(), sample_record());
    }

    #[test]
    fn test_known_offsets() {
        let bytes = encode_record(WireVersion::V108, &sample_record());
        assert_eq!(&bytes[52..56], &(-24.0f32).to_le_bytes());
        assert_eq!(&bytes[100..104], &(-12.5f32).to_le_bytes());
        assert_eq!(&bytes[104..108], &250i32.to_le_bytes());
        assert_eq!(bytes[1], 1);
        assert_eq!(bytes[5], 1);
    }

    #[test]
    fn test_legacy_versions_drop_tail_fields() {
        let record = sample_record();

        let v104 = decode_record(WireVersion::V104, &encode_record(WireVersion::V104, &record))
            .unwrap();
        assert_eq!(v104.volume, -12.5);
        assert_eq!(v104.delay, 0);

        let v100 = decode_record(WireVersion::V100, &encode_record(WireVersion::V100, &record))
            .unwrap();
        assert_eq!(v100.volume, 0.0);
        assert_eq!(v100.eq, record.eq);
        assert_eq!(v100.compressor, record.compressor);
    }
}
