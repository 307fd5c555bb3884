//! MDASP Device Profile
//!
//! What the DSP board exposes: its GATT identifiers, the register map that
//! addresses each parameter, and the record layouts firmware has shipped.

use crate::domain::models::AudioParameterRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// MDASP GATT service UUID (advertised by the board)
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x000000ff_0000_1000_8000_00805f9b34fb);

/// Parameter characteristic UUID.
/// Reads return the full parameter record, writes (without response) carry
/// one location + payload command.
pub const PARAMETER_CHAR_UUID: Uuid = Uuid::from_u128(0x0000ff01_0000_1000_8000_00805f9b34fb);

/// Local name the board advertises
pub const DEFAULT_DEVICE_NAME: &str = "MDASP Audio Processor";

/// Minimum spacing between throttled writes (~70 Hz)
pub const DEFAULT_MIN_WRITE_INTERVAL_MS: u64 = 14;

/// Firmware record format. Chosen by configuration, never guessed from the
/// length of a read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireVersion {
    /// EQ and compressor only
    V100,
    /// Adds master volume
    V104,
    /// Adds output delay
    #[default]
    V108,
}

impl WireVersion {
    pub fn record_size(self) -> usize {
        match self {
            Self::V100 => 100,
            Self::V104 => 104,
            Self::V108 => 108,
        }
    }
}

/// Register addresses of the device parameter space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Location {
    EqPassthrough = 0x0000,
    EqHighPass = 0x0001,
    EqHighShelf = 0x0002,
    EqBandReject = 0x0003,
    EqLowPass = 0x0004,
    EqLowShelf = 0x0005,
    EqGain = 0x0006,
    EqHighPassFreq = 0x0007,
    EqHighShelfFreq = 0x0008,
    EqBandRejectFreq = 0x0009,
    EqLowPassFreq = 0x000A,
    EqLowShelfFreq = 0x000B,
    EqHighShelfAmount = 0x000C,
    EqBandRejectAmount = 0x000D,
    EqLowShelfAmount = 0x000E,

    CompressorPassthrough = 0x0100,
    CompressorPregain = 0x0101,
    CompressorThreshold = 0x0102,
    CompressorKnee = 0x0103,
    CompressorRatio = 0x0104,
    CompressorAttack = 0x0105,
    CompressorRelease = 0x0106,
    CompressorPredelay = 0x0107,
    CompressorReleaseZone1 = 0x0108,
    CompressorReleaseZone2 = 0x0109,
    CompressorReleaseZone3 = 0x010A,
    CompressorReleaseZone4 = 0x010B,
    CompressorPostgain = 0x010C,
    CompressorWet = 0x010D,
    CompressorMakeupGain = 0x010E,

    Volume = 0x0200,
    Delay = 0x0300,

    /// Commit the current settings as the device's power-on default
    SaveAsDefault = 0xCAFE,
}

impl Location {
    pub const ALL: [Location; 33] = [
        Self::EqPassthrough,
        Self::EqHighPass,
        Self::EqHighShelf,
        Self::EqBandReject,
        Self::EqLowPass,
        Self::EqLowShelf,
        Self::EqGain,
        Self::EqHighPassFreq,
        Self::EqHighShelfFreq,
        Self::EqBandRejectFreq,
        Self::EqLowPassFreq,
        Self::EqLowShelfFreq,
        Self::EqHighShelfAmount,
        Self::EqBandRejectAmount,
        Self::EqLowShelfAmount,
        Self::CompressorPassthrough,
        Self::CompressorPregain,
        Self::CompressorThreshold,
        Self::CompressorKnee,
        Self::CompressorRatio,
        Self::CompressorAttack,
        Self::CompressorRelease,
        Self::CompressorPredelay,
        Self::CompressorReleaseZone1,
        Self::CompressorReleaseZone2,
        Self::CompressorReleaseZone3,
        Self::CompressorReleaseZone4,
        Self::CompressorPostgain,
        Self::CompressorWet,
        Self::CompressorMakeupGain,
        Self::Volume,
        Self::Delay,
        Self::SaveAsDefault,
    ];

    pub fn address(self) -> u16 {
        self as u16
    }

    pub fn from_address(address: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|l| l.address() == address)
    }

    /// Register addressed by the first two bytes of a write command
    pub fn from_command(bytes: &[u8]) -> Option<Self> {
        match bytes {
            [hi, lo, ..] => Self::from_address(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }

    /// Payload kind this register accepts
    pub fn payload_kind(self) -> PayloadKind {
        match self {
            Self::EqPassthrough
            | Self::EqHighPass
            | Self::EqHighShelf
            | Self::EqBandReject
            | Self::EqLowPass
            | Self::EqLowShelf
            | Self::CompressorPassthrough
            | Self::CompressorMakeupGain => PayloadKind::Bool,
            Self::Delay => PayloadKind::Int,
            Self::SaveAsDefault => PayloadKind::None,
            _ => PayloadKind::Float,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06X} ({:?})", self.address(), self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Float,
    Bool,
    Int,
    None,
}

/// Value written to a register
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Payload {
    Float(f32),
    Bool(bool),
    Int(i32),
    /// Trigger-only command
    None,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Float(_) => PayloadKind::Float,
            Self::Bool(_) => PayloadKind::Bool,
            Self::Int(_) => PayloadKind::Int,
            Self::None => PayloadKind::None,
        }
    }
}

/// One register update produced by a store mutator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WriteRequest {
    pub location: Location,
    pub payload: Payload,
    /// Bypass rate limiting (toggles, drag finished)
    pub immediate: bool,
}

impl WriteRequest {
    pub fn immediate(location: Location, payload: Payload) -> Self {
        Self {
            location,
            payload,
            immediate: true,
        }
    }

    pub fn throttled(location: Location, payload: Payload) -> Self {
        Self {
            location,
            payload,
            immediate: false,
        }
    }
}

/// Mutable view of one record field
pub enum FieldRef<'a> {
    Bool(&'a mut bool),
    Float(&'a mut f32),
    Int(&'a mut i32),
}

/// Resolve the record field a register addresses.
/// Returns `None` for trigger-only registers.
pub fn field_mut(record: &mut AudioParameterRecord, location: Location) -> Option<FieldRef<'_>> {
    let eq = &mut record.eq;
    let comp = &mut record.compressor;
    let field = match location {
        Location::EqPassthrough => FieldRef::Bool(&mut eq.passthrough),
        Location::EqHighPass => FieldRef::Bool(&mut eq.hp),
        Location::EqHighShelf => FieldRef::Bool(&mut eq.hs),
        Location::EqBandReject => FieldRef::Bool(&mut eq.br),
        Location::EqLowPass => FieldRef::Bool(&mut eq.lp),
        Location::EqLowShelf => FieldRef::Bool(&mut eq.ls),
        Location::EqGain => FieldRef::Float(&mut eq.gain),
        Location::EqHighPassFreq => FieldRef::Float(&mut eq.hp_freq.0),
        Location::EqHighShelfFreq => FieldRef::Float(&mut eq.hs_freq.0),
        Location::EqBandRejectFreq => FieldRef::Float(&mut eq.br_freq.0),
        Location::EqLowPassFreq => FieldRef::Float(&mut eq.lp_freq.0),
        Location::EqLowShelfFreq => FieldRef::Float(&mut eq.ls_freq.0),
        Location::EqHighShelfAmount => FieldRef::Float(&mut eq.hs_amount),
        Location::EqBandRejectAmount => FieldRef::Float(&mut eq.br_amount),
        Location::EqLowShelfAmount => FieldRef::Float(&mut eq.ls_amount),
        Location::CompressorPassthrough => FieldRef::Bool(&mut comp.passthrough),
        Location::CompressorMakeupGain => FieldRef::Bool(&mut comp.makeup_gain),
        Location::CompressorPregain => FieldRef::Float(&mut comp.pregain),
        Location::CompressorThreshold => FieldRef::Float(&mut comp.threshold),
        Location::CompressorKnee => FieldRef::Float(&mut comp.knee),
        Location::CompressorRatio => FieldRef::Float(&mut comp.ratio),
        Location::CompressorAttack => FieldRef::Float(&mut comp.attack),
        Location::CompressorRelease => FieldRef::Float(&mut comp.release),
        Location::CompressorPredelay => FieldRef::Float(&mut comp.predelay),
        Location::CompressorReleaseZone1 => FieldRef::Float(&mut comp.release_zone1),
        Location::CompressorReleaseZone2 => FieldRef::Float(&mut comp.release_zone2),
        Location::CompressorReleaseZone3 => FieldRef::Float(&mut comp.release_zone3),
        Location::CompressorReleaseZone4 => FieldRef::Float(&mut comp.release_zone4),
        Location::CompressorPostgain => FieldRef::Float(&mut comp.postgain),
        Location::CompressorWet => FieldRef::Float(&mut comp.wet),
        Location::Volume => FieldRef::Float(&mut record.volume),
        Location::Delay => FieldRef::Int(&mut record.delay),
        Location::SaveAsDefault => return None,
    };
    Some(field)
}

/// Current value of the field a register addresses
pub fn field_value(record: &AudioParameterRecord, location: Location) -> Payload {
    let mut copy = *record;
    match field_mut(&mut copy, location) {
        Some(FieldRef::Bool(v)) => Payload::Bool(*v),
        Some(FieldRef::Float(v)) => Payload::Float(*v),
        Some(FieldRef::Int(v)) => Payload::Int(*v),
        None => Payload::None,
    }
}

/// Store a payload into the field a register addresses.
/// Returns false when the payload does not fit the field.
pub fn set_field(record: &mut AudioParameterRecord, location: Location, payload: Payload) -> bool {
    match (field_mut(record, location), payload) {
        (Some(FieldRef::Bool(field)), Payload::Bool(v)) => *field = v,
        (Some(FieldRef::Float(field)), Payload::Float(v)) => *field = v,
        (Some(FieldRef::Int(field)), Payload::Int(v)) => *field = v,
        (None, Payload::None) => {}
        _ => return false,
    }
    true
}
