//! Parameter Store
//!
//! Canonical copy of the connected device's parameters. UI bindings call
//! the mutators; each one updates the record and returns the writes that
//! bring the device in line.

use crate::domain::models::{
    db_to_linear, AudioParameterRecord, NormalizedFrequency, MAX_DELAY_MS, MAX_VOLUME_DB,
    MIN_VOLUME_DB,
};
use crate::domain::device::{self, Location, Payload, WriteRequest};
use tracing::warn;

/// Stage of a continuous control gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// Slider still moving; rate limited
    Dragging,
    /// Gesture released; always transmitted
    Finished,
}

impl Edit {
    fn is_immediate(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Filter selection at the high end of the spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighEndFilter {
    HighPass,
    HighShelf,
}

/// Filter selection at the low end of the spectrum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowEndFilter {
    LowPass,
    LowShelf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EqFilter {
    HighPass,
    HighShelf,
    BandReject,
    LowPass,
    LowShelf,
}

impl EqFilter {
    fn frequency_location(self) -> Location {
        match self {
            Self::HighPass => Location::EqHighPassFreq,
            Self::HighShelf => Location::EqHighShelfFreq,
            Self::BandReject => Location::EqBandRejectFreq,
            Self::LowPass => Location::EqLowPassFreq,
            Self::LowShelf => Location::EqLowShelfFreq,
        }
    }
}

/// Filters with an adjustable amount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShelfFilter {
    HighShelf,
    BandReject,
    LowShelf,
}

impl ShelfFilter {
    fn amount_location(self) -> Location {
        match self {
            Self::HighShelf => Location::EqHighShelfAmount,
            Self::BandReject => Location::EqBandRejectAmount,
            Self::LowShelf => Location::EqLowShelfAmount,
        }
    }
}

/// Continuous compressor controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressorParam {
    Pregain,
    Threshold,
    Knee,
    Ratio,
    Attack,
    Release,
    Predelay,
    ReleaseZone1,
    ReleaseZone2,
    ReleaseZone3,
    ReleaseZone4,
    Postgain,
    Wet,
}

impl CompressorParam {
    pub fn location(self) -> Location {
        match self {
            Self::Pregain => Location::CompressorPregain,
            Self::Threshold => Location::CompressorThreshold,
            Self::Knee => Location::CompressorKnee,
            Self::Ratio => Location::CompressorRatio,
            Self::Attack => Location::CompressorAttack,
            Self::Release => Location::CompressorRelease,
            Self::Predelay => Location::CompressorPredelay,
            Self::ReleaseZone1 => Location::CompressorReleaseZone1,
            Self::ReleaseZone2 => Location::CompressorReleaseZone2,
            Self::ReleaseZone3 => Location::CompressorReleaseZone3,
            Self::ReleaseZone4 => Location::CompressorReleaseZone4,
            Self::Postgain => Location::CompressorPostgain,
            Self::Wet => Location::CompressorWet,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    record: AudioParameterRecord,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self) -> &AudioParameterRecord {
        &self.record
    }

    /// Replace the state with a record read from the device.
    ///
    /// A record with both filters of a pair enabled keeps the cut filter.
    pub fn apply_decoded(&mut self, mut record: AudioParameterRecord) {
        let eq = &mut record.eq;
        if eq.hp && eq.hs {
            warn!("Device reports high-pass and high-shelf both enabled, keeping high-pass");
            eq.hs = false;
        }
        if eq.lp && eq.ls {
            warn!("Device reports low-pass and low-shelf both enabled, keeping low-pass");
            eq.ls = false;
        }
        self.record = record;
    }

    fn set(&mut self, location: Location, payload: Payload, immediate: bool) -> WriteRequest {
        let stored = device::set_field(&mut self.record, location, payload);
        debug_assert!(stored, "{location} does not hold {payload:?}");
        WriteRequest {
            location,
            payload,
            immediate,
        }
    }

    fn toggle(&mut self, location: Location, enabled: bool) -> WriteRequest {
        self.set(location, Payload::Bool(enabled), true)
    }

    pub fn set_eq_passthrough(&mut self, enabled: bool) -> Vec<WriteRequest> {
        vec![self.toggle(Location::EqPassthrough, enabled)]
    }

    /// Radio selection at the high end. The other filter is disabled first.
    pub fn select_high_end(&mut self, selection: Option<HighEndFilter>) -> Vec<WriteRequest> {
        match selection {
            Some(HighEndFilter::HighPass) => vec![
                self.toggle(Location::EqHighShelf, false),
                self.toggle(Location::EqHighPass, true),
            ],
            Some(HighEndFilter::HighShelf) => vec![
                self.toggle(Location::EqHighPass, false),
                self.toggle(Location::EqHighShelf, true),
            ],
            None => vec![
                self.toggle(Location::EqHighPass, false),
                self.toggle(Location::EqHighShelf, false),
            ],
        }
    }

    /// Radio selection at the low end. The other filter is disabled first.
    pub fn select_low_end(&mut self, selection: Option<LowEndFilter>) -> Vec<WriteRequest> {
        match selection {
            Some(LowEndFilter::LowPass) => vec![
                self.toggle(Location::EqLowShelf, false),
                self.toggle(Location::EqLowPass, true),
            ],
            Some(LowEndFilter::LowShelf) => vec![
                self.toggle(Location::EqLowPass, false),
                self.toggle(Location::EqLowShelf, true),
            ],
            None => vec![
                self.toggle(Location::EqLowPass, false),
                self.toggle(Location::EqLowShelf, false),
            ],
        }
    }

    pub fn set_band_reject(&mut self, enabled: bool) -> Vec<WriteRequest> {
        vec![self.toggle(Location::EqBandReject, enabled)]
    }

    pub fn set_eq_gain(&mut self, gain: f32, edit: Edit) -> Vec<WriteRequest> {
        vec![self.set(Location::EqGain, Payload::Float(gain), edit.is_immediate())]
    }

    /// Set a corner frequency from a slider position in log2 space.
    pub fn set_filter_frequency(
        &mut self,
        filter: EqFilter,
        log_value: f32,
        edit: Edit,
    ) -> Vec<WriteRequest> {
        let freq = NormalizedFrequency::from_log2(log_value);
        vec![self.set(
            filter.frequency_location(),
            Payload::Float(freq.raw()),
            edit.is_immediate(),
        )]
    }

    /// Set a shelf or band-reject amount from a level in dB.
    pub fn set_filter_amount(
        &mut self,
        filter: ShelfFilter,
        db: f32,
        edit: Edit,
    ) -> Vec<WriteRequest> {
        vec![self.set(
            filter.amount_location(),
            Payload::Float(db_to_linear(db)),
            edit.is_immediate(),
        )]
    }

    pub fn set_compressor_passthrough(&mut self, enabled: bool) -> Vec<WriteRequest> {
        vec![self.toggle(Location::CompressorPassthrough, enabled)]
    }

    pub fn set_makeup_gain(&mut self, enabled: bool) -> Vec<WriteRequest> {
        vec![self.toggle(Location::CompressorMakeupGain, enabled)]
    }

    pub fn set_compressor_param(
        &mut self,
        param: CompressorParam,
        value: f32,
        edit: Edit,
    ) -> Vec<WriteRequest> {
        vec![self.set(param.location(), Payload::Float(value), edit.is_immediate())]
    }

    pub fn set_volume(&mut self, db: f32, edit: Edit) -> Vec<WriteRequest> {
        let db = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
        vec![self.set(Location::Volume, Payload::Float(db), edit.is_immediate())]
    }

    pub fn set_delay(&mut self, ms: i32, edit: Edit) -> Vec<WriteRequest> {
        let ms = ms.clamp(0, MAX_DELAY_MS);
        vec![self.set(Location::Delay, Payload::Int(ms), edit.is_immediate())]
    }

    /// Ask the device to keep the current settings across power cycles.
    pub fn save_as_default(&self) -> Vec<WriteRequest> {
        vec![WriteRequest::immediate(Location::SaveAsDefault, Payload::None)]
    }
}
