use serde::{Deserialize, Serialize};

/// Reference sample rate the device uses to normalize corner frequencies.
pub const REFERENCE_SAMPLE_RATE_HZ: f32 = 48_000.0;

/// Audible range accepted for filter corner frequencies.
pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 20_000.0;

/// Slider range in log2 (octave) space, approximately 20 Hz to 20 kHz.
pub const LOG_FREQ_MIN: f32 = 4.3219;
pub const LOG_FREQ_MAX: f32 = 14.2877;

pub const MIN_VOLUME_DB: f32 = -90.0;
pub const MAX_VOLUME_DB: f32 = 0.0;

pub const MAX_DELAY_MS: i32 = 400;

/// A corner frequency as the device stores it: a fraction of the 48 kHz
/// reference. The raw value is kept as-is so device images round-trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedFrequency(pub f32);

impl NormalizedFrequency {
    pub fn from_hz(hz: f32) -> Self {
        Self(hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ) / REFERENCE_SAMPLE_RATE_HZ)
    }

    /// Convert a slider position in octave space (`hz = 2^log`).
    pub fn from_log2(log_value: f32) -> Self {
        Self::from_hz(log2_to_hz(log_value))
    }

    pub fn hz(self) -> f32 {
        self.0 * REFERENCE_SAMPLE_RATE_HZ
    }

    pub fn raw(self) -> f32 {
        self.0
    }
}

pub fn log2_to_hz(log_value: f32) -> f32 {
    2f32.powf(log_value)
}

/// Linear gain for a level in dB.
pub fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

pub fn linear_to_db(gain: f32) -> f32 {
    20.0 * gain.max(f32::MIN_POSITIVE).log10()
}

/// Equalizer stage of the device's signal chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParametricEqualizer {
    pub passthrough: bool,
    pub hp: bool,
    pub hs: bool,
    pub br: bool,
    pub lp: bool,
    pub ls: bool,

    pub gain: f32,

    // Corner frequencies
    pub hp_freq: NormalizedFrequency,
    pub hs_freq: NormalizedFrequency,
    pub br_freq: NormalizedFrequency,
    pub lp_freq: NormalizedFrequency,
    pub ls_freq: NormalizedFrequency,

    // Linear gain applied by the shelf / reject filters
    pub hs_amount: f32,
    pub br_amount: f32,
    pub ls_amount: f32,
}

/// Compressor stage of the device's signal chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedCompressor {
    pub passthrough: bool,
    pub makeup_gain: bool,

    pub pregain: f32,
    pub threshold: f32,
    pub knee: f32,
    pub ratio: f32,
    pub attack: f32,
    pub release: f32,
    pub predelay: f32,
    pub release_zone1: f32,
    pub release_zone2: f32,
    pub release_zone3: f32,
    pub release_zone4: f32,
    pub postgain: f32,
    pub wet: f32,
}

/// Complete parameter block exchanged with the device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioParameterRecord {
    pub eq: ParametricEqualizer,
    pub compressor: AdvancedCompressor,
    /// Master volume in dB (-90..0)
    pub volume: f32,
    /// Output delay in milliseconds (0..400)
    pub delay: i32,
}

#[derive(Debug, Clone)]
pub enum AppEvent {
    ConnectionStatus(ConnectionStatus),
    ParametersUpdated(AudioParameterRecord),
    DeviceFound(ScannedDevice),
    LogMessage(StatusMessage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedDevice {
    pub name: String,
    pub address: u64,
    pub signal_strength: i16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone)]
pub struct StatusMessage {
    pub message: String,
    pub severity: MessageSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageSeverity {
    Info,
    Success,
    Warning,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_slider_bounds_map_to_audible_range() {
        assert!((log2_to_hz(LOG_FREQ_MIN) - 20.0).abs() < 0.01);
        assert!((log2_to_hz(LOG_FREQ_MAX) - 20_000.0).abs() < 5.0);
    }

    #[test]
    fn test_normalized_frequency_uses_48k_reference() {
        let freq = NormalizedFrequency::from_hz(12_000.0);
        assert_eq!(freq.raw(), 0.25);
        assert_eq!(freq.hz(), 12_000.0);
    }

    #[test]
    fn test_normalized_frequency_clamps() {
        assert_eq!(
            NormalizedFrequency::from_hz(5.0),
            NormalizedFrequency::from_hz(MIN_FREQUENCY_HZ)
        );
        assert!((NormalizedFrequency::from_hz(30_000.0).hz() - MAX_FREQUENCY_HZ).abs() < 0.01);
    }

    #[test]
    fn test_from_log2() {
        let freq = NormalizedFrequency::from_log2(10.0);
        assert!((freq.hz() - 1024.0).abs() < 0.01);
    }

    #[test]
    fn test_db_conversion() {
        assert!((db_to_linear(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_linear(-20.0) - 0.1).abs() < 1e-6);
        assert!((linear_to_db(0.1) + 20.0).abs() < 1e-4);
    }
}
