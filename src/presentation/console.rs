//! Console Front End
//!
//! Line commands read from stdin while a session is running. Parameter
//! changes go through the store as committed edits; `hex` sends a raw
//! register command straight to the characteristic.

use crate::domain::device::WriteRequest;
use crate::domain::models::{linear_to_db, AudioParameterRecord};
use crate::domain::parameters::{
    CompressorParam, Edit, EqFilter, HighEndFilter, LowEndFilter, ParameterStore, ShelfFilter,
};
use crate::infrastructure::bluetooth::protocol;
use crate::infrastructure::bluetooth::BluetoothService;
use anyhow::{anyhow, bail, Context, Result};
use std::fmt::Write as _;

pub const HELP: &str = "\
Commands:
  set <param> <value>   change a parameter (see below)
  hex <bytes>           send a raw command, e.g. `hex 000000`
  live on|off           transmit slider drags while they happen
  save                  store the current settings as device default
  refresh               re-read all parameters from the device
  show                  print the current parameters
  help                  this text
  quit                  disconnect and exit

Parameters:
  eq-bypass, comp-bypass, makeup, band-reject     on|off
  high, low                                       off|pass|shelf
  gain, pregain, threshold, knee, ratio, attack,
  release, predelay, zone1..zone4, postgain, wet  number
  hp-freq, hs-freq, br-freq, lp-freq, ls-freq     Hz
  hs-amount, br-amount, ls-amount, volume         dB
  delay                                           ms";

/// One parameter change requested from the console
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    EqPassthrough(bool),
    HighEnd(Option<HighEndFilter>),
    LowEnd(Option<LowEndFilter>),
    BandReject(bool),
    EqGain(f32),
    /// Corner frequency in Hz
    Frequency(EqFilter, f32),
    /// Shelf / reject amount in dB
    Amount(ShelfFilter, f32),
    CompressorPassthrough(bool),
    MakeupGain(bool),
    Compressor(CompressorParam, f32),
    Volume(f32),
    Delay(i32),
}

impl Adjustment {
    pub fn apply(self, store: &mut ParameterStore) -> Vec<WriteRequest> {
        let edit = Edit::Finished;
        match self {
            Self::EqPassthrough(on) => store.set_eq_passthrough(on),
            Self::HighEnd(filter) => store.select_high_end(filter),
            Self::LowEnd(filter) => store.select_low_end(filter),
            Self::BandReject(on) => store.set_band_reject(on),
            Self::EqGain(gain) => store.set_eq_gain(gain, edit),
            Self::Frequency(filter, hz) => {
                store.set_filter_frequency(filter, hz.max(f32::MIN_POSITIVE).log2(), edit)
            }
            Self::Amount(filter, db) => store.set_filter_amount(filter, db, edit),
            Self::CompressorPassthrough(on) => store.set_compressor_passthrough(on),
            Self::MakeupGain(on) => store.set_makeup_gain(on),
            Self::Compressor(param, value) => store.set_compressor_param(param, value, edit),
            Self::Volume(db) => store.set_volume(db, edit),
            Self::Delay(ms) => store.set_delay(ms, edit),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set(Adjustment),
    Hex(Vec<u8>),
    Live(bool),
    Save,
    Refresh,
    Show,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        bail!("empty command");
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "set" => {
            let param = words.next().ok_or_else(|| anyhow!("usage: set <param> <value>"))?;
            let value = words.next().ok_or_else(|| anyhow!("missing value for {}", param))?;
            Command::Set(parse_adjustment(param, value)?)
        }
        "hex" => Command::Hex(hex_to_bytes(&words.collect::<String>())?),
        "live" => Command::Live(parse_switch(words.next().unwrap_or_default())?),
        "save" => Command::Save,
        "refresh" => Command::Refresh,
        "show" => Command::Show,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command `{}` (try `help`)", other),
    };
    Ok(command)
}

fn parse_adjustment(param: &str, value: &str) -> Result<Adjustment> {
    let number = || -> Result<f32> {
        value
            .parse::<f32>()
            .with_context(|| format!("`{}` is not a number", value))
    };
    let adjustment = match param.to_ascii_lowercase().as_str() {
        "eq-bypass" => Adjustment::EqPassthrough(parse_switch(value)?),
        "comp-bypass" => Adjustment::CompressorPassthrough(parse_switch(value)?),
        "makeup" => Adjustment::MakeupGain(parse_switch(value)?),
        "band-reject" => Adjustment::BandReject(parse_switch(value)?),
        "high" => Adjustment::HighEnd(match value {
            "off" => None,
            "pass" => Some(HighEndFilter::HighPass),
            "shelf" => Some(HighEndFilter::HighShelf),
            _ => bail!("high expects off, pass or shelf"),
        }),
        "low" => Adjustment::LowEnd(match value {
            "off" => None,
            "pass" => Some(LowEndFilter::LowPass),
            "shelf" => Some(LowEndFilter::LowShelf),
            _ => bail!("low expects off, pass or shelf"),
        }),
        "gain" => Adjustment::EqGain(number()?),
        "hp-freq" => Adjustment::Frequency(EqFilter::HighPass, number()?),
        "hs-freq" => Adjustment::Frequency(EqFilter::HighShelf, number()?),
        "br-freq" => Adjustment::Frequency(EqFilter::BandReject, number()?),
        "lp-freq" => Adjustment::Frequency(EqFilter::LowPass, number()?),
        "ls-freq" => Adjustment::Frequency(EqFilter::LowShelf, number()?),
        "hs-amount" => Adjustment::Amount(ShelfFilter::HighShelf, number()?),
        "br-amount" => Adjustment::Amount(ShelfFilter::BandReject, number()?),
        "ls-amount" => Adjustment::Amount(ShelfFilter::LowShelf, number()?),
        "pregain" => Adjustment::Compressor(CompressorParam::Pregain, number()?),
        "threshold" => Adjustment::Compressor(CompressorParam::Threshold, number()?),
        "knee" => Adjustment::Compressor(CompressorParam::Knee, number()?),
        "ratio" => Adjustment::Compressor(CompressorParam::Ratio, number()?),
        "attack" => Adjustment::Compressor(CompressorParam::Attack, number()?),
        "release" => Adjustment::Compressor(CompressorParam::Release, number()?),
        "predelay" => Adjustment::Compressor(CompressorParam::Predelay, number()?),
        "zone1" => Adjustment::Compressor(CompressorParam::ReleaseZone1, number()?),
        "zone2" => Adjustment::Compressor(CompressorParam::ReleaseZone2, number()?),
        "zone3" => Adjustment::Compressor(CompressorParam::ReleaseZone3, number()?),
        "zone4" => Adjustment::Compressor(CompressorParam::ReleaseZone4, number()?),
        "postgain" => Adjustment::Compressor(CompressorParam::Postgain, number()?),
        "wet" => Adjustment::Compressor(CompressorParam::Wet, number()?),
        "volume" => Adjustment::Volume(number()?),
        "delay" => Adjustment::Delay(
            value
                .parse::<i32>()
                .with_context(|| format!("`{}` is not a whole number of ms", value))?,
        ),
        other => bail!("unknown parameter `{}`", other),
    };
    Ok(adjustment)
}

fn parse_switch(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => bail!("expected on or off, got `{}`", value),
    }
}

/// Parse a hex string such as `0200 0000 40C1` into bytes.
/// Whitespace and a leading `0x` are ignored.
pub fn hex_to_bytes(input: &str) -> Result<Vec<u8>> {
    let digits: String = input.split_whitespace().collect();
    let digits = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
        .unwrap_or(&digits);
    if digits.is_empty() {
        bail!("no bytes given");
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("`{}` is not hex", digits);
    }
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(Into::into))
        .collect()
}

/// Run one command against the session. Returns the line to report.
pub fn execute(service: &mut BluetoothService, command: Command) -> Result<String> {
    let reply = match command {
        Command::Set(adjustment) => {
            service.apply(|store| adjustment.apply(store))?;
            format!("Updated {:?}", adjustment)
        }
        Command::Hex(bytes) => {
            let location = service.write_raw(&bytes)?;
            service.refresh()?;
            format!("Sent [{}] to {}", protocol::hex(&bytes), location)
        }
        Command::Live(enabled) => {
            service.set_live_mode(enabled);
            format!("Live mode {}", if enabled { "on" } else { "off" })
        }
        Command::Save => {
            service.apply(|store| store.save_as_default())?;
            "Saved current settings as device default".to_string()
        }
        Command::Refresh => {
            service.refresh()?;
            "Reading parameters from device".to_string()
        }
        Command::Show => {
            let record = service
                .record()
                .ok_or_else(|| anyhow!("No device connected"))?;
            format_record(record)
        }
        Command::Help => HELP.to_string(),
        Command::Quit => "Exiting".to_string(),
    };
    Ok(reply)
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

pub fn format_record(record: &AudioParameterRecord) -> String {
    let eq = &record.eq;
    let comp = &record.compressor;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "EQ          passthrough {}  gain {:.2}",
        on_off(eq.passthrough),
        eq.gain
    );
    let _ = writeln!(
        out,
        "  high-pass   {:>3}  {:>8.1} Hz",
        on_off(eq.hp),
        eq.hp_freq.hz()
    );
    let _ = writeln!(
        out,
        "  high-shelf  {:>3}  {:>8.1} Hz  {:>6.1} dB",
        on_off(eq.hs),
        eq.hs_freq.hz(),
        linear_to_db(eq.hs_amount)
    );
    let _ = writeln!(
        out,
        "  band-reject {:>3}  {:>8.1} Hz  {:>6.1} dB",
        on_off(eq.br),
        eq.br_freq.hz(),
        linear_to_db(eq.br_amount)
    );
    let _ = writeln!(
        out,
        "  low-pass    {:>3}  {:>8.1} Hz",
        on_off(eq.lp),
        eq.lp_freq.hz()
    );
    let _ = writeln!(
        out,
        "  low-shelf   {:>3}  {:>8.1} Hz  {:>6.1} dB",
        on_off(eq.ls),
        eq.ls_freq.hz(),
        linear_to_db(eq.ls_amount)
    );
    let _ = writeln!(
        out,
        "Compressor  passthrough {}  makeup {}",
        on_off(comp.passthrough),
        on_off(comp.makeup_gain)
    );
    let _ = writeln!(
        out,
        "  pregain {} threshold {} knee {} ratio {} attack {} release {} predelay {}",
        comp.pregain, comp.threshold, comp.knee, comp.ratio, comp.attack, comp.release, comp.predelay
    );
    let _ = writeln!(
        out,
        "  zones {} / {} / {} / {}  postgain {} wet {}",
        comp.release_zone1,
        comp.release_zone2,
        comp.release_zone3,
        comp.release_zone4,
        comp.postgain,
        comp.wet
    );
    let _ = write!(out, "Volume {:.1} dB  Delay {} ms", record.volume, record.delay);
    out
}
