//! Datagram decoding for the two capture formats.
//!
//! Each format module decodes one framed record into the shared
//! [`Payload`] vocabulary. The two decoders share no code path - the
//! wire layouts have nothing in common - but everything downstream of
//! this module is format-agnostic.
//!
//! Sign normalization happens here and nowhere else: the normalized
//! convention is starboard-positive beam angle (and therefore
//! starboard-positive across-track distance later on). The modern
//! format records angles port-positive and is negated by its decoder;
//! the legacy format is already starboard-positive.

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;
use crate::framing::{RawRecord, SourceFormat};
use crate::params::AcquisitionParameterRecord;

pub mod all;
pub mod kmall;

// =============================================================================
// Ping identity
// =============================================================================

/// Identity of one logical ping, shared by all of its partitions.
///
/// Raw wire fields, not a converted timestamp: two partitions belong to
/// the same ping exactly when these three values match.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PingId {
    pub time_sec: u32,
    pub time_nanosec: u32,
    pub counter: u16,
}

// =============================================================================
// Per-beam data
// =============================================================================

bitflags! {
    /// Normalized per-beam detection flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BeamFlags: u8 {
        /// The sounder accepted this detection.
        const VALID = 0x01;
        /// Phase detection (amplitude when clear).
        const PHASE = 0x02;
    }
}

// Stored in containers as the raw bits
impl Serialize for BeamFlags {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.bits().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BeamFlags {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        u8::deserialize(deserializer).map(BeamFlags::from_bits_retain)
    }
}

/// One beam as decoded from the wire, before geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawBeam {
    /// Beam pointing angle, degrees, starboard-positive (normalized).
    pub angle_deg: f32,
    /// Two-way travel time, seconds.
    pub twtt_sec: f32,
    /// Backscatter amplitude, dB (one scale for both formats).
    pub backscatter_db: f32,
    pub flags: BeamFlags,
    /// Vendor quality indicator, passed through unscaled.
    pub quality: u8,
}

// =============================================================================
// Per-record payloads
// =============================================================================

/// Navigation and attitude as embedded in a modern ping record.
/// Legacy pings do not carry this; the pipeline fills it from the
/// position/attitude record stream instead.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct PingNav {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub heading_deg: f32,
    /// Positive rolls the starboard side down.
    pub roll_deg: f32,
    /// Positive pitches the bow up.
    pub pitch_deg: f32,
    /// Positive up.
    pub heave_m: f32,
}

/// Acquisition mode settings as embedded in a modern ping record.
/// Legacy pings take these from the runtime-parameter history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PingModeSettings {
    pub ping_mode: u8,
    pub pulse_form: u8,
    pub swath_mode: u8,
    /// Integer Hz so downstream grouping is exact.
    pub frequency_hz: u32,
}

/// One ping partition. The legacy format emits exactly one partition
/// per ping; the modern format may split a ping across several.
#[derive(Debug, Clone, PartialEq)]
pub struct PingPartition {
    pub id: PingId,
    pub timestamp: DateTime<Utc>,
    /// 0-based partition index (the modern wire value is 1-based).
    pub partition_index: u16,
    pub partition_count: u16,
    pub sound_speed_mps: f32,
    /// Transducer depth below the waterline, metres, as recorded.
    pub transducer_depth_m: f32,
    pub nav: Option<PingNav>,
    pub mode: Option<PingModeSettings>,
    pub beams: Vec<RawBeam>,
}

/// One attitude sample from a standalone attitude record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttitudeSample {
    pub timestamp: DateTime<Utc>,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub heave_m: f32,
    pub heading_deg: f32,
}

/// A position fix from a standalone position record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub speed_mps: f32,
    pub course_deg: f32,
}

/// Transducer installation geometry, parsed from the installation
/// record's text block. Lever arms are metres from the vessel
/// reference point: x forward, y starboard, z down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct InstallationParams {
    pub serial: u32,
    /// Waterline height relative to the reference point, metres, z down.
    pub waterline_z_m: f32,
    pub tx_x_m: f32,
    pub tx_y_m: f32,
    pub tx_z_m: f32,
    pub tx_roll_deg: f32,
    pub tx_pitch_deg: f32,
    pub tx_heading_deg: f32,
    pub rx_x_m: f32,
    pub rx_y_m: f32,
    pub rx_z_m: f32,
    pub rx_roll_deg: f32,
    pub rx_pitch_deg: f32,
    pub rx_heading_deg: f32,
    /// The raw text block, kept verbatim for survey reports.
    pub install_txt: String,
}

/// What one recognized record decodes to. The tagged union all
/// downstream stages consume, regardless of source format.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Ping(PingPartition),
    Attitude(Vec<AttitudeSample>),
    Position(PositionFix),
    Runtime(AcquisitionParameterRecord),
    Installation(InstallationParams),
    /// Recognized type that carries nothing the pipeline consumes
    /// (sound-velocity profiles, water column, clock, ...).
    Informational,
}

/// Decode one framed record with the decoder for its source format.
///
/// Errors are per-record diagnostics; the caller skips the record and
/// keeps going.
pub fn decode_record(record: &RawRecord<'_>) -> Result<Payload, Diagnostic> {
    match record.format {
        SourceFormat::Kmall => kmall::decode(record),
        SourceFormat::EmAll => all::decode(record),
    }
}

// =============================================================================
// Installation text
// =============================================================================

/// Parse an installation text block.
///
/// Both formats carry the same grammar: comma-separated `KEY=VALUE`
/// entries, where the transducer entries pack their six sub-fields with
/// semicolons, e.g.
/// `SN=1234,SWLZ=0.5,TRAI_TX1X=1.2;Y=0.0;Z=0.8;R=0.1;P=0.2;H=0.0,TRAI_RX1X=...`.
/// Unknown keys are ignored; missing keys keep their zero defaults.
pub fn parse_installation_text(txt: &str) -> InstallationParams {
    let mut params = InstallationParams {
        install_txt: txt.to_string(),
        ..Default::default()
    };
    for entry in txt.split(',') {
        let entry = entry.trim();
        if let Some(rest) = entry.strip_prefix("TRAI_TX1") {
            parse_transducer_fields(rest, &mut params, true);
        } else if let Some(rest) = entry.strip_prefix("TRAI_RX1") {
            parse_transducer_fields(rest, &mut params, false);
        } else if let Some((key, value)) = entry.split_once('=') {
            match key {
                "SN" => params.serial = value.parse().unwrap_or(0),
                "SWLZ" => params.waterline_z_m = value.parse().unwrap_or(0.0),
                _ => {}
            }
        }
    }
    params
}

fn parse_transducer_fields(fields: &str, params: &mut InstallationParams, tx: bool) {
    for field in fields.split(';') {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        let value: f32 = value.parse().unwrap_or(0.0);
        match (key, tx) {
            ("X", true) => params.tx_x_m = value,
            ("Y", true) => params.tx_y_m = value,
            ("Z", true) => params.tx_z_m = value,
            ("R", true) => params.tx_roll_deg = value,
            ("P", true) => params.tx_pitch_deg = value,
            ("H", true) => params.tx_heading_deg = value,
            ("X", false) => params.rx_x_m = value,
            ("Y", false) => params.rx_y_m = value,
            ("Z", false) => params.rx_z_m = value,
            ("R", false) => params.rx_roll_deg = value,
            ("P", false) => params.rx_pitch_deg = value,
            ("H", false) => params.rx_heading_deg = value,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_installation_text() {
        let txt = "SN=1234,SWLZ=0.5,\
                   TRAI_TX1X=1.2;Y=-0.1;Z=0.8;R=0.1;P=0.2;H=0.0,\
                   TRAI_RX1X=1.0;Y=0.3;Z=0.9;R=-0.1;P=0.0;H=0.5";
        let p = parse_installation_text(txt);
        assert_eq!(p.serial, 1234);
        assert_eq!(p.waterline_z_m, 0.5);
        assert_eq!(p.tx_x_m, 1.2);
        assert_eq!(p.tx_y_m, -0.1);
        assert_eq!(p.tx_z_m, 0.8);
        assert_eq!(p.rx_y_m, 0.3);
        assert_eq!(p.rx_heading_deg, 0.5);
        assert_eq!(p.install_txt, txt);
    }

    #[test]
    fn test_parse_installation_ignores_unknown_keys() {
        let p = parse_installation_text("SN=7,OPSTA=on,TRAI_TX1X=2.0;Q=9");
        assert_eq!(p.serial, 7);
        assert_eq!(p.tx_x_m, 2.0);
        assert_eq!(p.waterline_z_m, 0.0);
    }

    #[test]
    fn test_beam_flags_roundtrip_bits() {
        let f = BeamFlags::VALID | BeamFlags::PHASE;
        assert_eq!(BeamFlags::from_bits_retain(f.bits()), f);
    }
}
