//! The canonical record model.
//!
//! Format-independent, append-only output of the conversion pipeline
//! and the stable contract for every downstream consumer. The model is
//! built once per input file and never mutated afterwards: consumers
//! get read-only access, and filtering produces new collections, not
//! edits to stored records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coverage::CoverageAggregator;
use crate::formats::{BeamFlags, PingId, RawBeam};
use crate::framing::SourceFormat;
use crate::params::ParameterHistory;

/// One derived sounding: the canonical plotting unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoundingRecord {
    /// Across-track distance from the vessel reference point, metres.
    /// Port negative, starboard positive.
    pub across_m: f32,
    /// Depth below the vessel reference point, metres, positive down.
    pub depth_m: f32,
    /// Backscatter amplitude, dB.
    pub backscatter_db: f32,
    pub flags: BeamFlags,
}

impl SoundingRecord {
    pub fn is_valid(&self) -> bool {
        self.flags.contains(BeamFlags::VALID)
    }
}

/// One reconstructed ping with its raw beams and derived soundings.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalPing {
    pub id: PingId,
    pub timestamp: DateTime<Utc>,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub heading_deg: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub heave_m: f32,
    pub sound_speed_mps: f32,
    /// Transducer depth below the waterline as recorded, metres. Kept
    /// so consumers can re-reference depths to the waterline.
    pub transducer_depth_m: f32,
    pub ping_mode: u8,
    pub pulse_form: u8,
    pub swath_mode: u8,
    pub frequency_hz: u32,
    /// False when the source stream ended before all partitions arrived.
    pub complete: bool,
    pub beams: Vec<RawBeam>,
    pub soundings: Vec<SoundingRecord>,
}

/// Provenance of one converted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FileMeta {
    pub source_path: String,
    pub source_name: String,
    pub format: Option<SourceFormat>,
    /// RFC 3339, stamped by the conversion layer.
    pub converted_at: String,
    pub compressed: bool,
    pub source_bytes: u64,
}

/// Consumer-side filter for derived sounding views. All bounds are
/// optional and inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SoundingFilter {
    pub min_depth_m: Option<f32>,
    pub max_depth_m: Option<f32>,
    pub min_across_m: Option<f32>,
    pub max_across_m: Option<f32>,
    pub min_backscatter_db: Option<f32>,
    pub max_backscatter_db: Option<f32>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// When set, drop soundings the sounder rejected.
    pub valid_only: bool,
}

impl SoundingFilter {
    fn admits_time(&self, t: DateTime<Utc>) -> bool {
        self.from.map_or(true, |f| t >= f) && self.until.map_or(true, |u| t <= u)
    }

    fn admits(&self, s: &SoundingRecord) -> bool {
        if self.valid_only && !s.is_valid() {
            return false;
        }
        self.min_depth_m.map_or(true, |v| s.depth_m >= v)
            && self.max_depth_m.map_or(true, |v| s.depth_m <= v)
            && self.min_across_m.map_or(true, |v| s.across_m >= v)
            && self.max_across_m.map_or(true, |v| s.across_m <= v)
            && self.min_backscatter_db.map_or(true, |v| s.backscatter_db >= v)
            && self.max_backscatter_db.map_or(true, |v| s.backscatter_db <= v)
    }
}

/// Everything decoded from one capture file, in file order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CanonicalRecordModel {
    meta: FileMeta,
    pings: Vec<LogicalPing>,
    parameters: ParameterHistory,
}

impl CanonicalRecordModel {
    pub(crate) fn new(meta: FileMeta) -> Self {
        CanonicalRecordModel {
            meta,
            pings: Vec::new(),
            parameters: ParameterHistory::new(),
        }
    }

    pub(crate) fn push_ping(&mut self, ping: LogicalPing) {
        self.pings.push(ping);
    }

    pub(crate) fn parameters_mut(&mut self) -> &mut ParameterHistory {
        &mut self.parameters
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn pings(&self) -> &[LogicalPing] {
        &self.pings
    }

    pub fn parameters(&self) -> &ParameterHistory {
        &self.parameters
    }

    pub fn ping_count(&self) -> usize {
        self.pings.len()
    }

    pub fn sounding_count(&self) -> usize {
        self.pings.iter().map(|p| p.soundings.len()).sum()
    }

    /// Derived filtered view: a fresh collection of (ping, sounding)
    /// references. The stored records are untouched.
    pub fn filter_soundings(
        &self,
        filter: &SoundingFilter,
    ) -> Vec<(&LogicalPing, &SoundingRecord)> {
        self.pings
            .iter()
            .filter(|p| filter.admits_time(p.timestamp))
            .flat_map(|p| {
                p.soundings
                    .iter()
                    .filter(|s| filter.admits(s))
                    .map(move |s| (p, s))
            })
            .collect()
    }

    /// Swath coverage recomputed deterministically from the stored
    /// soundings.
    pub fn coverage(&self) -> CoverageAggregator {
        let mut agg = CoverageAggregator::new();
        for ping in &self.pings {
            agg.add_ping(ping);
        }
        agg
    }

    /// Compact summary for reporting layers.
    pub fn summary_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.meta.source_name,
            "format": self.meta.format.map(|f| f.to_string()),
            "convertedAt": self.meta.converted_at,
            "compressed": self.meta.compressed,
            "pings": self.ping_count(),
            "soundings": self.sounding_count(),
            "parameterRecords": self.parameters.len(),
        })
    }
}
