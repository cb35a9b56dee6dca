//! Runtime acquisition-parameter history.
//!
//! Runtime records are snapshots: a new one supersedes the previous
//! going forward in time, never retroactively. That is modelled as a
//! time-ordered history with an as-of lookup, not a mutable "current
//! settings" value, so a ping decoded late still resolves against the
//! snapshot that was active when it was transmitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::formats::PingModeSettings;

/// One runtime-parameter snapshot, valid from its timestamp until the
/// next snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionParameterRecord {
    pub valid_from: DateTime<Utc>,
    /// Angular swath limits, degrees from nadir.
    pub max_port_angle_deg: f32,
    pub max_stbd_angle_deg: f32,
    /// Coverage limits, metres across-track.
    pub max_port_coverage_m: f32,
    pub max_stbd_coverage_m: f32,
    pub mode: PingModeSettings,
}

/// Append-only, time-ordered parameter history for one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParameterHistory {
    records: Vec<AcquisitionParameterRecord>,
}

impl ParameterHistory {
    pub fn new() -> Self {
        ParameterHistory::default()
    }

    /// Insert a snapshot, keeping the history sorted by `valid_from`.
    /// Records usually arrive in time order, so this is an append in
    /// the common case.
    pub fn push(&mut self, record: AcquisitionParameterRecord) {
        let at = self
            .records
            .partition_point(|r| r.valid_from <= record.valid_from);
        self.records.insert(at, record);
    }

    /// The snapshot in force at `t`: the latest record with
    /// `valid_from <= t`. `None` before the first snapshot.
    pub fn as_of(&self, t: DateTime<Utc>) -> Option<&AcquisitionParameterRecord> {
        let n = self.records.partition_point(|r| r.valid_from <= t);
        if n == 0 {
            None
        } else {
            Some(&self.records[n - 1])
        }
    }

    /// The most recent snapshot, regardless of time.
    pub fn latest(&self) -> Option<&AcquisitionParameterRecord> {
        self.records.last()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AcquisitionParameterRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
