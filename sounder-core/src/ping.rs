//! Ping reconstruction from partition payloads.
//!
//! The modern format may split one ping's beam array across several
//! records; the legacy format always emits a single partition. The
//! reconstructor accumulates partitions per ping identity with an
//! explicit completion bitmap and emits a merged ping the moment the
//! last partition lands. Out-of-order arrival is tolerated; duplicates
//! are discarded with a warning; identities still open when the stream
//! ends drain as flagged, partial pings - partial data is worth more
//! than silence in this domain.

use std::collections::{HashMap, HashSet};

use crate::error::Diagnostic;
use crate::formats::{PingId, PingModeSettings, PingNav, PingPartition, RawBeam};
use chrono::{DateTime, Utc};

/// A ping with all (or, at end of stream, all received) partitions
/// merged, beams concatenated in partition-index order.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPing {
    pub id: PingId,
    pub timestamp: DateTime<Utc>,
    pub sound_speed_mps: f32,
    pub transducer_depth_m: f32,
    pub nav: Option<PingNav>,
    pub mode: Option<PingModeSettings>,
    pub beams: Vec<RawBeam>,
    /// False when partitions were still missing at end of stream.
    pub complete: bool,
}

/// Per-identity accumulation state. The slot vector doubles as the
/// completion bitmap: the ping is complete when every slot is filled.
struct InFlight {
    slots: Vec<Option<PingPartition>>,
    received: u16,
}

impl InFlight {
    fn new(count: u16) -> Self {
        InFlight {
            slots: (0..count).map(|_| None).collect(),
            received: 0,
        }
    }

    fn assemble(self, id: PingId, complete: bool) -> AssembledPing {
        // First filled slot carries the shared per-ping fields; every
        // partition repeats them on the wire.
        let first = self
            .slots
            .iter()
            .flatten()
            .next()
            .expect("assemble is only called with at least one partition");
        let timestamp = first.timestamp;
        let sound_speed_mps = first.sound_speed_mps;
        let transducer_depth_m = first.transducer_depth_m;
        let nav = first.nav;
        let mode = first.mode;

        let mut beams = Vec::new();
        for slot in self.slots.into_iter().flatten() {
            beams.extend(slot.beams);
        }
        AssembledPing {
            id,
            timestamp,
            sound_speed_mps,
            transducer_depth_m,
            nav,
            mode,
            beams,
            complete,
        }
    }
}

/// Merges partition payloads into completed pings.
#[derive(Default)]
pub struct PingReconstructor {
    in_flight: HashMap<PingId, InFlight>,
    /// Identities in first-seen order, so end-of-stream drains are
    /// deterministic.
    arrival: Vec<PingId>,
    /// Identities already emitted. Never reused: a late partition for
    /// one of these is a duplicate, not a new ping.
    completed: HashSet<PingId>,
}

impl PingReconstructor {
    pub fn new() -> Self {
        PingReconstructor::default()
    }

    /// Number of ping identities still awaiting partitions.
    pub fn open_pings(&self) -> usize {
        self.in_flight.len()
    }

    /// Feed one partition. Returns the assembled ping when this
    /// partition completes its identity.
    pub fn push(
        &mut self,
        partition: PingPartition,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> Option<AssembledPing> {
        let id = partition.id;

        if self.completed.contains(&id) {
            diagnostics.push(Diagnostic::DuplicatePartition {
                id,
                partition: partition.partition_index,
            });
            return None;
        }

        match self.in_flight.get(&id) {
            Some(state) if state.slots.len() != partition.partition_count as usize => {
                diagnostics.push(Diagnostic::MalformedPayload {
                    offset: 0,
                    tag: "ping partition".to_string(),
                    reason: format!(
                        "partition count changed from {} to {} within ping {:?}",
                        state.slots.len(),
                        partition.partition_count,
                        id
                    ),
                });
                return None;
            }
            Some(_) => {}
            None => {
                self.arrival.push(id);
                self.in_flight
                    .insert(id, InFlight::new(partition.partition_count));
            }
        }
        let state = self
            .in_flight
            .get_mut(&id)
            .expect("identity inserted above");

        let index = partition.partition_index as usize;
        if index >= state.slots.len() {
            diagnostics.push(Diagnostic::MalformedPayload {
                offset: 0,
                tag: "ping partition".to_string(),
                reason: format!(
                    "partition index {} out of range for count {} in ping {:?}",
                    index,
                    state.slots.len(),
                    id
                ),
            });
            return None;
        }
        if state.slots[index].is_some() {
            diagnostics.push(Diagnostic::DuplicatePartition {
                id,
                partition: partition.partition_index,
            });
            return None;
        }
        state.slots[index] = Some(partition);
        state.received += 1;

        if state.received as usize == state.slots.len() {
            let state = self.in_flight.remove(&id).expect("identity is in flight");
            self.arrival.retain(|a| *a != id);
            self.completed.insert(id);
            Some(state.assemble(id, true))
        } else {
            None
        }
    }

    /// End of stream: drain identities still awaiting partitions as
    /// incomplete pings, in first-seen order, each with a diagnostic.
    pub fn finish(&mut self, diagnostics: &mut Vec<Diagnostic>) -> Vec<AssembledPing> {
        let mut drained = Vec::new();
        for id in std::mem::take(&mut self.arrival) {
            let Some(state) = self.in_flight.remove(&id) else {
                continue;
            };
            diagnostics.push(Diagnostic::IncompletePing {
                id,
                received: state.received,
                expected: state.slots.len() as u16,
            });
            drained.push(state.assemble(id, false));
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::BeamFlags;
    use chrono::TimeZone;

    fn partition(counter: u16, index: u16, count: u16, first_angle: f32, beams: usize) -> PingPartition {
        PingPartition {
            id: PingId {
                time_sec: 1000,
                time_nanosec: 0,
                counter,
            },
            timestamp: Utc.timestamp_opt(1000, 0).unwrap(),
            partition_index: index,
            partition_count: count,
            sound_speed_mps: 1500.0,
            transducer_depth_m: 5.0,
            nav: None,
            mode: None,
            beams: (0..beams)
                .map(|i| RawBeam {
                    angle_deg: first_angle + i as f32,
                    twtt_sec: 0.1,
                    backscatter_db: -30.0,
                    flags: BeamFlags::VALID,
                    quality: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_single_partition_completes_immediately() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        let ping = r.push(partition(1, 0, 1, 0.0, 4), &mut diags).unwrap();
        assert!(ping.complete);
        assert_eq!(ping.beams.len(), 4);
        assert!(diags.is_empty());
        assert_eq!(r.open_pings(), 0);
    }

    #[test]
    fn test_out_of_order_partitions_merge_in_index_order() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        assert!(r.push(partition(1, 1, 2, 32.0, 32), &mut diags).is_none());
        let ping = r.push(partition(1, 0, 2, 0.0, 32), &mut diags).unwrap();
        assert!(ping.complete);
        assert_eq!(ping.beams.len(), 64);
        // Beams are ordered by partition index, not arrival
        assert_eq!(ping.beams[0].angle_deg, 0.0);
        assert_eq!(ping.beams[32].angle_deg, 32.0);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut diags = Vec::new();
        let parts = [
            partition(1, 0, 3, 0.0, 2),
            partition(1, 1, 3, 2.0, 2),
            partition(1, 2, 3, 4.0, 2),
        ];
        let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 0, 1], [1, 2, 0]];
        let mut assembled = Vec::new();
        for order in orders {
            let mut r = PingReconstructor::new();
            let mut ping = None;
            for i in order {
                ping = r.push(parts[i].clone(), &mut diags);
            }
            assembled.push(ping.unwrap());
        }
        assert_eq!(assembled[0], assembled[1]);
        assert_eq!(assembled[1], assembled[2]);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_duplicate_partition_is_discarded_with_warning() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        assert!(r.push(partition(1, 0, 2, 0.0, 2), &mut diags).is_none());
        assert!(r.push(partition(1, 0, 2, 99.0, 2), &mut diags).is_none());
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], Diagnostic::DuplicatePartition { partition: 0, .. }));
        // The original partition survives
        let ping = r.push(partition(1, 1, 2, 2.0, 2), &mut diags).unwrap();
        assert_eq!(ping.beams[0].angle_deg, 0.0);
    }

    #[test]
    fn test_incomplete_ping_drains_flagged() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        assert!(r.push(partition(1, 0, 3, 0.0, 2), &mut diags).is_none());
        assert!(r.push(partition(1, 2, 3, 4.0, 2), &mut diags).is_none());
        let drained = r.finish(&mut diags);
        assert_eq!(drained.len(), 1);
        assert!(!drained[0].complete);
        assert_eq!(drained[0].beams.len(), 4);
        assert!(matches!(
            diags[0],
            Diagnostic::IncompletePing {
                received: 2,
                expected: 3,
                ..
            }
        ));
        assert_eq!(r.open_pings(), 0);
    }

    #[test]
    fn test_partition_after_completion_is_duplicate_not_new_ping() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        let ping = r.push(partition(1, 0, 1, 0.0, 2), &mut diags).unwrap();
        assert!(ping.complete);
        // The identity is spent; a late copy must not open a new ping
        assert!(r.push(partition(1, 0, 1, 0.0, 2), &mut diags).is_none());
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], Diagnostic::DuplicatePartition { .. }));
        assert!(r.finish(&mut diags).is_empty());
    }

    #[test]
    fn test_distinct_identities_do_not_interfere() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        assert!(r.push(partition(1, 0, 2, 0.0, 2), &mut diags).is_none());
        assert!(r.push(partition(2, 0, 2, 10.0, 2), &mut diags).is_none());
        let first = r.push(partition(1, 1, 2, 2.0, 2), &mut diags).unwrap();
        assert_eq!(first.id.counter, 1);
        assert_eq!(r.open_pings(), 1);
    }

    #[test]
    fn test_partition_count_mismatch_is_malformed() {
        let mut r = PingReconstructor::new();
        let mut diags = Vec::new();
        assert!(r.push(partition(1, 0, 2, 0.0, 2), &mut diags).is_none());
        assert!(r.push(partition(1, 1, 3, 2.0, 2), &mut diags).is_none());
        assert_eq!(diags.len(), 1);
        assert!(matches!(diags[0], Diagnostic::MalformedPayload { .. }));
    }
}
