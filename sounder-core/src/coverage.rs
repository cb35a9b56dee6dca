//! Swath coverage aggregation.
//!
//! Per-ping extents fold into running statistics per swath group. The
//! fold is append-only and associative: aggregating files separately
//! and merging gives the same result as aggregating everything at
//! once, which is what makes cross-file coverage-trend comparison
//! cheap. Grouping is by exact mode tuple, never approximate.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::model::LogicalPing;

/// Exact grouping key for coverage statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwathGroup {
    pub ping_mode: u8,
    pub swath_mode: u8,
    pub frequency_hz: u32,
}

/// Extents of one ping's valid soundings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageExtent {
    pub group: SwathGroup,
    /// Outermost port sounding (negative across-track), metres.
    pub port_m: f32,
    /// Outermost starboard sounding, metres.
    pub stbd_m: f32,
    pub min_depth_m: f32,
    pub max_depth_m: f32,
}

impl CoverageExtent {
    /// Extents over the ping's valid soundings. `None` when the ping
    /// has no valid sounding at all. A side with no valid sounding
    /// reports zero extent, so one-sided swaths still aggregate.
    pub fn from_ping(ping: &LogicalPing) -> Option<CoverageExtent> {
        let mut any = false;
        let mut port_m = 0.0f32;
        let mut stbd_m = 0.0f32;
        let mut min_depth_m = f32::INFINITY;
        let mut max_depth_m = f32::NEG_INFINITY;
        for s in ping.soundings.iter().filter(|s| s.is_valid()) {
            any = true;
            port_m = port_m.min(s.across_m);
            stbd_m = stbd_m.max(s.across_m);
            min_depth_m = min_depth_m.min(s.depth_m);
            max_depth_m = max_depth_m.max(s.depth_m);
        }
        if !any {
            return None;
        }
        Some(CoverageExtent {
            group: SwathGroup {
                ping_mode: ping.ping_mode,
                swath_mode: ping.swath_mode,
                frequency_hz: ping.frequency_hz,
            },
            port_m,
            stbd_m,
            min_depth_m,
            max_depth_m,
        })
    }
}

/// Running coverage statistics for one swath group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupCoverage {
    pub ping_count: u64,
    pub min_across_m: f32,
    pub max_across_m: f32,
    pub min_depth_m: f32,
    pub max_depth_m: f32,
    sum_port_m: f64,
    sum_stbd_m: f64,
}

impl GroupCoverage {
    fn from_extent(e: &CoverageExtent) -> Self {
        GroupCoverage {
            ping_count: 1,
            min_across_m: e.port_m,
            max_across_m: e.stbd_m,
            min_depth_m: e.min_depth_m,
            max_depth_m: e.max_depth_m,
            sum_port_m: e.port_m as f64,
            sum_stbd_m: e.stbd_m as f64,
        }
    }

    fn add(&mut self, e: &CoverageExtent) {
        self.ping_count += 1;
        self.min_across_m = self.min_across_m.min(e.port_m);
        self.max_across_m = self.max_across_m.max(e.stbd_m);
        self.min_depth_m = self.min_depth_m.min(e.min_depth_m);
        self.max_depth_m = self.max_depth_m.max(e.max_depth_m);
        self.sum_port_m += e.port_m as f64;
        self.sum_stbd_m += e.stbd_m as f64;
    }

    fn merge(&mut self, other: &GroupCoverage) {
        self.ping_count += other.ping_count;
        self.min_across_m = self.min_across_m.min(other.min_across_m);
        self.max_across_m = self.max_across_m.max(other.max_across_m);
        self.min_depth_m = self.min_depth_m.min(other.min_depth_m);
        self.max_depth_m = self.max_depth_m.max(other.max_depth_m);
        self.sum_port_m += other.sum_port_m;
        self.sum_stbd_m += other.sum_stbd_m;
    }

    /// Mean outermost port extent, metres (negative).
    pub fn mean_port_m(&self) -> f64 {
        self.sum_port_m / self.ping_count as f64
    }

    /// Mean outermost starboard extent, metres.
    pub fn mean_stbd_m(&self) -> f64 {
        self.sum_stbd_m / self.ping_count as f64
    }
}

/// Accumulates coverage extents across pings, files and surveys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CoverageAggregator {
    groups: HashMap<SwathGroup, GroupCoverage>,
}

impl CoverageAggregator {
    pub fn new() -> Self {
        CoverageAggregator::default()
    }

    /// Fold one extent in.
    pub fn add_extent(&mut self, extent: &CoverageExtent) {
        self.groups
            .entry(extent.group)
            .and_modify(|g| g.add(extent))
            .or_insert_with(|| GroupCoverage::from_extent(extent));
    }

    /// Fold one ping's valid soundings in. Pings with no valid
    /// soundings contribute nothing.
    pub fn add_ping(&mut self, ping: &LogicalPing) {
        if let Some(extent) = CoverageExtent::from_ping(ping) {
            self.add_extent(&extent);
        }
    }

    /// Append-only merge of another aggregation into this one.
    pub fn merge(&mut self, other: &CoverageAggregator) {
        for (group, coverage) in &other.groups {
            self.groups
                .entry(*group)
                .and_modify(|g| g.merge(coverage))
                .or_insert(*coverage);
        }
    }

    pub fn get(&self, group: &SwathGroup) -> Option<&GroupCoverage> {
        self.groups.get(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SwathGroup, &GroupCoverage)> {
        self.groups.iter()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
