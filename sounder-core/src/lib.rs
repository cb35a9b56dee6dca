//! Platform-independent multibeam echosounder capture decoding.
//!
//! This crate turns raw capture files from two related but structurally
//! different wire formats - the modern partitioned format and the
//! legacy sequential format - into one canonical, format-independent
//! record model: reconstructed pings, per-beam sounding geometry,
//! backscatter, and acquisition-parameter history. It is the pure core
//! of the Sounder toolset; all file I/O, progress reporting and
//! parallel batch handling live in `sounder-convert`.
//!
//! # Architecture
//!
//! - **cursor**: bounds-checked little-endian field extraction
//! - **framing**: length-declared record walking, format detection
//! - **formats**: the two decoders and their shared payload vocabulary
//! - **ping**: partition reconstruction with completion bitmaps
//! - **geometry**: range/angle/attitude to across-track and depth
//! - **params**: time-ordered runtime-parameter history
//! - **model**: the canonical record model handed to consumers
//! - **coverage**: associative swath-coverage aggregation
//! - **container**: versioned, checksummed, optionally gzipped persistence
//! - **pipeline**: drives one file through all of the above
//!
//! Decoding one file is strictly sequential (each record's position
//! depends on the previous record's declared length); parallelism
//! belongs across files, with one independent [`Pipeline`] per file.

pub mod container;
pub mod coverage;
pub mod cursor;
pub mod error;
pub mod formats;
pub mod framing;
pub mod geometry;
pub mod model;
pub mod params;
pub mod ping;
pub mod pipeline;

pub use coverage::{CoverageAggregator, CoverageExtent, GroupCoverage, SwathGroup};
pub use cursor::ByteCursor;
pub use error::{ContainerFormatError, DecodeError, Diagnostic};
pub use formats::{
    AttitudeSample, BeamFlags, InstallationParams, Payload, PingId, PingModeSettings, PingNav,
    PingPartition, PositionFix, RawBeam,
};
pub use framing::{detect_format, DatagramFramer, RawRecord, RecordTag, SourceFormat};
pub use model::{CanonicalRecordModel, FileMeta, LogicalPing, SoundingFilter, SoundingRecord};
pub use params::{AcquisitionParameterRecord, ParameterHistory};
pub use ping::{AssembledPing, PingReconstructor};
pub use pipeline::{decode_capture, Decoded, Pipeline};
