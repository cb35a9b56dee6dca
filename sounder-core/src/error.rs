//! Error and diagnostic taxonomy for capture decoding.
//!
//! The split matters: a [`Diagnostic`] is a non-fatal, per-record condition
//! collected while the rest of the file keeps decoding; a [`DecodeError`]
//! aborts the file; a [`ContainerFormatError`] fails a container load
//! closed, with no partial model surfaced.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formats::PingId;

/// Non-fatal condition observed while decoding one capture file.
///
/// Diagnostics are collected in file order and returned alongside the
/// (possibly partial) model so a caller can report exactly what was
/// skipped and why.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum Diagnostic {
    /// A record declared more bytes than remain in the file. Framing
    /// stops here; records framed before this point remain usable.
    #[error("record at byte {offset} declares {declared} bytes but only {remaining} remain")]
    TruncatedRecord {
        offset: u64,
        declared: u32,
        remaining: u64,
    },

    /// Record type is not in the recognized catalogue. Skipped; both
    /// formats are extensible and newer records must not abort a file.
    #[error("unrecognized record {tag} at byte {offset}, skipped")]
    UnrecognizedRecord { offset: u64, tag: String },

    /// Record of a known type whose contents contradict its own framing
    /// (bad checksum, sub-array count inconsistent with length, ...).
    /// Skipped; the file continues.
    #[error("malformed {tag} record at byte {offset}: {reason}")]
    MalformedPayload {
        offset: u64,
        tag: String,
        reason: String,
    },

    /// A partition arrived for a ping identity that already has that
    /// partition (or is already complete). The duplicate is discarded.
    #[error("duplicate partition {partition} for ping {id:?}")]
    DuplicatePartition { id: PingId, partition: u16 },

    /// The stream ended before every partition of this ping arrived.
    /// The ping is still emitted, flagged, with the beams that did.
    #[error("ping {id:?} incomplete at end of stream ({received} of {expected} partitions)")]
    IncompletePing {
        id: PingId,
        received: u16,
        expected: u16,
    },
}

/// Fatal error decoding a capture file.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Neither format's framing matched the start of the file.
    #[error("unrecognized capture format (neither partitioned nor sequential framing)")]
    UnknownFormat,
}

/// Fatal error loading or producing a serialized container.
///
/// Loads fail closed: a container that cannot be fully validated yields
/// no model at all, never a partial one.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum ContainerFormatError {
    #[error("not a swath container (bad magic)")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("container truncated ({expected} payload bytes declared, {actual} present)")]
    Truncated { expected: u64, actual: u64 },

    #[error("container payload checksum mismatch")]
    ChecksumMismatch,

    #[error("container compression error: {0}")]
    Compression(String),

    #[error("container payload undecodable: {0}")]
    Payload(String),
}
