//! Record framing for both capture formats.
//!
//! Both formats are streams of self-describing records: each record
//! declares its own byte length up front, and the framer re-synchronizes
//! by seeking exactly that length. There is no sentinel scanning; a
//! length that would run past end-of-file is a truncation and framing
//! stops there, keeping everything framed so far.
//!
//! The framer does not interpret record contents beyond the type tag.
//! Unknown tags are framed and handed to the decoder, which decides
//! whether they are recognized.

use serde::{Deserialize, Serialize};

use crate::cursor::ByteCursor;
use crate::error::{DecodeError, Diagnostic};

/// Which wire format a capture file uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Modern partitioned format: 20-byte header with a four-byte ASCII
    /// tag, total length up front and repeated in a trailer.
    Kmall,
    /// Legacy sequential format: length word, STX-framed body, ETX and
    /// arithmetic checksum trailer.
    EmAll,
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Kmall => write!(f, "kmall"),
            SourceFormat::EmAll => write!(f, "all"),
        }
    }
}

/// Record type tag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTag {
    /// Four ASCII bytes, e.g. `#MRZ`.
    Modern([u8; 4]),
    /// Single type byte, e.g. `0x4E` ('N').
    Legacy(u8),
}

impl std::fmt::Display for RecordTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordTag::Modern(tag) => {
                write!(f, "{}", String::from_utf8_lossy(tag))
            }
            RecordTag::Legacy(t) if t.is_ascii_graphic() => {
                write!(f, "'{}'", *t as char)
            }
            RecordTag::Legacy(t) => write!(f, "0x{:02X}", t),
        }
    }
}

/// One framed record: the complete datagram bytes plus its tag and
/// position in the file. Transient; dropped after decode.
#[derive(Debug, Clone, Copy)]
pub struct RawRecord<'a> {
    pub format: SourceFormat,
    pub tag: RecordTag,
    /// Byte offset of the record (its length field) in the file.
    pub offset: u64,
    /// The whole datagram, length field and trailer included.
    pub bytes: &'a [u8],
}

/// Smallest possible modern record: header plus length trailer.
pub(crate) const KMALL_MIN_RECORD: usize = 24;
/// Modern header length (length word through time fields).
pub(crate) const KMALL_HEADER_LEN: usize = 20;
/// Smallest legacy body (STX through serial, ETX, checksum).
pub(crate) const ALL_MIN_BODY: usize = 19;

const STX: u8 = 0x02;

/// Identify a capture file's format from its leading bytes.
///
/// The file extension is not trusted: misnamed captures are common in
/// survey archives. A modern file opens with a length word followed by
/// `#` and three ASCII capitals; a legacy file opens with a length word
/// followed by STX.
pub fn detect_format(prefix: &[u8]) -> Result<SourceFormat, DecodeError> {
    if prefix.len() >= 8 && prefix[4] == b'#' {
        let tag = &prefix[5..8];
        if tag.iter().all(|b| b.is_ascii_uppercase()) {
            return Ok(SourceFormat::Kmall);
        }
    }
    if prefix.len() >= 5 && prefix[4] == STX {
        let declared = u32::from_le_bytes(prefix[0..4].try_into().unwrap());
        if declared as usize >= ALL_MIN_BODY {
            return Ok(SourceFormat::EmAll);
        }
    }
    Err(DecodeError::UnknownFormat)
}

/// Walks a capture file as a sequence of [`RawRecord`]s.
///
/// Lazy, finite, and restartable from the start via [`reset`]. Yields
/// `Err` exactly once, for a truncation, and then nothing further.
///
/// [`reset`]: DatagramFramer::reset
pub struct DatagramFramer<'a> {
    data: &'a [u8],
    format: SourceFormat,
    pos: usize,
    stopped: bool,
}

impl<'a> DatagramFramer<'a> {
    pub fn new(data: &'a [u8], format: SourceFormat) -> Self {
        DatagramFramer {
            data,
            format,
            pos: 0,
            stopped: false,
        }
    }

    /// Restart framing from the beginning of the file.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.stopped = false;
    }

    /// Bytes consumed so far, for progress reporting.
    pub fn bytes_consumed(&self) -> u64 {
        self.pos as u64
    }

    /// Total length of the underlying byte source.
    pub fn bytes_total(&self) -> u64 {
        self.data.len() as u64
    }

    fn truncated(&mut self, declared: u32) -> Diagnostic {
        self.stopped = true;
        Diagnostic::TruncatedRecord {
            offset: self.pos as u64,
            declared,
            remaining: (self.data.len() - self.pos) as u64,
        }
    }

    /// Declared length of the record at the current position, if the
    /// length word itself survived. Used only for diagnostics on a
    /// dangling tail.
    fn peek_declared(&self) -> u32 {
        if self.data.len() - self.pos >= 4 {
            u32::from_le_bytes(self.data[self.pos..self.pos + 4].try_into().unwrap())
        } else {
            0
        }
    }

    fn next_kmall(&mut self) -> Option<Result<RawRecord<'a>, Diagnostic>> {
        let remaining = self.data.len() - self.pos;
        if remaining < 8 {
            // A dangling handful of bytes cannot even hold a header
            if remaining > 0 {
                let declared = self.peek_declared();
                return Some(Err(self.truncated(declared)));
            }
            return None;
        }
        let mut cur = ByteCursor::new(&self.data[self.pos..]);
        let declared = cur.u32().expect("length checked above");
        let tag = cur.tag4().expect("length checked above");
        if (declared as usize) < KMALL_MIN_RECORD || declared as usize > remaining {
            return Some(Err(self.truncated(declared)));
        }
        let record = RawRecord {
            format: SourceFormat::Kmall,
            tag: RecordTag::Modern(tag),
            offset: self.pos as u64,
            bytes: &self.data[self.pos..self.pos + declared as usize],
        };
        self.pos += declared as usize;
        Some(Ok(record))
    }

    fn next_all(&mut self) -> Option<Result<RawRecord<'a>, Diagnostic>> {
        let remaining = self.data.len() - self.pos;
        if remaining < 6 {
            if remaining > 0 {
                let declared = self.peek_declared();
                return Some(Err(self.truncated(declared)));
            }
            return None;
        }
        let mut cur = ByteCursor::new(&self.data[self.pos..]);
        // Legacy length counts the bytes after the length word itself
        let declared = cur.u32().expect("length checked above");
        cur.u8().expect("length checked above"); // STX, verified by the decoder
        let type_byte = cur.u8().expect("length checked above");
        let total = 4usize + declared as usize;
        if (declared as usize) < ALL_MIN_BODY || total > remaining {
            return Some(Err(self.truncated(declared)));
        }
        let record = RawRecord {
            format: SourceFormat::EmAll,
            tag: RecordTag::Legacy(type_byte),
            offset: self.pos as u64,
            bytes: &self.data[self.pos..self.pos + total],
        };
        self.pos += total;
        Some(Ok(record))
    }
}

impl<'a> Iterator for DatagramFramer<'a> {
    type Item = Result<RawRecord<'a>, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stopped {
            return None;
        }
        match self.format {
            SourceFormat::Kmall => self.next_kmall(),
            SourceFormat::EmAll => self.next_all(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmall_record(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let total = (KMALL_HEADER_LEN + body.len() + 4) as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(tag);
        out.extend_from_slice(&[1, 0]); // version, system id
        out.extend_from_slice(&712u16.to_le_bytes());
        out.extend_from_slice(&100u32.to_le_bytes()); // time_sec
        out.extend_from_slice(&0u32.to_le_bytes()); // time_nanosec
        out.extend_from_slice(body);
        out.extend_from_slice(&total.to_le_bytes());
        out
    }

    fn all_record(type_byte: u8, payload: &[u8]) -> Vec<u8> {
        let mut body = vec![STX, type_byte];
        body.extend_from_slice(&712u16.to_le_bytes()); // model
        body.extend_from_slice(&20240601u32.to_le_bytes()); // date
        body.extend_from_slice(&0u32.to_le_bytes()); // time ms
        body.extend_from_slice(&1u16.to_le_bytes()); // counter
        body.extend_from_slice(&0u16.to_le_bytes()); // serial
        body.extend_from_slice(payload);
        let sum: u32 = body[1..].iter().map(|&b| b as u32).sum();
        body.push(0x03); // ETX
        body.extend_from_slice(&((sum % 65536) as u16).to_le_bytes());
        let mut out = Vec::new();
        out.extend_from_slice(&(body.len() as u32).to_le_bytes());
        out.extend_from_slice(&body);
        out
    }

    #[test]
    fn test_detect_format() {
        let k = kmall_record(b"#MRZ", &[]);
        assert_eq!(detect_format(&k).unwrap(), SourceFormat::Kmall);
        let a = all_record(b'N', &[]);
        assert_eq!(detect_format(&a).unwrap(), SourceFormat::EmAll);
        assert!(detect_format(&[0u8; 16]).is_err());
        assert!(detect_format(&[]).is_err());
    }

    #[test]
    fn test_frames_consecutive_kmall_records() {
        let mut data = kmall_record(b"#MRZ", &[0; 8]);
        data.extend_from_slice(&kmall_record(b"#SKM", &[0; 4]));
        let framer = DatagramFramer::new(&data, SourceFormat::Kmall);
        let records: Vec<_> = framer.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, RecordTag::Modern(*b"#MRZ"));
        assert_eq!(records[1].tag, RecordTag::Modern(*b"#SKM"));
        assert_eq!(records[1].offset, records[0].bytes.len() as u64);
    }

    #[test]
    fn test_frames_legacy_records_with_tag() {
        let mut data = all_record(b'N', &[1, 2, 3]);
        data.extend_from_slice(&all_record(b'A', &[]));
        let framer = DatagramFramer::new(&data, SourceFormat::EmAll);
        let records: Vec<_> = framer.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, RecordTag::Legacy(b'N'));
        assert_eq!(records[1].tag, RecordTag::Legacy(b'A'));
    }

    #[test]
    fn test_truncation_yields_one_error_then_stops() {
        let mut data = kmall_record(b"#MRZ", &[0; 8]);
        let good = data.len();
        // Second record claims far more than remains
        data.extend_from_slice(&500u32.to_le_bytes());
        data.extend_from_slice(b"#SKM");
        data.extend_from_slice(&[0; 8]);
        let mut framer = DatagramFramer::new(&data, SourceFormat::Kmall);
        assert!(framer.next().unwrap().is_ok());
        let err = framer.next().unwrap().unwrap_err();
        match err {
            Diagnostic::TruncatedRecord {
                offset, declared, ..
            } => {
                assert_eq!(offset, good as u64);
                assert_eq!(declared, 500);
            }
            other => panic!("expected truncation, got {:?}", other),
        }
        assert!(framer.next().is_none());
        assert!(framer.next().is_none());
    }

    #[test]
    fn test_reset_restarts_from_beginning() {
        let data = kmall_record(b"#MRZ", &[0; 8]);
        let mut framer = DatagramFramer::new(&data, SourceFormat::Kmall);
        assert!(framer.next().is_some());
        assert!(framer.next().is_none());
        framer.reset();
        assert!(framer.next().is_some());
    }

    #[test]
    fn test_unknown_tag_is_framed_not_dropped() {
        // The framer seeks by declared length even for unknown tags
        let mut data = kmall_record(b"#QQQ", &[0; 16]);
        data.extend_from_slice(&kmall_record(b"#MRZ", &[]));
        let framer = DatagramFramer::new(&data, SourceFormat::Kmall);
        let records: Vec<_> = framer.map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, RecordTag::Modern(*b"#QQQ"));
    }
}
