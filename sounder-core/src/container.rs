//! Compact container serialization for the canonical model.
//!
//! Layout: a 20-byte header (magic, format version, flags, payload
//! CRC-32, payload length) followed by the bincode-encoded model,
//! gzip-wrapped when the compression flag is set. Compression is an
//! encoding of the same logical bytes; toggling it never changes the
//! decoded model.
//!
//! Loads fail closed. Unknown magic or version, a short payload, a CRC
//! mismatch or an undecodable payload all yield an error and no model;
//! a partially-written container must never pass for a valid one.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::ContainerFormatError;
use crate::model::CanonicalRecordModel;

/// Container magic: "SWCM", swath container model.
pub const MAGIC: [u8; 4] = *b"SWCM";
/// Current container format version. Readers reject anything else.
pub const VERSION: u16 = 1;

const FLAG_GZIP: u8 = 0x01;
const HEADER_LEN: usize = 20;

/// Serialize a model into container bytes.
pub fn serialize(
    model: &CanonicalRecordModel,
    compress: bool,
) -> Result<Vec<u8>, ContainerFormatError> {
    let encoded =
        bincode::serialize(model).map_err(|e| ContainerFormatError::Payload(e.to_string()))?;

    let payload = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(6));
        encoder
            .write_all(&encoded)
            .and_then(|_| encoder.finish())
            .map_err(|e| ContainerFormatError::Compression(e.to_string()))?
    } else {
        encoded
    };

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.push(if compress { FLAG_GZIP } else { 0 });
    out.push(0); // reserved
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Restore a model from container bytes.
pub fn deserialize(bytes: &[u8]) -> Result<CanonicalRecordModel, ContainerFormatError> {
    if bytes.len() < HEADER_LEN {
        return Err(ContainerFormatError::BadMagic);
    }
    if bytes[0..4] != MAGIC {
        return Err(ContainerFormatError::BadMagic);
    }
    let version = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
    if version != VERSION {
        return Err(ContainerFormatError::UnsupportedVersion(version));
    }
    let flags = bytes[6];
    let crc = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
    let payload_len = u64::from_le_bytes(bytes[12..20].try_into().unwrap());

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != payload_len {
        return Err(ContainerFormatError::Truncated {
            expected: payload_len,
            actual: payload.len() as u64,
        });
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    if hasher.finalize() != crc {
        return Err(ContainerFormatError::ChecksumMismatch);
    }

    let decoded: Vec<u8> = if flags & FLAG_GZIP != 0 {
        let mut decoder = GzDecoder::new(payload);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| ContainerFormatError::Compression(e.to_string()))?;
        out
    } else {
        payload.to_vec()
    };

    bincode::deserialize(&decoded).map_err(|e| ContainerFormatError::Payload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{BeamFlags, PingId, RawBeam};
    use crate::model::{FileMeta, LogicalPing, SoundingRecord};
    use chrono::TimeZone;
    use chrono::Utc;

    fn sample_model() -> CanonicalRecordModel {
        let mut model = CanonicalRecordModel::new(FileMeta {
            source_path: "/data/line_0042.kmall".to_string(),
            source_name: "line_0042.kmall".to_string(),
            format: Some(crate::framing::SourceFormat::Kmall),
            converted_at: "2024-06-01T12:00:00Z".to_string(),
            compressed: false,
            source_bytes: 1024,
        });
        model.push_ping(LogicalPing {
            id: PingId {
                time_sec: 1000,
                time_nanosec: 500,
                counter: 1,
            },
            timestamp: Utc.timestamp_opt(1000, 500).unwrap(),
            latitude_deg: 43.5,
            longitude_deg: -70.9,
            heading_deg: 90.0,
            roll_deg: 1.0,
            pitch_deg: -0.5,
            heave_m: 0.1,
            sound_speed_mps: 1500.0,
            transducer_depth_m: 6.0,
            ping_mode: 1,
            pulse_form: 0,
            swath_mode: 2,
            frequency_hz: 300_000,
            complete: true,
            beams: vec![RawBeam {
                angle_deg: -60.0,
                twtt_sec: 0.12,
                backscatter_db: -31.5,
                flags: BeamFlags::VALID,
                quality: 12,
            }],
            soundings: vec![SoundingRecord {
                across_m: -77.9,
                depth_m: 45.0,
                backscatter_db: -31.5,
                flags: BeamFlags::VALID,
            }],
        });
        model
    }

    #[test]
    fn test_round_trip_uncompressed() {
        let model = sample_model();
        let bytes = serialize(&model, false).unwrap();
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_round_trip_compressed() {
        let model = sample_model();
        let bytes = serialize(&model, true).unwrap();
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_compression_is_encoding_only() {
        let model = sample_model();
        let plain = deserialize(&serialize(&model, false).unwrap()).unwrap();
        let packed = deserialize(&serialize(&model, true).unwrap()).unwrap();
        assert_eq!(plain, packed);
    }

    #[test]
    fn test_round_trip_empty_model() {
        let model = CanonicalRecordModel::new(FileMeta::default());
        let bytes = serialize(&model, true).unwrap();
        assert_eq!(deserialize(&bytes).unwrap(), model);
    }

    #[test]
    fn test_bad_magic_fails_closed() {
        let mut bytes = serialize(&sample_model(), false).unwrap();
        bytes[0] = b'X';
        assert_eq!(deserialize(&bytes), Err(ContainerFormatError::BadMagic));
    }

    #[test]
    fn test_unknown_version_fails_closed() {
        let mut bytes = serialize(&sample_model(), false).unwrap();
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        assert_eq!(
            deserialize(&bytes),
            Err(ContainerFormatError::UnsupportedVersion(99))
        );
    }

    #[test]
    fn test_corrupt_payload_fails_closed() {
        let mut bytes = serialize(&sample_model(), false).unwrap();
        let n = bytes.len();
        bytes[n - 1] ^= 0x40;
        assert_eq!(
            deserialize(&bytes),
            Err(ContainerFormatError::ChecksumMismatch)
        );
    }

    #[test]
    fn test_truncated_payload_fails_closed() {
        let mut bytes = serialize(&sample_model(), false).unwrap();
        bytes.truncate(bytes.len() - 10);
        assert!(matches!(
            deserialize(&bytes),
            Err(ContainerFormatError::Truncated { .. })
        ));
    }

    #[test]
    fn test_short_buffer_fails_closed() {
        assert_eq!(deserialize(&[1, 2, 3]), Err(ContainerFormatError::BadMagic));
    }
}
