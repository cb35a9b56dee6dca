//! Decoder for the modern partitioned capture format.
//!
//! Records open with a 20-byte header (total length, four-byte ASCII
//! tag, revision, system and sounder ids, timestamp) and close with a
//! four-byte trailer repeating the length. Ping records may be split
//! into partitions; each partition repeats the header blocks and
//! carries its own slice of the beam array.
//!
//! Field layouts are revision-dependent. The revision byte in the
//! record's own header selects an entry in a layout table; layouts are
//! never chosen per call site.

use chrono::{DateTime, TimeZone, Utc};

use crate::cursor::ByteCursor;
use crate::error::Diagnostic;
use crate::framing::{RawRecord, KMALL_HEADER_LEN};
use crate::params::AcquisitionParameterRecord;

use super::{
    parse_installation_text, AttitudeSample, BeamFlags, Payload, PingId, PingModeSettings,
    PingNav, PingPartition, PositionFix, RawBeam,
};

// =============================================================================
// Record catalogue
// =============================================================================

/// Ping soundings (partitioned).
pub const TAG_PING: [u8; 4] = *b"#MRZ";
/// Attitude samples.
pub const TAG_ATTITUDE: [u8; 4] = *b"#SKM";
/// Position fix.
pub const TAG_POSITION: [u8; 4] = *b"#SPO";
/// Runtime parameter snapshot.
pub const TAG_RUNTIME: [u8; 4] = *b"#IOP";
/// Installation text.
pub const TAG_INSTALLATION: [u8; 4] = *b"#IIP";

/// Recognized types the pipeline deliberately ignores: sound-velocity
/// profile, water column, clock, position calibration.
const INFORMATIONAL: [[u8; 4]; 4] = [*b"#SVP", *b"#MWC", *b"#SCL", *b"#CPO"];

// =============================================================================
// Sounding entry layouts
// =============================================================================

/// Wire layout of one sounding entry, selected by the record revision.
struct SoundingLayout {
    entry_len: usize,
    /// Revision 1 appended a per-beam signal-to-noise field.
    has_snr: bool,
}

/// Indexed by the header's revision byte.
const SOUNDING_LAYOUTS: [SoundingLayout; 2] = [
    SoundingLayout {
        entry_len: 16,
        has_snr: false,
    },
    SoundingLayout {
        entry_len: 20,
        has_snr: true,
    },
];

fn sounding_layout(revision: u8) -> Option<&'static SoundingLayout> {
    SOUNDING_LAYOUTS.get(revision as usize)
}

// =============================================================================
// Header
// =============================================================================

struct DgmHeader {
    num_bytes: u32,
    tag: [u8; 4],
    revision: u8,
    #[allow(dead_code)]
    system_id: u8,
    #[allow(dead_code)]
    sounder_id: u16,
    time_sec: u32,
    time_nanosec: u32,
}

impl DgmHeader {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.time_sec as i64, self.time_nanosec)
            .single()
    }
}

fn read_header(cur: &mut ByteCursor<'_>) -> Result<DgmHeader, crate::cursor::Overrun> {
    Ok(DgmHeader {
        num_bytes: cur.u32()?,
        tag: cur.tag4()?,
        revision: cur.u8()?,
        system_id: cur.u8()?,
        sounder_id: cur.u16()?,
        time_sec: cur.u32()?,
        time_nanosec: cur.u32()?,
    })
}

// =============================================================================
// Decode
// =============================================================================

struct RecordCtx {
    offset: u64,
    tag: String,
}

impl RecordCtx {
    fn malformed(&self, reason: impl Into<String>) -> Diagnostic {
        Diagnostic::MalformedPayload {
            offset: self.offset,
            tag: self.tag.clone(),
            reason: reason.into(),
        }
    }
}

/// Decode one framed modern record into a payload.
pub fn decode(record: &RawRecord<'_>) -> Result<Payload, Diagnostic> {
    let ctx = RecordCtx {
        offset: record.offset,
        tag: record.tag.to_string(),
    };

    let mut cur = ByteCursor::new(record.bytes);
    let header = read_header(&mut cur).map_err(|e| ctx.malformed(e.to_string()))?;

    // The trailer repeats the length; a mismatch means the record body
    // we framed is not the body the writer wrote.
    let trailer = u32::from_le_bytes(
        record.bytes[record.bytes.len() - 4..]
            .try_into()
            .expect("framer guarantees minimum record size"),
    );
    if trailer != header.num_bytes {
        return Err(ctx.malformed(format!(
            "length trailer {} does not match header {}",
            trailer, header.num_bytes
        )));
    }

    let timestamp = header
        .timestamp()
        .ok_or_else(|| ctx.malformed("unrepresentable record time"))?;

    // Body excludes the trailer so field reads cannot stray into it
    let body = &record.bytes[..record.bytes.len() - 4];
    let mut cur = ByteCursor::new(body);
    cur.seek(KMALL_HEADER_LEN)
        .map_err(|e| ctx.malformed(e.to_string()))?;

    match header.tag {
        t if t == TAG_PING => decode_ping(&ctx, &header, timestamp, &mut cur),
        t if t == TAG_ATTITUDE => decode_attitude(&ctx, &mut cur),
        t if t == TAG_POSITION => decode_position(&ctx, timestamp, &mut cur),
        t if t == TAG_RUNTIME => decode_runtime(&ctx, timestamp, &mut cur),
        t if t == TAG_INSTALLATION => decode_installation(&ctx, &mut cur),
        t if INFORMATIONAL.contains(&t) => Ok(Payload::Informational),
        _ => Err(Diagnostic::UnrecognizedRecord {
            offset: record.offset,
            tag: ctx.tag,
        }),
    }
}

fn decode_ping(
    ctx: &RecordCtx,
    header: &DgmHeader,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    let layout = sounding_layout(header.revision)
        .ok_or_else(|| ctx.malformed(format!("unsupported ping record revision {}", header.revision)))?;

    // Partition block
    let partition_count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let partition_number = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    if partition_count == 0 || partition_number == 0 || partition_number > partition_count {
        return Err(ctx.malformed(format!(
            "partition {} of {} out of range",
            partition_number, partition_count
        )));
    }

    // Common block, length-prefixed so future fields can be skipped
    let common_start = cur.position();
    let common_len = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    if common_len < 8 {
        return Err(ctx.malformed("common block shorter than its fixed fields"));
    }
    let ping_counter = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let _rx_fans_per_ping = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let _rx_fan_index = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    cur.seek(common_start + common_len)
        .map_err(|e| ctx.malformed(e.to_string()))?;

    // Ping info block, also length-prefixed
    let info_start = cur.position();
    let info_len = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    if info_len < 50 {
        return Err(ctx.malformed("ping info block shorter than its fixed fields"));
    }
    let sound_speed_mps = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let transducer_depth_m = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let latitude_deg = cur.f64().map_err(|e| ctx.malformed(e.to_string()))?;
    let longitude_deg = cur.f64().map_err(|e| ctx.malformed(e.to_string()))?;
    let heading_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let roll_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let pitch_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let heave_m = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let ping_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let pulse_form = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let swath_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    cur.skip(1).map_err(|e| ctx.malformed(e.to_string()))?;
    let frequency_hz = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
    cur.seek(info_start + info_len)
        .map_err(|e| ctx.malformed(e.to_string()))?;

    // Sounding array; count must fit in the declared record length
    let beam_count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    if cur.remaining() < beam_count * layout.entry_len {
        return Err(ctx.malformed(format!(
            "{} soundings of {} bytes do not fit in {} remaining bytes",
            beam_count,
            layout.entry_len,
            cur.remaining()
        )));
    }

    let mut beams = Vec::with_capacity(beam_count);
    for _ in 0..beam_count {
        // Raw angles are port-positive on this wire; normalize
        let angle_deg = -cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let twtt_sec = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let backscatter_db = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let detection = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
        let quality = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
        cur.skip(2).map_err(|e| ctx.malformed(e.to_string()))?;
        if layout.has_snr {
            let _snr_db = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        }

        let mut flags = BeamFlags::empty();
        // Detection: 0 rejected, 1 amplitude, 2 phase
        if detection != 0 {
            flags |= BeamFlags::VALID;
        }
        if detection == 2 {
            flags |= BeamFlags::PHASE;
        }
        beams.push(RawBeam {
            angle_deg,
            twtt_sec,
            backscatter_db,
            flags,
            quality,
        });
    }

    Ok(Payload::Ping(PingPartition {
        id: PingId {
            time_sec: header.time_sec,
            time_nanosec: header.time_nanosec,
            counter: ping_counter,
        },
        timestamp,
        partition_index: partition_number - 1,
        partition_count,
        sound_speed_mps,
        transducer_depth_m,
        nav: Some(PingNav {
            latitude_deg,
            longitude_deg,
            heading_deg,
            roll_deg,
            pitch_deg,
            heave_m,
        }),
        mode: Some(PingModeSettings {
            ping_mode,
            pulse_form,
            swath_mode,
            frequency_hz,
        }),
        beams,
    }))
}

fn decode_attitude(ctx: &RecordCtx, cur: &mut ByteCursor<'_>) -> Result<Payload, Diagnostic> {
    const SAMPLE_LEN: usize = 24;
    let count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    cur.skip(2).map_err(|e| ctx.malformed(e.to_string()))?;
    if cur.remaining() < count * SAMPLE_LEN {
        return Err(ctx.malformed(format!(
            "{} attitude samples do not fit in {} remaining bytes",
            count,
            cur.remaining()
        )));
    }
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let time_sec = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
        let time_nanosec = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
        let roll_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let pitch_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let heave_m = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let heading_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
        let timestamp = Utc
            .timestamp_opt(time_sec as i64, time_nanosec)
            .single()
            .ok_or_else(|| ctx.malformed("unrepresentable attitude sample time"))?;
        samples.push(AttitudeSample {
            timestamp,
            roll_deg,
            pitch_deg,
            heave_m,
            heading_deg,
        });
    }
    Ok(Payload::Attitude(samples))
}

fn decode_position(
    ctx: &RecordCtx,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    let latitude_deg = cur.f64().map_err(|e| ctx.malformed(e.to_string()))?;
    let longitude_deg = cur.f64().map_err(|e| ctx.malformed(e.to_string()))?;
    let speed_mps = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let course_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    Ok(Payload::Position(PositionFix {
        timestamp,
        latitude_deg,
        longitude_deg,
        speed_mps,
        course_deg,
    }))
}

fn decode_runtime(
    ctx: &RecordCtx,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    let max_port_angle_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_stbd_angle_deg = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_port_coverage_m = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_stbd_coverage_m = cur.f32().map_err(|e| ctx.malformed(e.to_string()))?;
    let ping_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let pulse_form = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let swath_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    cur.skip(1).map_err(|e| ctx.malformed(e.to_string()))?;
    let frequency_hz = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
    Ok(Payload::Runtime(AcquisitionParameterRecord {
        valid_from: timestamp,
        max_port_angle_deg,
        max_stbd_angle_deg,
        max_port_coverage_m,
        max_stbd_coverage_m,
        mode: PingModeSettings {
            ping_mode,
            pulse_form,
            swath_mode,
            frequency_hz,
        },
    }))
}

fn decode_installation(ctx: &RecordCtx, cur: &mut ByteCursor<'_>) -> Result<Payload, Diagnostic> {
    let text_len = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    let raw = cur.bytes(text_len).map_err(|e| ctx.malformed(e.to_string()))?;
    let txt = String::from_utf8_lossy(raw);
    Ok(Payload::Installation(parse_installation_text(&txt)))
}
