//! Decoder for the legacy sequential capture format.
//!
//! Records are a length word, an STX-framed body, an ETX byte and an
//! arithmetic checksum over the body. The body opens with a fixed
//! header: type byte, sounder model number, date (YYYYMMDD), time in
//! milliseconds since midnight, ping/record counter, serial number.
//! There is no partitioning; every ping record is complete on its own.
//!
//! The model word doubles as the revision selector: the per-beam entry
//! layout differs between the deep-water and high-resolution system
//! families, chosen from a table keyed on the model.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use crate::cursor::ByteCursor;
use crate::error::Diagnostic;
use crate::framing::RawRecord;
use crate::params::AcquisitionParameterRecord;

use super::{
    parse_installation_text, AttitudeSample, BeamFlags, Payload, PingId, PingModeSettings,
    PingPartition, PositionFix, RawBeam,
};

// =============================================================================
// Record catalogue
// =============================================================================

const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// Raw range and beam angle - the ping record.
pub const TYPE_PING: u8 = b'N';
/// Attitude sample series.
pub const TYPE_ATTITUDE: u8 = b'A';
/// Position fix.
pub const TYPE_POSITION: u8 = b'P';
/// Runtime parameter snapshot.
pub const TYPE_RUNTIME: u8 = b'R';
/// Installation text.
pub const TYPE_INSTALLATION: u8 = b'I';

/// Recognized types the pipeline deliberately ignores: sounder-computed
/// depths, sound-velocity profile, surface sound speed, height, clock.
const INFORMATIONAL: [u8; 5] = [b'X', b'U', b'G', b'h', b'C'];

/// Detection byte: bit 7 set means the sounder rejected the beam.
const DETECTION_REJECTED: u8 = 0x80;
/// Detection byte: bit 0 set means phase detection.
const DETECTION_PHASE: u8 = 0x01;

// =============================================================================
// Beam entry layouts
// =============================================================================

/// Wire layout of one beam entry, selected by the sounder model.
struct BeamLayout {
    entry_len: usize,
    /// The high-resolution family appends an explicit beam number.
    has_beam_number: bool,
}

const COMPACT_LAYOUT: BeamLayout = BeamLayout {
    entry_len: 12,
    has_beam_number: false,
};

const EXTENDED_LAYOUT: BeamLayout = BeamLayout {
    entry_len: 16,
    has_beam_number: true,
};

fn beam_layout(model: u16) -> &'static BeamLayout {
    // Model numbers 2000 and up are the high-resolution family
    if model >= 2000 {
        &EXTENDED_LAYOUT
    } else {
        &COMPACT_LAYOUT
    }
}

// =============================================================================
// Header
// =============================================================================

struct DgmHeader {
    type_byte: u8,
    model: u16,
    date: u32,
    time_ms: u32,
    counter: u16,
    #[allow(dead_code)]
    serial: u16,
}

impl DgmHeader {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        let year = (self.date / 10_000) as i32;
        let month = (self.date / 100) % 100;
        let day = self.date % 100;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let midnight = date.and_hms_opt(0, 0, 0)?;
        let dt = midnight + Duration::milliseconds(self.time_ms as i64);
        Some(Utc.from_utc_datetime(&dt))
    }
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

/// Decode one framed legacy record into a payload.
pub fn decode(record: &RawRecord<'_>) -> Result<Payload, Diagnostic> {
    let ctx = RecordCtx {
        offset: record.offset,
        tag: record.tag.to_string(),
    };
    let bytes = record.bytes;

    // Framer guarantees the minimum body, so the fixed trailer indexes
    // below cannot underflow.
    if bytes[4] != STX {
        return Err(ctx.malformed("missing STX"));
    }
    if bytes[bytes.len() - 3] != ETX {
        return Err(ctx.malformed("missing ETX"));
    }

    // Arithmetic checksum over the body between STX and ETX
    let summed: u32 = bytes[5..bytes.len() - 3].iter().map(|&b| b as u32).sum();
    let expected = (summed % 65_536) as u16;
    let stored = u16::from_le_bytes(bytes[bytes.len() - 2..].try_into().unwrap());
    if stored != expected {
        return Err(ctx.malformed(format!(
            "checksum mismatch (stored {:#06x}, computed {:#06x})",
            stored, expected
        )));
    }

    let mut cur = ByteCursor::new(&bytes[..bytes.len() - 3]);
    cur.skip(5).map_err(|e| ctx.malformed(e.to_string()))?; // length word + STX
    let header = DgmHeader {
        type_byte: cur.u8().map_err(|e| ctx.malformed(e.to_string()))?,
        model: cur.u16().map_err(|e| ctx.malformed(e.to_string()))?,
        date: cur.u32().map_err(|e| ctx.malformed(e.to_string()))?,
        time_ms: cur.u32().map_err(|e| ctx.malformed(e.to_string()))?,
        counter: cur.u16().map_err(|e| ctx.malformed(e.to_string()))?,
        serial: cur.u16().map_err(|e| ctx.malformed(e.to_string()))?,
    };
    let timestamp = header
        .timestamp()
        .ok_or_else(|| ctx.malformed(format!("unrepresentable record date {}", header.date)))?;

    match header.type_byte {
        TYPE_PING => decode_ping(&ctx, &header, timestamp, &mut cur),
        TYPE_ATTITUDE => decode_attitude(&ctx, timestamp, &mut cur),
        TYPE_POSITION => decode_position(&ctx, timestamp, &mut cur),
        TYPE_RUNTIME => decode_runtime(&ctx, timestamp, &mut cur),
        TYPE_INSTALLATION => decode_installation(&mut cur),
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
    let layout = beam_layout(header.model);

    let sound_speed_dms = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let transducer_depth_cm = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let beam_count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    let _valid_count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;

    if cur.remaining() < beam_count * layout.entry_len {
        return Err(ctx.malformed(format!(
            "{} beams of {} bytes do not fit in {} remaining bytes",
            beam_count,
            layout.entry_len,
            cur.remaining()
        )));
    }

    let mut beams = Vec::with_capacity(beam_count);
    for _ in 0..beam_count {
        // Already starboard-positive on this wire; no sign change
        let angle_cdeg = cur.i16().map_err(|e| ctx.malformed(e.to_string()))?;
        let twtt_us = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
        let reflectivity_ddb = cur.i16().map_err(|e| ctx.malformed(e.to_string()))?;
        let quality = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
        let detection = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
        cur.skip(2).map_err(|e| ctx.malformed(e.to_string()))?;
        if layout.has_beam_number {
            let _beam_number = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
            cur.skip(2).map_err(|e| ctx.malformed(e.to_string()))?;
        }

        let mut flags = BeamFlags::empty();
        if detection & DETECTION_REJECTED == 0 {
            flags |= BeamFlags::VALID;
        }
        if detection & DETECTION_PHASE != 0 {
            flags |= BeamFlags::PHASE;
        }
        beams.push(RawBeam {
            angle_deg: angle_cdeg as f32 * 0.01,
            twtt_sec: twtt_us as f32 * 1e-6,
            backscatter_db: reflectivity_ddb as f32 * 0.1,
            flags,
            quality,
        });
    }

    // Millisecond time resolution on this wire; identity nanoseconds
    // carry the sub-second part so modern and legacy identities share
    // one shape.
    let id = PingId {
        time_sec: timestamp.timestamp() as u32,
        time_nanosec: (header.time_ms % 1000) * 1_000_000,
        counter: header.counter,
    };

    Ok(Payload::Ping(PingPartition {
        id,
        timestamp,
        partition_index: 0,
        partition_count: 1,
        sound_speed_mps: sound_speed_dms as f32 * 0.1,
        transducer_depth_m: transducer_depth_cm as f32 * 0.01,
        nav: None,
        mode: None,
        beams,
    }))
}

fn decode_attitude(
    ctx: &RecordCtx,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    const SAMPLE_LEN: usize = 12;
    let count = cur.u16().map_err(|e| ctx.malformed(e.to_string()))? as usize;
    if cur.remaining() < count * SAMPLE_LEN {
        return Err(ctx.malformed(format!(
            "{} attitude samples do not fit in {} remaining bytes",
            count,
            cur.remaining()
        )));
    }
    let mut samples = Vec::with_capacity(count);
    for _ in 0..count {
        let offset_ms = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
        let _status = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
        let roll_cdeg = cur.i16().map_err(|e| ctx.malformed(e.to_string()))?;
        let pitch_cdeg = cur.i16().map_err(|e| ctx.malformed(e.to_string()))?;
        let heave_cm = cur.i16().map_err(|e| ctx.malformed(e.to_string()))?;
        let heading_cdeg = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
        samples.push(AttitudeSample {
            timestamp: timestamp + Duration::milliseconds(offset_ms as i64),
            roll_deg: roll_cdeg as f32 * 0.01,
            pitch_deg: pitch_cdeg as f32 * 0.01,
            heave_m: heave_cm as f32 * 0.01,
            heading_deg: heading_cdeg as f32 * 0.01,
        });
    }
    Ok(Payload::Attitude(samples))
}

fn decode_position(
    ctx: &RecordCtx,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    // Latitude counts twice as fine as longitude on this wire
    let lat_raw = cur.i32().map_err(|e| ctx.malformed(e.to_string()))?;
    let lon_raw = cur.i32().map_err(|e| ctx.malformed(e.to_string()))?;
    let _fix_quality = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let speed_cms = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let course_cdeg = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    Ok(Payload::Position(PositionFix {
        timestamp,
        latitude_deg: lat_raw as f64 / 2e7,
        longitude_deg: lon_raw as f64 / 1e7,
        speed_mps: speed_cms as f32 * 0.01,
        course_deg: course_cdeg as f32 * 0.01,
    }))
}

fn decode_runtime(
    ctx: &RecordCtx,
    timestamp: DateTime<Utc>,
    cur: &mut ByteCursor<'_>,
) -> Result<Payload, Diagnostic> {
    let ping_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let pulse_form = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    let swath_mode = cur.u8().map_err(|e| ctx.malformed(e.to_string()))?;
    cur.skip(1).map_err(|e| ctx.malformed(e.to_string()))?;
    let max_port_angle = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_stbd_angle = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_port_coverage = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let max_stbd_coverage = cur.u16().map_err(|e| ctx.malformed(e.to_string()))?;
    let frequency_hz = cur.u32().map_err(|e| ctx.malformed(e.to_string()))?;
    Ok(Payload::Runtime(AcquisitionParameterRecord {
        valid_from: timestamp,
        max_port_angle_deg: max_port_angle as f32,
        max_stbd_angle_deg: max_stbd_angle as f32,
        max_port_coverage_m: max_port_coverage as f32,
        max_stbd_coverage_m: max_stbd_coverage as f32,
        mode: PingModeSettings {
            ping_mode,
            pulse_form,
            swath_mode,
            frequency_hz,
        },
    }))
}

fn decode_installation(cur: &mut ByteCursor<'_>) -> Result<Payload, Diagnostic> {
    let raw = cur
        .bytes(cur.remaining())
        .expect("reading exactly the remaining bytes");
    let txt = String::from_utf8_lossy(raw);
    let txt = txt.trim_end_matches('\0').trim();
    Ok(Payload::Installation(parse_installation_text(txt)))
}
