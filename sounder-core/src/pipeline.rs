//! The per-file conversion pipeline.
//!
//! One pipeline instance decodes one capture file: framed records are
//! fed in file order, payloads are routed to the reconstructor and the
//! parameter history, and completed pings get their geometry derived
//! and land in the canonical model. Pipelines share no state; batch
//! conversion runs one per file.
//!
//! Legacy pings carry no embedded navigation or mode settings. The
//! pipeline holds the latest attitude sample and position fix
//! (sample-and-hold, no interpolation) and resolves mode settings
//! against the runtime-parameter history as of the ping time.

use crate::error::{DecodeError, Diagnostic};
use crate::formats::{
    decode_record, AttitudeSample, InstallationParams, Payload, PingNav, PositionFix,
};
use crate::framing::{detect_format, DatagramFramer, RawRecord, SourceFormat};
use crate::geometry::extract_soundings;
use crate::model::{CanonicalRecordModel, FileMeta, LogicalPing};
use crate::ping::{AssembledPing, PingReconstructor};

/// A decoded file: the (possibly partial) model plus everything that
/// went wrong along the way, in file order.
#[derive(Debug)]
pub struct Decoded {
    pub model: CanonicalRecordModel,
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives one capture file through decode, reconstruction and geometry.
pub struct Pipeline {
    reconstructor: PingReconstructor,
    installation: InstallationParams,
    latest_attitude: Option<AttitudeSample>,
    latest_position: Option<PositionFix>,
    model: CanonicalRecordModel,
    diagnostics: Vec<Diagnostic>,
}

impl Pipeline {
    pub fn new(meta: FileMeta) -> Self {
        Pipeline {
            reconstructor: PingReconstructor::new(),
            installation: InstallationParams::default(),
            latest_attitude: None,
            latest_position: None,
            model: CanonicalRecordModel::new(meta),
            diagnostics: Vec::new(),
        }
    }

    /// Record a framing-level diagnostic (truncation).
    pub fn push_diagnostic(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Decode and route one framed record.
    pub fn feed(&mut self, record: &RawRecord<'_>) {
        match decode_record(record) {
            Ok(payload) => self.apply(payload),
            Err(diagnostic) => self.diagnostics.push(diagnostic),
        }
    }

    pub(crate) fn apply(&mut self, payload: Payload) {
        match payload {
            Payload::Ping(partition) => {
                if let Some(ping) = self.reconstructor.push(partition, &mut self.diagnostics) {
                    self.complete_ping(ping);
                }
            }
            Payload::Attitude(samples) => {
                if let Some(last) = samples.last() {
                    self.latest_attitude = Some(*last);
                }
            }
            Payload::Position(fix) => {
                self.latest_position = Some(fix);
            }
            Payload::Runtime(record) => {
                self.model.parameters_mut().push(record);
            }
            Payload::Installation(params) => {
                self.installation = params;
            }
            Payload::Informational => {}
        }
    }

    fn complete_ping(&mut self, ping: AssembledPing) {
        let nav = ping.nav.unwrap_or_else(|| self.held_nav());
        let mode = ping
            .mode
            .or_else(|| {
                self.model
                    .parameters()
                    .as_of(ping.timestamp)
                    .or_else(|| self.model.parameters().latest())
                    .map(|r| r.mode)
            })
            .unwrap_or_default();

        let soundings =
            extract_soundings(&ping.beams, ping.sound_speed_mps, &nav, &self.installation);

        self.model.push_ping(LogicalPing {
            id: ping.id,
            timestamp: ping.timestamp,
            latitude_deg: nav.latitude_deg,
            longitude_deg: nav.longitude_deg,
            heading_deg: nav.heading_deg,
            roll_deg: nav.roll_deg,
            pitch_deg: nav.pitch_deg,
            heave_m: nav.heave_m,
            sound_speed_mps: ping.sound_speed_mps,
            transducer_depth_m: ping.transducer_depth_m,
            ping_mode: mode.ping_mode,
            pulse_form: mode.pulse_form,
            swath_mode: mode.swath_mode,
            frequency_hz: mode.frequency_hz,
            complete: ping.complete,
            beams: ping.beams,
            soundings,
        });
    }

    /// Navigation for a ping that carries none: latest attitude and
    /// position, held since their records.
    fn held_nav(&self) -> PingNav {
        let mut nav = PingNav::default();
        if let Some(att) = &self.latest_attitude {
            nav.heading_deg = att.heading_deg;
            nav.roll_deg = att.roll_deg;
            nav.pitch_deg = att.pitch_deg;
            nav.heave_m = att.heave_m;
        }
        if let Some(fix) = &self.latest_position {
            nav.latitude_deg = fix.latitude_deg;
            nav.longitude_deg = fix.longitude_deg;
        }
        nav
    }

    /// End of input: drain incomplete pings (flagged, with diagnostics)
    /// and hand over the finished model.
    pub fn finish(mut self) -> Decoded {
        let incomplete = self.reconstructor.finish(&mut self.diagnostics);
        for ping in incomplete {
            self.complete_ping(ping);
        }
        Decoded {
            model: self.model,
            diagnostics: self.diagnostics,
        }
    }
}

/// Decode a whole in-memory capture in one call: detect the format,
/// frame, decode, reconstruct. The conversion layer drives the same
/// stages itself when it needs progress reporting and cancellation.
pub fn decode_capture(data: &[u8], source: &str) -> Result<Decoded, DecodeError> {
    let format = detect_format(data)?;
    let meta = FileMeta {
        source_path: source.to_string(),
        source_name: source
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(source)
            .to_string(),
        format: Some(format),
        converted_at: String::new(),
        compressed: false,
        source_bytes: data.len() as u64,
    };
    let mut pipeline = Pipeline::new(meta);
    for item in DatagramFramer::new(data, format) {
        match item {
            Ok(record) => pipeline.feed(&record),
            Err(diagnostic) => pipeline.push_diagnostic(diagnostic),
        }
    }
    Ok(pipeline.finish())
}
