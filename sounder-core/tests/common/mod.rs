//! Synthetic capture-file builders for the integration tests.
//!
//! These write the wire layouts directly (wire-level values, wire-level
//! sign conventions), so the tests exercise the real decode path
//! instead of the vocabulary types.

/// One sounding entry as it goes on the modern wire.
/// Angles here are wire angles: port-positive.
#[derive(Clone, Copy)]
pub struct ModernBeam {
    pub wire_angle_deg: f32,
    pub twtt_sec: f32,
    pub backscatter_db: f32,
    /// 0 rejected, 1 amplitude, 2 phase
    pub detection: u8,
    pub quality: u8,
}

impl ModernBeam {
    pub fn valid(wire_angle_deg: f32) -> Self {
        ModernBeam {
            wire_angle_deg,
            twtt_sec: 0.1,
            backscatter_db: -30.0,
            detection: 1,
            quality: 20,
        }
    }
}

pub struct KmallBuilder {
    data: Vec<u8>,
}

impl KmallBuilder {
    pub fn new() -> Self {
        KmallBuilder { data: Vec::new() }
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    /// Append arbitrary bytes, for deliberately broken tails.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn record(&mut self, tag: &[u8; 4], revision: u8, time_sec: u32, body: &[u8]) -> &mut Self {
        let total = (20 + body.len() + 4) as u32;
        self.data.extend_from_slice(&total.to_le_bytes());
        self.data.extend_from_slice(tag);
        self.data.push(revision);
        self.data.push(0); // system id
        self.data.extend_from_slice(&712u16.to_le_bytes());
        self.data.extend_from_slice(&time_sec.to_le_bytes());
        self.data.extend_from_slice(&0u32.to_le_bytes());
        self.data.extend_from_slice(body);
        self.data.extend_from_slice(&total.to_le_bytes());
        self
    }

    pub fn ping(
        &mut self,
        time_sec: u32,
        counter: u16,
        partition_number: u16,
        partition_count: u16,
        beams: &[ModernBeam],
    ) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&partition_count.to_le_bytes());
        body.extend_from_slice(&partition_number.to_le_bytes());
        // common block
        body.extend_from_slice(&8u16.to_le_bytes());
        body.extend_from_slice(&counter.to_le_bytes());
        body.push(1);
        body.push(0);
        body.extend_from_slice(&[1, 0]);
        // info block
        body.extend_from_slice(&50u16.to_le_bytes());
        body.extend_from_slice(&1500.0f32.to_le_bytes());
        body.extend_from_slice(&6.0f32.to_le_bytes());
        body.extend_from_slice(&43.5f64.to_le_bytes());
        body.extend_from_slice(&(-70.9f64).to_le_bytes());
        body.extend_from_slice(&90.0f32.to_le_bytes());
        body.extend_from_slice(&0.0f32.to_le_bytes());
        body.extend_from_slice(&0.0f32.to_le_bytes());
        body.extend_from_slice(&0.0f32.to_le_bytes());
        body.extend_from_slice(&[1, 0, 2, 0]);
        body.extend_from_slice(&300_000u32.to_le_bytes());
        // soundings, revision 0 layout
        body.extend_from_slice(&(beams.len() as u16).to_le_bytes());
        for b in beams {
            body.extend_from_slice(&b.wire_angle_deg.to_le_bytes());
            body.extend_from_slice(&b.twtt_sec.to_le_bytes());
            body.extend_from_slice(&b.backscatter_db.to_le_bytes());
            body.push(b.detection);
            body.push(b.quality);
            body.extend_from_slice(&[0, 0]);
        }
        self.record(b"#MRZ", 0, time_sec, &body)
    }

    pub fn runtime(&mut self, time_sec: u32, ping_mode: u8, frequency_hz: u32) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&65.0f32.to_le_bytes());
        body.extend_from_slice(&65.0f32.to_le_bytes());
        body.extend_from_slice(&2000.0f32.to_le_bytes());
        body.extend_from_slice(&2000.0f32.to_le_bytes());
        body.extend_from_slice(&[ping_mode, 0, 0, 0]);
        body.extend_from_slice(&frequency_hz.to_le_bytes());
        self.record(b"#IOP", 0, time_sec, &body)
    }

    pub fn installation(&mut self, time_sec: u32, txt: &str) -> &mut Self {
        let mut body = Vec::new();
        body.extend_from_slice(&(txt.len() as u16).to_le_bytes());
        body.extend_from_slice(txt.as_bytes());
        self.record(b"#IIP", 0, time_sec, &body)
    }
}

/// One beam entry as it goes on the legacy wire (compact layout).
/// Angles here are already starboard-positive.
#[derive(Clone, Copy)]
pub struct LegacyBeam {
    pub angle_cdeg: i16,
    pub twtt_us: u32,
    pub reflectivity_ddb: i16,
    pub quality: u8,
    /// Bit 7 set means rejected.
    pub detection: u8,
}

impl LegacyBeam {
    pub fn valid(angle_cdeg: i16) -> Self {
        LegacyBeam {
            angle_cdeg,
            twtt_us: 100_000,
            reflectivity_ddb: -300,
            quality: 30,
            detection: 0,
        }
    }
}

pub struct AllBuilder {
    data: Vec<u8>,
}

impl AllBuilder {
    pub fn new() -> Self {
        AllBuilder { data: Vec::new() }
    }

    pub fn build(self) -> Vec<u8> {
        self.data
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    pub fn record(&mut self, type_byte: u8, time_ms: u32, counter: u16, payload: &[u8]) -> &mut Self {
        let mut body = vec![0x02u8, type_byte];
        body.extend_from_slice(&712u16.to_le_bytes());
        body.extend_from_slice(&20240601u32.to_le_bytes());
        body.extend_from_slice(&time_ms.to_le_bytes());
        body.extend_from_slice(&counter.to_le_bytes());
        body.extend_from_slice(&100u16.to_le_bytes());
        body.extend_from_slice(payload);
        let sum: u32 = body[1..].iter().map(|&b| b as u32).sum();
        body.push(0x03);
        body.extend_from_slice(&((sum % 65_536) as u16).to_le_bytes());
        self.data.extend_from_slice(&(body.len() as u32).to_le_bytes());
        self.data.extend_from_slice(&body);
        self
    }

    pub fn ping(&mut self, time_ms: u32, counter: u16, beams: &[LegacyBeam]) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&15_000u16.to_le_bytes()); // 1500.0 m/s
        payload.extend_from_slice(&600u16.to_le_bytes()); // 6.00 m
        payload.extend_from_slice(&(beams.len() as u16).to_le_bytes());
        let valid = beams.iter().filter(|b| b.detection & 0x80 == 0).count();
        payload.extend_from_slice(&(valid as u16).to_le_bytes());
        for b in beams {
            payload.extend_from_slice(&b.angle_cdeg.to_le_bytes());
            payload.extend_from_slice(&b.twtt_us.to_le_bytes());
            payload.extend_from_slice(&b.reflectivity_ddb.to_le_bytes());
            payload.push(b.quality);
            payload.push(b.detection);
            payload.extend_from_slice(&[0, 0]);
        }
        self.record(b'N', time_ms, counter, &payload)
    }

    pub fn attitude(&mut self, time_ms: u32, roll_cdeg: i16, heave_cm: i16) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&0u16.to_le_bytes()); // offset ms
        payload.extend_from_slice(&0u16.to_le_bytes()); // status
        payload.extend_from_slice(&roll_cdeg.to_le_bytes());
        payload.extend_from_slice(&0i16.to_le_bytes()); // pitch
        payload.extend_from_slice(&heave_cm.to_le_bytes());
        payload.extend_from_slice(&9000u16.to_le_bytes()); // heading 90
        self.record(b'A', time_ms, 1, &payload)
    }

    pub fn position(&mut self, time_ms: u32, latitude_deg: f64, longitude_deg: f64) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&((latitude_deg * 2e7) as i32).to_le_bytes());
        payload.extend_from_slice(&((longitude_deg * 1e7) as i32).to_le_bytes());
        payload.extend_from_slice(&1u16.to_le_bytes());
        payload.extend_from_slice(&200u16.to_le_bytes());
        payload.extend_from_slice(&9000u16.to_le_bytes());
        self.record(b'P', time_ms, 1, &payload)
    }

    pub fn runtime(&mut self, time_ms: u32, ping_mode: u8, frequency_hz: u32) -> &mut Self {
        let mut payload = Vec::new();
        payload.extend_from_slice(&[ping_mode, 0, 0, 0]);
        payload.extend_from_slice(&65u16.to_le_bytes());
        payload.extend_from_slice(&65u16.to_le_bytes());
        payload.extend_from_slice(&2000u16.to_le_bytes());
        payload.extend_from_slice(&2000u16.to_le_bytes());
        payload.extend_from_slice(&frequency_hz.to_le_bytes());
        self.record(b'R', time_ms, 1, &payload)
    }

    pub fn installation(&mut self, txt: &str) -> &mut Self {
        self.record(b'I', 0, 1, txt.as_bytes())
    }
}
