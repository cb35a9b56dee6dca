//! Beam geometry: raw range and angle to across-track distance and depth.
//!
//! Planar ray tracing. The recorded sound speed and attitude are
//! trusted as-is; there is no refraction model and no re-weighting of
//! the raw samples. Axes are vessel-fixed: x forward, y starboard,
//! z down. Positive roll puts the starboard side down, positive pitch
//! the bow up, heave is positive up.
//!
//! The across-track sign contract for everything downstream: port is
//! negative, starboard positive. The decoders already normalized beam
//! angles to starboard-positive, so no sign handling happens here.

use nalgebra::{Rotation3, Vector3};

use crate::formats::{InstallationParams, PingNav, RawBeam};
use crate::model::SoundingRecord;

/// Derive one sounding per beam.
///
/// Invalid detections produce a sounding flagged invalid but are never
/// dropped, so beam counts and positions stay aligned with the ping.
pub fn extract_soundings(
    beams: &[RawBeam],
    sound_speed_mps: f32,
    nav: &PingNav,
    installation: &InstallationParams,
) -> Vec<SoundingRecord> {
    let attitude = Rotation3::from_euler_angles(
        (nav.roll_deg as f64).to_radians(),
        (nav.pitch_deg as f64).to_radians(),
        0.0,
    );
    let mount = Rotation3::from_euler_angles(
        (installation.rx_roll_deg as f64).to_radians(),
        (installation.rx_pitch_deg as f64).to_radians(),
        (installation.rx_heading_deg as f64).to_radians(),
    );
    let lever_arm = Vector3::new(
        installation.rx_x_m as f64,
        installation.rx_y_m as f64,
        installation.rx_z_m as f64,
    );

    beams
        .iter()
        .map(|beam| {
            let range_m = sound_speed_mps as f64 * beam.twtt_sec as f64 * 0.5;
            let theta = (beam.angle_deg as f64).to_radians();
            // Beam direction in the receive-array frame
            let direction = Vector3::new(0.0, theta.sin(), theta.cos());
            let in_vessel = lever_arm + mount * direction * range_m;
            let in_earth = attitude * in_vessel;

            SoundingRecord {
                across_m: in_earth.y as f32,
                depth_m: (in_earth.z - nav.heave_m as f64) as f32,
                backscatter_db: beam.backscatter_db,
                flags: beam.flags,
            }
        })
        .collect()
}
