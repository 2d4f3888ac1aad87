//! Energy profiling.
//!
//! Produces loudness-like descriptors (RMS, peak, crest factor), a
//! low/mid/high spectral balance, a smoothed per-frame energy curve and
//! the 1-10 energy grade used for set planning.

use crate::spectral::{db_to_linear, Spectrogram};
use crate::types::EnergyProfile;

/// Upper bound of the low band in Hz (bass, kick drums).
pub const LOW_BAND_HZ: f32 = 250.0;
/// Upper bound of the mid band in Hz (vocals, instruments).
pub const MID_BAND_HZ: f32 = 4000.0;

/// Radius of the centered moving average applied to the energy curve.
const CURVE_SMOOTHING_RADIUS: usize = 5;

/// Compute the energy profile from the mono samples and the
/// energy-resolution spectrogram.
pub fn analyze_energy(samples: &[f32], spectrogram: &Spectrogram) -> EnergyProfile {
    let rms = if samples.is_empty() {
        0.0
    } else {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    };
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

    let (low, mid, high, raw_curve) = band_energies(spectrogram);
    let curve = smooth_curve(&normalize_curve(raw_curve));

    let dynamic_range_db = if peak > 0.0 {
        20.0 * (peak / rms.max(1e-10)).log10()
    } else {
        0.0
    };

    let global = energy_grade(rms, low, mid, high);

    EnergyProfile {
        global,
        curve,
        rms,
        peak,
        dynamic_range_db,
        low,
        mid,
        high,
    }
}

/// Per-band fractions (summing to 1) and the raw per-frame energy curve.
fn band_energies(spectrogram: &Spectrogram) -> (f32, f32, f32, Vec<f32>) {
    let bin_count = spectrogram.bin_count().max(1);
    let mut low_sum = 0.0f64;
    let mut mid_sum = 0.0f64;
    let mut high_sum = 0.0f64;
    let mut curve = Vec::with_capacity(spectrogram.frames.len());

    for frame in &spectrogram.frames {
        let mut frame_total = 0.0f64;
        for (bin, db) in frame.iter().enumerate() {
            let magnitude = db_to_linear(*db) as f64;
            frame_total += magnitude;
            let hz = spectrogram.bin_frequency(bin);
            if hz < LOW_BAND_HZ {
                low_sum += magnitude;
            } else if hz < MID_BAND_HZ {
                mid_sum += magnitude;
            } else {
                high_sum += magnitude;
            }
        }
        curve.push((frame_total / bin_count as f64) as f32);
    }

    // Noise at the dB floor still accumulates tiny magnitudes; treat
    // anything at that level as silence.
    let frames = spectrogram.frames.len().max(1) as f64;
    let silence_floor = 1e-9 * bin_count as f64;
    let total = low_sum + mid_sum + high_sum;
    if total / frames <= silence_floor {
        return (1.0 / 3.0, 1.0 / 3.0, 1.0 / 3.0, curve);
    }
    (
        (low_sum / total) as f32,
        (mid_sum / total) as f32,
        (high_sum / total) as f32,
        curve,
    )
}

fn normalize_curve(mut curve: Vec<f32>) -> Vec<f32> {
    let max = curve.iter().cloned().fold(0.0f32, f32::max);
    if max > 1e-9 {
        for value in &mut curve {
            *value /= max;
        }
    } else {
        for value in &mut curve {
            *value = 0.0;
        }
    }
    curve
}

/// Centered moving average over roughly 10 frames.
fn smooth_curve(curve: &[f32]) -> Vec<f32> {
    if curve.is_empty() {
        return Vec::new();
    }
    (0..curve.len())
        .map(|i| {
            let lo = i.saturating_sub(CURVE_SMOOTHING_RADIUS);
            let hi = (i + CURVE_SMOOTHING_RADIUS + 1).min(curve.len());
            curve[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
        })
        .collect()
}

/// Map the descriptors onto the 1-10 grade. Pure silence is pinned to 1.
fn energy_grade(rms: f32, low: f32, mid: f32, high: f32) -> u8 {
    if rms <= 1e-10 {
        return 1;
    }
    let score = 0.4 * (5.0 * rms).min(1.0) + 0.35 * low + 0.15 * mid + 0.1 * high;
    let grade = (9.0 * score).round() as i32 + 1;
    grade.clamp(1, 10) as u8
}
