//! Tempo estimation and beat grid generation.
//!
//! Onset evidence comes from the spectral flux of the shared STFT
//! front-end; the tempo is the autocorrelation lag with the strongest
//! self-similarity, and beats are laid out on a fixed grid anchored at
//! the first confident onset peak.

use crate::config::AnalysisConfig;
use crate::spectral::{spectral_flux, Spectrogram};
use crate::types::{BeatMarker, Beatgrid, TempoNode};

/// BPM reported when the track carries no usable onset evidence.
const FALLBACK_BPM: f64 = 120.0;

/// Detect the tempo and beat grid from a beatgrid-resolution spectrogram.
///
/// Degenerate inputs (too short, silent, too few onsets) produce the
/// documented defaults (120 BPM, no beats, confidence 0) and never an
/// error.
pub fn detect_beatgrid(spectrogram: &Spectrogram, config: &AnalysisConfig) -> Beatgrid {
    let onset = spectral_flux(spectrogram);
    let frame_rate = spectrogram.frame_rate();

    let lag_min = ((60.0 * frame_rate / config.tempo_ceil_bpm).floor() as usize).max(1);
    let lag_max = (60.0 * frame_rate / config.tempo_floor_bpm).ceil() as usize;

    if lag_max >= onset.len() {
        log::warn!(
            "track too short for tempo detection ({} onset frames, need > {})",
            onset.len(),
            lag_max
        );
        return fallback_grid();
    }

    let Some((lag, correlation)) = best_autocorrelation_lag(&onset, lag_min, lag_max) else {
        return fallback_grid();
    };
    if correlation <= 1e-10 {
        log::warn!("no onset energy found, defaulting to {FALLBACK_BPM} BPM");
        return fallback_grid();
    }

    let bpm = (60.0 * frame_rate / lag as f64)
        .clamp(config.tempo_floor_bpm, config.tempo_ceil_bpm);
    log::debug!("autocorrelation lag {lag} frames -> {bpm:.2} BPM");

    let peaks = pick_onset_peaks(&onset, lag);
    let confidence = grid_confidence(&peaks, lag);

    let beats = match peaks.first() {
        Some(&first_peak) => lay_out_beats(first_peak, lag, onset.len(), spectrogram),
        None => Vec::new(),
    };

    Beatgrid {
        tempo_map: vec![TempoNode { beat_index: 0, bpm }],
        beats,
        confidence,
    }
}

fn fallback_grid() -> Beatgrid {
    Beatgrid {
        tempo_map: vec![TempoNode {
            beat_index: 0,
            bpm: FALLBACK_BPM,
        }],
        beats: Vec::new(),
        confidence: 0.0,
    }
}

/// Mean-of-products autocorrelation over the candidate lag range.
fn best_autocorrelation_lag(onset: &[f32], lag_min: usize, lag_max: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for lag in lag_min..=lag_max {
        if lag >= onset.len() {
            break;
        }
        let n = onset.len() - lag;
        let sum: f64 = (0..n)
            .map(|i| onset[i] as f64 * onset[i + lag] as f64)
            .sum();
        let mean = sum / n as f64;
        if best.map_or(true, |(_, value)| mean > value) {
            best = Some((lag, mean));
        }
    }
    best
}

/// Adaptive peak picking over the onset envelope.
///
/// A frame is a peak when it clears `mean + 0.5·std` and is strictly
/// greater than every other value within `max(3, lag/4)` frames. Peaks
/// closer than `lag/2` collapse to the higher one.
fn pick_onset_peaks(onset: &[f32], lag: usize) -> Vec<usize> {
    if onset.is_empty() {
        return Vec::new();
    }
    let mean = onset.iter().sum::<f32>() / onset.len() as f32;
    let variance =
        onset.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / onset.len() as f32;
    let threshold = mean + 0.5 * variance.sqrt();
    let half_width = (lag / 4).max(3);

    let mut peaks: Vec<usize> = Vec::new();
    for i in 0..onset.len() {
        if onset[i] < threshold {
            continue;
        }
        let lo = i.saturating_sub(half_width);
        let hi = (i + half_width + 1).min(onset.len());
        let is_local_max = (lo..hi).all(|j| j == i || onset[i] > onset[j]);
        if !is_local_max {
            continue;
        }
        match peaks.last() {
            Some(&prev) if i - prev < lag / 2 => {
                if onset[i] > onset[prev] {
                    *peaks.last_mut().unwrap() = i;
                }
            }
            _ => peaks.push(i),
        }
    }
    peaks
}

/// Fixed-spacing beat markers from the anchor frame to the end of the
/// track. Downbeats land every 4th marker.
fn lay_out_beats(
    first_frame: usize,
    lag: usize,
    frame_count: usize,
    spectrogram: &Spectrogram,
) -> Vec<BeatMarker> {
    let seconds_per_frame = spectrogram.hop_size as f64 / spectrogram.sample_rate as f64;
    let mut beats = Vec::new();
    let mut frame = first_frame;
    let mut index = 0;
    while frame < frame_count {
        beats.push(BeatMarker {
            index,
            time_seconds: frame as f64 * seconds_per_frame,
            is_downbeat: index % 4 == 0,
        });
        frame += lag;
        index += 1;
    }
    beats
}

/// Confidence from how evenly the surviving onset peaks are spaced
/// relative to the detected lag. Needs at least 3 peaks.
fn grid_confidence(peaks: &[usize], lag: usize) -> f32 {
    if peaks.len() < 3 || lag == 0 {
        return 0.0;
    }
    let deviations: f64 = peaks
        .windows(2)
        .map(|pair| ((pair[1] - pair[0]) as f64 - lag as f64).abs())
        .sum();
    let mean_deviation = deviations / (peaks.len() - 1) as f64 / lag as f64;
    (1.0 - 2.0 * mean_deviation).clamp(0.0, 1.0) as f32
}
