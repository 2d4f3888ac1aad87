//! Structural segmentation.
//!
//! Beat-aligned energy jumps at phrase boundaries become section
//! boundaries; sections are then labeled from their mean energy, energy
//! variance and position in the track.

use crate::config::AnalysisConfig;
use crate::spectral::{db_to_linear, Spectrogram};
use crate::types::{BeatMarker, Section, SectionKind, TransitionWindow};

/// Number of beats averaged on each side of a candidate boundary.
const BOUNDARY_CONTEXT_BEATS: usize = 8;

/// Longest transition window carved from an intro or outro, in seconds.
const MAX_TRANSITION_WINDOW_SECS: f64 = 16.0;

/// Sections plus the derived mix-in/mix-out windows.
#[derive(Debug, Clone, Default)]
pub struct SectionAnalysis {
    /// Labeled sections tiling the beat range.
    pub sections: Vec<Section>,
    /// Mix-friendly windows (intro tail, outro head, breakdowns).
    pub transition_windows: Vec<TransitionWindow>,
    /// Overall segmentation confidence (0.0-1.0).
    pub confidence: f32,
}

/// Partition the track into labeled sections.
///
/// Needs at least one full section worth of beats; anything shorter
/// (including beatless tracks) yields an empty analysis.
pub fn detect_sections(
    beats: &[BeatMarker],
    spectrogram: &Spectrogram,
    duration_seconds: f64,
    config: &AnalysisConfig,
) -> SectionAnalysis {
    if beats.len() < config.min_section_beats || spectrogram.frames.is_empty() {
        return SectionAnalysis::default();
    }

    let beat_energy = beat_energies(beats, spectrogram);
    let boundaries = find_boundaries(&beat_energy, config);

    let total_beats = beats.len();
    let mut sections = Vec::with_capacity(boundaries.len() - 1);
    for (i, pair) in boundaries.windows(2).enumerate() {
        let (start_beat, end_beat) = (pair[0], pair[1]);
        let slice = &beat_energy[start_beat..end_beat];
        let mean = slice.iter().sum::<f32>() / slice.len() as f32;
        let variance =
            slice.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / slice.len() as f32;

        let is_first = i == 0;
        let is_last = i == boundaries.len() - 2;
        let midpoint = (start_beat + end_beat) as f32 / 2.0 / total_beats as f32;
        let kind = classify(mean, variance, midpoint, is_first, is_last, config);

        let start_time = beats[start_beat].time_seconds;
        let end_time = if end_beat < total_beats {
            beats[end_beat].time_seconds
        } else {
            duration_seconds
        };

        log::debug!(
            "section {kind} beats {start_beat}..{end_beat} (mean {mean:.2}, var {variance:.3})"
        );

        sections.push(Section {
            kind,
            start_time,
            end_time,
            start_beat,
            end_beat,
            confidence: (0.7 + 0.3 * variance).clamp(0.0, 1.0),
        });
    }

    let transition_windows = transition_windows(&sections);
    let confidence = overall_confidence(&sections);

    SectionAnalysis {
        sections,
        transition_windows,
        confidence,
    }
}

/// Max-normalized energy of the spectrogram frame containing each beat.
fn beat_energies(beats: &[BeatMarker], spectrogram: &Spectrogram) -> Vec<f32> {
    let bin_count = spectrogram.bin_count().max(1);
    let frame_energy: Vec<f32> = spectrogram
        .frames
        .iter()
        .map(|frame| frame.iter().map(|db| db_to_linear(*db)).sum::<f32>() / bin_count as f32)
        .collect();
    let max = frame_energy.iter().cloned().fold(0.0f32, f32::max);

    beats
        .iter()
        .map(|beat| {
            let frame = spectrogram
                .frame_at_time(beat.time_seconds)
                .min(frame_energy.len() - 1);
            if max > 1e-9 {
                frame_energy[frame] / max
            } else {
                0.0
            }
        })
        .collect()
}

/// Boundary discovery: phrase-aligned beats where the mean energy of the
/// surrounding context jumps by more than the configured threshold.
fn find_boundaries(beat_energy: &[f32], config: &AnalysisConfig) -> Vec<usize> {
    let total = beat_energy.len();
    let mut boundaries = vec![0];

    let mut beat = config.min_section_beats;
    while beat + BOUNDARY_CONTEXT_BEATS <= total {
        if beat % config.phrase_beats == 0 && beat >= BOUNDARY_CONTEXT_BEATS {
            let before = &beat_energy[beat - BOUNDARY_CONTEXT_BEATS..beat];
            let after = &beat_energy[beat..beat + BOUNDARY_CONTEXT_BEATS];
            let before_mean = before.iter().sum::<f32>() / before.len() as f32;
            let after_mean = after.iter().sum::<f32>() / after.len() as f32;

            let last = *boundaries.last().unwrap();
            if (after_mean - before_mean).abs() > config.section_change_threshold
                && beat - last >= config.min_section_beats
            {
                boundaries.push(beat);
            }
        }
        beat += config.min_section_beats;
    }

    boundaries.push(total);
    boundaries
}

/// Rule-based section labeling.
fn classify(
    mean: f32,
    variance: f32,
    midpoint: f32,
    is_first: bool,
    is_last: bool,
    config: &AnalysisConfig,
) -> SectionKind {
    if is_first && midpoint < 0.10 {
        return SectionKind::Intro;
    }
    if is_last && midpoint > 0.85 {
        return SectionKind::Outro;
    }
    if mean > 0.75 {
        return SectionKind::Drop;
    }
    if mean < 0.35 {
        return if variance < config.breakdown_variance_threshold {
            SectionKind::Breakdown
        } else {
            SectionKind::Verse
        };
    }
    if mean > 0.5 && variance > 0.1 {
        return SectionKind::Build;
    }
    SectionKind::Verse
}

/// Mix windows: the tail of the intro, the head of the outro and every
/// breakdown in full.
fn transition_windows(sections: &[Section]) -> Vec<TransitionWindow> {
    let mut windows = Vec::new();
    for section in sections {
        let span = section.duration_seconds();
        match section.kind {
            SectionKind::Intro => {
                let length = MAX_TRANSITION_WINDOW_SECS.min(span / 2.0);
                windows.push(TransitionWindow {
                    start_time: section.end_time - length,
                    end_time: section.end_time,
                });
            }
            SectionKind::Outro => {
                let length = MAX_TRANSITION_WINDOW_SECS.min(span / 2.0);
                windows.push(TransitionWindow {
                    start_time: section.start_time,
                    end_time: section.start_time + length,
                });
            }
            SectionKind::Breakdown => {
                windows.push(TransitionWindow {
                    start_time: section.start_time,
                    end_time: section.end_time,
                });
            }
            _ => {}
        }
    }
    windows
}

/// Half structural completeness, half mean per-section confidence.
fn overall_confidence(sections: &[Section]) -> f32 {
    if sections.is_empty() {
        return 0.0;
    }
    let has = |kind: SectionKind| sections.iter().any(|s| s.kind == kind);
    let mut structure = 0.0f32;
    if has(SectionKind::Intro) {
        structure += 0.25;
    }
    if has(SectionKind::Outro) {
        structure += 0.25;
    }
    if has(SectionKind::Drop) {
        structure += 0.25;
    }
    if sections.len() >= 3 {
        structure += 0.25;
    }
    let mean_confidence =
        sections.iter().map(|s| s.confidence).sum::<f32>() / sections.len() as f32;
    0.5 * structure + 0.5 * mean_confidence
}
