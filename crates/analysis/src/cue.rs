//! Cue point generation.
//!
//! Section boundaries become beat-aligned cues, snapped to downbeats and
//! trimmed to the cue budget by a fixed priority order; the safe-play
//! bounds mark where a DJ can hand the track over without clipping the
//! intro or outro.

use crate::config::AnalysisConfig;
use crate::types::{BeatMarker, CueKind, CuePoint, CueSet, Section, SectionKind};

/// Beats held back before the outro when computing the safe end bound.
const OUTRO_SAFETY_BEATS: usize = 32;

/// Generate the prioritized cue set for a track.
pub fn generate_cues(
    beats: &[BeatMarker],
    sections: &[Section],
    config: &AnalysisConfig,
) -> CueSet {
    let Some(last_beat) = beats.last().map(|beat| beat.index) else {
        return CueSet {
            cues: Vec::new(),
            safe_start_beat: 0,
            safe_end_beat: 0,
        };
    };

    let mut cues: Vec<CuePoint> = vec![make_cue(CueKind::Load, 0, beats)];

    for section in sections {
        let kind = match section.kind {
            SectionKind::Intro => CueKind::IntroStart,
            SectionKind::Verse => CueKind::Marker,
            SectionKind::Build => CueKind::Build,
            SectionKind::Drop => CueKind::Drop,
            SectionKind::Breakdown => CueKind::Breakdown,
            SectionKind::Outro => CueKind::OutroStart,
        };
        try_add_cue(&mut cues, kind, section.start_beat, last_beat, beats, config);

        // Intro and outro get end markers too.
        let end_kind = match section.kind {
            SectionKind::Intro => Some(CueKind::IntroEnd),
            SectionKind::Outro => Some(CueKind::OutroEnd),
            _ => None,
        };
        if let Some(end_kind) = end_kind {
            try_add_cue(&mut cues, end_kind, section.end_beat, last_beat, beats, config);
        }
    }

    sort_by_beat(&mut cues);

    if cues.len() > config.max_cues {
        cues.sort_by_key(|cue| (cue.kind.priority(), cue.beat_index));
        cues.truncate(config.max_cues);
        sort_by_beat(&mut cues);
    }

    let (safe_start_beat, safe_end_beat) = safe_bounds(sections, last_beat);

    CueSet {
        cues,
        safe_start_beat,
        safe_end_beat,
    }
}

fn sort_by_beat(cues: &mut [CuePoint]) {
    cues.sort_by_key(|cue| cue.beat_index);
}

/// Snap to the nearest earlier downbeat, add unless another cue already
/// sits within the proximity tolerance.
fn try_add_cue(
    cues: &mut Vec<CuePoint>,
    kind: CueKind,
    beat: usize,
    last_beat: usize,
    beats: &[BeatMarker],
    config: &AnalysisConfig,
) {
    let snapped = snap_to_downbeat(beat.min(last_beat));
    let tolerance = config.downbeat_snap_tolerance_beats;
    let crowded = cues
        .iter()
        .any(|cue| cue.beat_index.abs_diff(snapped) < tolerance);
    if !crowded {
        cues.push(make_cue(kind, snapped, beats));
    }
}

/// Floor to a multiple of 4 beats.
fn snap_to_downbeat(beat: usize) -> usize {
    beat - beat % 4
}

fn make_cue(kind: CueKind, beat_index: usize, beats: &[BeatMarker]) -> CuePoint {
    CuePoint {
        kind,
        beat_index,
        time_seconds: beats[beat_index].time_seconds,
        label: kind.label().to_string(),
        color: kind.color(),
    }
}

/// Safe-play bounds: after the intro, and a phrase before the outro.
fn safe_bounds(sections: &[Section], last_beat: usize) -> (usize, usize) {
    let safe_start = sections
        .iter()
        .find(|s| s.kind == SectionKind::Intro)
        .map_or(0, |s| s.end_beat.min(last_beat));
    let safe_end = sections
        .iter()
        .find(|s| s.kind == SectionKind::Outro)
        .map_or(last_beat, |s| {
            s.start_beat.saturating_sub(OUTRO_SAFETY_BEATS)
        });
    // A short track can put the outro backoff before the intro end; keep
    // the bounds ordered.
    if safe_start > safe_end {
        (safe_end, safe_end)
    } else {
        (safe_start, safe_end)
    }
}
