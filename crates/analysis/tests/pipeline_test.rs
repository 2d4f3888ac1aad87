//! End-to-end pipeline tests over synthesized audio.
//!
//! Every scenario builds its PCM from scratch (silence, click tracks,
//! chords, ramps, a full EDM-style arrangement), so the suite runs
//! without any external audio and stays deterministic.

use std::f32::consts::PI;

use cratedigger_analysis::{
    rank_candidates, score_transition, AnalysisConfig, AnalyzeOptions, CueKind, PcmBuffer,
    SectionKind, SimilarityConfig, TrackAnalyzer,
};

const SAMPLE_RATE: u32 = 48_000;

fn analyze(pcm: &PcmBuffer, name: &str) -> cratedigger_analysis::TrackAnalysis {
    TrackAnalyzer::with_defaults()
        .analyze(pcm, &AnalyzeOptions::for_path(name))
        .unwrap()
}

fn sine(freq: f32, amplitude: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| amplitude * (2.0 * PI * freq * i as f32 / SAMPLE_RATE as f32).sin())
        .collect()
}

/// Unit impulse clicks every `interval` samples.
fn click_track(interval: usize, duration_secs: f64) -> PcmBuffer {
    let total = (duration_secs * SAMPLE_RATE as f64) as usize;
    let mut samples = vec![0.0f32; total];
    let mut pos = 0;
    while pos < total {
        samples[pos] = 1.0;
        pos += interval;
    }
    PcmBuffer::mono(samples, SAMPLE_RATE)
}

/// One beat of synthesized club audio: a short click transient over a
/// sustained bass tone, both scaled by `amplitude`.
fn fill_beat(samples: &mut [f32], amplitude: f32) {
    let click_len = (0.03 * SAMPLE_RATE as f32) as usize;
    for (i, sample) in samples.iter_mut().enumerate() {
        let t = i as f32 / SAMPLE_RATE as f32;
        let bass = 0.6 * (2.0 * PI * 60.0 * t).sin();
        let click = if i < click_len {
            0.4 * (2.0 * PI * 1000.0 * t).sin() * (1.0 - i as f32 / click_len as f32)
        } else {
            0.0
        };
        *sample = amplitude * (bass + click);
    }
}

/// EDM-style arrangement at ~128 BPM: per-beat amplitudes laid out in
/// 32-beat phrases. The beat length is an exact multiple of the analysis
/// hop sizes, and the track starts after a short silent lead-in so the
/// first onset is cleanly visible.
fn edm_track(phrase_amps: &[&[f32]]) -> PcmBuffer {
    let beat_len = 22_528; // 127.84 BPM at 48 kHz
    let lead_in = 2_560;
    let beats: Vec<f32> = phrase_amps
        .iter()
        .flat_map(|phrase| phrase.iter().cycle().take(32).copied().collect::<Vec<f32>>())
        .collect();

    let mut samples = vec![0.0f32; lead_in + beats.len() * beat_len];
    for (i, &amp) in beats.iter().enumerate() {
        let start = lead_in + i * beat_len;
        fill_beat(&mut samples[start..start + beat_len], amp);
    }
    PcmBuffer::mono(samples, SAMPLE_RATE)
}

/// Tempo range pinned around house tempos, used by the arrangement
/// scenarios to rule out half/double-tempo readings of the ~128 BPM grid.
fn club_config() -> AnalysisConfig {
    AnalysisConfig {
        tempo_floor_bpm: 100.0,
        tempo_ceil_bpm: 140.0,
        ..Default::default()
    }
}

#[test]
fn test_silence_scenario() {
    let pcm = PcmBuffer::mono(vec![0.0; SAMPLE_RATE as usize * 10], SAMPLE_RATE);
    let analysis = analyze(&pcm, "silence.wav");

    assert_eq!(analysis.loudness.integrated_lufs, -70.0);
    assert_eq!(analysis.loudness.true_peak_dbtp, -70.0);
    assert!(analysis.beatgrid.beats.is_empty());
    assert_eq!(analysis.beatgrid.tempo_map[0].bpm, 120.0);
    assert_eq!(analysis.energy.global, 1);
    assert!(analysis.sections.is_empty());
    assert!(analysis.cue_set.cues.is_empty());
    assert_eq!(analysis.beatgrid.confidence, 0.0);
    assert_eq!(analysis.key.confidence, 0.0);
    assert_eq!(analysis.section_confidence, 0.0);
}

#[test]
fn test_click_track_scenario() {
    // Unit impulses every 24000 samples: 120 BPM for 30 s.
    let analysis = analyze(&click_track(24_000, 30.0), "clicks.wav");

    let bpm = analysis.bpm();
    assert!((bpm - 120.0).abs() <= 1.0, "detected {bpm} BPM");
    let beats = &analysis.beatgrid.beats;
    assert!(
        (58..=62).contains(&beats.len()),
        "{} beats detected",
        beats.len()
    );
    for (i, beat) in beats.iter().enumerate() {
        assert_eq!(beat.index, i);
        assert_eq!(beat.is_downbeat, i % 4 == 0);
    }
    assert!(
        analysis.beatgrid.confidence >= 0.8,
        "confidence {}",
        analysis.beatgrid.confidence
    );
}

#[test]
fn test_a_minor_chord_scenario() {
    // A3 + C4 + E4 sustained for 10 s.
    let len = SAMPLE_RATE as usize * 10;
    let mut samples = sine(220.0, 0.3, len);
    for (sample, c) in samples.iter_mut().zip(sine(261.63, 0.3, len)) {
        *sample += c;
    }
    for (sample, e) in samples.iter_mut().zip(sine(329.63, 0.3, len)) {
        *sample += e;
    }
    let analysis = analyze(&PcmBuffer::mono(samples, SAMPLE_RATE), "am_chord.wav");

    assert_eq!(analysis.key.pitch_class, 9);
    assert!(analysis.key.is_minor);
    assert_eq!(analysis.key.camelot(), "8A");
    assert!(
        analysis.key.confidence >= 0.7,
        "confidence {}",
        analysis.key.confidence
    );
}

#[test]
fn test_energy_ramp_scenario() {
    // 100 Hz sine rising linearly from 0 to full scale over 60 s.
    let len = SAMPLE_RATE as usize * 60;
    let samples: Vec<f32> = (0..len)
        .map(|i| {
            (i as f32 / len as f32) * (2.0 * PI * 100.0 * i as f32 / SAMPLE_RATE as f32).sin()
        })
        .collect();
    let analysis = analyze(&PcmBuffer::mono(samples, SAMPLE_RATE), "ramp.wav");

    let curve = &analysis.energy.curve;
    assert!(!curve.is_empty());
    let reversals = curve
        .windows(2)
        .filter(|pair| pair[1] < pair[0] - 1e-4)
        .count();
    assert!(
        reversals <= curve.len() / 100,
        "{reversals} reversals in {} frames",
        curve.len()
    );
    assert!(analysis.energy.global >= 7, "grade {}", analysis.energy.global);
    assert!(analysis.energy.low > analysis.energy.high);
}

#[test]
fn test_edm_structure_scenario() {
    let quiet: &[f32] = &[0.12];
    let build: &[f32] = &[0.1, 0.1, 0.95, 0.95];
    let drop: &[f32] = &[0.95];
    let breakdown: &[f32] = &[0.25];
    // intro, build, drop x2, breakdown, drop x2, outro.
    let pcm = edm_track(&[quiet, build, drop, drop, breakdown, drop, drop, quiet]);

    let analyzer = TrackAnalyzer::new(club_config()).unwrap();
    let analysis = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("edm.wav"))
        .unwrap();

    assert!(
        (analysis.bpm() - 127.84).abs() <= 1.0,
        "bpm {}",
        analysis.bpm()
    );

    // The section sequence must contain intro, build, drop, breakdown,
    // drop, outro in order.
    let kinds: Vec<SectionKind> = analysis.sections.iter().map(|s| s.kind).collect();
    let expected = [
        SectionKind::Intro,
        SectionKind::Build,
        SectionKind::Drop,
        SectionKind::Breakdown,
        SectionKind::Drop,
        SectionKind::Outro,
    ];
    let mut cursor = 0;
    for kind in &kinds {
        if cursor < expected.len() && *kind == expected[cursor] {
            cursor += 1;
        }
    }
    assert_eq!(
        cursor,
        expected.len(),
        "section sequence {kinds:?} does not contain {expected:?}"
    );

    assert!(
        analysis.section_confidence >= 0.6,
        "section confidence {}",
        analysis.section_confidence
    );

    // Cue expectations.
    let cues = &analysis.cue_set.cues;
    assert_eq!(cues[0].kind, CueKind::Load);
    assert_eq!(cues[0].beat_index, 0);

    let drop_starts: Vec<usize> = analysis
        .sections
        .iter()
        .filter(|s| s.kind == SectionKind::Drop)
        .map(|s| s.start_beat)
        .collect();
    for start in &drop_starts {
        assert!(
            cues.iter()
                .any(|cue| cue.kind == CueKind::Drop && cue.beat_index.abs_diff(*start) <= 8),
            "no drop cue near beat {start}"
        );
    }
    assert!(cues.iter().any(|cue| cue.kind == CueKind::OutroStart));

    let outro_start = analysis
        .sections
        .iter()
        .find(|s| s.kind == SectionKind::Outro)
        .map(|s| s.start_beat)
        .unwrap();
    assert_eq!(analysis.cue_set.safe_end_beat, outro_start - 32);
}

#[test]
fn test_inter_sample_peak_scenario() {
    // Pairs of +0.98 / -0.98 samples for one second: the reconstructed
    // quarter-rate waveform peaks well above the stored samples. (The
    // every-sample alternation variant is covered below; see DESIGN.md
    // on why it cannot overshoot.)
    let samples: Vec<f32> = (0..SAMPLE_RATE as usize)
        .map(|i| if (i / 2) % 2 == 0 { 0.98 } else { -0.98 })
        .collect();
    let analysis = analyze(&PcmBuffer::mono(samples, SAMPLE_RATE), "peaks.wav");

    assert!(
        (analysis.loudness.sample_peak_dbfs - (-0.175)).abs() < 0.01,
        "sample peak {}",
        analysis.loudness.sample_peak_dbfs
    );
    assert!(analysis.loudness.true_peak_dbtp > analysis.loudness.sample_peak_dbfs);
}

#[test]
fn test_nyquist_alternation_peak_scenario() {
    // Strict every-sample +0.98 / -0.98 alternation is a pure Nyquist
    // tone; its bandlimited reconstruction peaks exactly at the samples,
    // so the true peak matches the sample peak instead of exceeding it.
    let samples: Vec<f32> = (0..SAMPLE_RATE as usize)
        .map(|i| if i % 2 == 0 { 0.98 } else { -0.98 })
        .collect();
    let analysis = analyze(&PcmBuffer::mono(samples, SAMPLE_RATE), "nyquist.wav");

    assert!(
        (analysis.loudness.sample_peak_dbfs - (-0.175)).abs() < 0.01,
        "sample peak {}",
        analysis.loudness.sample_peak_dbfs
    );
    assert!(
        (analysis.loudness.true_peak_dbtp - analysis.loudness.sample_peak_dbfs).abs() < 0.05,
        "true peak {} vs sample peak {}",
        analysis.loudness.true_peak_dbtp,
        analysis.loudness.sample_peak_dbfs
    );
    assert!(analysis.loudness.true_peak_dbtp >= analysis.loudness.sample_peak_dbfs);
}

#[test]
fn test_universal_invariants_on_arranged_track() {
    let quiet: &[f32] = &[0.12];
    let drop: &[f32] = &[0.95];
    let breakdown: &[f32] = &[0.25];
    let pcm = edm_track(&[quiet, drop, drop, breakdown, drop, quiet]);
    let analyzer = TrackAnalyzer::new(club_config()).unwrap();
    let analysis = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("invariants.wav"))
        .unwrap();
    let config = analyzer.config();

    // Beats: strictly increasing, contiguous indices, downbeats every 4.
    let beats = &analysis.beatgrid.beats;
    assert!(!beats.is_empty());
    for (i, beat) in beats.iter().enumerate() {
        assert_eq!(beat.index, i);
        assert_eq!(beat.is_downbeat, i % 4 == 0);
    }
    for pair in beats.windows(2) {
        let interval = pair[1].time_seconds - pair[0].time_seconds;
        assert!(pair[1].time_seconds > pair[0].time_seconds);
        assert!(interval >= 60.0 / config.tempo_ceil_bpm * (1.0 - 5e-3));
        assert!(interval <= 60.0 / config.tempo_floor_bpm * (1.0 + 5e-3));
    }
    let bpm = analysis.beatgrid.tempo_map[0].bpm;
    assert!(bpm >= config.tempo_floor_bpm && bpm <= config.tempo_ceil_bpm);

    // Sections tile the beat range without overlap.
    assert_eq!(analysis.sections.first().unwrap().start_beat, 0);
    assert_eq!(analysis.sections.last().unwrap().end_beat, beats.len());
    for pair in analysis.sections.windows(2) {
        assert_eq!(pair[0].end_beat, pair[1].start_beat);
    }
    for section in &analysis.sections {
        assert!(section.end_beat > section.start_beat);
        assert!((0.0..=1.0).contains(&section.confidence));
    }

    // Cues: bounded, sorted, load cue present.
    let cues = &analysis.cue_set.cues;
    assert!(cues.len() <= config.max_cues);
    for pair in cues.windows(2) {
        assert!(pair[0].beat_index < pair[1].beat_index);
    }
    assert!(cues.iter().any(|c| c.kind == CueKind::Load && c.beat_index == 0));

    // Safe bounds ordered and in range.
    let last_beat = beats.last().unwrap().index;
    assert!(analysis.cue_set.safe_start_beat <= analysis.cue_set.safe_end_beat);
    assert!(analysis.cue_set.safe_end_beat <= last_beat);

    // Waveform: full bin count, bounded values.
    assert_eq!(analysis.waveform.peaks.len(), config.waveform_bins);
    assert!(analysis
        .waveform
        .peaks
        .iter()
        .all(|&p| (0.0..=1.0).contains(&p)));

    // Embedding: configured length, self-similarity identities.
    assert_eq!(analysis.embedding.vector.len(), config.embedding_dim);
    assert!((analysis.embedding.cosine_similarity(&analysis.embedding) - 1.0).abs() < 1e-5);

    // Loudness orderings.
    assert!(analysis.loudness.short_term_max >= analysis.loudness.integrated_lufs);
    assert!(analysis.loudness.integrated_lufs >= -70.0);
    assert!(analysis.loudness.sample_peak_dbfs <= analysis.loudness.true_peak_dbtp);
    assert!(analysis.loudness.loudness_range_lu >= 0.0);

    // Confidences all in [0, 1].
    assert!((0.0..=1.0).contains(&analysis.beatgrid.confidence));
    assert!((0.0..=1.0).contains(&analysis.key.confidence));
    assert!((0.0..=1.0).contains(&analysis.section_confidence));
}

#[test]
fn test_similarity_of_identical_tracks() {
    let drop: &[f32] = &[0.95];
    let quiet: &[f32] = &[0.12];
    let pcm = edm_track(&[quiet, drop, drop, quiet]);
    let analyzer = TrackAnalyzer::new(club_config()).unwrap();
    let a = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("a.wav"))
        .unwrap();
    let b = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("b.wav"))
        .unwrap();

    let score = score_transition(&a, &b, &SimilarityConfig::default());
    assert!(score.score > 0.95, "score {}", score.score);
    assert!((score.vibe - 1.0).abs() < 1e-5);
    assert_eq!(score.tempo, 1.0);
    assert_eq!(score.key, 1.0);
    assert_eq!(score.energy, 1.0);
    assert!(score.explanation.contains("tempo match"));
    assert!(score.explanation.contains("(same)"));
    assert!(score.explanation.contains("same energy"));
    assert!(score.explanation.starts_with("similar vibe (100%)"));
}

#[test]
fn test_similarity_uses_external_embedding_when_configured() {
    let drop: &[f32] = &[0.95];
    let quiet: &[f32] = &[0.12];
    let pcm = edm_track(&[quiet, drop, drop, quiet]);
    let analyzer = TrackAnalyzer::new(club_config()).unwrap();
    let mut a = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("a.wav"))
        .unwrap();
    let mut b = analyzer
        .analyze(&pcm, &AnalyzeOptions::for_path("b.wav"))
        .unwrap();

    // Orthogonal external embeddings drive the vibe term to zero even
    // though the internal embeddings are identical.
    let mut va = vec![0.0f32; 512];
    let mut vb = vec![0.0f32; 512];
    va[0] = 1.0;
    vb[1] = 1.0;
    a.external_embedding_512d = Some(va);
    b.external_embedding_512d = Some(vb);

    let config = SimilarityConfig {
        use_external_embedding: true,
    };
    let score = score_transition(&a, &b, &config);
    assert!(score.vibe.abs() < 1e-6);

    let internal = score_transition(&a, &b, &SimilarityConfig::default());
    assert!((internal.vibe - 1.0).abs() < 1e-5);
}

#[test]
fn test_candidate_ranking_prefers_similar_material() {
    let drop: &[f32] = &[0.95];
    let quiet: &[f32] = &[0.12];
    let analyzer = TrackAnalyzer::new(club_config()).unwrap();

    let current = analyzer
        .analyze(
            &edm_track(&[quiet, drop, drop, quiet]),
            &AnalyzeOptions::for_path("current.wav"),
        )
        .unwrap();
    // Candidate 0: the same material. Candidate 1: a sustained chord
    // with no beat structure at all.
    let twin = analyzer
        .analyze(
            &edm_track(&[quiet, drop, drop, quiet]),
            &AnalyzeOptions::for_path("twin.wav"),
        )
        .unwrap();
    let len = SAMPLE_RATE as usize * 70;
    let chord = analyzer
        .analyze(
            &PcmBuffer::mono(sine(329.63, 0.4, len), SAMPLE_RATE),
            &AnalyzeOptions::for_path("chord.wav"),
        )
        .unwrap();

    let ranked = rank_candidates(&current, &[chord, twin], &SimilarityConfig::default());
    assert_eq!(ranked.len(), 2);
    // The twin (index 1 in the pool) must rank first.
    assert_eq!(ranked[0].0, 1);
    assert!(ranked[0].1.score > ranked[1].1.score);
}

#[test]
fn test_schema_round_trip() {
    let pcm = click_track(24_000, 10.0);
    let analysis = analyze(&pcm, "schema.wav");

    let json = serde_json::to_value(&analysis).unwrap();
    for field in [
        "track_id",
        "source_path",
        "duration_seconds",
        "sample_rate",
        "beatgrid",
        "key",
        "energy",
        "loudness",
        "sections",
        "transition_windows",
        "section_confidence",
        "cue_set",
        "waveform",
        "embedding",
        "analyzed_at",
        "algorithm_version",
    ] {
        assert!(json.get(field).is_some(), "missing field {field}");
    }
    assert!(json["beatgrid"].get("tempo_map").is_some());
    assert!(json["loudness"].get("integrated_lufs").is_some());
    assert!(json["loudness"].get("true_peak_dbtp").is_some());
    assert!(json["cue_set"].get("safe_start_beat").is_some());
    // Unpopulated extensibility slots stay out of the serialized form.
    assert!(json.get("external_embedding_512d").is_none());

    let back: cratedigger_analysis::TrackAnalysis =
        serde_json::from_value(json).unwrap();
    assert_eq!(back.track_id, analysis.track_id);
    assert_eq!(back.bpm(), analysis.bpm());
    assert_eq!(back.embedding.vector, analysis.embedding.vector);
}
