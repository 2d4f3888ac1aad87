//! Core data model for track analysis results.
//!
//! Everything here is plain serializable data. The analyzers own their
//! working buffers while they run; once the orchestrator assembles a
//! [`TrackAnalysis`] the record is immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Version tag stamped onto every analysis record.
pub const ALGORITHM_VERSION: &str = "1.0";

/// Decoded PCM audio handed to the engine by an external decoder.
///
/// Samples are interleaved `f32` normalized to [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcmBuffer {
    /// Interleaved samples.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
}

impl PcmBuffer {
    /// Wrap an already-monaural sample buffer.
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
            channels: 1,
        }
    }

    /// Number of sample frames (samples per channel).
    pub fn frame_count(&self) -> usize {
        if self.channels <= 1 {
            self.samples.len()
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    /// Track duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    /// Channel-averaged monaural samples.
    ///
    /// Borrows when the buffer is already mono, so the common path does
    /// not copy.
    pub fn mono_samples(&self) -> std::borrow::Cow<'_, [f32]> {
        if self.channels <= 1 {
            return std::borrow::Cow::Borrowed(&self.samples);
        }
        let channels = self.channels as usize;
        let mono: Vec<f32> = self
            .samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        std::borrow::Cow::Owned(mono)
    }
}

/// A single marker in the beat grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatMarker {
    /// 0-based, monotonically increasing beat index.
    pub index: usize,
    /// Position of the beat in seconds. Strictly increasing.
    pub time_seconds: f64,
    /// First beat of a bar. Every 4th marker in 4/4.
    pub is_downbeat: bool,
}

/// A tempo anchor. For a static tempo a single node at beat 0 suffices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoNode {
    /// Beat index this node takes effect at.
    pub beat_index: usize,
    /// Tempo in beats per minute.
    pub bpm: f64,
}

/// Beat grid analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Beatgrid {
    /// Tempo map; index 0 holds the global estimate.
    pub tempo_map: Vec<TempoNode>,
    /// Beat markers, strictly increasing in time.
    pub beats: Vec<BeatMarker>,
    /// Detection confidence (0.0-1.0).
    pub confidence: f32,
}

impl Beatgrid {
    /// The global BPM estimate.
    pub fn bpm(&self) -> f64 {
        self.tempo_map.first().map_or(0.0, |node| node.bpm)
    }

    /// Beat interval in seconds at the global tempo.
    pub fn beat_interval_seconds(&self) -> f64 {
        60.0 / self.bpm()
    }

    /// Index of the last beat, if any.
    pub fn last_beat_index(&self) -> Option<usize> {
        self.beats.last().map(|beat| beat.index)
    }

    /// Time of the beat nearest to the given position.
    pub fn nearest_beat_time(&self, position_seconds: f64) -> Option<f64> {
        self.beats
            .iter()
            .min_by(|a, b| {
                let da = (a.time_seconds - position_seconds).abs();
                let db = (b.time_seconds - position_seconds).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|beat| beat.time_seconds)
    }
}

/// Detected musical key.
///
/// `pitch_class` is 0-based with 0 = C. Name derivations (standard,
/// Camelot, Open-Key) live in the `key` module.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MusicalKey {
    /// Pitch class of the tonic, 0..=11 with 0 = C.
    pub pitch_class: u8,
    /// Minor mode flag.
    pub is_minor: bool,
    /// Detection confidence (0.0-1.0).
    pub confidence: f32,
}

/// Loudness-like descriptors and the 1-10 energy grade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnergyProfile {
    /// Overall energy grade, 1 (ambient) to 10 (peak-time).
    pub global: u8,
    /// Smoothed per-frame energy curve, normalized to [0, 1].
    pub curve: Vec<f32>,
    /// Root-mean-square amplitude of the full signal.
    pub rms: f32,
    /// Maximum absolute amplitude.
    pub peak: f32,
    /// Crest factor in dB.
    pub dynamic_range_db: f32,
    /// Fraction of spectral energy below 250 Hz.
    pub low: f32,
    /// Fraction of spectral energy between 250 Hz and 4 kHz.
    pub mid: f32,
    /// Fraction of spectral energy above 4 kHz.
    pub high: f32,
}

/// EBU R128 loudness statistics.
///
/// -70 LUFS is the silence sentinel throughout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoudnessSummary {
    /// Double-gated integrated loudness in LUFS.
    pub integrated_lufs: f64,
    /// Loudness range in LU.
    pub loudness_range_lu: f64,
    /// Maximum short-term (3 s) loudness in LUFS.
    pub short_term_max: f64,
    /// Maximum momentary (400 ms) loudness in LUFS.
    pub momentary_max: f64,
    /// Oversampled true peak in dBTP.
    pub true_peak_dbtp: f64,
    /// Sample peak in dBFS.
    pub sample_peak_dbfs: f64,
}

/// Structural section kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Intro,
    Verse,
    Build,
    Drop,
    Breakdown,
    Outro,
}

impl SectionKind {
    /// Lowercase label used in logs and cue names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Verse => "verse",
            Self::Build => "build",
            Self::Drop => "drop",
            Self::Breakdown => "breakdown",
            Self::Outro => "outro",
        }
    }
}

impl std::fmt::Display for SectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A labeled structural section. Sections tile the beat range of the
/// track without overlap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Structural label.
    pub kind: SectionKind,
    /// Start time in seconds.
    pub start_time: f64,
    /// End time in seconds.
    pub end_time: f64,
    /// First beat of the section (inclusive).
    pub start_beat: usize,
    /// Last beat of the section (exclusive).
    pub end_beat: usize,
    /// Classification confidence (0.0-1.0).
    pub confidence: f32,
}

impl Section {
    /// Section length in beats.
    pub fn beat_len(&self) -> usize {
        self.end_beat.saturating_sub(self.start_beat)
    }

    /// Section duration in seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// A time range considered acceptable for mixing in or out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransitionWindow {
    /// Window start in seconds.
    pub start_time: f64,
    /// Window end in seconds.
    pub end_time: f64,
}

/// Cue point kinds, ordered roughly by where they land in a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CueKind {
    Load,
    IntroStart,
    IntroEnd,
    Build,
    Drop,
    Breakdown,
    OutroStart,
    OutroEnd,
    Marker,
}

impl CueKind {
    /// Priority used when trimming to the cue budget. Lower keeps first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::Load => 0,
            Self::Drop => 1,
            Self::IntroStart | Self::OutroStart => 2,
            Self::Build => 3,
            Self::Breakdown => 4,
            Self::IntroEnd | Self::OutroEnd => 5,
            Self::Marker => 6,
        }
    }

    /// Default label for cues of this kind.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Load => "Load",
            Self::IntroStart => "Intro Start",
            Self::IntroEnd => "Intro End",
            Self::Build => "Build",
            Self::Drop => "Drop",
            Self::Breakdown => "Breakdown",
            Self::OutroStart => "Outro Start",
            Self::OutroEnd => "Outro End",
            Self::Marker => "Marker",
        }
    }

    /// Fixed palette color for this kind.
    pub fn color(&self) -> CueColor {
        match self {
            Self::Load => CueColor::Green,
            Self::IntroStart | Self::IntroEnd => CueColor::Blue,
            Self::Build => CueColor::Yellow,
            Self::Drop => CueColor::Red,
            Self::Breakdown => CueColor::Purple,
            Self::OutroStart | Self::OutroEnd => CueColor::Orange,
            Self::Marker => CueColor::Cyan,
        }
    }
}

/// Fixed cue color palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CueColor {
    Green,
    Blue,
    Yellow,
    Red,
    Purple,
    Orange,
    Cyan,
}

impl CueColor {
    /// RGB value for display surfaces.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::Green => (0, 255, 0),
            Self::Blue => (0, 64, 255),
            Self::Yellow => (255, 224, 0),
            Self::Red => (255, 0, 0),
            Self::Purple => (160, 0, 255),
            Self::Orange => (255, 128, 0),
            Self::Cyan => (0, 224, 255),
        }
    }
}

/// A beat-aligned cue point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuePoint {
    /// Cue kind.
    pub kind: CueKind,
    /// Beat index the cue is anchored to.
    pub beat_index: usize,
    /// Time of the anchor beat in seconds.
    pub time_seconds: f64,
    /// Display label.
    pub label: String,
    /// Palette color mapped from the kind.
    pub color: CueColor,
}

/// Generated cue set plus the safe-play bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CueSet {
    /// Cue points sorted by beat index.
    pub cues: Vec<CuePoint>,
    /// First beat considered safe for playback handoff.
    pub safe_start_beat: usize,
    /// Last beat considered safe for playback handoff.
    pub safe_end_beat: usize,
}

/// Deterministic feature embedding plus scalar descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioEmbedding {
    /// Feature vector of length `embedding_dim`.
    pub vector: Vec<f32>,
    /// Amplitude-weighted mean frequency in Hz.
    pub spectral_centroid_hz: f32,
    /// Frequency below which 85% of spectral energy sits, in Hz.
    pub spectral_rolloff_hz: f32,
    /// Fraction of adjacent sample pairs that change sign.
    pub zero_crossing_rate: f32,
    /// Geometric/arithmetic spectral mean ratio (0.0-1.0).
    pub spectral_flatness: f32,
    /// Regularity of the onset envelope (0.0-1.0).
    pub tempo_stability: f32,
    /// Fraction of spectral energy in local peak bins (0.0-1.0).
    pub harmonic_ratio: f32,
}

/// 3-band energy fractions for one waveform bin.
///
/// - Low: below 250 Hz (bass, kick drums)
/// - Mid: 250 Hz - 4 kHz (vocals, instruments)
/// - High: above 4 kHz (hi-hats, cymbals)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BandLevels {
    /// Low band fraction (0.0-1.0).
    pub low: f32,
    /// Mid band fraction (0.0-1.0).
    pub mid: f32,
    /// High band fraction (0.0-1.0).
    pub high: f32,
}

/// Downsampled waveform overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveformSummary {
    /// Peak absolute amplitude per bin (0.0-1.0 for bounded PCM).
    pub peaks: Vec<f32>,
    /// Band fractions per bin, parallel to `peaks`.
    pub bands: Vec<BandLevels>,
    /// Number of bins.
    pub bin_count: usize,
    /// Duration covered, in seconds.
    pub duration_seconds: f64,
}

/// The complete, immutable analysis artifact for one track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackAnalysis {
    /// Content hash of the PCM combined with the source path.
    pub track_id: String,
    /// Source path as supplied by the caller.
    pub source_path: String,
    /// Track duration in seconds.
    pub duration_seconds: f64,
    /// Sample rate the analysis ran at.
    pub sample_rate: u32,
    /// Tempo map and beat markers.
    pub beatgrid: Beatgrid,
    /// Musical key estimate.
    pub key: MusicalKey,
    /// Energy descriptors.
    pub energy: EnergyProfile,
    /// EBU R128 loudness statistics.
    pub loudness: LoudnessSummary,
    /// Structural sections, tiling the beat range.
    pub sections: Vec<Section>,
    /// Mix-friendly windows derived from the sections.
    pub transition_windows: Vec<TransitionWindow>,
    /// Overall section-detection confidence (0.0-1.0).
    pub section_confidence: f32,
    /// Prioritized beat-aligned cues and safe-play bounds.
    pub cue_set: CueSet,
    /// Downsampled waveform overview.
    pub waveform: WaveformSummary,
    /// Deterministic feature embedding.
    pub embedding: AudioEmbedding,
    /// When the analysis was performed.
    pub analyzed_at: DateTime<Utc>,
    /// Version of the analysis algorithms.
    pub algorithm_version: String,
    /// Slot for an externally computed perceptual embedding. Never read
    /// by the core; the similarity scorer may consume it when configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_embedding_512d: Option<Vec<f32>>,
    /// Slot for external sound-class tags. Opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound_classification: Option<Vec<String>>,
    /// Slot for external section labels. Opaque to the core.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_section_labels: Option<Vec<String>>,
}

impl TrackAnalysis {
    /// The global BPM estimate.
    pub fn bpm(&self) -> f64 {
        self.beatgrid.bpm()
    }
}
