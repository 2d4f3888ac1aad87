//! Cratedigger analysis engine
//!
//! Offline audio analysis for DJ library preparation. Feed it a decoded
//! mono PCM buffer and it produces a single immutable [`TrackAnalysis`]
//! record:
//!
//! - Tempo map and beat grid with downbeats and confidence
//! - Musical key with standard, Camelot and Open-Key names
//! - Global and banded energy profile with a 1-10 grade
//! - EBU R128 loudness (integrated, short-term, momentary, LRA, true peak)
//! - Structural sections (intro / verse / build / drop / breakdown /
//!   outro) with transition windows
//! - Prioritized beat-aligned cue points and safe-play bounds
//! - Downsampled waveform overview with 3-band coloring
//! - Deterministic 128-D feature embedding for similarity search
//!
//! Decoding lives outside this crate (see `cratedigger-decode`); the
//! engine is pure CPU, performs no I/O and yields bit-identical results
//! for identical input and configuration.
//!
//! ```no_run
//! use cratedigger_analysis::{AnalyzeOptions, PcmBuffer, TrackAnalyzer};
//!
//! let pcm = PcmBuffer::mono(vec![0.0; 48_000 * 60], 48_000);
//! let analyzer = TrackAnalyzer::with_defaults();
//! let analysis = analyzer.analyze(&pcm, &AnalyzeOptions::for_path("track.flac"))?;
//! println!("{:.1} BPM, key {}", analysis.bpm(), analysis.key.camelot());
//! # Ok::<(), cratedigger_analysis::AnalysisError>(())
//! ```

pub mod analyzer;
pub mod beatgrid;
pub mod config;
pub mod cue;
pub mod embedding;
pub mod energy;
pub mod error;
pub mod key;
pub mod loudness;
pub mod section;
pub mod similarity;
pub mod spectral;
pub mod types;
pub mod waveform;

// Re-export the main types.
pub use analyzer::{AnalyzeOptions, CancelToken, ProgressEvent, TrackAnalyzer};
pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use similarity::{
    rank_candidates, score_transition, KeyRelation, SimilarityConfig, SimilarityScore,
};
pub use types::{
    AudioEmbedding, BandLevels, BeatMarker, Beatgrid, CueColor, CueKind, CuePoint, CueSet,
    EnergyProfile, LoudnessSummary, MusicalKey, PcmBuffer, Section, SectionKind, TempoNode,
    TrackAnalysis, TransitionWindow, WaveformSummary,
};
