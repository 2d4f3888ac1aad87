//! Analysis orchestration.
//!
//! Sequences the analyzers over a shared PCM buffer, reuses spectrograms
//! between stages with matching FFT parameters, reports progress at
//! stage boundaries and assembles the final [`TrackAnalysis`] record.
//! Cancellation and the soft timeout are honored between stages; a
//! running stage is never interrupted, so per-stage latency stays
//! bounded by the PCM length.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::beatgrid::detect_beatgrid;
use crate::config::AnalysisConfig;
use crate::cue::generate_cues;
use crate::embedding::generate_embedding;
use crate::energy::analyze_energy;
use crate::error::{AnalysisError, Result};
use crate::key::detect_key;
use crate::loudness::analyze_loudness;
use crate::section::{detect_sections, SectionAnalysis};
use crate::spectral::{chroma_features, SpectralProcessor};
use crate::types::{PcmBuffer, TrackAnalysis, ALGORITHM_VERSION};
use crate::waveform::summarize_waveform;

/// Progress notifications, emitted in stage order.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ProgressEvent {
    Decoding,
    Beatgrid { progress: f32 },
    Key,
    Energy,
    Loudness,
    Sections,
    Cues,
    Waveform,
    Embedding,
    Complete,
}

/// Cooperative cancellation flag, checked at stage boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; takes effect at the next stage boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Source path recorded in the analysis record and its identifier.
    pub source_path: String,
    /// Cancellation token shared with the caller.
    pub cancel: CancelToken,
    /// Soft timeout for the whole run, checked between stages.
    pub soft_timeout: Option<Duration>,
}

impl AnalyzeOptions {
    pub fn for_path(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            ..Self::default()
        }
    }
}

/// The analysis pipeline.
pub struct TrackAnalyzer {
    config: AnalysisConfig,
}

impl TrackAnalyzer {
    /// Build an analyzer, validating the configuration eagerly.
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Analyzer with the default configuration.
    pub fn with_defaults() -> Self {
        Self {
            config: AnalysisConfig::default(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a track without progress reporting.
    pub fn analyze(&self, pcm: &PcmBuffer, options: &AnalyzeOptions) -> Result<TrackAnalysis> {
        self.analyze_with_progress(pcm, options, |_| {})
    }

    /// Analyze a track, invoking `on_progress` at each stage boundary.
    pub fn analyze_with_progress<F>(
        &self,
        pcm: &PcmBuffer,
        options: &AnalyzeOptions,
        mut on_progress: F,
    ) -> Result<TrackAnalysis>
    where
        F: FnMut(ProgressEvent),
    {
        let started = Instant::now();
        let config = &self.config;

        on_progress(ProgressEvent::Decoding);
        let frame_count = pcm.frame_count();
        let required = config.sample_rate_hz as usize;
        if frame_count < required {
            return Err(AnalysisError::InsufficientData {
                samples: frame_count,
                required,
            });
        }
        let mono = pcm.mono_samples();
        let samples: &[f32] = &mono;
        let sample_rate = pcm.sample_rate;
        let duration_seconds = pcm.duration_seconds();

        log::info!(
            "analyzing {} ({:.1} s at {} Hz)",
            options.source_path,
            duration_seconds,
            sample_rate
        );

        self.checkpoint(options, started)?;

        // Shared spectral front-end. Stages with matching FFT and hop
        // parameters reuse the same spectrogram.
        let mut main_processor = SpectralProcessor::new(config.fft_size_main)?;
        let beat_spectrogram =
            main_processor.stft(samples, config.hop_size_beatgrid, sample_rate)?;
        let energy_spectrogram =
            main_processor.stft(samples, config.hop_size_energy, sample_rate)?;
        let mut wide_processor = SpectralProcessor::new(config.fft_size_key_section)?;
        let section_spectrogram =
            wide_processor.stft(samples, config.hop_size_key_section, sample_rate)?;

        self.checkpoint(options, started)?;

        on_progress(ProgressEvent::Beatgrid { progress: 0.0 });
        let (beatgrid, key, energy, loudness, embedding) = if config.parallel {
            // Fixed join tree: every run reduces in the same order.
            let (beatgrid, (key, ((energy, loudness), embedding))) = rayon::join(
                || detect_beatgrid(&beat_spectrogram, config),
                || {
                    rayon::join(
                        || detect_key(&chroma_features(&section_spectrogram)),
                        || {
                            rayon::join(
                                || {
                                    rayon::join(
                                        || analyze_energy(samples, &energy_spectrogram),
                                        || analyze_loudness(samples, sample_rate, config),
                                    )
                                },
                                || generate_embedding(samples, &energy_spectrogram, config),
                            )
                        },
                    )
                },
            );
            (beatgrid, key, energy, loudness, embedding)
        } else {
            let beatgrid = detect_beatgrid(&beat_spectrogram, config);
            self.checkpoint(options, started)?;
            let key = detect_key(&chroma_features(&section_spectrogram));
            self.checkpoint(options, started)?;
            let energy = analyze_energy(samples, &energy_spectrogram);
            self.checkpoint(options, started)?;
            let loudness = analyze_loudness(samples, sample_rate, config);
            self.checkpoint(options, started)?;
            let embedding = generate_embedding(samples, &energy_spectrogram, config);
            (beatgrid, key, energy, loudness, embedding)
        };
        on_progress(ProgressEvent::Beatgrid { progress: 1.0 });
        on_progress(ProgressEvent::Key);
        on_progress(ProgressEvent::Energy);
        on_progress(ProgressEvent::Loudness);

        self.checkpoint(options, started)?;

        let SectionAnalysis {
            sections,
            transition_windows,
            confidence: section_confidence,
        } = detect_sections(
            &beatgrid.beats,
            &section_spectrogram,
            duration_seconds,
            config,
        );
        on_progress(ProgressEvent::Sections);
        self.checkpoint(options, started)?;

        let cue_set = generate_cues(&beatgrid.beats, &sections, config);
        on_progress(ProgressEvent::Cues);
        self.checkpoint(options, started)?;

        let waveform = summarize_waveform(samples, sample_rate, config);
        on_progress(ProgressEvent::Waveform);
        self.checkpoint(options, started)?;

        on_progress(ProgressEvent::Embedding);

        let track_id = content_id(samples, sample_rate, &options.source_path);
        let analysis = TrackAnalysis {
            track_id,
            source_path: options.source_path.clone(),
            duration_seconds,
            sample_rate,
            beatgrid,
            key,
            energy,
            loudness,
            sections,
            transition_windows,
            section_confidence,
            cue_set,
            waveform,
            embedding,
            analyzed_at: Utc::now(),
            algorithm_version: ALGORITHM_VERSION.to_string(),
            external_embedding_512d: None,
            sound_classification: None,
            custom_section_labels: None,
        };

        on_progress(ProgressEvent::Complete);
        log::info!(
            "analysis complete: {:.1} BPM, key {}, energy {}",
            analysis.bpm(),
            analysis.key.name(),
            analysis.energy.global
        );
        Ok(analysis)
    }

    fn checkpoint(&self, options: &AnalyzeOptions, started: Instant) -> Result<()> {
        if options.cancel.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        if let Some(timeout) = options.soft_timeout {
            if started.elapsed() > timeout {
                return Err(AnalysisError::Timeout);
            }
        }
        Ok(())
    }
}

/// FNV-1a content hash over the sample bits and sample rate, combined
/// with the source path.
fn content_id(samples: &[f32], sample_rate: u32, source_path: &str) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET;
    let mut feed = |byte: u8| {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    };
    for byte in sample_rate.to_le_bytes() {
        feed(byte);
    }
    for sample in samples {
        for byte in sample.to_bits().to_le_bytes() {
            feed(byte);
        }
    }
    format!("{hash:016x}:{source_path}")
}
