//! Analysis configuration.

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

/// Configuration for a full track analysis run.
///
/// The defaults are tuned for club music at 48 kHz and match the values
/// used by the individual analyzers' documentation. All parameters are
/// validated eagerly by [`AnalysisConfig::validate`]; a `TrackAnalyzer`
/// refuses to build from an invalid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Expected PCM sample rate in Hz.
    pub sample_rate_hz: u32,
    /// FFT size for beatgrid, energy and embedding analysis.
    pub fft_size_main: usize,
    /// FFT size for key detection and section analysis.
    pub fft_size_key_section: usize,
    /// Hop size for the beatgrid onset envelope.
    pub hop_size_beatgrid: usize,
    /// Hop size for energy and embedding spectrograms.
    pub hop_size_energy: usize,
    /// Hop size for key and section spectrograms.
    pub hop_size_key_section: usize,
    /// Minimum BPM to detect.
    pub tempo_floor_bpm: f64,
    /// Maximum BPM to detect.
    pub tempo_ceil_bpm: f64,
    /// Minimum length of a structural section, in beats.
    pub min_section_beats: usize,
    /// Phrase length in beats; section boundaries are tested at phrase
    /// multiples.
    pub phrase_beats: usize,
    /// Minimum beat-energy jump for a section boundary to be accepted.
    pub section_change_threshold: f32,
    /// Beat-energy variance below which a quiet section counts as a
    /// breakdown rather than a verse.
    pub breakdown_variance_threshold: f32,
    /// Maximum number of cue points to emit.
    pub max_cues: usize,
    /// Minimum spacing between cue points, in beats.
    pub downbeat_snap_tolerance_beats: usize,
    /// Length of the feature embedding vector.
    pub embedding_dim: usize,
    /// Number of bins in the waveform summary.
    pub waveform_bins: usize,
    /// Absolute gate for integrated loudness, in LUFS.
    pub loudness_absolute_gate_lufs: f64,
    /// Relative gate below the ungated mean, in LU.
    pub loudness_relative_gate_lu: f64,
    /// Oversampling factor for true-peak estimation.
    pub true_peak_oversample: usize,
    /// Lower percentile for the loudness range.
    pub lra_low_percentile: f64,
    /// Upper percentile for the loudness range.
    pub lra_high_percentile: f64,
    /// Run the independent analyzers on a rayon pool with a fixed join
    /// tree. Stage ordering of progress events is preserved either way.
    pub parallel: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 48_000,
            fft_size_main: 2048,
            fft_size_key_section: 4096,
            hop_size_beatgrid: 512,
            hop_size_energy: 1024,
            hop_size_key_section: 2048,
            tempo_floor_bpm: 60.0,
            tempo_ceil_bpm: 180.0,
            min_section_beats: 16,
            phrase_beats: 32,
            section_change_threshold: 0.15,
            breakdown_variance_threshold: 0.05,
            max_cues: 8,
            downbeat_snap_tolerance_beats: 8,
            embedding_dim: 128,
            waveform_bins: 200,
            loudness_absolute_gate_lufs: -70.0,
            loudness_relative_gate_lu: -10.0,
            true_peak_oversample: 4,
            lra_low_percentile: 0.10,
            lra_high_percentile: 0.95,
            parallel: false,
        }
    }
}

impl AnalysisConfig {
    /// Check every parameter and reject the configuration before any DSP
    /// runs.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate_hz == 0 {
            return Err(AnalysisError::InvalidParameter(
                "sample_rate_hz must be positive".to_string(),
            ));
        }
        for (name, size) in [
            ("fft_size_main", self.fft_size_main),
            ("fft_size_key_section", self.fft_size_key_section),
        ] {
            if size < 2 || !size.is_power_of_two() {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{name} must be a power of two, got {size}"
                )));
            }
        }
        for (name, hop) in [
            ("hop_size_beatgrid", self.hop_size_beatgrid),
            ("hop_size_energy", self.hop_size_energy),
            ("hop_size_key_section", self.hop_size_key_section),
        ] {
            if hop == 0 {
                return Err(AnalysisError::InvalidParameter(format!(
                    "{name} must be positive"
                )));
            }
        }
        if self.tempo_floor_bpm <= 0.0 || self.tempo_floor_bpm >= self.tempo_ceil_bpm {
            return Err(AnalysisError::InvalidParameter(format!(
                "tempo bounds inverted: floor {} ceil {}",
                self.tempo_floor_bpm, self.tempo_ceil_bpm
            )));
        }
        if self.min_section_beats == 0 || self.phrase_beats == 0 {
            return Err(AnalysisError::InvalidParameter(
                "section and phrase lengths must be positive".to_string(),
            ));
        }
        if self.embedding_dim == 0 || self.embedding_dim % 4 != 0 {
            return Err(AnalysisError::InvalidParameter(format!(
                "embedding_dim must be a positive multiple of 4, got {}",
                self.embedding_dim
            )));
        }
        if self.waveform_bins == 0 {
            return Err(AnalysisError::InvalidParameter(
                "waveform_bins must be positive".to_string(),
            ));
        }
        if self.true_peak_oversample < 2 {
            return Err(AnalysisError::InvalidParameter(
                "true_peak_oversample must be at least 2".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.lra_low_percentile)
            || !(0.0..=1.0).contains(&self.lra_high_percentile)
            || self.lra_low_percentile >= self.lra_high_percentile
        {
            return Err(AnalysisError::InvalidParameter(format!(
                "LRA percentiles inverted: low {} high {}",
                self.lra_low_percentile, self.lra_high_percentile
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(AnalysisConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_fft() {
        let config = AnalysisConfig {
            fft_size_main: 1000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(AnalysisError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_rejects_zero_hop() {
        let config = AnalysisConfig {
            hop_size_energy: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_tempo_bounds() {
        let config = AnalysisConfig {
            tempo_floor_bpm: 180.0,
            tempo_ceil_bpm: 60.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_lra_percentiles() {
        let config = AnalysisConfig {
            lra_low_percentile: 0.95,
            lra_high_percentile: 0.10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_misaligned_embedding_dim() {
        let config = AnalysisConfig {
            embedding_dim: 130,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
