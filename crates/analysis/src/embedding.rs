//! Deterministic feature embedding.
//!
//! The vector packs banded spectral statistics (mean, deviation, delta,
//! delta-delta) into a fixed number of dimensions; the scalar descriptors
//! feed the similarity scorer's auxiliary terms. No learned weights are
//! involved, so the same PCM always produces the same embedding.

use crate::config::AnalysisConfig;
use crate::spectral::{db_to_linear, spectral_flux, Spectrogram};
use crate::types::AudioEmbedding;

/// Cumulative-energy threshold for the spectral rolloff.
const ROLLOFF_THRESHOLD: f32 = 0.85;

/// Auxiliary similarity scale for the spectral centroid, in Hz.
const CENTROID_SIM_SCALE: f32 = 4000.0;
/// Auxiliary similarity scale for the zero-crossing rate.
const ZCR_SIM_SCALE: f32 = 0.2;

/// Build the embedding from the mono samples and the energy-resolution
/// spectrogram.
pub fn generate_embedding(
    samples: &[f32],
    spectrogram: &Spectrogram,
    config: &AnalysisConfig,
) -> AudioEmbedding {
    let linear_frames: Vec<Vec<f32>> = spectrogram
        .frames
        .iter()
        .map(|frame| frame.iter().map(|db| db_to_linear(*db)).collect())
        .collect();

    let (spectral_centroid_hz, spectral_rolloff_hz) =
        centroid_and_rolloff(&linear_frames, spectrogram);
    let spectral_flatness = mean_flatness(&linear_frames);
    let harmonic_ratio = mean_harmonic_ratio(&linear_frames);
    let zero_crossing_rate = zero_crossing_rate(samples);
    let tempo_stability = tempo_stability(&spectral_flux(spectrogram));

    let vector = banded_statistics(&linear_frames, config.embedding_dim);

    AudioEmbedding {
        vector,
        spectral_centroid_hz,
        spectral_rolloff_hz,
        zero_crossing_rate,
        spectral_flatness,
        tempo_stability,
        harmonic_ratio,
    }
}

fn centroid_and_rolloff(frames: &[Vec<f32>], spectrogram: &Spectrogram) -> (f32, f32) {
    let mut centroid_sum = 0.0f64;
    let mut rolloff_sum = 0.0f64;
    let mut contributing = 0usize;

    for frame in frames {
        let total: f32 = frame.iter().sum();
        if total <= 1e-6 {
            continue;
        }
        let weighted: f32 = frame
            .iter()
            .enumerate()
            .map(|(bin, mag)| spectrogram.bin_frequency(bin) * mag)
            .sum();
        centroid_sum += (weighted / total) as f64;

        let mut cumulative = 0.0f32;
        for (bin, mag) in frame.iter().enumerate() {
            cumulative += mag;
            if cumulative >= ROLLOFF_THRESHOLD * total {
                rolloff_sum += spectrogram.bin_frequency(bin) as f64;
                break;
            }
        }
        contributing += 1;
    }

    if contributing == 0 {
        return (0.0, 0.0);
    }
    (
        (centroid_sum / contributing as f64) as f32,
        (rolloff_sum / contributing as f64) as f32,
    )
}

/// Geometric over arithmetic mean of the linear magnitudes, averaged
/// across frames.
fn mean_flatness(frames: &[Vec<f32>]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for frame in frames {
        let arithmetic = frame.iter().sum::<f32>() / frame.len().max(1) as f32;
        if arithmetic <= 1e-10 {
            continue;
        }
        let log_mean = frame
            .iter()
            .map(|mag| mag.max(1e-10).ln() as f64)
            .sum::<f64>()
            / frame.len() as f64;
        let geometric = log_mean.exp() as f32;
        sum += (geometric / arithmetic).clamp(0.0, 1.0) as f64;
    }
    (sum / frames.len() as f64) as f32
}

/// Energy in strict local-maximum bins over total energy, averaged
/// across frames.
fn mean_harmonic_ratio(frames: &[Vec<f32>]) -> f32 {
    if frames.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for frame in frames {
        let total: f32 = frame.iter().sum();
        if total <= 1e-10 || frame.len() < 3 {
            continue;
        }
        let peak_energy: f32 = (1..frame.len() - 1)
            .filter(|&bin| frame[bin] > frame[bin - 1] && frame[bin] > frame[bin + 1])
            .map(|bin| frame[bin])
            .sum();
        sum += (peak_energy / total).clamp(0.0, 1.0) as f64;
    }
    (sum / frames.len() as f64) as f32
}

/// Fraction of adjacent sample pairs that change sign.
fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] > 0.0) != (pair[1] > 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// One minus the coefficient of variation of the onset envelope.
fn tempo_stability(flux: &[f32]) -> f32 {
    if flux.len() < 2 {
        return 0.0;
    }
    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    if mean <= 1e-10 {
        return 0.0;
    }
    let variance = flux.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>() / flux.len() as f32;
    (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0)
}

/// Banded mean/std/delta/delta-delta statistics, each quartile
/// max-normalized, concatenated and sized to `dim`.
fn banded_statistics(frames: &[Vec<f32>], dim: usize) -> Vec<f32> {
    let bands = (dim / 4).max(1);
    let mut means = vec![0.0f32; bands];
    let mut stds = vec![0.0f32; bands];
    let mut deltas = vec![0.0f32; bands];
    let mut delta_deltas = vec![0.0f32; bands];

    if let Some(first) = frames.first() {
        let band_width = (first.len() / bands).max(1);

        for (band, (mean_slot, (std_slot, (delta_slot, dd_slot)))) in means
            .iter_mut()
            .zip(stds.iter_mut().zip(deltas.iter_mut().zip(delta_deltas.iter_mut())))
            .enumerate()
        {
            let lo = band * band_width;
            // Per-frame mean magnitude inside the band.
            let series: Vec<f32> = frames
                .iter()
                .map(|frame| {
                    let hi = (lo + band_width).min(frame.len());
                    if lo >= hi {
                        return 0.0;
                    }
                    frame[lo..hi].iter().sum::<f32>() / (hi - lo) as f32
                })
                .collect();

            let mean = series.iter().sum::<f32>() / series.len().max(1) as f32;
            let variance = series.iter().map(|x| (x - mean) * (x - mean)).sum::<f32>()
                / series.len().max(1) as f32;
            *mean_slot = mean;
            *std_slot = variance.sqrt();

            if series.len() >= 3 {
                *delta_slot = series
                    .windows(3)
                    .map(|w| (w[2] - w[0]).abs() / 2.0)
                    .sum::<f32>()
                    / (series.len() - 2) as f32;
            }
            if series.len() >= 5 {
                *dd_slot = (0..series.len() - 4)
                    .map(|t| (series[t + 4] - 2.0 * series[t + 2] + series[t]).abs())
                    .sum::<f32>()
                    / (series.len() - 4) as f32;
            }
        }
    }

    let mut vector = Vec::with_capacity(bands * 4);
    for quartile in [means, stds, deltas, delta_deltas] {
        let max = quartile.iter().cloned().fold(0.0f32, f32::max);
        if max > 1e-10 {
            vector.extend(quartile.iter().map(|v| v / max));
        } else {
            vector.extend(quartile.iter().map(|_| 0.0));
        }
    }

    vector.resize(dim, 0.0);
    vector
}

impl AudioEmbedding {
    /// Cosine similarity of the feature vectors. 0 when either vector is
    /// all zeros.
    pub fn cosine_similarity(&self, other: &AudioEmbedding) -> f32 {
        let dot: f32 = self
            .vector
            .iter()
            .zip(other.vector.iter())
            .map(|(a, b)| a * b)
            .sum();
        let norm_a: f32 = self.vector.iter().map(|a| a * a).sum::<f32>().sqrt();
        let norm_b: f32 = other.vector.iter().map(|b| b * b).sum::<f32>().sqrt();
        if norm_a <= 1e-10 || norm_b <= 1e-10 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }

    /// Blended "vibe" similarity: cosine plus scalar-descriptor
    /// proximity terms.
    pub fn vibe_similarity(&self, other: &AudioEmbedding) -> f32 {
        let aux = |delta: f32, scale: f32| 1.0 - (delta.abs() / scale).clamp(0.0, 1.0);
        0.50 * self.cosine_similarity(other)
            + 0.15 * aux(
                self.spectral_centroid_hz - other.spectral_centroid_hz,
                CENTROID_SIM_SCALE,
            )
            + 0.15 * aux(self.spectral_flatness - other.spectral_flatness, 1.0)
            + 0.10 * aux(self.harmonic_ratio - other.harmonic_ratio, 1.0)
            + 0.10 * aux(
                self.zero_crossing_rate - other.zero_crossing_rate,
                ZCR_SIM_SCALE,
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spectral::SpectralProcessor;

    fn embed(samples: &[f32]) -> AudioEmbedding {
        let config = AnalysisConfig::default();
        let mut processor = SpectralProcessor::new(config.fft_size_main).unwrap();
        let spec = processor
            .stft(samples, config.hop_size_energy, config.sample_rate_hz)
            .unwrap();
        generate_embedding(samples, &spec, &config)
    }

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / 48_000.0).sin())
            .collect()
    }

    /// Deterministic white-ish noise from a tiny LCG.
    fn noise(len: usize) -> Vec<f32> {
        let mut state = 0x2545_f491u32;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 8) as f32 / 8_388_608.0 - 1.0
            })
            .collect()
    }

    #[test]
    fn test_vector_has_configured_length() {
        let embedding = embed(&sine(440.0, 48_000 * 2));
        assert_eq!(embedding.vector.len(), 128);
        assert!(embedding.vector.iter().all(|v| v.is_finite()));
        assert!(embedding.vector.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_cosine_identities() {
        let embedding = embed(&sine(440.0, 48_000 * 2));
        assert!((embedding.cosine_similarity(&embedding) - 1.0).abs() < 1e-5);

        let zero = AudioEmbedding {
            vector: vec![0.0; 128],
            spectral_centroid_hz: 0.0,
            spectral_rolloff_hz: 0.0,
            zero_crossing_rate: 0.0,
            spectral_flatness: 0.0,
            tempo_stability: 0.0,
            harmonic_ratio: 0.0,
        };
        assert_eq!(embedding.cosine_similarity(&zero), 0.0);
        assert_eq!(zero.cosine_similarity(&zero), 0.0);
    }

    #[test]
    fn test_vibe_similarity_is_symmetric() {
        let a = embed(&sine(440.0, 48_000 * 2));
        let b = embed(&noise(48_000 * 2));
        assert!((a.vibe_similarity(&b) - b.vibe_similarity(&a)).abs() < 1e-6);
        assert!((a.vibe_similarity(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_centroid_of_pure_tone() {
        let embedding = embed(&sine(1000.0, 48_000 * 2));
        // Leakage skews the average upward a little.
        assert!(
            (500.0..2500.0).contains(&embedding.spectral_centroid_hz),
            "centroid {}",
            embedding.spectral_centroid_hz
        );
        assert!(embedding.spectral_rolloff_hz >= 900.0);
    }

    #[test]
    fn test_zero_crossing_rate_of_tone() {
        let embedding = embed(&sine(1000.0, 48_000 * 2));
        // A 1 kHz sine crosses zero 2000 times per second.
        assert!(
            (embedding.zero_crossing_rate - 2000.0 / 48_000.0).abs() < 0.005,
            "zcr {}",
            embedding.zero_crossing_rate
        );
    }

    #[test]
    fn test_flatness_separates_tone_from_noise() {
        let tone = embed(&sine(1000.0, 48_000 * 2));
        let noisy = embed(&noise(48_000 * 2));
        assert!(tone.spectral_flatness < noisy.spectral_flatness);
        assert!(noisy.spectral_flatness > 0.2);
        assert!((0.0..=1.0).contains(&tone.spectral_flatness));
    }

    #[test]
    fn test_silence_descriptors() {
        let embedding = embed(&vec![0.0f32; 48_000 * 2]);
        assert_eq!(embedding.spectral_centroid_hz, 0.0);
        assert_eq!(embedding.zero_crossing_rate, 0.0);
        assert_eq!(embedding.tempo_stability, 0.0);
        assert!(embedding.vector.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_similar_signals_have_high_vibe() {
        let a = embed(&sine(440.0, 48_000 * 2));
        let b = embed(&sine(441.0, 48_000 * 2));
        assert!(a.vibe_similarity(&b) > 0.9);
        let c = embed(&noise(48_000 * 2));
        assert!(a.vibe_similarity(&b) > a.vibe_similarity(&c));
    }
}
