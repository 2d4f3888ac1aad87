//! Waveform overview generation.
//!
//! The track is reduced to a fixed number of bins; each bin carries the
//! peak absolute amplitude plus relative low/mid/high energy so display
//! surfaces can draw colored overviews without touching the PCM.

use crate::config::AnalysisConfig;
use crate::energy::{LOW_BAND_HZ, MID_BAND_HZ};
use crate::spectral::{db_to_linear, SpectralProcessor};
use crate::types::{BandLevels, WaveformSummary};

/// Summarize the PCM into `waveform_bins` peak/band bins.
///
/// Empty PCM yields an empty summary; the final partial bin is absorbed
/// into its neighbor.
pub fn summarize_waveform(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalysisConfig,
) -> WaveformSummary {
    if samples.is_empty() {
        return WaveformSummary {
            peaks: Vec::new(),
            bands: Vec::new(),
            bin_count: 0,
            duration_seconds: 0.0,
        };
    }

    let bins = config.waveform_bins;
    let mut processor = SpectralProcessor::new(config.fft_size_main).ok();

    let mut peaks = Vec::with_capacity(bins);
    let mut bands = Vec::with_capacity(bins);
    let mut padded = vec![0.0f32; config.fft_size_main];

    for bin in 0..bins {
        let start = bin * samples.len() / bins;
        let end = ((bin + 1) * samples.len() / bins).max(start + 1).min(samples.len());

        let peak = samples[start..end]
            .iter()
            .map(|s| s.abs())
            .fold(0.0f32, f32::max);
        peaks.push(peak);

        let levels = match processor.as_mut() {
            Some(processor) => {
                bin_band_levels(samples, (start + end) / 2, sample_rate, processor, &mut padded)
            }
            None => BandLevels::default(),
        };
        bands.push(levels);
    }

    WaveformSummary {
        peaks,
        bands,
        bin_count: bins,
        duration_seconds: samples.len() as f64 / sample_rate as f64,
    }
}

/// Relative band energies around the center of one bin.
///
/// A window centered on the bin is analyzed; silent windows report even
/// thirds so overviews render them neutrally.
fn bin_band_levels(
    samples: &[f32],
    center: usize,
    sample_rate: u32,
    processor: &mut SpectralProcessor,
    padded: &mut [f32],
) -> BandLevels {
    let fft_size = processor.fft_size();
    let start = center.saturating_sub(fft_size / 2);
    let available = (samples.len() - start).min(fft_size);

    padded[..available].copy_from_slice(&samples[start..start + available]);
    padded[available..].fill(0.0);

    let Ok(spectrum) = processor.magnitude_spectrum(padded) else {
        return BandLevels::default();
    };

    let bin_hz = sample_rate as f32 / fft_size as f32;
    let mut low = 0.0f32;
    let mut mid = 0.0f32;
    let mut high = 0.0f32;
    let mut low_bins = 0u32;
    let mut mid_bins = 0u32;
    let mut high_bins = 0u32;

    for (bin, db) in spectrum.iter().enumerate() {
        let magnitude = db_to_linear(*db);
        let energy = magnitude * magnitude;
        let hz = bin as f32 * bin_hz;
        if hz < LOW_BAND_HZ {
            low += energy;
            low_bins += 1;
        } else if hz < MID_BAND_HZ {
            mid += energy;
            mid_bins += 1;
        } else {
            high += energy;
            high_bins += 1;
        }
    }

    // Average per bin, then amplitude scale.
    low = (low / low_bins.max(1) as f32).sqrt();
    mid = (mid / mid_bins.max(1) as f32).sqrt();
    high = (high / high_bins.max(1) as f32).sqrt();

    let total = low + mid + high;
    if total > 1e-6 {
        BandLevels {
            low: low / total,
            mid: mid / total,
            high: high / total,
        }
    } else {
        BandLevels {
            low: 1.0 / 3.0,
            mid: 1.0 / 3.0,
            high: 1.0 / 3.0,
        }
    }
}
