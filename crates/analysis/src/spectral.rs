//! Shared STFT front-end.
//!
//! Every spectral analyzer consumes the output of this module: dB-scaled
//! magnitude spectrograms, the spectral flux onset envelope, and the
//! 12-bin chroma projection. Outputs are computed eagerly so repeated
//! runs over the same PCM are deterministic.

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

use crate::error::{AnalysisError, Result};

/// Magnitude floor applied before the dB conversion.
pub const MAGNITUDE_EPSILON: f32 = 1e-10;

/// Lower frequency bound for the chroma projection, in Hz.
const CHROMA_MIN_HZ: f32 = 20.0;
/// Upper frequency bound for the chroma projection, in Hz.
const CHROMA_MAX_HZ: f32 = 5000.0;

/// A sequence of dB-scaled magnitude frames.
///
/// Each frame has `fft_size / 2` bins; values are `20·log10(mag)` with
/// magnitudes floored at [`MAGNITUDE_EPSILON`].
#[derive(Debug, Clone)]
pub struct Spectrogram {
    /// dB magnitude frames, time-major.
    pub frames: Vec<Vec<f32>>,
    /// FFT size the frames were computed with.
    pub fft_size: usize,
    /// Hop size between frames, in samples.
    pub hop_size: usize,
    /// Sample rate of the source PCM.
    pub sample_rate: u32,
}

impl Spectrogram {
    /// Frames per second.
    pub fn frame_rate(&self) -> f64 {
        self.sample_rate as f64 / self.hop_size as f64
    }

    /// Center frequency of a bin in Hz.
    pub fn bin_frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.sample_rate as f32 / self.fft_size as f32
    }

    /// Number of bins per frame.
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Spectrogram frame index containing the given time.
    pub fn frame_at_time(&self, time_seconds: f64) -> usize {
        (time_seconds * self.frame_rate()) as usize
    }
}

/// Convert a dB value back to linear magnitude.
#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Windowed FFT processor with a precomputed Hann window and plan.
///
/// The plan scratch space is owned by the processor, so keep one
/// processor per thread.
pub struct SpectralProcessor {
    fft_size: usize,
    window: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl SpectralProcessor {
    /// Build a processor for the given FFT size.
    ///
    /// Fails with `InvalidParameter` unless `fft_size` is a power of two.
    pub fn new(fft_size: usize) -> Result<Self> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(AnalysisError::InvalidParameter(format!(
                "FFT size must be a power of two, got {fft_size}"
            )));
        }
        let window: Vec<f32> = (0..fft_size)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f32::consts::PI * i as f32 / (fft_size - 1) as f32).cos())
            })
            .collect();
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        Ok(Self {
            fft_size,
            window,
            fft,
            scratch,
        })
    }

    /// FFT size this processor was planned for.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// dB magnitude spectrum of one frame.
    ///
    /// Requires at least `fft_size` samples; excess is ignored.
    pub fn magnitude_spectrum(&mut self, frame: &[f32]) -> Result<Vec<f32>> {
        if frame.len() < self.fft_size {
            return Err(AnalysisError::InvalidParameter(format!(
                "frame of {} samples is shorter than FFT size {}",
                frame.len(),
                self.fft_size
            )));
        }
        let mut buffer: Vec<Complex<f32>> = frame[..self.fft_size]
            .iter()
            .zip(self.window.iter())
            .map(|(s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.fft.process_with_scratch(&mut buffer, &mut self.scratch);

        let norm = 1.0 / self.fft_size as f32;
        Ok(buffer[..self.fft_size / 2]
            .iter()
            .map(|c| 20.0 * (c.norm() * norm).max(MAGNITUDE_EPSILON).log10())
            .collect())
    }

    /// Eager STFT over the full signal.
    ///
    /// Produces `(len − fft_size) / hop + 1` frames; an empty spectrogram
    /// when the signal is shorter than one window.
    pub fn stft(&mut self, samples: &[f32], hop_size: usize, sample_rate: u32) -> Result<Spectrogram> {
        if hop_size == 0 {
            return Err(AnalysisError::InvalidParameter(
                "hop size must be positive".to_string(),
            ));
        }
        let mut frames = Vec::new();
        if samples.len() >= self.fft_size {
            frames.reserve((samples.len() - self.fft_size) / hop_size + 1);
            let mut start = 0;
            while start + self.fft_size <= samples.len() {
                frames.push(self.magnitude_spectrum(&samples[start..start + self.fft_size])?);
                start += hop_size;
            }
        }
        Ok(Spectrogram {
            frames,
            fft_size: self.fft_size,
            hop_size,
            sample_rate,
        })
    }
}

/// L2 half-wave rectified spectral flux, one value per frame.
///
/// Frame 0 is defined as 0.
pub fn spectral_flux(spectrogram: &Spectrogram) -> Vec<f32> {
    let mut flux = Vec::with_capacity(spectrogram.frames.len());
    for (i, frame) in spectrogram.frames.iter().enumerate() {
        if i == 0 {
            flux.push(0.0);
            continue;
        }
        let prev = &spectrogram.frames[i - 1];
        let sum: f32 = frame
            .iter()
            .zip(prev.iter())
            .map(|(curr, prev)| {
                let diff = (curr - prev).max(0.0);
                diff * diff
            })
            .sum();
        flux.push(sum.sqrt());
    }
    flux
}

/// Per-frame 12-bin chroma projection.
///
/// Linear bin magnitudes between 20 Hz and 5 kHz are accumulated into the
/// pitch class of their nearest equal-tempered note (A4 = 440 Hz); each
/// frame is max-normalized.
pub fn chroma_features(spectrogram: &Spectrogram) -> Vec<[f32; 12]> {
    // Precompute the pitch class of every usable bin once per spectrogram.
    let pitch_classes: Vec<Option<usize>> = (0..spectrogram.bin_count())
        .map(|bin| {
            let hz = spectrogram.bin_frequency(bin);
            if !(CHROMA_MIN_HZ..=CHROMA_MAX_HZ).contains(&hz) {
                return None;
            }
            let midi = 69.0 + 12.0 * (hz / 440.0).log2();
            Some(midi.round().rem_euclid(12.0) as usize % 12)
        })
        .collect();

    spectrogram
        .frames
        .iter()
        .map(|frame| {
            let mut chroma = [0.0f32; 12];
            for (db, pc) in frame.iter().zip(pitch_classes.iter()) {
                if let Some(pc) = pc {
                    chroma[*pc] += db_to_linear(*db);
                }
            }
            let max = chroma.iter().cloned().fold(0.0f32, f32::max);
            if max > MAGNITUDE_EPSILON {
                for value in &mut chroma {
                    *value /= max;
                }
            }
            chroma
        })
        .collect()
}
