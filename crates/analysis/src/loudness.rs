//! EBU R128 / ITU-R BS.1770-4 loudness measurement.
//!
//! The K-weighting filter is derived analytically from the sample rate at
//! runtime, so any input rate measures correctly. Gating follows the
//! two-stage scheme: an absolute gate at -70 LUFS, then a relative gate
//! 10 LU below the ungated mean.

use crate::config::AnalysisConfig;
use crate::types::LoudnessSummary;

/// Loudness value reported for silence.
pub const SILENCE_LUFS: f64 = -70.0;

/// High-shelf stage center frequency (head-model pre-filter).
const SHELF_HZ: f64 = 1681.974450955533;
/// High-shelf gain in dB.
const SHELF_GAIN_DB: f64 = 3.999843853973347;
/// High-shelf quality factor.
const SHELF_Q: f64 = 0.7071752369554196;

/// High-pass stage corner frequency (RLB weighting).
const HIGHPASS_HZ: f64 = 38.13547087602444;
/// High-pass quality factor.
const HIGHPASS_Q: f64 = 0.5003270373238773;

/// Taps per side of the true-peak interpolation kernel.
const TRUE_PEAK_HALF_TAPS: i64 = 8;

/// Biquad filter coefficients (Direct Form II Transposed).
#[derive(Debug, Clone, Copy)]
struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

/// Biquad filter state; one pair per filter stage.
#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadCoeffs {
    /// Shelving stage of the K-weighting cascade, via the bilinear
    /// transform with `K = tan(pi * fc / Fs)`.
    fn k_weighting_shelf(sample_rate: f64) -> Self {
        let k = (std::f64::consts::PI * SHELF_HZ / sample_rate).tan();
        let vh = 10.0f64.powf(SHELF_GAIN_DB / 20.0);
        let vb = vh.powf(0.4996667741545416);
        let den = 1.0 + k / SHELF_Q + k * k;
        Self {
            b0: (vh + vb * k / SHELF_Q + k * k) / den,
            b1: 2.0 * (k * k - vh) / den,
            b2: (vh - vb * k / SHELF_Q + k * k) / den,
            a1: 2.0 * (k * k - 1.0) / den,
            a2: (1.0 - k / SHELF_Q + k * k) / den,
        }
    }

    /// High-pass stage of the K-weighting cascade.
    fn k_weighting_highpass(sample_rate: f64) -> Self {
        let k = (std::f64::consts::PI * HIGHPASS_HZ / sample_rate).tan();
        let den = 1.0 + k / HIGHPASS_Q + k * k;
        Self {
            b0: 1.0,
            b1: -2.0,
            b2: 1.0,
            a1: 2.0 * (k * k - 1.0) / den,
            a2: (1.0 - k / HIGHPASS_Q + k * k) / den,
        }
    }

    #[inline]
    fn process(&self, input: f64, state: &mut BiquadState) -> f64 {
        let output = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * output + state.z2;
        state.z2 = self.b2 * input - self.a2 * output;
        output
    }
}

/// Apply the two-stage K-weighting cascade to a mono signal.
fn k_weight(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let shelf = BiquadCoeffs::k_weighting_shelf(sample_rate as f64);
    let highpass = BiquadCoeffs::k_weighting_highpass(sample_rate as f64);
    let mut shelf_state = BiquadState::default();
    let mut highpass_state = BiquadState::default();

    samples
        .iter()
        .map(|&sample| {
            let shelved = shelf.process(sample as f64, &mut shelf_state);
            highpass.process(shelved, &mut highpass_state)
        })
        .collect()
}

/// Mean-square per block, hopped. Returns `(mean_square, lufs)` pairs.
fn block_loudness(weighted: &[f64], block_len: usize, hop: usize) -> Vec<(f64, f64)> {
    let mut blocks = Vec::new();
    if block_len == 0 || weighted.len() < block_len {
        return blocks;
    }
    let mut start = 0;
    while start + block_len <= weighted.len() {
        let mean_square = weighted[start..start + block_len]
            .iter()
            .map(|x| x * x)
            .sum::<f64>()
            / block_len as f64;
        let lufs = if mean_square > 0.0 {
            -0.691 + 10.0 * mean_square.log10()
        } else {
            SILENCE_LUFS
        };
        blocks.push((mean_square, lufs));
        start += hop;
    }
    blocks
}

/// Double-gated integrated loudness over the momentary blocks.
fn integrated_loudness(blocks: &[(f64, f64)], config: &AnalysisConfig) -> f64 {
    let absolute_gate = config.loudness_absolute_gate_lufs;
    let gated: Vec<(f64, f64)> = blocks
        .iter()
        .copied()
        .filter(|(_, lufs)| *lufs > absolute_gate)
        .collect();
    if gated.is_empty() {
        return SILENCE_LUFS;
    }

    let ungated_mean_ms =
        gated.iter().map(|(ms, _)| ms).sum::<f64>() / gated.len() as f64;
    let ungated_lufs = -0.691 + 10.0 * ungated_mean_ms.log10();
    let relative_gate = ungated_lufs + config.loudness_relative_gate_lu;

    let relative: Vec<(f64, f64)> = gated
        .iter()
        .copied()
        .filter(|(_, lufs)| *lufs > relative_gate)
        .collect();
    if relative.is_empty() {
        log::debug!("relative gate removed all blocks, using ungated mean");
        return ungated_lufs.max(SILENCE_LUFS);
    }

    let mean_ms = relative.iter().map(|(ms, _)| ms).sum::<f64>() / relative.len() as f64;
    (-0.691 + 10.0 * mean_ms.log10()).max(SILENCE_LUFS)
}

/// Loudness range from the short-term distribution.
fn loudness_range(short_term: &[(f64, f64)], config: &AnalysisConfig) -> f64 {
    let mut values: Vec<f64> = short_term
        .iter()
        .filter(|(_, lufs)| *lufs > config.loudness_absolute_gate_lufs)
        .map(|(_, lufs)| *lufs)
        .collect();
    if values.len() <= 10 {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let index_at = |percentile: f64| {
        ((percentile * (values.len() - 1) as f64).round() as usize).min(values.len() - 1)
    };
    let low = values[index_at(config.lra_low_percentile)];
    let high = values[index_at(config.lra_high_percentile)];
    (high - low).max(0.0)
}

/// Inter-sample true peak via polyphase windowed-sinc interpolation.
///
/// Original samples are included in the maximum, so the result can never
/// fall below the sample peak.
fn true_peak_sinc(samples: &[f32], oversample: usize) -> f64 {
    let mut peak = samples.iter().map(|x| x.abs() as f64).fold(0.0, f64::max);
    if samples.len() < 2 || oversample < 2 {
        return peak;
    }

    let half = TRUE_PEAK_HALF_TAPS;
    for phase in 1..oversample {
        let offset = phase as f64 / oversample as f64;
        // Hann-windowed sinc taps for this fractional delay, normalized
        // to unity DC gain.
        let mut taps = Vec::with_capacity((2 * half) as usize);
        let mut tap_sum = 0.0;
        for k in (1 - half)..=half {
            let t = k as f64 - offset;
            let sinc = if t.abs() < 1e-12 {
                1.0
            } else {
                (std::f64::consts::PI * t).sin() / (std::f64::consts::PI * t)
            };
            let window = 0.5 * (1.0 + (std::f64::consts::PI * t / half as f64).cos());
            let tap = sinc * window;
            taps.push((k, tap));
            tap_sum += tap;
        }

        for n in 0..samples.len() - 1 {
            let mut value = 0.0;
            for &(k, tap) in &taps {
                let index = n as i64 + k;
                if index >= 0 && (index as usize) < samples.len() {
                    value += samples[index as usize] as f64 * tap;
                }
            }
            peak = peak.max((value / tap_sum).abs());
        }
    }
    peak
}

/// Compute all R128 statistics for a mono signal.
pub fn analyze_loudness(
    samples: &[f32],
    sample_rate: u32,
    config: &AnalysisConfig,
) -> LoudnessSummary {
    let weighted = k_weight(samples, sample_rate);

    let hop = (sample_rate as f64 * 0.1).round() as usize;
    let momentary_len = (sample_rate as f64 * 0.4).round() as usize;
    let short_term_len = (sample_rate as f64 * 3.0).round() as usize;

    let momentary = block_loudness(&weighted, momentary_len, hop);
    let mut short_term = block_loudness(&weighted, short_term_len, hop);
    if short_term.is_empty() && !weighted.is_empty() {
        // Shorter than one 3 s window: measure the whole signal as a
        // single short-term block so the ordering against the integrated
        // value holds for 1-3 s tracks.
        short_term = block_loudness(&weighted, weighted.len(), weighted.len());
    }

    let momentary_max = momentary
        .iter()
        .map(|(_, lufs)| *lufs)
        .fold(SILENCE_LUFS, f64::max);
    let short_term_max = short_term
        .iter()
        .map(|(_, lufs)| *lufs)
        .fold(SILENCE_LUFS, f64::max);

    let integrated_lufs = integrated_loudness(&momentary, config);
    let loudness_range_lu = loudness_range(&short_term, config);

    let sample_peak = samples.iter().map(|x| x.abs() as f64).fold(0.0, f64::max);
    let sample_peak_dbfs = if sample_peak > 1e-10 {
        20.0 * sample_peak.log10()
    } else {
        SILENCE_LUFS
    };
    let true_peak = true_peak_sinc(samples, config.true_peak_oversample);
    let true_peak_dbtp = if true_peak > 1e-10 {
        20.0 * true_peak.log10()
    } else {
        SILENCE_LUFS
    };

    log::debug!(
        "loudness: integrated {integrated_lufs:.2} LUFS, LRA {loudness_range_lu:.2} LU, \
         true peak {true_peak_dbtp:.2} dBTP"
    );

    LoudnessSummary {
        integrated_lufs,
        loudness_range_lu,
        short_term_max,
        momentary_max,
        true_peak_dbtp,
        sample_peak_dbfs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, amplitude: f64, seconds: f64, sample_rate: u32) -> Vec<f32> {
        let len = (seconds * sample_rate as f64) as usize;
        (0..len)
            .map(|i| {
                (amplitude * (2.0 * std::f64::consts::PI * freq * i as f64 / sample_rate as f64)
                    .sin()) as f32
            })
            .collect()
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[test]
    fn test_silence_reports_sentinels() {
        let samples = vec![0.0f32; 48_000 * 10];
        let loudness = analyze_loudness(&samples, 48_000, &config());

        assert_eq!(loudness.integrated_lufs, SILENCE_LUFS);
        assert_eq!(loudness.true_peak_dbtp, SILENCE_LUFS);
        assert_eq!(loudness.sample_peak_dbfs, SILENCE_LUFS);
        assert_eq!(loudness.loudness_range_lu, 0.0);
        assert_eq!(loudness.momentary_max, SILENCE_LUFS);
        assert_eq!(loudness.short_term_max, SILENCE_LUFS);
    }

    #[test]
    fn test_full_scale_1khz_sine() {
        // 1 kHz sits in the flat region of the K-weighting curve, so a
        // full-scale sine lands near -0.691 + 10*log10(0.5) = -3.70 LUFS.
        let samples = sine(1000.0, 1.0, 10.0, 48_000);
        let loudness = analyze_loudness(&samples, 48_000, &config());

        assert!(
            (loudness.integrated_lufs - (-3.70)).abs() < 0.5,
            "integrated {}",
            loudness.integrated_lufs
        );
        assert!(loudness.sample_peak_dbfs.abs() < 0.05);
        assert!(loudness.short_term_max >= loudness.integrated_lufs - 0.1);
        assert!(loudness.momentary_max >= loudness.integrated_lufs - 0.1);
    }

    #[test]
    fn test_highpass_attenuates_sub_bass() {
        // 20 Hz content is strongly attenuated by the RLB stage.
        let sub = analyze_loudness(&sine(20.0, 1.0, 10.0, 48_000), 48_000, &config());
        let mid = analyze_loudness(&sine(1000.0, 1.0, 10.0, 48_000), 48_000, &config());
        assert!(sub.integrated_lufs < mid.integrated_lufs - 10.0);
    }

    #[test]
    fn test_shelf_boosts_treble() {
        let mid = analyze_loudness(&sine(1000.0, 0.5, 10.0, 48_000), 48_000, &config());
        let treble = analyze_loudness(&sine(8000.0, 0.5, 10.0, 48_000), 48_000, &config());
        assert!(
            treble.integrated_lufs > mid.integrated_lufs + 2.0,
            "treble {} vs mid {}",
            treble.integrated_lufs,
            mid.integrated_lufs
        );
    }

    #[test]
    fn test_gating_ignores_silence() {
        // Half tone, half silence: gating keeps the integrated value at
        // the tone's loudness instead of averaging the silence in.
        let mut samples = sine(1000.0, 1.0, 5.0, 48_000);
        samples.extend(vec![0.0f32; 48_000 * 5]);
        let loudness = analyze_loudness(&samples, 48_000, &config());
        assert!(
            loudness.integrated_lufs > -6.0,
            "integrated {}",
            loudness.integrated_lufs
        );
    }

    #[test]
    fn test_loudness_range_of_two_level_signal() {
        // 20 dB step between halves.
        let mut samples = sine(1000.0, 0.1, 15.0, 48_000);
        samples.extend(sine(1000.0, 1.0, 15.0, 48_000));
        let loudness = analyze_loudness(&samples, 48_000, &config());
        assert!(
            loudness.loudness_range_lu > 12.0 && loudness.loudness_range_lu < 22.0,
            "LRA {}",
            loudness.loudness_range_lu
        );
    }

    #[test]
    fn test_lra_needs_enough_blocks() {
        // 2 s yields too few short-term blocks for a range estimate.
        let samples = sine(1000.0, 1.0, 2.0, 48_000);
        let loudness = analyze_loudness(&samples, 48_000, &config());
        assert_eq!(loudness.loudness_range_lu, 0.0);
    }

    #[test]
    fn test_inter_sample_true_peak() {
        // +0.98 +0.98 -0.98 -0.98 repeating: a quarter-rate square whose
        // reconstructed waveform peaks ~3 dB above the samples.
        let samples: Vec<f32> = (0..48_000)
            .map(|i| if (i / 2) % 2 == 0 { 0.98 } else { -0.98 })
            .collect();
        let loudness = analyze_loudness(&samples, 48_000, &config());

        assert!(
            (loudness.sample_peak_dbfs - (-0.175)).abs() < 0.01,
            "sample peak {}",
            loudness.sample_peak_dbfs
        );
        assert!(
            loudness.true_peak_dbtp > loudness.sample_peak_dbfs + 1.0,
            "true peak {} vs sample peak {}",
            loudness.true_peak_dbtp,
            loudness.sample_peak_dbfs
        );
    }

    #[test]
    fn test_nyquist_alternation_has_no_overshoot() {
        // Every-sample +0.98 / -0.98 alternation is a pure Nyquist tone:
        // its bandlimited reconstruction peaks exactly at the sample
        // points, so the true peak must equal the sample peak rather
        // than exceed it.
        let samples: Vec<f32> = (0..48_000)
            .map(|i| if i % 2 == 0 { 0.98 } else { -0.98 })
            .collect();
        let loudness = analyze_loudness(&samples, 48_000, &config());

        assert!(
            (loudness.sample_peak_dbfs - (-0.175)).abs() < 0.01,
            "sample peak {}",
            loudness.sample_peak_dbfs
        );
        assert!(
            (loudness.true_peak_dbtp - loudness.sample_peak_dbfs).abs() < 0.05,
            "true peak {} vs sample peak {}",
            loudness.true_peak_dbtp,
            loudness.sample_peak_dbfs
        );
        assert!(loudness.true_peak_dbtp >= loudness.sample_peak_dbfs);
    }

    #[test]
    fn test_true_peak_never_below_sample_peak() {
        let samples = sine(440.0, 0.5, 2.0, 48_000);
        let loudness = analyze_loudness(&samples, 48_000, &config());
        assert!(loudness.true_peak_dbtp >= loudness.sample_peak_dbfs);
    }
}
