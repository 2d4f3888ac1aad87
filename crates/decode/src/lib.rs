//! Audio file decoding for the analysis engine.
//!
//! This crate is the reference implementation of the engine's decoder
//! contract: given a file path, produce a [`PcmBuffer`] of `f32` samples
//! normalized to [-1, 1] at the requested sample rate, downmixed to mono
//! by default. The analysis core never touches the filesystem; everything
//! that does lives here.
//!
//! All failures surface as [`AnalysisError::DecodingFailed`] with the
//! underlying decoder message passed through verbatim.

use std::fs::File;
use std::path::Path;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use cratedigger_analysis::{AnalysisError, PcmBuffer};

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct DecodeConfig {
    /// Sample rate the PCM is resampled to.
    pub target_sample_rate: u32,
    /// Downmix to a single channel by averaging.
    pub mono: bool,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 48_000,
            mono: true,
        }
    }
}

/// File extensions the decoder accepts.
pub fn supported_extensions() -> &'static [&'static str] {
    &["mp3", "wav", "aiff", "aif", "flac"]
}

/// Check whether a path looks like a decodable audio file.
pub fn is_supported_audio_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            supported_extensions().contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Decode an audio file into a PCM buffer at the configured rate.
pub fn decode_file<P: AsRef<Path>>(
    path: P,
    config: &DecodeConfig,
) -> Result<PcmBuffer, AnalysisError> {
    let path = path.as_ref();
    log::info!("decoding {:?}", path);

    let file = File::open(path)
        .map_err(|e| AnalysisError::DecodingFailed(format!("{}: {e}", path.display())))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AnalysisError::DecodingFailed(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| AnalysisError::DecodingFailed("no audio track found".to_string()))?;
    let track_id = track.id;
    let source_rate = track.codec_params.sample_rate.unwrap_or(44_100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AnalysisError::DecodingFailed(e.to_string()))?;

    // Decode into per-channel buffers.
    let mut channels: Vec<Vec<f32>> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                log::warn!("error reading packet: {e}");
                break;
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => append_samples(&mut channels, &decoded),
            Err(e) => log::warn!("error decoding packet: {e}"),
        }
    }

    if channels.is_empty() || channels[0].is_empty() {
        return Err(AnalysisError::DecodingFailed(
            "no decodable audio data".to_string(),
        ));
    }

    if config.mono && channels.len() > 1 {
        channels = vec![downmix(&channels)];
    }

    if source_rate != config.target_sample_rate {
        log::debug!(
            "resampling {} Hz -> {} Hz",
            source_rate,
            config.target_sample_rate
        );
        channels = resample(channels, source_rate, config.target_sample_rate)?;
    }

    Ok(to_pcm(channels, config.target_sample_rate))
}

/// Append one decoded packet, converting to f32 per channel.
fn append_samples(channels: &mut Vec<Vec<f32>>, decoded: &AudioBufferRef) {
    macro_rules! extend {
        ($buf:expr, $convert:expr) => {{
            let count = $buf.spec().channels.count();
            if channels.len() < count {
                channels.resize(count, Vec::new());
            }
            for ch in 0..count {
                channels[ch].extend($buf.chan(ch).iter().map($convert));
            }
        }};
    }
    match decoded {
        AudioBufferRef::F32(buf) => extend!(buf, |s: &f32| *s),
        AudioBufferRef::S16(buf) => extend!(buf, |s: &i16| *s as f32 / 32_768.0),
        AudioBufferRef::S32(buf) => extend!(buf, |s: &i32| *s as f32 / 2_147_483_648.0),
        AudioBufferRef::U8(buf) => extend!(buf, |s: &u8| (*s as f32 - 128.0) / 128.0),
        _ => log::warn!("unsupported sample format in packet, skipping"),
    }
}

/// Average all channels into one.
fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let count = channels.len() as f32;
    (0..frames)
        .map(|i| channels.iter().map(|c| c[i]).sum::<f32>() / count)
        .collect()
}

/// Sinc resampling via rubato, fed in fixed-size chunks.
fn resample(
    channels: Vec<Vec<f32>>,
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<Vec<f32>>, AnalysisError> {
    const CHUNK: usize = 1024;

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(
        target_rate as f64 / source_rate as f64,
        2.0,
        params,
        CHUNK,
        channels.len(),
    )
    .map_err(|e| AnalysisError::DecodingFailed(e.to_string()))?;

    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels.len()];

    let mut start = 0;
    while start < frames {
        let end = (start + CHUNK).min(frames);
        let chunk: Vec<Vec<f32>> = channels
            .iter()
            .map(|c| {
                let mut frame = c[start..end].to_vec();
                frame.resize(CHUNK, 0.0);
                frame
            })
            .collect();
        let resampled = resampler
            .process(&chunk, None)
            .map_err(|e| AnalysisError::DecodingFailed(e.to_string()))?;
        for (out, res) in output.iter_mut().zip(resampled.into_iter()) {
            out.extend(res);
        }
        start = end;
    }
    Ok(output)
}

/// Interleave the channel buffers into a PCM buffer.
fn to_pcm(channels: Vec<Vec<f32>>, sample_rate: u32) -> PcmBuffer {
    if channels.len() == 1 {
        let samples = channels.into_iter().next().unwrap();
        return PcmBuffer::mono(samples, sample_rate);
    }
    let frames = channels.iter().map(|c| c.len()).min().unwrap_or(0);
    let mut samples = Vec::with_capacity(frames * channels.len());
    for i in 0..frames {
        for channel in &channels {
            samples.push(channel[i]);
        }
    }
    PcmBuffer {
        samples,
        sample_rate,
        channels: channels.len() as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Write a minimal 16-bit PCM WAV file.
    fn write_wav(path: &Path, sample_rate: u32, channels: u16, samples: &[i16]) {
        let mut file = File::create(path).unwrap();
        let data_len = (samples.len() * 2) as u32;
        let byte_rate = sample_rate * channels as u32 * 2;
        let block_align = channels * 2;

        file.write_all(b"RIFF").unwrap();
        file.write_all(&(36 + data_len).to_le_bytes()).unwrap();
        file.write_all(b"WAVE").unwrap();
        file.write_all(b"fmt ").unwrap();
        file.write_all(&16u32.to_le_bytes()).unwrap();
        file.write_all(&1u16.to_le_bytes()).unwrap();
        file.write_all(&channels.to_le_bytes()).unwrap();
        file.write_all(&sample_rate.to_le_bytes()).unwrap();
        file.write_all(&byte_rate.to_le_bytes()).unwrap();
        file.write_all(&block_align.to_le_bytes()).unwrap();
        file.write_all(&16u16.to_le_bytes()).unwrap();
        file.write_all(b"data").unwrap();
        file.write_all(&data_len.to_le_bytes()).unwrap();
        for sample in samples {
            file.write_all(&sample.to_le_bytes()).unwrap();
        }
    }

    fn sine_i16(freq: f64, sample_rate: u32, seconds: f64) -> Vec<i16> {
        let len = (sample_rate as f64 * seconds) as usize;
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate as f64;
                ((2.0 * std::f64::consts::PI * freq * t).sin() * 0.8 * 32_767.0) as i16
            })
            .collect()
    }

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_audio_file("track.mp3"));
        assert!(is_supported_audio_file("track.FLAC"));
        assert!(is_supported_audio_file("track.aif"));
        assert!(!is_supported_audio_file("track.txt"));
        assert!(!is_supported_audio_file("track"));
    }

    #[test]
    fn test_missing_file_fails() {
        let err = decode_file("/nonexistent/file.wav", &DecodeConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::DecodingFailed(_)));
    }

    #[test]
    fn test_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"this is not audio").unwrap();
        let err = decode_file(&path, &DecodeConfig::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::DecodingFailed(_)));
    }

    #[test]
    fn test_decode_wav_at_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, 48_000, 1, &sine_i16(440.0, 48_000, 2.0));

        let pcm = decode_file(&path, &DecodeConfig::default()).unwrap();
        assert_eq!(pcm.sample_rate, 48_000);
        assert_eq!(pcm.channels, 1);
        assert!((pcm.duration_seconds() - 2.0).abs() < 0.01);
        let peak = pcm.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!((peak - 0.8).abs() < 0.01);
    }

    #[test]
    fn test_decode_resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone44.wav");
        write_wav(&path, 44_100, 1, &sine_i16(440.0, 44_100, 2.0));

        let pcm = decode_file(&path, &DecodeConfig::default()).unwrap();
        assert_eq!(pcm.sample_rate, 48_000);
        // Chunked resampling pads the tail, so allow a small overrun.
        let duration = pcm.duration_seconds();
        assert!(
            (1.95..=2.1).contains(&duration),
            "resampled duration {duration}"
        );
        assert!(pcm.samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        // L = +0.5, R = -0.5 constant: averages to silence.
        let frames = 48_000;
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            samples.push((0.5 * 32_767.0) as i16);
            samples.push((-0.5 * 32_767.0) as i16);
        }
        write_wav(&path, 48_000, 2, &samples);

        let pcm = decode_file(&path, &DecodeConfig::default()).unwrap();
        assert_eq!(pcm.channels, 1);
        let peak = pcm.samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
        assert!(peak < 0.001, "downmix peak {peak}");
    }

    #[test]
    fn test_stereo_preserved_when_mono_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo2.wav");
        let frames = 24_000;
        let mut samples = Vec::with_capacity(frames * 2);
        for _ in 0..frames {
            samples.push(16_000i16);
            samples.push(-16_000i16);
        }
        write_wav(&path, 48_000, 2, &samples);

        let config = DecodeConfig {
            mono: false,
            ..Default::default()
        };
        let pcm = decode_file(&path, &config).unwrap();
        assert_eq!(pcm.channels, 2);
        assert_eq!(pcm.frame_count(), frames);
        // Interleaved L/R keep their signs.
        assert!(pcm.samples[0] > 0.4);
        assert!(pcm.samples[1] < -0.4);
    }
}
