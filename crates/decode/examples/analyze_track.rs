//! Decode and analyze a single track, printing the result as JSON.
//!
//! Usage: cargo run --example analyze_track -- <audio-file>

use anyhow::{bail, Context, Result};
use cratedigger_analysis::{AnalyzeOptions, ProgressEvent, TrackAnalyzer};
use cratedigger_decode::{decode_file, DecodeConfig};

fn main() -> Result<()> {
    env_logger::init();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: analyze_track <audio-file>");
    };

    let pcm = decode_file(&path, &DecodeConfig::default()).context("decoding failed")?;
    println!(
        "decoded {:.1} s at {} Hz ({} channel{})",
        pcm.duration_seconds(),
        pcm.sample_rate,
        pcm.channels,
        if pcm.channels == 1 { "" } else { "s" }
    );

    let analyzer = TrackAnalyzer::with_defaults();
    let analysis = analyzer.analyze_with_progress(
        &pcm,
        &AnalyzeOptions::for_path(&path),
        |event| match event {
            ProgressEvent::Beatgrid { progress } if progress > 0.0 => {
                eprintln!("  beatgrid done");
            }
            ProgressEvent::Complete => eprintln!("  complete"),
            other => eprintln!("  {other:?}"),
        },
    )?;

    println!(
        "{:.1} BPM (confidence {:.2}), key {} / {}, energy {}/10, {:.1} LUFS",
        analysis.bpm(),
        analysis.beatgrid.confidence,
        analysis.key.name(),
        analysis.key.camelot(),
        analysis.energy.global,
        analysis.loudness.integrated_lufs,
    );
    for section in &analysis.sections {
        println!(
            "  {:>9}  {:7.1}s - {:7.1}s  (beats {}..{})",
            section.kind.to_string(),
            section.start_time,
            section.end_time,
            section.start_beat,
            section.end_beat,
        );
    }
    for cue in &analysis.cue_set.cues {
        println!("  cue {:<12} beat {:>5}  {:8.2}s", cue.label, cue.beat_index, cue.time_seconds);
    }

    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}
