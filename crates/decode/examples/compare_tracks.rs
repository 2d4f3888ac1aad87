//! Score how well two tracks would mix together.
//!
//! Usage: cargo run --example compare_tracks -- <track-a> <track-b>

use anyhow::{bail, Result};
use cratedigger_analysis::{score_transition, AnalyzeOptions, SimilarityConfig, TrackAnalyzer};
use cratedigger_decode::{decode_file, DecodeConfig};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [path_a, path_b] = args.as_slice() else {
        bail!("usage: compare_tracks <track-a> <track-b>");
    };

    let analyzer = TrackAnalyzer::with_defaults();
    let decode_config = DecodeConfig::default();

    let a = analyzer.analyze(
        &decode_file(path_a, &decode_config)?,
        &AnalyzeOptions::for_path(path_a),
    )?;
    let b = analyzer.analyze(
        &decode_file(path_b, &decode_config)?,
        &AnalyzeOptions::for_path(path_b),
    )?;

    let score = score_transition(&a, &b, &SimilarityConfig::default());
    println!("{path_a}  ->  {path_b}");
    println!("  score  {:.3}", score.score);
    println!("  vibe   {:.3}", score.vibe);
    println!("  tempo  {:.3}", score.tempo);
    println!("  key    {:.3}", score.key);
    println!("  energy {:.3}", score.energy);
    println!("  {}", score.explanation);
    Ok(())
}
