//! Set-level track similarity.
//!
//! Ranks how well two analyzed tracks mix together by blending embedding
//! similarity with tempo, key and energy proximity, and produces a short
//! human-readable explanation of the verdict.

use serde::{Deserialize, Serialize};

use crate::types::{MusicalKey, TrackAnalysis};

/// BPM difference that maps tempo similarity to zero.
const TEMPO_SIM_SCALE: f64 = 10.0;
/// Energy grade difference that maps energy similarity to zero.
const ENERGY_SIM_SCALE: f32 = 5.0;

/// Scorer configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimilarityConfig {
    /// Read `external_embedding_512d` for the vibe term when both tracks
    /// carry one. The core never populates that slot itself.
    pub use_external_embedding: bool,
}

/// How two keys relate on the Camelot wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRelation {
    Same,
    Relative,
    Adjacent,
    TwoSteps,
    Distant,
}

impl KeyRelation {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Same => "same",
            Self::Relative => "relative",
            Self::Adjacent => "adjacent",
            Self::TwoSteps => "two steps",
            Self::Distant => "distant",
        }
    }

    fn similarity(&self) -> f32 {
        match self {
            Self::Same => 1.0,
            Self::Relative => 0.9,
            Self::Adjacent => 0.8,
            Self::TwoSteps => 0.6,
            Self::Distant => 0.2,
        }
    }
}

/// Weighted similarity verdict with its component scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityScore {
    /// Final weighted score (0.0-1.0).
    pub score: f32,
    /// Embedding vibe similarity.
    pub vibe: f32,
    /// Tempo similarity with half/double equivalence.
    pub tempo: f32,
    /// Camelot-relation key similarity.
    pub key: f32,
    /// Energy grade proximity.
    pub energy: f32,
    /// Semicolon-joined human-readable explanation.
    pub explanation: String,
}

/// Score a transition from `a` into `b`.
pub fn score_transition(
    a: &TrackAnalysis,
    b: &TrackAnalysis,
    config: &SimilarityConfig,
) -> SimilarityScore {
    let vibe = vibe_similarity(a, b, config);
    let tempo = tempo_similarity(a.bpm(), b.bpm());
    let relation = key_relation(&a.key, &b.key);
    let key = relation.similarity();
    let energy = energy_similarity(a.energy.global, b.energy.global);

    let score = 0.5 * vibe + 0.2 * tempo + 0.2 * key + 0.1 * energy;
    let explanation = explain(a, b, vibe, relation);

    SimilarityScore {
        score,
        vibe,
        tempo,
        key,
        energy,
        explanation,
    }
}

fn vibe_similarity(a: &TrackAnalysis, b: &TrackAnalysis, config: &SimilarityConfig) -> f32 {
    if config.use_external_embedding {
        if let (Some(va), Some(vb)) = (&a.external_embedding_512d, &b.external_embedding_512d) {
            return cosine(va, vb);
        }
    }
    a.embedding.cosine_similarity(&b.embedding)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a <= 1e-10 || norm_b <= 1e-10 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Tempo similarity over a 10 BPM scale, honoring half- and double-tempo
/// equivalence.
pub fn tempo_similarity(a_bpm: f64, b_bpm: f64) -> f32 {
    let delta = (a_bpm - b_bpm)
        .abs()
        .min((a_bpm - b_bpm * 2.0).abs())
        .min((a_bpm - b_bpm / 2.0).abs());
    (1.0 - delta / TEMPO_SIM_SCALE).max(0.0) as f32
}

/// Camelot-wheel relation between two keys.
pub fn key_relation(a: &MusicalKey, b: &MusicalKey) -> KeyRelation {
    if a.pitch_class == b.pitch_class && a.is_minor == b.is_minor {
        return KeyRelation::Same;
    }
    let (num_a, minor_a) = camelot_number(a);
    let (num_b, minor_b) = camelot_number(b);

    if num_a == num_b && minor_a != minor_b {
        return KeyRelation::Relative;
    }
    let steps = wheel_distance(num_a, num_b);
    if minor_a == minor_b {
        match steps {
            1 => return KeyRelation::Adjacent,
            2 => return KeyRelation::TwoSteps,
            _ => {}
        }
    }
    KeyRelation::Distant
}

fn camelot_number(key: &MusicalKey) -> (u8, bool) {
    let label = key.camelot();
    let number: u8 = label[..label.len() - 1].parse().unwrap_or(0);
    (number, key.is_minor)
}

/// Steps around the 12-position wheel, shortest way round.
fn wheel_distance(a: u8, b: u8) -> u8 {
    let diff = (a as i16 - b as i16).rem_euclid(12) as u8;
    diff.min(12 - diff)
}

/// Energy similarity on the 1-10 grade scale.
pub fn energy_similarity(a: u8, b: u8) -> f32 {
    let delta = (a as f32 - b as f32).abs();
    (1.0 - delta / ENERGY_SIM_SCALE).max(0.0)
}

/// Rank candidate follow-up tracks for `current`, best first.
///
/// Returns indices into `pool` paired with their scores. Ties keep pool
/// order, so rankings are deterministic.
pub fn rank_candidates(
    current: &TrackAnalysis,
    pool: &[TrackAnalysis],
    config: &SimilarityConfig,
) -> Vec<(usize, SimilarityScore)> {
    let mut ranked: Vec<(usize, SimilarityScore)> = pool
        .iter()
        .enumerate()
        .map(|(i, candidate)| (i, score_transition(current, candidate, config)))
        .collect();
    ranked.sort_by(|a, b| {
        b.1.score
            .partial_cmp(&a.1.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ranked
}

fn explain(a: &TrackAnalysis, b: &TrackAnalysis, vibe: f32, relation: KeyRelation) -> String {
    let vibe_part = format!("similar vibe ({}%)", (vibe * 100.0).round() as i32);

    let bpm_delta = (a.bpm() - b.bpm()).abs();
    let tempo_part = if bpm_delta < 0.1 {
        "tempo match".to_string()
    } else {
        format!("\u{0394}{:.0} BPM", bpm_delta)
    };

    let key_part = format!(
        "key: {}\u{2192}{} ({})",
        a.key.camelot(),
        b.key.camelot(),
        relation.as_str()
    );

    let energy_delta = b.energy.global as i32 - a.energy.global as i32;
    let energy_part = if energy_delta == 0 {
        "same energy".to_string()
    } else {
        format!("energy {:+}", energy_delta)
    };

    format!("{vibe_part}; {tempo_part}; {key_part}; {energy_part}")
}
