/// Shared candidate and result types produced by detectors and consumed by
/// the combiner, refiner and selector (spec.md §3).
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    Onset,
    Tempo,
    Flux,
    Combined,
}

/// Per-frame metadata a detector may attach to a candidate (spectral
/// centroid, band energies) — optional, never required by the combiner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateMetadata {
    pub spectral_centroid: Option<f32>,
    pub band_energies: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatCandidate {
    pub timestamp: f64,
    pub confidence: f64,
    pub strength: f64,
    pub source: Source,
    pub metadata: CandidateMetadata,
}

impl BeatCandidate {
    pub fn new(timestamp: f64, confidence: f64, strength: f64, source: Source) -> Self {
        Self {
            timestamp,
            confidence: confidence.clamp(0.0, 1.0),
            strength: strength.max(0.0),
            source,
            metadata: CandidateMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    pub bpm: f64,
    pub confidence: f64,
    pub phase: f64,
    pub stability: f64,
    pub time_signature: Option<(u8, u8)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub timestamp: f64,
    pub confidence: f64,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionResult {
    pub beats: Vec<Beat>,
    pub target_count: usize,
}
