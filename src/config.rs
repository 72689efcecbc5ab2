/// Pipeline configuration: owned by a `BeatParser` instance and frozen at
/// the first call to `initialize()` or the first parse operation.
use serde::{Deserialize, Serialize};

use crate::error::{BeatError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Json,
    Xml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SelectionMethod {
    Energy,
    Regular,
    Musical,
    Adaptive,
}

/// Detector fusion weights. Stored unnormalized; the combiner renormalizes
/// at use so callers may pass any positive-sum triple.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DetectorWeights {
    pub onset: f64,
    pub tempo: f64,
    pub spectral: f64,
}

impl Default for DetectorWeights {
    fn default() -> Self {
        Self {
            onset: 0.4,
            tempo: 0.4,
            spectral: 0.2,
        }
    }
}

/// Top-level parser configuration (spec.md §6, "Configuration options").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    pub sample_rate: u32,
    pub frame_size: usize,
    pub hop_size: usize,
    pub min_tempo: f64,
    pub max_tempo: f64,
    pub weights: DetectorWeights,
    pub confidence_threshold: f64,
    pub multi_pass_enabled: bool,
    pub genre_adaptive: bool,
    pub enable_preprocessing: bool,
    pub enable_normalization: bool,
    pub enable_filtering: bool,
    pub output_format: OutputFormat,
    pub include_metadata: bool,
    pub include_confidence_scores: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            frame_size: 2048,
            hop_size: 512,
            min_tempo: 60.0,
            max_tempo: 200.0,
            weights: DetectorWeights::default(),
            confidence_threshold: 0.5,
            multi_pass_enabled: true,
            genre_adaptive: true,
            enable_preprocessing: true,
            enable_normalization: true,
            enable_filtering: false,
            output_format: OutputFormat::Json,
            include_metadata: true,
            include_confidence_scores: true,
        }
    }
}

impl ParserConfig {
    /// Validate configuration (spec.md §4.9 step 1).
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(BeatError::InvalidConfiguration(
                "sampleRate must be > 0".to_string(),
            ));
        }
        if !(20.0..=400.0).contains(&self.min_tempo) || !(20.0..=400.0).contains(&self.max_tempo) {
            return Err(BeatError::InvalidConfiguration(
                "minTempo/maxTempo must lie within [20, 400]".to_string(),
            ));
        }
        if self.min_tempo > self.max_tempo {
            return Err(BeatError::InvalidConfiguration(
                "minTempo must be <= maxTempo".to_string(),
            ));
        }
        if self.frame_size < 256 {
            return Err(BeatError::InvalidConfiguration(
                "frameSize must be >= 256".to_string(),
            ));
        }
        if self.hop_size == 0 || self.hop_size > self.frame_size {
            return Err(BeatError::InvalidConfiguration(
                "hopSize must be in (0, frameSize]".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply a partial update, used by `updateConfig` before initialization.
    pub fn merge(&mut self, partial: ConfigPatch) {
        if let Some(v) = partial.sample_rate {
            self.sample_rate = v;
        }
        if let Some(v) = partial.frame_size {
            self.frame_size = v;
        }
        if let Some(v) = partial.hop_size {
            self.hop_size = v;
        }
        if let Some(v) = partial.min_tempo {
            self.min_tempo = v;
        }
        if let Some(v) = partial.max_tempo {
            self.max_tempo = v;
        }
        if let Some(v) = partial.weights {
            self.weights = v;
        }
        if let Some(v) = partial.confidence_threshold {
            self.confidence_threshold = v;
        }
        if let Some(v) = partial.multi_pass_enabled {
            self.multi_pass_enabled = v;
        }
        if let Some(v) = partial.genre_adaptive {
            self.genre_adaptive = v;
        }
    }
}

/// Sparse patch applied via `updateConfig`.
#[derive(Debug, Clone, Default)]
pub struct ConfigPatch {
    pub sample_rate: Option<u32>,
    pub frame_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub min_tempo: Option<f64>,
    pub max_tempo: Option<f64>,
    pub weights: Option<DetectorWeights>,
    pub confidence_threshold: Option<f64>,
    pub multi_pass_enabled: Option<bool>,
    pub genre_adaptive: Option<bool>,
}

/// Per-call overrides (spec.md §6, "Parse options"). These never mutate the
/// frozen `ParserConfig`; they apply for the duration of a single call only
/// (spec.md §9, open question i).
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    pub min_confidence: Option<f64>,
    pub window_size: Option<usize>,
    pub hop_size: Option<usize>,
    pub sample_rate: Option<u32>,
    pub target_picture_count: Option<usize>,
    pub selection_method: Option<SelectionMethod>,
    pub filename: Option<String>,
    pub chunk_size: Option<usize>,
    pub overlap: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(ParserConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_inverted_tempo_range() {
        let mut cfg = ParserConfig::default();
        cfg.min_tempo = 200.0;
        cfg.max_tempo = 60.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_small_frame_size() {
        let mut cfg = ParserConfig::default();
        cfg.frame_size = 64;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_hop_larger_than_frame() {
        let mut cfg = ParserConfig::default();
        cfg.hop_size = cfg.frame_size + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn merge_applies_only_present_fields() {
        let mut cfg = ParserConfig::default();
        let original_frame_size = cfg.frame_size;
        cfg.merge(ConfigPatch {
            min_tempo: Some(70.0),
            ..Default::default()
        });
        assert_eq!(cfg.min_tempo, 70.0);
        assert_eq!(cfg.frame_size, original_frame_size);
    }
}
