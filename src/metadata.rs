/// The top-level result type returned by `parse_buffer`/`parse_stream`,
/// plus the processing metadata attached to it (spec.md §3, §6).
use serde::{Deserialize, Serialize};

use crate::candidate::{Beat, TempoEstimate};
use crate::config::ParserConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetadata {
    pub chunks_processed: usize,
    pub detectors_run: Vec<String>,
    pub genre_adaptive_applied: bool,
    pub multi_pass_applied: bool,
    pub processing_time_ms: f64,
    pub samples_processed: usize,
    pub parameters: ParserConfig,
}

impl Default for ProcessingMetadata {
    fn default() -> Self {
        Self {
            chunks_processed: 1,
            detectors_run: Vec::new(),
            genre_adaptive_applied: false,
            multi_pass_applied: false,
            processing_time_ms: 0.0,
            samples_processed: 0,
            parameters: ParserConfig::default(),
        }
    }
}

/// The result of a single parse (spec.md §3, §6): the selected beats, the
/// tempo estimate that drove selection, an overall confidence (the mean of
/// the final beats' confidence, `0.0` when none survive selection), and
/// optional processing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    pub beats: Vec<Beat>,
    pub tempo: TempoEstimate,
    pub confidence: f64,
    pub metadata: Option<ProcessingMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_metadata_reports_one_chunk() {
        assert_eq!(ProcessingMetadata::default().chunks_processed, 1);
    }

    #[test]
    fn default_metadata_carries_default_parameters() {
        let metadata = ProcessingMetadata::default();
        assert_eq!(metadata.samples_processed, 0);
        assert_eq!(metadata.parameters.sample_rate, ParserConfig::default().sample_rate);
    }
}
