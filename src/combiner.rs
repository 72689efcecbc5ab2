/// Hybrid combiner: clusters candidates from the three detectors that fall
/// within a temporal tolerance of each other, fuses each cluster into a
/// single candidate using confidence- and source-weighted averaging, and
/// rewards multi-detector agreement with a consensus bonus (spec.md §4.6).
use crate::candidate::{BeatCandidate, CandidateMetadata, Source};
use crate::config::DetectorWeights;

#[derive(Debug, Clone, Copy)]
pub struct CombinerConfig {
    /// Candidates within this many seconds of each other are clustered
    /// together.
    pub cluster_tolerance: f64,
    /// Confidence bonus applied per additional distinct source agreeing
    /// within a cluster, capped at `max_consensus_bonus`.
    pub consensus_bonus_per_source: f64,
    pub max_consensus_bonus: f64,
    pub confidence_threshold: f64,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            cluster_tolerance: 0.05,
            consensus_bonus_per_source: 0.1,
            max_consensus_bonus: 0.2,
            confidence_threshold: 0.5,
        }
    }
}

impl CombinerConfig {
    /// Default tolerance, widened from 50ms to 70ms when the tempo estimate
    /// driving this combine pass is unstable (spec.md §4.6 step 2).
    pub fn for_tempo_stability(stability: f64, confidence_threshold: f64) -> Self {
        Self {
            cluster_tolerance: if stability < 0.3 { 0.07 } else { 0.05 },
            confidence_threshold,
            ..Self::default()
        }
    }
}

fn source_weight(source: Source, weights: &DetectorWeights) -> f64 {
    match source {
        Source::Onset => weights.onset,
        Source::Tempo => weights.tempo,
        Source::Flux => weights.spectral,
        Source::Combined => 1.0,
    }
}

/// Combine candidates from all detectors into a single confidence-ranked,
/// time-ordered list, dropping clusters whose fused confidence falls below
/// `config.confidence_threshold`.
pub fn combine(
    mut candidates: Vec<BeatCandidate>,
    weights: &DetectorWeights,
    config: &CombinerConfig,
) -> Vec<BeatCandidate> {
    candidates.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());

    let clusters = cluster(&candidates, config.cluster_tolerance);

    let mut combined: Vec<BeatCandidate> = clusters
        .into_iter()
        .map(|cluster| fuse_cluster(cluster, weights, config))
        .filter(|c| c.confidence >= config.confidence_threshold)
        .collect();

    // Tie-break: when fused clusters land at (near-)identical timestamps
    // after fusion, keep only the higher-confidence one (spec.md §4.6,
    // "tie-break rules").
    combined.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());
    dedupe_by_timestamp(combined, config.cluster_tolerance)
}

/// Greedy chained clustering: a new candidate joins the current cluster if
/// it lies within `tolerance` of the cluster's most recent member.
fn cluster(candidates: &[BeatCandidate], tolerance: f64) -> Vec<Vec<BeatCandidate>> {
    let mut clusters: Vec<Vec<BeatCandidate>> = Vec::new();
    for candidate in candidates {
        match clusters.last_mut() {
            Some(current) if candidate.timestamp - current.last().unwrap().timestamp <= tolerance => {
                current.push(candidate.clone());
            }
            _ => clusters.push(vec![candidate.clone()]),
        }
    }
    clusters
}

fn fuse_cluster(
    cluster: Vec<BeatCandidate>,
    weights: &DetectorWeights,
    config: &CombinerConfig,
) -> BeatCandidate {
    let mut distinct_sources = std::collections::HashSet::new();
    let mut weighted_time_sum = 0.0;
    let mut weighted_confidence_sum = 0.0;
    let mut weight_sum = 0.0;
    let mut strength_sum = 0.0;
    let mut band_energies: Option<Vec<f32>> = None;
    let mut spectral_centroid: Option<f32> = None;

    for candidate in &cluster {
        let w = source_weight(candidate.source, weights) * candidate.confidence;
        weighted_time_sum += candidate.timestamp * w;
        weighted_confidence_sum += candidate.confidence * source_weight(candidate.source, weights);
        weight_sum += w.max(1e-9);
        strength_sum += candidate.strength;
        distinct_sources.insert(candidate.source);
        if candidate.metadata.band_energies.is_some() {
            band_energies = candidate.metadata.band_energies.clone();
        }
        if candidate.metadata.spectral_centroid.is_some() {
            spectral_centroid = candidate.metadata.spectral_centroid;
        }
    }

    let weight_norm: f64 = cluster
        .iter()
        .map(|c| source_weight(c.source, weights))
        .sum::<f64>()
        .max(1e-9);

    let timestamp = if weight_sum > 1e-9 {
        weighted_time_sum / weight_sum
    } else {
        cluster[0].timestamp
    };

    let base_confidence = weighted_confidence_sum / weight_norm;
    let consensus_bonus = (config.consensus_bonus_per_source
        * (distinct_sources.len().saturating_sub(1)) as f64)
        .min(config.max_consensus_bonus);

    let mut fused = BeatCandidate::new(
        timestamp,
        base_confidence + consensus_bonus,
        strength_sum / cluster.len() as f64,
        Source::Combined,
    );
    fused.metadata = CandidateMetadata {
        spectral_centroid,
        band_energies,
    };
    fused
}

/// Collapse near-duplicate timestamps that survive clustering (can happen
/// at cluster boundaries), keeping the higher-confidence candidate and, on
/// an exact confidence tie, the earlier timestamp.
fn dedupe_by_timestamp(candidates: Vec<BeatCandidate>, tolerance: f64) -> Vec<BeatCandidate> {
    let mut out: Vec<BeatCandidate> = Vec::new();
    for candidate in candidates {
        if let Some(last) = out.last_mut() {
            if candidate.timestamp - last.timestamp <= tolerance {
                if candidate.confidence > last.confidence {
                    *last = candidate;
                }
                continue;
            }
        }
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(timestamp: f64, confidence: f64, source: Source) -> BeatCandidate {
        BeatCandidate::new(timestamp, confidence, 1.0, source)
    }

    #[test]
    fn clusters_nearby_candidates_across_sources() {
        let candidates = vec![
            candidate(1.00, 0.8, Source::Onset),
            candidate(1.02, 0.6, Source::Flux),
            candidate(1.03, 0.5, Source::Tempo),
            candidate(5.00, 0.9, Source::Onset),
        ];
        let combined = combine(candidates, &DetectorWeights::default(), &CombinerConfig::default());
        assert_eq!(combined.len(), 2);
        assert!(combined[0].confidence > 0.8); // consensus bonus applied
    }

    #[test]
    fn isolated_single_source_candidate_gets_no_consensus_bonus() {
        let candidates = vec![candidate(1.0, 0.6, Source::Onset)];
        let combined = combine(
            candidates,
            &DetectorWeights::default(),
            &CombinerConfig {
                confidence_threshold: 0.0,
                ..CombinerConfig::default()
            },
        );
        assert_eq!(combined.len(), 1);
        assert!((combined[0].confidence - 0.6).abs() < 1e-9);
    }

    #[test]
    fn drops_clusters_below_confidence_threshold() {
        let candidates = vec![candidate(1.0, 0.1, Source::Onset)];
        let combined = combine(candidates, &DetectorWeights::default(), &CombinerConfig::default());
        assert!(combined.is_empty());
    }

    #[test]
    fn widens_tolerance_for_low_tempo_stability() {
        let stable = CombinerConfig::for_tempo_stability(0.8, 0.5);
        let unstable = CombinerConfig::for_tempo_stability(0.1, 0.5);
        assert_eq!(stable.cluster_tolerance, 0.05);
        assert_eq!(unstable.cluster_tolerance, 0.07);
    }

    #[test]
    fn output_is_sorted_by_timestamp() {
        let candidates = vec![
            candidate(3.0, 0.9, Source::Onset),
            candidate(1.0, 0.9, Source::Tempo),
            candidate(2.0, 0.9, Source::Flux),
        ];
        let combined = combine(
            candidates,
            &DetectorWeights::default(),
            &CombinerConfig {
                confidence_threshold: 0.0,
                ..CombinerConfig::default()
            },
        );
        let timestamps: Vec<f64> = combined.iter().map(|c| c.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(timestamps, sorted);
    }
}
