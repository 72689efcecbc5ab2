//! The three peer detectors of spec.md §4.3-§4.5: onset (spectral-flux
//! novelty), tempo/autocorrelation, and band-weighted spectral-flux. All
//! three implement [`Detector`] so the combiner only depends on the
//! capability, not the concrete algorithm (spec.md §9, "Detector
//! polymorphism").

pub mod onset;
pub mod spectral_flux;
pub mod tempo;

use crate::audio::AudioBuffer;
use crate::candidate::BeatCandidate;
use crate::error::Result;

/// Common capability shared by the three detectors.
pub trait Detector {
    /// Run the detector over a prepared, immutable audio buffer and return
    /// its candidates, sorted by timestamp.
    fn detect(&self, audio: &AudioBuffer) -> Result<Vec<BeatCandidate>>;

    fn name(&self) -> &'static str;
}

/// Pick local maxima in `curve` that exceed `local_mean + alpha * local_std`
/// computed over a `±window` neighborhood, itself a local maximum over the
/// same neighborhood (spec.md §4.3 peak-picking rule, reused by §4.5 with a
/// wider neighborhood).
pub(crate) fn pick_peaks(curve: &[f32], window: usize, alpha: f32) -> Vec<usize> {
    let len = curve.len();
    if len < 3 {
        return Vec::new();
    }
    let mut peaks = Vec::new();
    for i in 0..len {
        let lo = i.saturating_sub(window);
        let hi = (i + window + 1).min(len);
        let neighborhood = &curve[lo..hi];

        let mean = neighborhood.iter().sum::<f32>() / neighborhood.len() as f32;
        let variance =
            neighborhood.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / neighborhood.len() as f32;
        let std = variance.sqrt();
        let threshold = mean + alpha * std;

        let is_local_max = neighborhood
            .iter()
            .all(|&v| v <= curve[i] || (v - curve[i]).abs() < f32::EPSILON);

        if curve[i] > threshold && is_local_max && curve[i] > 0.0 {
            peaks.push(i);
        }
    }
    dedupe_adjacent(peaks, curve)
}

/// Collapse runs of adjacent peak indices (plateaus / near-ties within the
/// same neighborhood) down to the strongest one.
fn dedupe_adjacent(peaks: Vec<usize>, curve: &[f32]) -> Vec<usize> {
    if peaks.is_empty() {
        return peaks;
    }
    let mut out = Vec::new();
    let mut run_start = 0;
    for i in 1..=peaks.len() {
        let broke_run = i == peaks.len() || peaks[i] != peaks[i - 1] + 1;
        if broke_run {
            let run = &peaks[run_start..i];
            let best = *run
                .iter()
                .max_by(|&&a, &&b| curve[a].partial_cmp(&curve[b]).unwrap())
                .unwrap();
            out.push(best);
            run_start = i;
        }
    }
    out
}

#[inline]
pub(crate) fn sigmoid(x: f64, scale: f64) -> f64 {
    1.0 / (1.0 + (-x / scale).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_peaks_finds_isolated_spike() {
        let mut curve = vec![0.0f32; 50];
        curve[25] = 1.0;
        let peaks = pick_peaks(&curve, 5, 1.0);
        assert_eq!(peaks, vec![25]);
    }

    #[test]
    fn pick_peaks_collapses_plateau_to_one() {
        let mut curve = vec![0.0f32; 50];
        curve[20] = 1.0;
        curve[21] = 1.0;
        let peaks = pick_peaks(&curve, 5, 1.0);
        assert_eq!(peaks.len(), 1);
    }

    #[test]
    fn pick_peaks_empty_on_flat_curve() {
        let curve = vec![0.5f32; 50];
        let peaks = pick_peaks(&curve, 5, 1.0);
        assert!(peaks.is_empty());
    }

    #[test]
    fn sigmoid_is_monotonic_and_bounded() {
        assert!(sigmoid(-100.0, 1.0) < sigmoid(0.0, 1.0));
        assert!(sigmoid(0.0, 1.0) < sigmoid(100.0, 1.0));
        assert!(sigmoid(100.0, 1.0) <= 1.0);
        assert!(sigmoid(-100.0, 1.0) >= 0.0);
    }
}
