/// Multi-pass genre-adaptive refinement (spec.md §4.7): derives a coarse
/// genre hint from the audio and the combiner's initial output, maps it to a
/// parameter preset, re-runs the combiner over the raw per-detector
/// candidates with that preset, and keeps whichever result has the higher
/// mean confidence.
use crate::audio::AudioBuffer;
use crate::candidate::{BeatCandidate, TempoEstimate};
use crate::combiner::{combine, CombinerConfig};
use crate::config::DetectorWeights;
use crate::signal::fft::{bin_frequency, real_fft};
use crate::signal::framing::frame_signal;
use crate::signal::window::{coefficients, WindowKind};

/// One of nine coarse genre hints used only to bias refinement parameters,
/// never surfaced as a classification result in its own right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreHint {
    Electronic,
    HipHop,
    Rock,
    Metal,
    Pop,
    Jazz,
    Classical,
    Folk,
    Ambient,
}

/// Coarse descriptors computed once per call and fed to [`classify_genre`].
#[derive(Debug, Clone, Copy)]
pub struct GenreDescriptors {
    pub tempo_stability: f64,
    pub percussive_energy_ratio: f64,
    pub spectral_centroid_mean: f64,
    pub ibi_coefficient_of_variation: f64,
}

pub fn compute_descriptors(audio: &AudioBuffer, beats: &[BeatCandidate], tempo: &TempoEstimate) -> GenreDescriptors {
    GenreDescriptors {
        tempo_stability: tempo.stability,
        percussive_energy_ratio: percussive_energy_ratio(audio),
        spectral_centroid_mean: spectral_centroid_mean(audio),
        ibi_coefficient_of_variation: ibi_coefficient_of_variation(beats),
    }
}

fn percussive_energy_ratio(audio: &AudioBuffer) -> f64 {
    let samples = audio.samples();
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples.iter().map(|&s| (s as f64).powi(2)).sum();
    if total < 1e-12 {
        return 0.0;
    }
    // Crest-factor proxy: percussive material has sparse high-amplitude
    // transients against a low RMS floor.
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs())) as f64;
    let rms = (total / samples.len() as f64).sqrt();
    if rms < 1e-9 {
        0.0
    } else {
        (peak / rms / 10.0).min(1.0)
    }
}

fn spectral_centroid_mean(audio: &AudioBuffer) -> f64 {
    let frame_size = 2048usize.min(audio.len().max(1));
    if frame_size < 4 {
        return 0.0;
    }
    let frames = match frame_signal(audio.samples(), frame_size, frame_size, true) {
        Ok(f) => f,
        Err(_) => return 0.0,
    };
    let window = coefficients(WindowKind::Hann, frame_size);

    let mut total = 0.0;
    let mut count = 0usize;
    for frame in &frames {
        let windowed: Vec<f32> = frame.iter().zip(window.iter()).map(|(s, w)| s * w).collect();
        let spectrum = match real_fft(&windowed) {
            Ok(s) => s,
            Err(_) => continue,
        };
        let magnitude = spectrum.magnitude();
        let energy: f32 = magnitude.iter().sum();
        if energy < 1e-9 {
            continue;
        }
        let weighted: f32 = magnitude
            .iter()
            .enumerate()
            .map(|(k, &m)| bin_frequency(k, spectrum.fft_size, audio.sample_rate()) * m)
            .sum();
        total += (weighted / energy) as f64;
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn ibi_coefficient_of_variation(beats: &[BeatCandidate]) -> f64 {
    if beats.len() < 3 {
        return 0.0;
    }
    let intervals: Vec<f64> = beats.windows(2).map(|w| w[1].timestamp - w[0].timestamp).collect();
    let mean = intervals.iter().sum::<f64>() / intervals.len() as f64;
    if mean < 1e-9 {
        return 0.0;
    }
    let variance = intervals.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / intervals.len() as f64;
    variance.sqrt() / mean
}

/// Genre-hint thresholds over the four coarse descriptors. Not derived from
/// any labeled corpus; these are a deliberately simple decision tree meant
/// only to bias refinement aggressiveness, recorded in DESIGN.md.
pub fn classify_genre(descriptors: &GenreDescriptors) -> GenreHint {
    let d = descriptors;
    if d.percussive_energy_ratio > 0.75 && d.tempo_stability > 0.7 {
        if d.spectral_centroid_mean > 4000.0 {
            return GenreHint::Electronic;
        }
        return GenreHint::HipHop;
    }
    if d.percussive_energy_ratio > 0.6 && d.spectral_centroid_mean > 3500.0 {
        return GenreHint::Metal;
    }
    if d.percussive_energy_ratio > 0.5 && d.tempo_stability > 0.5 {
        return GenreHint::Rock;
    }
    if d.tempo_stability > 0.6 && d.ibi_coefficient_of_variation < 0.1 {
        return GenreHint::Pop;
    }
    if d.ibi_coefficient_of_variation > 0.35 && d.spectral_centroid_mean > 1500.0 {
        return GenreHint::Jazz;
    }
    if d.ibi_coefficient_of_variation > 0.45 {
        return GenreHint::Classical;
    }
    if d.percussive_energy_ratio < 0.2 && d.spectral_centroid_mean < 1000.0 {
        return GenreHint::Ambient;
    }
    GenreHint::Folk
}

/// Combiner parameters derived from a genre hint (spec.md §4.7 step 3).
#[derive(Debug, Clone, Copy)]
pub struct GenrePreset {
    pub weights: DetectorWeights,
    pub cluster_tolerance: f64,
    pub confidence_threshold: f64,
    pub preferred_bpm_window: (f64, f64),
}

fn preset_for(hint: GenreHint) -> GenrePreset {
    match hint {
        GenreHint::Electronic | GenreHint::HipHop => GenrePreset {
            weights: DetectorWeights {
                onset: 0.35,
                tempo: 0.45,
                spectral: 0.2,
            },
            cluster_tolerance: 0.04,
            confidence_threshold: 0.5,
            preferred_bpm_window: (110.0, 140.0),
        },
        GenreHint::Pop | GenreHint::Rock => GenrePreset {
            weights: DetectorWeights {
                onset: 0.4,
                tempo: 0.4,
                spectral: 0.2,
            },
            cluster_tolerance: 0.05,
            confidence_threshold: 0.5,
            preferred_bpm_window: (90.0, 130.0),
        },
        GenreHint::Metal => GenrePreset {
            weights: DetectorWeights {
                onset: 0.5,
                tempo: 0.3,
                spectral: 0.2,
            },
            cluster_tolerance: 0.045,
            confidence_threshold: 0.45,
            preferred_bpm_window: (100.0, 180.0),
        },
        GenreHint::Jazz | GenreHint::Folk => GenrePreset {
            weights: DetectorWeights {
                onset: 0.3,
                tempo: 0.3,
                spectral: 0.4,
            },
            cluster_tolerance: 0.07,
            confidence_threshold: 0.4,
            preferred_bpm_window: (70.0, 140.0),
        },
        GenreHint::Classical | GenreHint::Ambient => GenrePreset {
            weights: DetectorWeights {
                onset: 0.25,
                tempo: 0.25,
                spectral: 0.5,
            },
            cluster_tolerance: 0.08,
            confidence_threshold: 0.35,
            preferred_bpm_window: (50.0, 120.0),
        },
    }
}

/// Preset used when genre adaptation is disabled: mirrors the caller's own
/// detector weights and the base combiner config it already ran with, so a
/// disabled second pass can't drift from the first pass's tuning.
fn neutral_preset(weights: &DetectorWeights, base: &CombinerConfig) -> GenrePreset {
    GenrePreset {
        weights: *weights,
        cluster_tolerance: base.cluster_tolerance,
        confidence_threshold: base.confidence_threshold,
        preferred_bpm_window: (0.0, 0.0),
    }
}

fn mean_confidence(beats: &[BeatCandidate]) -> f64 {
    if beats.is_empty() {
        return 0.0;
    }
    beats.iter().map(|b| b.confidence).sum::<f64>() / beats.len() as f64
}

/// Run the multi-pass refiner (spec.md §4.7 steps 2-5): classify a genre
/// hint from the initial combined beats (skipped, falling back to a neutral
/// preset, when `genre_adaptive` is false), re-run the combiner over the raw
/// per-detector candidates with the hint's preset, and keep the refined set
/// only if its mean confidence is at least the initial set's.
pub fn refine(
    raw_candidates: &[BeatCandidate],
    initial_combined: &[BeatCandidate],
    audio: &AudioBuffer,
    tempo: &TempoEstimate,
    base_weights: &DetectorWeights,
    base_combiner_config: &CombinerConfig,
    genre_adaptive: bool,
) -> Vec<BeatCandidate> {
    if initial_combined.len() < 3 {
        return initial_combined.to_vec();
    }

    let preset = if genre_adaptive {
        let descriptors = compute_descriptors(audio, initial_combined, tempo);
        preset_for(classify_genre(&descriptors))
    } else {
        neutral_preset(base_weights, base_combiner_config)
    };

    let combiner_config = CombinerConfig {
        cluster_tolerance: preset.cluster_tolerance,
        confidence_threshold: preset.confidence_threshold,
        ..*base_combiner_config
    };

    let refined = combine(raw_candidates.to_vec(), &preset.weights, &combiner_config);

    if mean_confidence(&refined) >= mean_confidence(initial_combined) {
        refined
    } else {
        initial_combined.to_vec()
    }
}
