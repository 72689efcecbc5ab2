/// Onset detector: spectral-flux novelty curve with local-mean
/// normalization and adaptive peak picking (spec.md §4.3).
use crate::audio::AudioBuffer;
use crate::candidate::{BeatCandidate, Source};
use crate::detectors::{pick_peaks, sigmoid, Detector};
use crate::error::Result;
use crate::signal::fft::real_fft;
use crate::signal::framing::{frame_signal, FrameGrid};
use crate::signal::window::{coefficients, WindowKind};

/// A novelty (onset-strength) curve with enough metadata to convert its
/// frame indices back to seconds. Computed once and reused by the tempo
/// detector (spec.md §4.4: "reuse 4.3's").
#[derive(Debug, Clone)]
pub struct NoveltyCurve {
    pub values: Vec<f32>,
    pub hop_size: usize,
    pub frame_size: usize,
    pub sample_rate: u32,
}

impl NoveltyCurve {
    pub fn time_of(&self, frame_index: usize) -> f64 {
        (frame_index as f64 * self.hop_size as f64 + self.frame_size as f64 / 2.0)
            / self.sample_rate as f64
    }

    pub fn value_at(&self, time: f64) -> f32 {
        let idx = ((time * self.sample_rate as f64 - self.frame_size as f64 / 2.0)
            / self.hop_size as f64)
            .round();
        let idx = idx.max(0.0) as usize;
        self.values.get(idx).copied().unwrap_or(0.0)
    }
}

/// Frequency weighting favoring 50-200 Hz (kick) and 2-8 kHz (snare/hats).
fn log_frequency_emphasis(bin_freq: f32) -> f32 {
    let kick = gaussian_bump(bin_freq, 125.0, 75.0);
    let snare = gaussian_bump(bin_freq, 5000.0, 3000.0);
    1.0 + kick.max(snare)
}

fn gaussian_bump(x: f32, center: f32, width: f32) -> f32 {
    (-((x - center) / width).powi(2)).exp()
}

/// Half-wave-rectified spectral flux, optionally weighted by frequency
/// emphasis, normalized by a local mean over a ~0.5s moving window.
pub fn compute_novelty(
    audio: &AudioBuffer,
    frame_size: usize,
    hop_size: usize,
    emphasize: bool,
) -> Result<NoveltyCurve> {
    let grid = FrameGrid::new(audio.len(), frame_size, hop_size, true)?;
    let frames = frame_signal(audio.samples(), frame_size, hop_size, true)?;
    let window = coefficients(WindowKind::Hann, frame_size);

    let mut raw = vec![0.0f32; grid.count];
    let mut prev_mag: Option<Vec<f32>> = None;

    for (i, frame) in frames.iter().enumerate() {
        let windowed: Vec<f32> = frame.iter().zip(window.iter()).map(|(s, w)| s * w).collect();
        let spectrum = real_fft(&windowed)?;
        let magnitude = spectrum.magnitude();

        if let Some(prev) = &prev_mag {
            let flux: f32 = magnitude
                .iter()
                .zip(prev.iter())
                .enumerate()
                .map(|(k, (&cur, &p))| {
                    let diff = (cur - p).max(0.0);
                    if emphasize {
                        let freq = crate::signal::fft::bin_frequency(k, spectrum.fft_size, audio.sample_rate());
                        diff * log_frequency_emphasis(freq)
                    } else {
                        diff
                    }
                })
                .sum();
            raw[i] = flux;
        }
        prev_mag = Some(magnitude);
    }

    let normalized = local_mean_normalize(&raw, local_window_frames(hop_size, audio.sample_rate()));

    Ok(NoveltyCurve {
        values: normalized,
        hop_size,
        frame_size,
        sample_rate: audio.sample_rate(),
    })
}

fn local_window_frames(hop_size: usize, sample_rate: u32) -> usize {
    let frames_per_half_second = (0.5 * sample_rate as f64 / hop_size as f64).round() as usize;
    frames_per_half_second.max(1)
}

/// Divide each sample by its local mean over a `±window` neighborhood so the
/// detection function is scale-invariant across dynamics changes.
fn local_mean_normalize(values: &[f32], window: usize) -> Vec<f32> {
    let len = values.len();
    (0..len)
        .map(|i| {
            let lo = i.saturating_sub(window);
            let hi = (i + window + 1).min(len);
            let local_mean = values[lo..hi].iter().sum::<f32>() / (hi - lo) as f32;
            if local_mean > 1e-8 {
                values[i] / local_mean
            } else {
                values[i]
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct OnsetConfig {
    pub frame_size: usize,
    pub hop_size: usize,
    pub alpha: f32,
    pub peak_window_ms: f64,
    pub confidence_scale: f64,
    pub emphasize_frequency: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            frame_size: 2048,
            hop_size: 512,
            alpha: 1.5,
            peak_window_ms: 30.0,
            confidence_scale: 1.0,
            emphasize_frequency: true,
        }
    }
}

pub struct OnsetDetector {
    config: OnsetConfig,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        Self { config }
    }
}

impl Detector for OnsetDetector {
    fn detect(&self, audio: &AudioBuffer) -> Result<Vec<BeatCandidate>> {
        let novelty = compute_novelty(
            audio,
            self.config.frame_size,
            self.config.hop_size,
            self.config.emphasize_frequency,
        )?;
        Ok(candidates_from_novelty(&novelty, &self.config))
    }

    fn name(&self) -> &'static str {
        "onset"
    }
}

pub(crate) fn candidates_from_novelty(
    novelty: &NoveltyCurve,
    config: &OnsetConfig,
) -> Vec<BeatCandidate> {
    let frames_per_ms = novelty.sample_rate as f64 / novelty.hop_size as f64 / 1000.0;
    let window = (config.peak_window_ms * frames_per_ms).round() as usize;
    let window = window.max(1);

    let peaks = pick_peaks(&novelty.values, window, config.alpha);

    peaks
        .into_iter()
        .map(|i| {
            let value = novelty.values[i];
            let lo = i.saturating_sub(window);
            let hi = (i + window + 1).min(novelty.values.len());
            let neighborhood = &novelty.values[lo..hi];
            let mean = neighborhood.iter().sum::<f32>() / neighborhood.len() as f32;
            let variance =
                neighborhood.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / neighborhood.len() as f32;
            let threshold = mean + config.alpha * variance.sqrt();

            let confidence = sigmoid(
                (value - threshold) as f64,
                config.confidence_scale.max(1e-6),
            );

            BeatCandidate::new(
                novelty.time_of(i),
                confidence,
                value as f64,
                Source::Onset,
            )
        })
        .collect()
}
