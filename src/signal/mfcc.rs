/// Mel filterbank and MFCC extraction (spec.md §4.1). Not consumed by the
/// hybrid pipeline directly; exposed for callers and plugins.
use crate::signal::fft::real_fft;
use crate::signal::window::{coefficients, WindowKind};

const DEFAULT_COEFFICIENTS: usize = 13;
const DEFAULT_BANDS: usize = 26;

fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// Triangular mel filterbank with `num_bands` filters spanning
/// `[f_min, f_max]`, each row `num_bins` wide (`fft_size / 2 + 1`).
pub fn mel_filterbank(fft_size: usize, sample_rate: u32, num_bands: usize) -> Vec<Vec<f32>> {
    let num_bins = fft_size / 2 + 1;
    let f_min = 0.0f32;
    let f_max = sample_rate as f32 / 2.0;

    let mel_min = hz_to_mel(f_min);
    let mel_max = hz_to_mel(f_max);

    let mel_points: Vec<f32> = (0..=num_bands + 1)
        .map(|i| mel_min + (mel_max - mel_min) * i as f32 / (num_bands + 1) as f32)
        .collect();
    let hz_points: Vec<f32> = mel_points.iter().map(|&m| mel_to_hz(m)).collect();
    let bin_points: Vec<usize> = hz_points
        .iter()
        .map(|&f| ((f / f_max) * (num_bins - 1) as f32).round() as usize)
        .map(|b| b.min(num_bins - 1))
        .collect();

    (0..num_bands)
        .map(|i| {
            let start = bin_points[i];
            let center = bin_points[i + 1];
            let end = bin_points[i + 2];
            let mut filter = vec![0.0f32; num_bins];
            for j in start..center {
                if center > start {
                    filter[j] = (j - start) as f32 / (center - start) as f32;
                }
            }
            for j in center..end {
                if end > center {
                    filter[j] = (end - j) as f32 / (end - center) as f32;
                }
            }
            filter
        })
        .collect()
}

/// MFCC coefficients for a single frame, using `num_bands` mel filters and
/// keeping the first `num_coeffs` DCT-II outputs (defaults K=13, M=26).
pub fn mfcc_frame(frame: &[f32], sample_rate: u32, num_coeffs: usize, num_bands: usize) -> Vec<f32> {
    let window = coefficients(WindowKind::Hann, frame.len());
    let windowed: Vec<f32> = frame.iter().zip(window.iter()).map(|(s, w)| s * w).collect();

    let spectrum = match real_fft(&windowed) {
        Ok(s) => s,
        Err(_) => return vec![0.0; num_coeffs],
    };
    let power = spectrum.power();
    let bank = mel_filterbank(spectrum.fft_size, sample_rate, num_bands);

    let log_energies: Vec<f32> = bank
        .iter()
        .map(|filter| {
            let energy: f32 = filter.iter().zip(power.iter()).map(|(f, p)| f * p).sum();
            (energy + 1e-10).ln()
        })
        .collect();

    dct_ii(&log_energies, num_coeffs)
}

pub fn mfcc(frame: &[f32], sample_rate: u32) -> Vec<f32> {
    mfcc_frame(frame, sample_rate, DEFAULT_COEFFICIENTS, DEFAULT_BANDS)
}

fn dct_ii(input: &[f32], num_coeffs: usize) -> Vec<f32> {
    let n = input.len();
    if n == 0 {
        return vec![0.0; num_coeffs];
    }
    (0..num_coeffs)
        .map(|k| {
            let sum: f64 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| {
                    x as f64 * (std::f64::consts::PI * k as f64 * (2.0 * i as f64 + 1.0) / (2.0 * n as f64)).cos()
                })
                .sum();
            sum as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filterbank_has_requested_band_count() {
        let bank = mel_filterbank(2048, 44_100, DEFAULT_BANDS);
        assert_eq!(bank.len(), DEFAULT_BANDS);
        assert_eq!(bank[0].len(), 2048 / 2 + 1);
    }

    #[test]
    fn mfcc_returns_default_coefficient_count() {
        let frame = vec![0.1f32; 2048];
        let coeffs = mfcc(&frame, 44_100);
        assert_eq!(coeffs.len(), DEFAULT_COEFFICIENTS);
    }

    #[test]
    fn silent_frame_yields_finite_coefficients() {
        let frame = vec![0.0f32; 2048];
        let coeffs = mfcc(&frame, 44_100);
        assert!(coeffs.iter().all(|c| c.is_finite()));
    }
}
