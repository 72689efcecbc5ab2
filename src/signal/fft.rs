/// Real-to-complex FFT and the magnitude/power spectra derived from it
/// (spec.md §4.1). Non-power-of-two inputs succeed by zero-padding up to
/// the next power of two internally.
use num_complex::Complex32;
use rustfft::FftPlanner;

use crate::error::{BeatError, Result};

/// Half-spectrum (`N/2 + 1` bins) of a single windowed frame.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub bins: Vec<Complex32>,
    pub fft_size: usize,
}

impl Spectrum {
    pub fn magnitude(&self) -> Vec<f32> {
        self.bins.iter().map(|c| c.norm()).collect()
    }

    pub fn power(&self) -> Vec<f32> {
        self.bins.iter().map(|c| c.norm_sqr()).collect()
    }
}

fn next_power_of_two(n: usize) -> usize {
    n.next_power_of_two()
}

/// Compute the half-spectrum of a real-valued frame. `frame.len()` need not
/// be a power of two or match any particular FFT size; the input is
/// zero-padded up to the next power of two, with a floor of 4.
pub fn real_fft(frame: &[f32]) -> Result<Spectrum> {
    if frame.is_empty() {
        return Err(BeatError::InvalidArgument(
            "Cannot compute FFT of an empty frame".to_string(),
        ));
    }
    let fft_size = next_power_of_two(frame.len()).max(4);

    let mut buffer: Vec<Complex32> = frame
        .iter()
        .map(|&s| Complex32::new(s, 0.0))
        .chain(std::iter::repeat(Complex32::new(0.0, 0.0)))
        .take(fft_size)
        .collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_size);
    fft.process(&mut buffer);

    let half = fft_size / 2 + 1;
    Ok(Spectrum {
        bins: buffer.into_iter().take(half).collect(),
        fft_size,
    })
}

/// Frequency (Hz) of bin `k` out of a spectrum computed with `fft_size`.
pub fn bin_frequency(k: usize, fft_size: usize, sample_rate: u32) -> f32 {
    (k as f32 * sample_rate as f32) / fft_size as f32
}
