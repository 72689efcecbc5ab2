/// Second-order-section IIR filters, cascaded to whatever order is
/// requested (spec.md §4.1).
use crate::error::{BeatError, Result};

#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

impl BiquadCoeffs {
    /// Validates cutoff in (0, Nyquist).
    fn check_cutoff(sample_rate: f64, cutoff_hz: f64) -> Result<()> {
        let nyquist = sample_rate / 2.0;
        if !(cutoff_hz > 0.0 && cutoff_hz < nyquist) {
            return Err(BeatError::InvalidArgument(format!(
                "cutoff {cutoff_hz} Hz must lie in (0, {nyquist} Hz)"
            )));
        }
        Ok(())
    }

    pub fn lowpass(sample_rate: f64, cutoff_hz: f64, q: f64) -> Result<Self> {
        Self::check_cutoff(sample_rate, cutoff_hz)?;
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 - cos_w0) / 2.0;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) / 2.0;
        Ok(Self::normalize(b0, b1, b2, cos_w0, alpha))
    }

    pub fn highpass(sample_rate: f64, cutoff_hz: f64, q: f64) -> Result<Self> {
        Self::check_cutoff(sample_rate, cutoff_hz)?;
        let w0 = 2.0 * std::f64::consts::PI * cutoff_hz / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 + cos_w0) / 2.0;
        let b1 = -(1.0 + cos_w0);
        let b2 = (1.0 + cos_w0) / 2.0;
        Ok(Self::normalize(b0, b1, b2, cos_w0, alpha))
    }

    /// Band-pass via constant-skirt-gain form; requires a positive
    /// bandwidth in Hz.
    pub fn bandpass(sample_rate: f64, center_hz: f64, bandwidth_hz: f64) -> Result<Self> {
        if bandwidth_hz <= 0.0 {
            return Err(BeatError::InvalidArgument(
                "band-pass bandwidth must be positive".to_string(),
            ));
        }
        Self::check_cutoff(sample_rate, center_hz)?;
        let w0 = 2.0 * std::f64::consts::PI * center_hz / sample_rate;
        let (sin_w0, cos_w0) = w0.sin_cos();
        let q = center_hz / bandwidth_hz;
        let alpha = sin_w0 / (2.0 * q);

        let b0 = alpha;
        let b1 = 0.0;
        let b2 = -alpha;
        Ok(Self::normalize(b0, b1, b2, cos_w0, alpha))
    }

    fn normalize(b0: f64, b1: f64, b2: f64, cos_w0: f64, alpha: f64) -> Self {
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    #[inline]
    fn process_sample(&self, input: f64, state: &mut BiquadState) -> f64 {
        let output = self.b0 * input + state.z1;
        state.z1 = self.b1 * input - self.a1 * output + state.z2;
        state.z2 = self.b2 * input - self.a2 * output;
        output
    }
}

/// A cascade of biquad stages applied in series to a mono signal.
pub struct BiquadCascade {
    coeffs: Vec<BiquadCoeffs>,
    states: Vec<BiquadState>,
}

impl BiquadCascade {
    pub fn new(coeffs: Vec<BiquadCoeffs>) -> Self {
        let states = vec![BiquadState::default(); coeffs.len()];
        Self { coeffs, states }
    }

    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let mut output: Vec<f64> = samples.iter().map(|&s| s as f64).collect();
        for (stage, state) in self.coeffs.iter().zip(self.states.iter_mut()) {
            for sample in output.iter_mut() {
                *sample = stage.process_sample(*sample, state);
            }
        }
        output.into_iter().map(|s| s as f32).collect()
    }

    pub fn reset(&mut self) {
        for state in self.states.iter_mut() {
            *state = BiquadState::default();
        }
    }
}
