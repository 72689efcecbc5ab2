//! Signal primitives: windowing, FFT, framing, IIR filters, MFCC.
//!
//! These are consumed directly by the detectors in [`crate::detectors`] and
//! are otherwise exposed for callers and plugins that need raw DSP building
//! blocks.

pub mod biquad;
pub mod fft;
pub mod framing;
pub mod mfcc;
pub mod window;
