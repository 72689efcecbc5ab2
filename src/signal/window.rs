/// Named analysis windows (spec.md §4.1).
use crate::error::{BeatError, Result};
use std::f64::consts::PI;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    Hann,
    Hamming,
    Blackman,
    Rectangular,
}

impl WindowKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hann" => Ok(Self::Hann),
            "hamming" => Ok(Self::Hamming),
            "blackman" => Ok(Self::Blackman),
            "rectangular" | "rect" | "none" => Ok(Self::Rectangular),
            other => Err(BeatError::InvalidArgument(format!(
                "Unknown window name: {other}"
            ))),
        }
    }
}

/// Generate a length-`n` coefficient sequence for `kind`.
pub fn coefficients(kind: WindowKind, n: usize) -> Vec<f32> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| {
            let phase = 2.0 * PI * i as f64 / denom;
            let w = match kind {
                WindowKind::Hann => 0.5 * (1.0 - phase.cos()),
                WindowKind::Hamming => 0.54 - 0.46 * phase.cos(),
                WindowKind::Blackman => {
                    0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos()
                }
                WindowKind::Rectangular => 1.0,
            };
            w as f32
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangular_window_is_identity() {
        let w = coefficients(WindowKind::Rectangular, 8);
        assert!(w.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn hann_window_is_symmetric_and_edges_near_zero() {
        let w = coefficients(WindowKind::Hann, 9);
        assert!((w[0]).abs() < 1e-6);
        assert!((w[8]).abs() < 1e-6);
        assert!((w[0] - w[8]).abs() < 1e-6);
        assert!((w[1] - w[7]).abs() < 1e-6);
    }

    #[test]
    fn unknown_window_name_is_invalid_argument() {
        let err = WindowKind::from_name("triangular").unwrap_err();
        assert!(matches!(err, BeatError::InvalidArgument(_)));
    }

    #[test]
    fn window_name_parsing_is_case_insensitive() {
        assert_eq!(WindowKind::from_name("HANN").unwrap(), WindowKind::Hann);
    }
}
