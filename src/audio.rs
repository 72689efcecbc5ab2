/// Audio preparation: downmix, resample, normalize, optional pre-filter,
/// and the validation gate described in spec.md §4.2.
use crate::error::{BeatError, Result};
use crate::signal::biquad::{BiquadCascade, BiquadCoeffs};

/// Mono audio at the pipeline sample rate, owned for the duration of a
/// single `parse_buffer`/`parse_stream` call (spec.md §3, "Ownership").
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Wrap already-mono, already-validated samples. Used internally by
    /// `prepare` once all checks have passed.
    fn new_unchecked(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Raw, possibly multi-channel, possibly-wrong-rate input handed to
/// `prepare`. Construction from a file/container is an external
/// collaborator's job (spec.md §1); this type is the interface boundary.
#[derive(Debug, Clone)]
pub struct RawAudio {
    pub interleaved: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Preparation knobs, mirrored from `ParserConfig` so `prepare` doesn't need
/// the whole config struct.
#[derive(Debug, Clone, Copy)]
pub struct PreparationConfig {
    pub target_sample_rate: u32,
    pub frame_size: usize,
    pub normalize: bool,
    pub pre_filter: bool,
}

/// Validate, downmix, resample and normalize raw audio into an
/// `AudioBuffer` at `config.target_sample_rate` (spec.md §4.2).
pub fn prepare(raw: &RawAudio, config: &PreparationConfig) -> Result<AudioBuffer> {
    validate_raw(raw, config.frame_size)?;

    let mono = downmix(&raw.interleaved, raw.channels.max(1) as usize);
    let resampled = if raw.sample_rate != config.target_sample_rate {
        resample_linear(&mono, raw.sample_rate, config.target_sample_rate)
    } else {
        mono
    };

    let mut prepared = resampled;
    if config.normalize {
        normalize_peak(&mut prepared);
    }
    if config.pre_filter {
        prepared = apply_percussive_bandpass(&prepared, config.target_sample_rate)?;
    }

    Ok(AudioBuffer::new_unchecked(
        prepared,
        config.target_sample_rate,
    ))
}

/// Idempotence (spec.md §8, universal invariant 4): running `prepare` again
/// on an already-prepared mono buffer at the target rate is a no-op aside
/// from re-applying normalization, which is itself idempotent (peak <= 1.0
/// stays <= 1.0).
pub fn prepare_buffer(buffer: &AudioBuffer, config: &PreparationConfig) -> Result<AudioBuffer> {
    let raw = RawAudio {
        interleaved: buffer.samples.clone(),
        sample_rate: buffer.sample_rate,
        channels: 1,
    };
    prepare(&raw, config)
}

fn validate_raw(raw: &RawAudio, frame_size: usize) -> Result<()> {
    if raw.interleaved.is_empty() {
        return Err(BeatError::InvalidArgument("Audio data is empty".to_string()));
    }
    if !raw.interleaved.iter().all(|s| s.is_finite()) {
        return Err(BeatError::InvalidArgument(
            "Audio data contains invalid values".to_string(),
        ));
    }
    let channels = raw.channels.max(1) as usize;
    let frame_count = raw.interleaved.len() / channels;
    if frame_count < frame_size {
        return Err(BeatError::InvalidArgument(format!(
            "Audio is too short: {frame_count} samples, need at least {frame_size}"
        )));
    }
    Ok(())
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampling. The spec explicitly does not mandate
/// polyphase resampling (spec.md §4.2).
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if samples.is_empty() || from_rate == to_rate {
        return samples.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((samples.len() as f64) * ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src_pos = i as f64 / ratio;
        let idx = src_pos.floor() as usize;
        let frac = (src_pos - idx as f64) as f32;
        let a = samples.get(idx).copied().unwrap_or(0.0);
        let b = samples.get(idx + 1).copied().unwrap_or(a);
        out.push(a + (b - a) * frac);
    }
    out
}

/// Normalize peak to 1.0; silent buffers (peak < 1e-6) are left untouched
/// (spec.md §4.2).
fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak < 1e-6 {
        return;
    }
    let gain = 1.0 / peak;
    for s in samples.iter_mut() {
        *s *= gain;
    }
}

/// Percussive-content pre-filter: a band-pass tuned to 30-8000 Hz
/// (spec.md §4.2). Propagates `InvalidArgument` rather than panicking when
/// `target_sample_rate` puts the fixed 8 kHz cutoff at or above Nyquist
/// (e.g. a configured rate below 16 kHz).
fn apply_percussive_bandpass(samples: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
    let low = BiquadCoeffs::highpass(sample_rate as f64, 30.0, 0.707)?;
    let high = BiquadCoeffs::lowpass(sample_rate as f64, 8000.0, 0.707)?;
    let mut cascade = BiquadCascade::new(vec![low, high]);
    Ok(cascade.process(samples))
}

/// Already-decoded audio handed in by an external collaborator (e.g. a
/// `symphonia`-based loader), shaped after
/// `fingerprint-server/src/audio/loader.rs::AudioData`. A thin conversion
/// into `RawAudio`, the boundary type `prepare` consumes — decoding itself
/// stays out of this crate's scope (spec.md §1).
#[derive(Debug, Clone)]
pub struct AudioSource {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl From<AudioSource> for RawAudio {
    fn from(source: AudioSource) -> Self {
        RawAudio {
            interleaved: source.samples.iter().map(|&s| s as f32).collect(),
            sample_rate: source.sample_rate,
            channels: source.channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_mono(samples: Vec<f32>, sample_rate: u32) -> RawAudio {
        RawAudio {
            interleaved: samples,
            sample_rate,
            channels: 1,
        }
    }

    fn prep_config() -> PreparationConfig {
        PreparationConfig {
            target_sample_rate: 44_100,
            frame_size: 256,
            normalize: true,
            pre_filter: false,
        }
    }

    #[test]
    fn rejects_empty_audio() {
        let raw = raw_mono(vec![], 44_100);
        let err = prepare(&raw, &prep_config()).unwrap_err();
        assert!(matches!(err, BeatError::InvalidArgument(_)));
    }

    #[test]
    fn rejects_non_finite_samples() {
        let mut samples = vec![0.0f32; 4096];
        samples[1024] = f32::NAN;
        let raw = raw_mono(samples, 44_100);
        let err = prepare(&raw, &prep_config()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid argument: Audio data contains invalid values"
        );
    }

    #[test]
    fn rejects_too_short_audio() {
        let raw = raw_mono(vec![0.1; 10], 44_100);
        let err = prepare(&raw, &prep_config()).unwrap_err();
        assert!(matches!(err, BeatError::InvalidArgument(_)));
    }

    #[test]
    fn downmixes_stereo_by_averaging() {
        let interleaved = vec![1.0, -1.0, 0.5, 0.5];
        let mono = downmix(&interleaved, 2);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn normalizes_peak_to_one() {
        let mut samples = vec![0.0, 0.25, -0.5, 0.1];
        normalize_peak(&mut samples);
        let peak = samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
    }

    #[test]
    fn skips_normalizing_silent_buffer() {
        let mut samples = vec![0.0; 100];
        normalize_peak(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn prepare_is_idempotent_on_mono_same_rate() {
        let raw = raw_mono(vec![0.2; 4096], 44_100);
        let config = prep_config();
        let once = prepare(&raw, &config).unwrap();
        let twice = prepare_buffer(&once, &config).unwrap();
        assert_eq!(once.samples().len(), twice.samples().len());
        assert_eq!(once.sample_rate(), twice.sample_rate());
    }

    #[test]
    fn percussive_bandpass_rejects_cutoff_above_nyquist_instead_of_panicking() {
        let raw = raw_mono(vec![0.3; 4096], 8000);
        let config = PreparationConfig {
            target_sample_rate: 8000,
            frame_size: 256,
            normalize: false,
            pre_filter: true,
        };
        let err = prepare(&raw, &config).unwrap_err();
        assert!(matches!(err, BeatError::InvalidArgument(_)));
    }

    #[test]
    fn audio_source_converts_f64_samples_into_raw_audio() {
        let source = AudioSource {
            samples: vec![0.5, -0.5, 0.25],
            sample_rate: 44_100,
            channels: 1,
        };
        let raw: RawAudio = source.into();
        assert_eq!(raw.interleaved, vec![0.5f32, -0.5, 0.25]);
        assert_eq!(raw.sample_rate, 44_100);
    }
}
