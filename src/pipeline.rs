/// The top-level orchestrator: validates config and input, prepares audio,
/// fans the three detectors out in parallel, combines, refines and
/// selects (spec.md §4.9). Patterned on `fingerprint-server`'s
/// handler/analyzer split — a thin async entrypoint that hands the
/// CPU-bound work to a blocking pool, `rayon::join` fanning out the
/// detectors within it.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::audio::{prepare, AudioBuffer, PreparationConfig, RawAudio};
use crate::candidate::{BeatCandidate, TempoEstimate};
use crate::combiner::{combine, CombinerConfig};
use crate::config::{ConfigPatch, ParseOptions, ParserConfig, SelectionMethod};
use crate::detectors::onset::{OnsetConfig, OnsetDetector};
use crate::detectors::spectral_flux::{SpectralFluxConfig, SpectralFluxDetector};
use crate::detectors::tempo::{TempoConfig, TempoDetector};
use crate::detectors::Detector;
use crate::error::{BeatError, Result};
use crate::metadata::{ParseResult, ProcessingMetadata};
use crate::plugin::{Plugin, PluginRegistry};
use crate::refiner::refine;
use crate::selector::select;

pub const VERSION: &str = "0.1.0";
const SUPPORTED_FORMATS: &[&str] = &["pcm_f32", "pcm_s16", "pcm_s32"];

/// Cooperative cancellation flag checked at detector/combiner/refiner
/// boundaries (spec.md §5). Not a full `tokio-util` `CancellationToken`:
/// the pipeline only needs a shared bool, so it doesn't pull in the crate.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The crate's top-level type: owns a frozen-on-use configuration and an
/// ordered plugin registry, and drives a single parse from raw audio to a
/// ranked beat list.
pub struct BeatParser {
    config: ParserConfig,
    plugins: PluginRegistry,
    initialized: bool,
}

impl BeatParser {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            config,
            plugins: PluginRegistry::new(),
            initialized: false,
        }
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Apply a partial configuration update. Rejected once the parser has
    /// been initialized (spec.md §9, configuration immutability).
    pub fn update_config(&mut self, patch: ConfigPatch) -> Result<()> {
        if self.initialized {
            return Err(BeatError::AlreadyInitialized);
        }
        self.config.merge(patch);
        self.config.validate()
    }

    pub fn add_plugin(&mut self, plugin: Box<dyn Plugin>) -> Result<()> {
        self.plugins.add(plugin)
    }

    pub fn remove_plugin(&mut self, name: &str) -> Result<()> {
        self.plugins.remove(name)
    }

    pub fn list_plugins(&self) -> Vec<&str> {
        self.plugins.list()
    }

    /// Validate configuration, run every plugin's `init`, and freeze both
    /// against further mutation (spec.md §4.9 step 1).
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Err(BeatError::AlreadyInitialized);
        }
        self.config.validate()?;
        self.plugins.initialize()?;
        self.initialized = true;
        debug!("beat parser initialized");
        Ok(())
    }

    pub fn cleanup(&mut self) {
        self.plugins.cleanup();
        self.initialized = false;
    }

    pub fn version() -> &'static str {
        VERSION
    }

    pub fn supported_formats() -> &'static [&'static str] {
        SUPPORTED_FORMATS
    }

    /// Parse a single in-memory buffer end-to-end (spec.md §4.9): validate
    /// input, prepare audio, run the pre-plugin hook, fan the detectors
    /// out, combine, refine, run the post-plugin hook, then select down to
    /// `target_picture_count` beats.
    pub async fn parse_buffer(
        &mut self,
        raw: RawAudio,
        options: ParseOptions,
        cancellation: CancellationToken,
    ) -> Result<ParseResult> {
        if !self.initialized {
            self.initialize()?;
        }
        self.config.validate()?;

        let config = self.config.clone();
        let prep = PreparationConfig {
            target_sample_rate: options.sample_rate.unwrap_or(config.sample_rate),
            frame_size: options.window_size.unwrap_or(config.frame_size),
            normalize: config.enable_normalization,
            pre_filter: config.enable_filtering,
        };

        let start = Instant::now();
        let audio = prepare(&raw, &prep)?;
        let audio = self.plugins.run_prepare(audio)?;

        if cancellation.is_cancelled() {
            return Err(BeatError::Cancelled);
        }

        let detector_config = DetectorRunConfig::from_options(&config, &options, &prep);
        let (audio, raw_candidates, detectors_run, tempo) = tokio::task::spawn_blocking(move || -> Result<_> {
            let (candidates, ran, tempo) = run_detectors(&audio, &detector_config)?;
            Ok((audio, candidates, ran, tempo))
        })
        .await
        .map_err(|e| BeatError::InvalidArgument(format!("detector task panicked: {e}")))??;

        if cancellation.is_cancelled() {
            return Err(BeatError::Cancelled);
        }

        let combiner_config = CombinerConfig::for_tempo_stability(
            tempo.stability,
            options.min_confidence.unwrap_or(config.confidence_threshold),
        );
        let combined = combine(raw_candidates.clone(), &config.weights, &combiner_config);

        let (refined_beats, multi_pass_applied) = if config.multi_pass_enabled {
            let beats = refine(
                &raw_candidates,
                &combined,
                &audio,
                &tempo,
                &config.weights,
                &combiner_config,
                config.genre_adaptive,
            );
            (beats, true)
        } else {
            (combined, false)
        };

        if cancellation.is_cancelled() {
            return Err(BeatError::Cancelled);
        }

        let post_processed = self.plugins.run_post_process(refined_beats)?;

        let target_count = options.target_picture_count.unwrap_or(usize::MAX);
        let method = options.selection_method.unwrap_or(SelectionMethod::Adaptive);
        let selection = select(&post_processed, audio.duration(), target_count, method, &tempo);

        let overall_confidence = if selection.beats.is_empty() {
            0.0
        } else {
            selection.beats.iter().map(|b| b.confidence).sum::<f64>() / selection.beats.len() as f64
        };

        let metadata = if config.include_metadata {
            Some(ProcessingMetadata {
                chunks_processed: 1,
                detectors_run,
                genre_adaptive_applied: config.genre_adaptive && config.multi_pass_enabled,
                multi_pass_applied,
                processing_time_ms: start.elapsed().as_secs_f64() * 1000.0,
                samples_processed: audio.len(),
                parameters: config.clone(),
            })
        } else {
            None
        };

        Ok(ParseResult {
            beats: selection.beats,
            tempo,
            confidence: overall_confidence,
            metadata,
        })
    }

    /// Accumulate a sequence of chunks into one signal and delegate to
    /// `parse_buffer` (spec.md §5, "streaming accumulates chunks with a
    /// progress callback"). True bounded-latency streaming is out of scope
    /// (spec.md Non-goals).
    pub async fn parse_stream<I, F>(
        &mut self,
        chunks: I,
        sample_rate: u32,
        options: ParseOptions,
        cancellation: CancellationToken,
        mut on_progress: F,
    ) -> Result<ParseResult>
    where
        I: IntoIterator<Item = Vec<f32>>,
        F: FnMut(usize),
    {
        let mut interleaved = Vec::new();
        let mut chunk_count = 0usize;
        for chunk in chunks {
            if cancellation.is_cancelled() {
                return Err(BeatError::Cancelled);
            }
            interleaved.extend(chunk);
            chunk_count += 1;
            on_progress(chunk_count);
        }

        let raw = RawAudio {
            interleaved,
            sample_rate,
            channels: 1,
        };

        let mut result = self.parse_buffer(raw, options, cancellation).await?;
        if let Some(metadata) = result.metadata.as_mut() {
            metadata.chunks_processed = chunk_count.max(1);
        }
        Ok(result)
    }
}

struct DetectorRunConfig {
    onset: OnsetConfig,
    tempo: TempoConfig,
    flux: SpectralFluxConfig,
}

impl DetectorRunConfig {
    fn from_options(config: &ParserConfig, options: &ParseOptions, prep: &PreparationConfig) -> Self {
        let frame_size = prep.frame_size;
        let hop_size = options.hop_size.unwrap_or(config.hop_size);
        Self {
            onset: OnsetConfig {
                frame_size,
                hop_size,
                ..OnsetConfig::default()
            },
            tempo: TempoConfig {
                frame_size,
                hop_size,
                min_bpm: config.min_tempo,
                max_bpm: config.max_tempo,
                ..TempoConfig::default()
            },
            flux: SpectralFluxConfig {
                frame_size,
                hop_size,
                ..SpectralFluxConfig::default()
            },
        }
    }
}

/// Run the three peer detectors concurrently via `rayon::join`. A detector
/// that errors is logged and dropped rather than aborting the whole parse;
/// only total failure across all three is fatal (spec.md §7, "per-frame
/// numerical anomalies absorbed"). The tempo detector's own `TempoEstimate`
/// (spec.md §4.4) becomes the pipeline's sole tempo source; if it fails, a
/// zero-valued estimate stands in so combining/selection still run.
fn run_detectors(
    audio: &AudioBuffer,
    config: &DetectorRunConfig,
) -> Result<(Vec<BeatCandidate>, Vec<String>, TempoEstimate)> {
    let onset = OnsetDetector::new(config.onset.clone());
    let tempo = TempoDetector::new(config.tempo.clone());
    let flux = SpectralFluxDetector::new(config.flux.clone());

    let ((onset_result, tempo_result), flux_result) = rayon::join(
        || rayon::join(|| onset.detect(audio), || tempo.detect_with_estimate(audio)),
        || flux.detect(audio),
    );

    let mut candidates = Vec::new();
    let mut ran = Vec::new();

    match onset_result {
        Ok(c) => {
            candidates.extend(c);
            ran.push(onset.name().to_string());
        }
        Err(e) => warn!(detector = onset.name(), error = %e, "detector failed"),
    }
    let tempo_estimate = match tempo_result {
        Ok((c, estimate)) => {
            candidates.extend(c);
            ran.push(tempo.name().to_string());
            estimate
        }
        Err(e) => {
            warn!(detector = tempo.name(), error = %e, "detector failed");
            TempoEstimate {
                bpm: 0.0,
                confidence: 0.0,
                phase: 0.0,
                stability: 0.0,
                time_signature: None,
            }
        }
    };
    match flux_result {
        Ok(c) => {
            candidates.extend(c);
            ran.push(flux.name().to_string());
        }
        Err(e) => warn!(detector = flux.name(), error = %e, "detector failed"),
    }

    if ran.is_empty() {
        return Err(BeatError::InvalidArgument("all detectors failed".to_string()));
    }

    Ok((candidates, ran, tempo_estimate))
}
