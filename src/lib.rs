//! Hybrid onset/tempo/spectral-flux beat detection pipeline.
//!
//! Composes three independent detectors, a confidence-weighted hybrid
//! combiner, an optional genre-adaptive multi-pass refiner, and a selector
//! that reduces candidates to a target count under one of four policies.
//! Audio decoding, CLI surfaces and output serialization are an external
//! collaborator's job; this crate starts from an already-decoded buffer.

pub mod audio;
pub mod candidate;
pub mod combiner;
pub mod config;
pub mod detectors;
pub mod error;
pub mod metadata;
pub mod pipeline;
pub mod plugin;
pub mod refiner;
pub mod selector;
pub mod signal;

pub use audio::{AudioBuffer, AudioSource, PreparationConfig, RawAudio};
pub use candidate::{Beat, BeatCandidate, SelectionResult, Source, TempoEstimate};
pub use config::{ConfigPatch, DetectorWeights, OutputFormat, ParseOptions, ParserConfig, SelectionMethod};
pub use detectors::Detector;
pub use error::{BeatError, Result};
pub use metadata::{ParseResult, ProcessingMetadata};
pub use pipeline::{BeatParser, CancellationToken};
pub use plugin::{Plugin, PluginRegistry};
