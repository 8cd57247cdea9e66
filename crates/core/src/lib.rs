//! Core library for the Soundcheck toolkit.
//!
//! Audio enters through named sources owned by a [`SourceRouter`], which
//! also mixes routed sources into buses. An [`AnalysisPipeline`] pulls
//! buffers from the router, runs every registered feature analyzer and
//! caches the unified result under a content fingerprint.

pub mod analysis;
pub mod buffer;
pub mod cache;
pub mod config;
pub mod decode;
pub mod error;
pub mod format;
pub mod pipeline;
pub mod render;
pub mod routing;
pub mod source;
mod sync;

pub use analysis::{Analyzer, AnalyzerRegistry, FeatureFamily, FeatureModel, FeatureSet};
pub use buffer::AudioBuffer;
pub use cache::{compute_fingerprint, AnalysisCache, CacheStats, Fingerprint};
pub use config::{AppConfig, AudioConfig, CacheConfig, PipelineConfig};
pub use decode::{AudioDecoder, WavDecoder};
pub use error::{AnalyzerError, DecodeError, Result, SoundcheckError, SourceError};
pub use format::{detect_audio_format, AudioFormat};
pub use pipeline::{
    AnalysisPipeline, AnalysisResult, PipelineMetrics, ProcessOptions, RealtimeDriver,
    RealtimeOutput,
};
pub use render::{RenderEngine, RenderGraph, SignalRenderer, Waveform};
pub use routing::{RoutingTable, SourceRouter};
pub use source::{
    AudioSource, AudioSourceConfig, EndOfFilePolicy, LiveFeed, SourceHealth, SourceType,
};
