//! Cached, fault-isolated analysis over router-supplied buffers.
//!
//! Per buffer: fingerprint, cache lookup, then on a miss every analyzer runs
//! independently (in parallel by default) and the outputs are joined into a
//! single [`AnalysisResult`] before the cache is filled.

mod metrics;
mod realtime;
mod result;
mod suggestions;

use std::{
    borrow::Cow,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, OnceLock, RwLock},
    thread,
    time::Instant,
};

use tracing::{debug, error, warn};

use crate::{
    analysis::{Analyzer, AnalyzerRegistry, FeatureModel, FeatureSet, RawFeatures},
    cache::{compute_fingerprint, AnalysisCache, CacheStats, Fingerprint},
    routing::SourceRouter,
    sync, AnalyzerError, AppConfig, AudioBuffer, PipelineConfig, SourceError,
};

pub use metrics::{MetricsHistory, PipelineMetrics};
pub use realtime::{RealtimeDriver, RealtimeOutput};
pub use result::AnalysisResult;
pub use suggestions::suggest_actions;

/// Per-call switches for [`AnalysisPipeline::process`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOptions {
    /// Bypass both the cache lookup and the cache fill.
    pub skip_cache: bool,
}

impl ProcessOptions {
    pub fn skip_cache() -> Self {
        Self { skip_cache: true }
    }
}

enum Outcome {
    Features(FeatureModel),
    Failed(AnalyzerError),
    Panicked(String),
}

/// Owns the analyzers, the cache and the metrics history, and borrows
/// buffers from a shared [`SourceRouter`].
pub struct AnalysisPipeline {
    config: PipelineConfig,
    router: Arc<SourceRouter>,
    analyzers: RwLock<Vec<Arc<dyn Analyzer>>>,
    cache: AnalysisCache,
    metrics: Mutex<MetricsHistory>,
}

impl AnalysisPipeline {
    /// Pipeline with every built-in analyzer and a fresh router.
    pub fn new(config: &AppConfig) -> Self {
        Self::with_parts(
            config.pipeline.clone(),
            Arc::new(SourceRouter::new(config.audio.clone())),
            AnalyzerRegistry::with_defaults().instantiate_all(),
            AnalysisCache::from_config(&config.cache),
        )
    }

    pub fn with_parts(
        config: PipelineConfig,
        router: Arc<SourceRouter>,
        analyzers: Vec<Box<dyn Analyzer>>,
        cache: AnalysisCache,
    ) -> Self {
        let history = MetricsHistory::new(config.metrics_history);
        Self {
            config,
            router,
            analyzers: RwLock::new(analyzers.into_iter().map(Arc::from).collect()),
            cache,
            metrics: Mutex::new(history),
        }
    }

    pub fn router(&self) -> &Arc<SourceRouter> {
        &self.router
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Adds an analyzer, replacing any existing one with the same name.
    /// Cached results stay valid: the analyzer set is part of the key.
    pub fn register_analyzer(&self, analyzer: Box<dyn Analyzer>) {
        let mut analyzers = sync::write(&self.analyzers);
        analyzers.retain(|existing| existing.name() != analyzer.name());
        debug!(analyzer = analyzer.name(), "registered analyzer");
        analyzers.push(Arc::from(analyzer));
    }

    pub fn analyzer_names(&self) -> Vec<String> {
        sync::read(&self.analyzers)
            .iter()
            .map(|analyzer| analyzer.name().to_string())
            .collect()
    }

    pub fn process(&self, buffer: &AudioBuffer, options: ProcessOptions) -> AnalysisResult {
        self.run(buffer, options, None)
    }

    /// Same as [`AnalysisPipeline::process`], attributing the metrics
    /// snapshot to `source`.
    pub fn process_labeled(
        &self,
        source: &str,
        buffer: &AudioBuffer,
        options: ProcessOptions,
    ) -> AnalysisResult {
        self.run(buffer, options, Some(source))
    }

    /// Pulls one buffer from the named source and analyzes it.
    pub fn process_audio_source(
        &self,
        name: &str,
        options: ProcessOptions,
    ) -> Result<AnalysisResult, SourceError> {
        let buffer = self.router.get_buffer(name)?;
        Ok(self.run(&buffer, options, Some(name)))
    }

    /// One result per registered source. Sources removed mid-iteration are
    /// skipped.
    pub fn process_all_sources(&self, options: ProcessOptions) -> BTreeMap<String, AnalysisResult> {
        let mut results = BTreeMap::new();
        for name in self.router.source_names() {
            match self.process_audio_source(&name, options) {
                Ok(result) => {
                    results.insert(name, result);
                }
                Err(err) => debug!(source = %name, error = %err, "skipping source"),
            }
        }
        results
    }

    pub fn get_latest_metrics(&self) -> Option<PipelineMetrics> {
        sync::lock(&self.metrics).latest().cloned()
    }

    pub fn get_metrics(&self) -> Vec<PipelineMetrics> {
        sync::lock(&self.metrics).snapshot()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Clears the cache, its counters and the metrics history. Analyzers
    /// and sources stay registered.
    pub fn reset(&self) {
        self.cache.clear();
        sync::lock(&self.metrics).clear();
    }

    fn run(&self, buffer: &AudioBuffer, options: ProcessOptions, source: Option<&str>) -> AnalysisResult {
        let started = Instant::now();
        let buffer = repair(buffer);
        let analyzers: Vec<Arc<dyn Analyzer>> = sync::read(&self.analyzers).clone();

        let fingerprint = (!options.skip_cache).then(|| cache_key(&buffer, &analyzers));
        let cached = fingerprint.as_ref().and_then(|key| self.cache.get(key));
        let cache_hit = cached.is_some();

        let result = match cached {
            Some(result) => result,
            None => {
                let result = self.analyze(&buffer, &analyzers, fingerprint.as_ref());
                if let Some(key) = fingerprint {
                    self.cache.put(key, result.clone());
                }
                result
            }
        };

        let snapshot = PipelineMetrics {
            processing_time: started.elapsed(),
            cache_hit,
            cache_hit_rate: self.cache.hit_rate(),
            buffer_size: buffer.frames(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
            source: source.map(str::to_string),
            analyzers_failed: result.failed_analyzers.len(),
            recorded_at_ms: result::now_ms(),
        };
        debug!(
            source = source.unwrap_or("-"),
            cache_hit,
            elapsed_us = snapshot.processing_time.as_micros() as u64,
            "processed buffer"
        );
        sync::lock(&self.metrics).push(snapshot);

        result
    }

    fn analyze(
        &self,
        buffer: &AudioBuffer,
        analyzers: &[Arc<dyn Analyzer>],
        fingerprint: Option<&Fingerprint>,
    ) -> AnalysisResult {
        let outcomes: Vec<Outcome> = if self.config.parallel_analyzers && analyzers.len() > 1 {
            thread::scope(|scope| {
                let handles: Vec<_> = analyzers
                    .iter()
                    .map(|analyzer| scope.spawn(move || run_isolated(analyzer.as_ref(), buffer)))
                    .collect();
                handles
                    .into_iter()
                    .map(|handle| {
                        handle
                            .join()
                            .unwrap_or_else(|payload| Outcome::Panicked(panic_message(&*payload)))
                    })
                    .collect()
            })
        } else {
            analyzers
                .iter()
                .map(|analyzer| run_isolated(analyzer.as_ref(), buffer))
                .collect()
        };

        let mut features = FeatureSet::default();
        let mut raw = BTreeMap::new();
        let mut failed_analyzers = Vec::new();
        for (analyzer, outcome) in analyzers.iter().zip(outcomes) {
            match outcome {
                Outcome::Features(model) => {
                    let model = if model.is_finite() {
                        model
                    } else {
                        warn!(
                            analyzer = analyzer.name(),
                            family = %model.family(),
                            "non-finite features, reporting neutral values"
                        );
                        FeatureModel::neutral(model.family())
                    };
                    raw.insert(analyzer.name().to_string(), model.to_raw());
                    features.insert(model);
                }
                Outcome::Failed(err) => {
                    warn!(analyzer = analyzer.name(), error = %err, "analyzer failed, family omitted");
                    failed_analyzers.push(analyzer.name().to_string());
                }
                Outcome::Panicked(message) => {
                    error!(analyzer = analyzer.name(), panic = %message, "analyzer panicked, family omitted");
                    failed_analyzers.push(analyzer.name().to_string());
                }
            }
        }

        let suggested_actions = suggest_actions(&features);
        AnalysisResult {
            timestamp_ms: result::now_ms(),
            duration_seconds: buffer.duration_seconds(),
            sample_rate: buffer.sample_rate(),
            channels: buffer.channels(),
            frames: buffer.frames(),
            fingerprint: fingerprint.map(Fingerprint::to_hex),
            features,
            raw,
            failed_analyzers,
            suggested_actions,
        }
    }
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("config", &self.config)
            .field("analyzers", &self.analyzer_names())
            .field("cache", &self.cache)
            .finish()
    }
}

fn cache_key(buffer: &AudioBuffer, analyzers: &[Arc<dyn Analyzer>]) -> Fingerprint {
    let names: Vec<&str> = analyzers.iter().map(|analyzer| analyzer.name()).collect();
    let params: BTreeMap<String, RawFeatures> = analyzers
        .iter()
        .map(|analyzer| (analyzer.name().to_string(), analyzer.parameters()))
        .collect();
    compute_fingerprint(buffer, &names, &params)
}

/// Caller-supplied buffers may carry NaN/Inf; analyzers only ever see a
/// finite copy.
fn repair(buffer: &AudioBuffer) -> Cow<'_, AudioBuffer> {
    if buffer.is_finite() {
        return Cow::Borrowed(buffer);
    }
    let mut owned = buffer.clone();
    let repaired = owned.sanitize();
    warn!(repaired, "replaced non-finite samples before analysis");
    Cow::Owned(owned)
}

fn run_isolated(analyzer: &dyn Analyzer, buffer: &AudioBuffer) -> Outcome {
    match panic::catch_unwind(AssertUnwindSafe(|| analyzer.extract_features(buffer))) {
        Ok(Ok(model)) => Outcome::Features(model),
        Ok(Err(err)) => Outcome::Failed(err),
        Err(payload) => Outcome::Panicked(panic_message(&*payload)),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

static SHARED: OnceLock<Arc<AnalysisPipeline>> = OnceLock::new();

/// Process-wide pipeline, built from default configuration on first use
/// unless [`install_shared`] ran earlier. Independent pipelines built with
/// [`AnalysisPipeline::new`] are unaffected.
pub fn shared() -> Arc<AnalysisPipeline> {
    Arc::clone(SHARED.get_or_init(|| Arc::new(AnalysisPipeline::new(&AppConfig::default()))))
}

/// Installs `pipeline` as the process-wide instance. Hands it back if one
/// was already initialised.
pub fn install_shared(pipeline: Arc<AnalysisPipeline>) -> Result<(), Arc<AnalysisPipeline>> {
    SHARED.set(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{DynamicsAnalyzer, FeatureFamily, SpectralAnalyzer},
        source::AudioSourceConfig,
        AudioConfig, CacheConfig, Waveform,
    };

    struct Failing;

    impl Analyzer for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn family(&self) -> FeatureFamily {
            FeatureFamily::Timbre
        }

        fn extract_features(&self, _: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
            Err(AnalyzerError::InternalFailure("always fails".into()))
        }
    }

    struct Panicking;

    impl Analyzer for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn family(&self) -> FeatureFamily {
            FeatureFamily::Rhythm
        }

        fn extract_features(&self, _: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
            panic!("analyzer bug")
        }
    }

    fn tone(frames: usize) -> AudioBuffer {
        let samples = (0..frames * 2)
            .map(|i| 0.4 * (i as f32 / 2.0 * 0.05).sin())
            .collect();
        AudioBuffer::from_interleaved(samples, 44_100, 2)
    }

    fn small_pipeline(analyzers: Vec<Box<dyn Analyzer>>, history: usize) -> AnalysisPipeline {
        AnalysisPipeline::with_parts(
            PipelineConfig {
                metrics_history: history,
                ..Default::default()
            },
            Arc::new(SourceRouter::new(AudioConfig::default())),
            analyzers,
            AnalysisCache::from_config(&CacheConfig::default()),
        )
    }

    #[test]
    fn generator_source_hits_cache_on_second_pull() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        pipeline
            .router()
            .create_source(AudioSourceConfig::generator("test_generator", 44_100, 2, 1024))
            .unwrap();

        let first = pipeline
            .process_audio_source("test_generator", ProcessOptions::default())
            .unwrap();
        assert_eq!((pipeline.cache().hits(), pipeline.cache().misses()), (0, 1));

        let second = pipeline
            .process_audio_source("test_generator", ProcessOptions::default())
            .unwrap();
        assert_eq!((pipeline.cache().hits(), pipeline.cache().misses()), (1, 1));

        assert_eq!(first.sample_rate, 44_100);
        assert_eq!(second.sample_rate, 44_100);
        assert_eq!(first, second);
    }

    #[test]
    fn repeated_buffer_is_served_from_cache() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let buffer = tone(1024);

        let first = pipeline.process(&buffer, ProcessOptions::default());
        let second = pipeline.process(&buffer, ProcessOptions::default());
        assert_eq!(first, second);

        let metrics = pipeline.get_metrics();
        assert_eq!(metrics.len(), 2);
        assert!(!metrics[0].cache_hit);
        assert!(metrics[1].cache_hit);
        assert!(metrics[1].processing_time < metrics[0].processing_time);
        assert_eq!(metrics[1].cache_hit_rate, 0.5);
    }

    #[test]
    fn every_family_present_for_a_stereo_tone() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let result = pipeline.process(&tone(2048), ProcessOptions::default());
        assert_eq!(result.features.present(), FeatureFamily::ALL.to_vec());
        assert!(result.failed_analyzers.is_empty());
        assert_eq!(result.raw.len(), 10);
        assert_eq!(result.frames, 2048);
        assert!(result.fingerprint.is_some());
    }

    #[test]
    fn failing_analyzers_only_drop_their_family() {
        let pipeline = small_pipeline(
            vec![
                Box::new(SpectralAnalyzer::new()),
                Box::new(Failing),
                Box::new(Panicking),
                Box::new(DynamicsAnalyzer::new()),
            ],
            8,
        );
        let result = pipeline.process(&tone(512), ProcessOptions::default());

        assert_eq!(
            result.features.present(),
            vec![FeatureFamily::Spectral, FeatureFamily::Dynamics]
        );
        assert_eq!(result.failed_analyzers, vec!["failing", "panicking"]);
        assert_eq!(pipeline.get_latest_metrics().unwrap().analyzers_failed, 2);
    }

    #[test]
    fn sequential_mode_matches_parallel() {
        let parallel = small_pipeline(vec![Box::new(DynamicsAnalyzer::new()), Box::new(Failing)], 8);
        let sequential = AnalysisPipeline::with_parts(
            PipelineConfig {
                parallel_analyzers: false,
                ..Default::default()
            },
            Arc::new(SourceRouter::new(AudioConfig::default())),
            vec![Box::new(DynamicsAnalyzer::new()), Box::new(Failing)],
            AnalysisCache::default(),
        );
        let buffer = tone(256);
        let a = parallel.process(&buffer, ProcessOptions::skip_cache());
        let b = sequential.process(&buffer, ProcessOptions::skip_cache());
        assert_eq!(a.features, b.features);
        assert_eq!(a.failed_analyzers, b.failed_analyzers);
    }

    #[test]
    fn skip_cache_bypasses_lookup_and_fill() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let result = pipeline.process(&tone(256), ProcessOptions::skip_cache());
        assert!(result.fingerprint.is_none());
        assert_eq!(pipeline.cache_stats().misses, 0);
        assert!(pipeline.cache().is_empty());
    }

    #[test]
    fn metrics_history_is_bounded() {
        let pipeline = small_pipeline(vec![Box::new(DynamicsAnalyzer::new())], 3);
        for frames in [64, 128, 256, 512, 1024] {
            pipeline.process(&tone(frames), ProcessOptions::default());
        }
        let sizes: Vec<_> = pipeline.get_metrics().iter().map(|m| m.buffer_size).collect();
        assert_eq!(sizes, vec![256, 512, 1024]);
        assert_eq!(pipeline.get_latest_metrics().unwrap().buffer_size, 1024);
    }

    #[test]
    fn reset_clears_cache_and_metrics_but_keeps_registrations() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        pipeline
            .router()
            .create_source(AudioSourceConfig::generator("tone", 8_000, 1, 256))
            .unwrap();
        pipeline.process_audio_source("tone", ProcessOptions::default()).unwrap();
        pipeline.process_audio_source("tone", ProcessOptions::default()).unwrap();

        pipeline.reset();
        assert_eq!(pipeline.cache_stats(), CacheStats::default());
        assert!(pipeline.get_metrics().is_empty());
        assert!(pipeline.get_latest_metrics().is_none());
        assert_eq!(pipeline.analyzer_names().len(), 10);
        assert!(pipeline.router().contains("tone"));
    }

    #[test]
    fn removed_sources_are_errors() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let router = pipeline.router();
        router
            .create_source(AudioSourceConfig::generator("tone", 8_000, 1, 256))
            .unwrap();
        assert!(router.remove_source("tone"));
        assert!(matches!(
            pipeline.process_audio_source("tone", ProcessOptions::default()),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn process_all_sources_reports_each_source() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let router = pipeline.router();
        router
            .create_source(
                AudioSourceConfig::generator("hum", 8_000, 1, 256).with_waveform(Waveform::Sine {
                    frequency: 60.0,
                    amplitude: 0.3,
                }),
            )
            .unwrap();
        router
            .create_source(AudioSourceConfig::live_input("mic", 8_000, 1, 256).with_poll_timeout_ms(0))
            .unwrap();

        let results = pipeline.process_all_sources(ProcessOptions::default());
        assert_eq!(results.keys().collect::<Vec<_>>(), vec!["hum", "mic"]);
        assert!(results["mic"]
            .suggested_actions
            .iter()
            .any(|action| action.starts_with("Signal is silent")));
        assert_eq!(router.source_health("mic").unwrap().underrun_count, 1);
    }

    #[test]
    fn non_finite_input_is_repaired_before_analysis() {
        let pipeline = small_pipeline(vec![Box::new(DynamicsAnalyzer::new())], 4);
        let buffer = AudioBuffer::from_interleaved(vec![0.5, f32::NAN, -0.5, f32::INFINITY], 8_000, 1);
        let result = pipeline.process(&buffer, ProcessOptions::default());
        let dynamics = result.features.dynamics.unwrap();
        assert!(dynamics.rms.is_finite());
        assert_eq!(dynamics.peak, 0.5);
    }

    #[test]
    fn huge_finite_samples_still_round_trip_through_json() {
        let pipeline = AnalysisPipeline::new(&AppConfig::default());
        let buffer = AudioBuffer::from_interleaved(vec![1.0e20; 2048], 44_100, 2);
        let result = pipeline.process(&buffer, ProcessOptions::default());

        assert!(result.failed_analyzers.is_empty());
        assert!(result.features.dynamics.as_ref().unwrap().rms.is_finite());
        let json = result.to_json().unwrap();
        assert!(!json.contains("\"rms\":null"));
        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);

        let cached = pipeline.process(&buffer, ProcessOptions::default());
        assert_eq!(pipeline.cache_stats().hits, 1);
        assert_eq!(cached, result);
    }

    struct Overflowing;

    impl Analyzer for Overflowing {
        fn name(&self) -> &str {
            "overflowing"
        }

        fn family(&self) -> FeatureFamily {
            FeatureFamily::Spatial
        }

        fn extract_features(&self, _: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
            Ok(FeatureModel::Spatial(crate::analysis::SpatialFeatures {
                correlation: f32::NAN,
                ..Default::default()
            }))
        }
    }

    #[test]
    fn non_finite_features_are_replaced_with_neutral_values() {
        let pipeline = small_pipeline(vec![Box::new(Overflowing)], 4);
        let result = pipeline.process(&tone(64), ProcessOptions::default());
        assert_eq!(
            result.features.spatial,
            Some(crate::analysis::SpatialFeatures::default())
        );
        assert!(result.failed_analyzers.is_empty());
        assert_eq!(result.raw["overflowing"]["correlation"], 1.0);
    }

    #[test]
    fn registering_replaces_by_name_and_changes_the_key() {
        let pipeline = small_pipeline(vec![Box::new(DynamicsAnalyzer::new())], 4);
        let buffer = tone(128);
        let before = pipeline.process(&buffer, ProcessOptions::default());

        pipeline.register_analyzer(Box::new(SpectralAnalyzer::new()));
        pipeline.register_analyzer(Box::new(SpectralAnalyzer::new()));
        assert_eq!(pipeline.analyzer_names(), vec!["dynamics", "spectral"]);

        let after = pipeline.process(&buffer, ProcessOptions::default());
        assert_ne!(before.fingerprint, after.fingerprint);
        assert!(after.features.spectral.is_some());
        assert_eq!(pipeline.cache_stats().hits, 0);
    }

    #[test]
    fn shared_pipeline_is_a_single_instance() {
        let a = shared();
        let b = shared();
        assert!(Arc::ptr_eq(&a, &b));
        let independent = AnalysisPipeline::new(&AppConfig::default());
        assert!(independent.get_metrics().is_empty());
    }

    #[test]
    fn results_serialize_to_json() {
        let pipeline = small_pipeline(vec![Box::new(DynamicsAnalyzer::new())], 4);
        let result = pipeline.process(&tone(128), ProcessOptions::default());
        let json = result.to_json().unwrap();
        assert!(json.contains("\"suggested_actions\""));
        let parsed: AnalysisResult = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, result);
    }
}
