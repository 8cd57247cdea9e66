use std::{collections::BTreeMap, fmt, sync::Arc};

use tracing::warn;

use super::{
    Analyzer, ChromaAnalyzer, DynamicsAnalyzer, HarmonicAnalyzer, MusicalContextAnalyzer,
    NeutralAnalyzer, PerceptualAnalyzer, QualityAnalyzer, RhythmAnalyzer, SpatialAnalyzer,
    SpectralAnalyzer, TimbreAnalyzer,
};

/// Builds a fresh analyzer instance.
pub type AnalyzerFactory = Arc<dyn Fn() -> Box<dyn Analyzer> + Send + Sync>;

/// Name to factory map. Iteration order is by name, so analyzer sets built
/// from a registry are deterministic.
#[derive(Clone, Default)]
pub struct AnalyzerRegistry {
    factories: BTreeMap<String, AnalyzerFactory>,
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in feature family.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("spectral", || Box::new(SpectralAnalyzer::new()));
        registry.register("dynamics", || Box::new(DynamicsAnalyzer::new()));
        registry.register("harmonic", || Box::new(HarmonicAnalyzer::new()));
        registry.register("perceptual", || Box::new(PerceptualAnalyzer::new()));
        registry.register("rhythm", || Box::new(RhythmAnalyzer::new()));
        registry.register("timbre", || Box::new(TimbreAnalyzer::new()));
        registry.register("chroma", || Box::new(ChromaAnalyzer::new()));
        registry.register("quality", || Box::new(QualityAnalyzer::new()));
        registry.register("spatial", || Box::new(SpatialAnalyzer::new()));
        registry.register("musical_context", || Box::new(MusicalContextAnalyzer::new()));
        registry
    }

    /// Adds or replaces the factory under `name`. Returns true when an
    /// earlier factory was replaced.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> bool
    where
        F: Fn() -> Box<dyn Analyzer> + Send + Sync + 'static,
    {
        self.factories
            .insert(name.into(), Arc::new(factory))
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiates the analyzer registered under `name`. An analyzer that
    /// reports itself unavailable is swapped for a [`NeutralAnalyzer`] of
    /// the same name and family.
    pub fn create(&self, name: &str) -> Option<Box<dyn Analyzer>> {
        let analyzer = (self.factories.get(name)?)();
        if analyzer.is_available() {
            return Some(analyzer);
        }

        warn!(
            analyzer = name,
            family = %analyzer.family(),
            "analyzer unavailable, substituting neutral output"
        );
        Some(Box::new(NeutralAnalyzer::new(
            analyzer.name(),
            analyzer.family(),
        )))
    }

    pub fn instantiate_all(&self) -> Vec<Box<dyn Analyzer>> {
        self.factories
            .keys()
            .filter_map(|name| self.create(name))
            .collect()
    }
}

impl fmt::Debug for AnalyzerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzerRegistry")
            .field("analyzers", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::{FeatureFamily, FeatureModel},
        AnalyzerError, AudioBuffer,
    };

    struct Unavailable;

    impl Analyzer for Unavailable {
        fn name(&self) -> &str {
            "loudness_model"
        }

        fn family(&self) -> FeatureFamily {
            FeatureFamily::Perceptual
        }

        fn is_available(&self) -> bool {
            false
        }

        fn extract_features(&self, _: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
            Err(AnalyzerError::InternalFailure("model not loaded".into()))
        }
    }

    #[test]
    fn defaults_cover_every_family() {
        let registry = AnalyzerRegistry::with_defaults();
        assert_eq!(registry.len(), FeatureFamily::ALL.len());

        let mut families: Vec<_> = registry
            .instantiate_all()
            .iter()
            .map(|analyzer| analyzer.family())
            .collect();
        families.sort();
        assert_eq!(families, FeatureFamily::ALL.to_vec());

        for analyzer in registry.instantiate_all() {
            assert_eq!(analyzer.name(), analyzer.family().as_str());
        }
    }

    #[test]
    fn unknown_names_create_nothing() {
        assert!(AnalyzerRegistry::with_defaults().create("tempo_map").is_none());
    }

    #[test]
    fn unavailable_analyzers_fall_back_to_neutral() {
        let mut registry = AnalyzerRegistry::new();
        registry.register("loudness_model", || Box::new(Unavailable));

        let analyzer = registry.create("loudness_model").unwrap();
        assert!(analyzer.is_available());
        assert_eq!(analyzer.name(), "loudness_model");

        let buffer = AudioBuffer::from_interleaved(vec![0.3; 64], 8_000, 1);
        assert_eq!(
            analyzer.extract_features(&buffer).unwrap(),
            FeatureModel::neutral(FeatureFamily::Perceptual)
        );
    }

    #[test]
    fn register_replaces_existing_factory() {
        let mut registry = AnalyzerRegistry::with_defaults();
        let replaced = registry.register("spectral", || {
            Box::new(NeutralAnalyzer::new("spectral", FeatureFamily::Spectral))
        });
        assert!(replaced);
        assert_eq!(registry.len(), 10);
    }
}
