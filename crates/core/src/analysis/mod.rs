//! Analyzer plugin contract and the built-in feature families.
//!
//! Each analyzer consumes an [`AudioBuffer`] read-only and produces a typed
//! [`FeatureModel`]. Analyzers are independent of each other, which lets the
//! pipeline run them concurrently over the same buffer.

mod chroma;
pub mod dsp;
mod dynamics;
mod features;
mod harmonic;
mod musical;
mod neutral;
mod perceptual;
mod quality;
mod registry;
mod rhythm;
mod spatial;
mod spectral;
mod timbre;

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AnalyzerError, AudioBuffer};

pub use chroma::ChromaAnalyzer;
pub use dynamics::DynamicsAnalyzer;
pub use features::{
    ChromaFeatures, DynamicsFeatures, FeatureSet, HarmonicFeatures, MusicalContextFeatures,
    PerceptualFeatures, QualityFeatures, RhythmFeatures, SpatialFeatures, SpectralFeatures,
    TimbreFeatures,
};
pub use harmonic::HarmonicAnalyzer;
pub use musical::MusicalContextAnalyzer;
pub use neutral::NeutralAnalyzer;
pub use perceptual::PerceptualAnalyzer;
pub use quality::QualityAnalyzer;
pub use registry::{AnalyzerFactory, AnalyzerRegistry};
pub use rhythm::RhythmAnalyzer;
pub use spatial::SpatialAnalyzer;
pub use spectral::SpectralAnalyzer;
pub use timbre::TimbreAnalyzer;

/// Loose key/value view of an analyzer's output.
pub type RawFeatures = BTreeMap<String, Value>;

/// Category of extracted characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    Spectral,
    Dynamics,
    Harmonic,
    Perceptual,
    Rhythm,
    Timbre,
    Chroma,
    Quality,
    Spatial,
    MusicalContext,
}

impl FeatureFamily {
    pub const ALL: [FeatureFamily; 10] = [
        FeatureFamily::Spectral,
        FeatureFamily::Dynamics,
        FeatureFamily::Harmonic,
        FeatureFamily::Perceptual,
        FeatureFamily::Rhythm,
        FeatureFamily::Timbre,
        FeatureFamily::Chroma,
        FeatureFamily::Quality,
        FeatureFamily::Spatial,
        FeatureFamily::MusicalContext,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FeatureFamily::Spectral => "spectral",
            FeatureFamily::Dynamics => "dynamics",
            FeatureFamily::Harmonic => "harmonic",
            FeatureFamily::Perceptual => "perceptual",
            FeatureFamily::Rhythm => "rhythm",
            FeatureFamily::Timbre => "timbre",
            FeatureFamily::Chroma => "chroma",
            FeatureFamily::Quality => "quality",
            FeatureFamily::Spatial => "spatial",
            FeatureFamily::MusicalContext => "musical_context",
        }
    }
}

impl fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed output of one analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum FeatureModel {
    Spectral(SpectralFeatures),
    Dynamics(DynamicsFeatures),
    Harmonic(HarmonicFeatures),
    Perceptual(PerceptualFeatures),
    Rhythm(RhythmFeatures),
    Timbre(TimbreFeatures),
    Chroma(ChromaFeatures),
    Quality(QualityFeatures),
    Spatial(SpatialFeatures),
    MusicalContext(MusicalContextFeatures),
}

impl FeatureModel {
    pub fn family(&self) -> FeatureFamily {
        match self {
            FeatureModel::Spectral(_) => FeatureFamily::Spectral,
            FeatureModel::Dynamics(_) => FeatureFamily::Dynamics,
            FeatureModel::Harmonic(_) => FeatureFamily::Harmonic,
            FeatureModel::Perceptual(_) => FeatureFamily::Perceptual,
            FeatureModel::Rhythm(_) => FeatureFamily::Rhythm,
            FeatureModel::Timbre(_) => FeatureFamily::Timbre,
            FeatureModel::Chroma(_) => FeatureFamily::Chroma,
            FeatureModel::Quality(_) => FeatureFamily::Quality,
            FeatureModel::Spatial(_) => FeatureFamily::Spatial,
            FeatureModel::MusicalContext(_) => FeatureFamily::MusicalContext,
        }
    }

    /// Neutral feature set for a family, as reported for silent or empty
    /// buffers.
    pub fn neutral(family: FeatureFamily) -> Self {
        match family {
            FeatureFamily::Spectral => FeatureModel::Spectral(Default::default()),
            FeatureFamily::Dynamics => FeatureModel::Dynamics(Default::default()),
            FeatureFamily::Harmonic => FeatureModel::Harmonic(Default::default()),
            FeatureFamily::Perceptual => FeatureModel::Perceptual(Default::default()),
            FeatureFamily::Rhythm => FeatureModel::Rhythm(Default::default()),
            FeatureFamily::Timbre => FeatureModel::Timbre(Default::default()),
            FeatureFamily::Chroma => FeatureModel::Chroma(ChromaFeatures {
                profile: vec![0.0; 12],
                dominant_pitch_class: None,
            }),
            FeatureFamily::Quality => FeatureModel::Quality(Default::default()),
            FeatureFamily::Spatial => FeatureModel::Spatial(Default::default()),
            FeatureFamily::MusicalContext => FeatureModel::MusicalContext(Default::default()),
        }
    }

    /// False when any numeric feature is NaN or infinite. Such values do
    /// not survive a JSON round trip.
    pub fn is_finite(&self) -> bool {
        fn finite(values: &[f32]) -> bool {
            values.iter().all(|value| value.is_finite())
        }

        match self {
            FeatureModel::Spectral(f) => finite(&[
                f.centroid_hz,
                f.rolloff_hz,
                f.flatness,
                f.bandwidth_hz,
                f.low_energy_ratio,
                f.mid_energy_ratio,
                f.high_energy_ratio,
            ]),
            FeatureModel::Dynamics(f) => finite(&[
                f.rms,
                f.peak,
                f.rms_db,
                f.peak_db,
                f.crest_factor_db,
                f.dynamic_range_db,
                f.clipping_ratio,
            ]),
            FeatureModel::Harmonic(f) => {
                finite(&[f.harmonicity, f.zero_crossing_rate])
                    && f.fundamental_hz.map_or(true, f32::is_finite)
            }
            FeatureModel::Perceptual(f) => {
                finite(&[f.loudness_db, f.brightness, f.warmth, f.sharpness])
            }
            FeatureModel::Rhythm(f) => {
                finite(&[f.onset_rate, f.pulse_clarity]) && f.tempo_bpm.map_or(true, f32::is_finite)
            }
            FeatureModel::Timbre(f) => {
                finite(&[f.skewness, f.kurtosis, f.contrast_db, f.zero_crossing_rate])
            }
            FeatureModel::Chroma(f) => finite(&f.profile),
            FeatureModel::Quality(f) => {
                finite(&[f.dc_offset, f.silence_ratio, f.noise_floor_db, f.snr_db])
            }
            FeatureModel::Spatial(f) => finite(&[f.correlation, f.stereo_width, f.balance]),
            FeatureModel::MusicalContext(f) => finite(&[f.key_confidence, f.energy_level]),
        }
    }

    /// Flattens the model into a key/value map without the family tag.
    pub fn to_raw(&self) -> RawFeatures {
        let value = match self {
            FeatureModel::Spectral(f) => serde_json::to_value(f),
            FeatureModel::Dynamics(f) => serde_json::to_value(f),
            FeatureModel::Harmonic(f) => serde_json::to_value(f),
            FeatureModel::Perceptual(f) => serde_json::to_value(f),
            FeatureModel::Rhythm(f) => serde_json::to_value(f),
            FeatureModel::Timbre(f) => serde_json::to_value(f),
            FeatureModel::Chroma(f) => serde_json::to_value(f),
            FeatureModel::Quality(f) => serde_json::to_value(f),
            FeatureModel::Spatial(f) => serde_json::to_value(f),
            FeatureModel::MusicalContext(f) => serde_json::to_value(f),
        };
        match value {
            Ok(Value::Object(map)) => map.into_iter().collect(),
            _ => RawFeatures::new(),
        }
    }
}

/// A feature-family extractor.
///
/// Implementations must accept empty and all-zero buffers and return the
/// family's neutral features for them. Structurally invalid buffers (zero
/// channels, ragged sample counts) are rejected with
/// [`AnalyzerError::InvalidBuffer`].
pub trait Analyzer: Send + Sync {
    /// Unique registry name.
    fn name(&self) -> &str;

    fn family(&self) -> FeatureFamily;

    /// Settings that influence the output; folded into the cache key.
    fn parameters(&self) -> RawFeatures {
        RawFeatures::new()
    }

    /// Whether the computation backing this analyzer can run here. The
    /// registry substitutes a [`NeutralAnalyzer`] when it cannot.
    fn is_available(&self) -> bool {
        true
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError>;

    /// Introspectable variant of [`Analyzer::extract_features`].
    fn process(&self, buffer: &AudioBuffer) -> Result<RawFeatures, AnalyzerError> {
        self.extract_features(buffer).map(|model| model.to_raw())
    }
}

impl fmt::Debug for dyn Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Analyzer")
            .field("name", &self.name())
            .field("family", &self.family())
            .finish()
    }
}

/// Validates the buffer and reports whether it carries any signal.
pub(crate) fn check_buffer(buffer: &AudioBuffer) -> Result<bool, AnalyzerError> {
    buffer.validate()?;
    Ok(!buffer.is_empty() && buffer.samples().iter().any(|s| *s != 0.0))
}
