use serde::{Deserialize, Serialize};

use super::{FeatureFamily, FeatureModel};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpectralFeatures {
    pub centroid_hz: f32,
    /// Frequency below which 85% of the energy lies.
    pub rolloff_hz: f32,
    pub flatness: f32,
    pub bandwidth_hz: f32,
    pub low_energy_ratio: f32,
    pub mid_energy_ratio: f32,
    pub high_energy_ratio: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicsFeatures {
    pub rms: f32,
    pub peak: f32,
    pub rms_db: f32,
    pub peak_db: f32,
    pub crest_factor_db: f32,
    /// Spread between the loudest and quietest non-silent 10 ms windows.
    pub dynamic_range_db: f32,
    pub clipping_ratio: f32,
}

impl Default for DynamicsFeatures {
    fn default() -> Self {
        Self {
            rms: 0.0,
            peak: 0.0,
            rms_db: super::dsp::SILENCE_DB,
            peak_db: super::dsp::SILENCE_DB,
            crest_factor_db: 0.0,
            dynamic_range_db: 0.0,
            clipping_ratio: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonicFeatures {
    pub fundamental_hz: Option<f32>,
    /// Normalised autocorrelation at the detected period, 0..1.
    pub harmonicity: f32,
    pub zero_crossing_rate: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerceptualFeatures {
    pub loudness_db: f32,
    pub brightness: f32,
    pub warmth: f32,
    pub sharpness: f32,
}

impl Default for PerceptualFeatures {
    fn default() -> Self {
        Self {
            loudness_db: super::dsp::SILENCE_DB,
            brightness: 0.0,
            warmth: 0.0,
            sharpness: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RhythmFeatures {
    pub tempo_bpm: Option<f32>,
    pub onset_count: usize,
    pub onset_rate: f32,
    pub pulse_clarity: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimbreFeatures {
    pub skewness: f32,
    pub kurtosis: f32,
    pub contrast_db: f32,
    pub zero_crossing_rate: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChromaFeatures {
    /// Twelve pitch-class energies starting at C, normalised to a peak of 1.
    pub profile: Vec<f32>,
    pub dominant_pitch_class: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFeatures {
    pub dc_offset: f32,
    pub clipped_samples: usize,
    pub silence_ratio: f32,
    pub noise_floor_db: f32,
    pub snr_db: f32,
}

impl Default for QualityFeatures {
    fn default() -> Self {
        Self {
            dc_offset: 0.0,
            clipped_samples: 0,
            silence_ratio: 1.0,
            noise_floor_db: super::dsp::SILENCE_DB,
            snr_db: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialFeatures {
    /// Pearson correlation of the first two channels, -1..1.
    pub correlation: f32,
    pub stereo_width: f32,
    /// -1 is hard left, 1 is hard right.
    pub balance: f32,
    pub mono_compatible: bool,
}

impl Default for SpatialFeatures {
    fn default() -> Self {
        Self {
            correlation: 1.0,
            stereo_width: 0.0,
            balance: 0.0,
            mono_compatible: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MusicalContextFeatures {
    pub key: Option<String>,
    pub mode: Option<String>,
    pub key_confidence: f32,
    /// Rough loudness-derived energy, 0..1.
    pub energy_level: f32,
}

/// One optional slot per feature family. A `None` slot means no analyzer
/// for that family ran successfully.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub spectral: Option<SpectralFeatures>,
    pub dynamics: Option<DynamicsFeatures>,
    pub harmonic: Option<HarmonicFeatures>,
    pub perceptual: Option<PerceptualFeatures>,
    pub rhythm: Option<RhythmFeatures>,
    pub timbre: Option<TimbreFeatures>,
    pub chroma: Option<ChromaFeatures>,
    pub quality: Option<QualityFeatures>,
    pub spatial: Option<SpatialFeatures>,
    pub musical_context: Option<MusicalContextFeatures>,
}

impl FeatureSet {
    pub fn insert(&mut self, model: FeatureModel) {
        match model {
            FeatureModel::Spectral(f) => self.spectral = Some(f),
            FeatureModel::Dynamics(f) => self.dynamics = Some(f),
            FeatureModel::Harmonic(f) => self.harmonic = Some(f),
            FeatureModel::Perceptual(f) => self.perceptual = Some(f),
            FeatureModel::Rhythm(f) => self.rhythm = Some(f),
            FeatureModel::Timbre(f) => self.timbre = Some(f),
            FeatureModel::Chroma(f) => self.chroma = Some(f),
            FeatureModel::Quality(f) => self.quality = Some(f),
            FeatureModel::Spatial(f) => self.spatial = Some(f),
            FeatureModel::MusicalContext(f) => self.musical_context = Some(f),
        }
    }

    pub fn contains(&self, family: FeatureFamily) -> bool {
        match family {
            FeatureFamily::Spectral => self.spectral.is_some(),
            FeatureFamily::Dynamics => self.dynamics.is_some(),
            FeatureFamily::Harmonic => self.harmonic.is_some(),
            FeatureFamily::Perceptual => self.perceptual.is_some(),
            FeatureFamily::Rhythm => self.rhythm.is_some(),
            FeatureFamily::Timbre => self.timbre.is_some(),
            FeatureFamily::Chroma => self.chroma.is_some(),
            FeatureFamily::Quality => self.quality.is_some(),
            FeatureFamily::Spatial => self.spatial.is_some(),
            FeatureFamily::MusicalContext => self.musical_context.is_some(),
        }
    }

    /// Families with a populated slot, in declaration order.
    pub fn present(&self) -> Vec<FeatureFamily> {
        FeatureFamily::ALL
            .into_iter()
            .filter(|family| self.contains(*family))
            .collect()
    }
}
