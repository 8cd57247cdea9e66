use super::{
    check_buffer,
    dsp::{power, Spectrum},
    Analyzer, ChromaFeatures, FeatureFamily, FeatureModel, RawFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

pub(crate) const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const MIN_HZ: f32 = 55.0;
const MAX_HZ: f32 = 5_000.0;

/// Twelve-bin pitch-class profile.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromaAnalyzer;

impl ChromaAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for ChromaAnalyzer {
    fn name(&self) -> &str {
        "chroma"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Chroma
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("min_hz".to_string(), MIN_HZ.into()),
            ("max_hz".to_string(), MAX_HZ.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }
        Ok(FeatureModel::Chroma(chroma_features(buffer)?))
    }
}

/// Shared with the musical-context analyzer, which derives the key from
/// the same profile.
pub(crate) fn chroma_features(buffer: &AudioBuffer) -> Result<ChromaFeatures, AnalyzerError> {
    let spectrum = Spectrum::compute(&buffer.mono_mix(), buffer.sample_rate())?;
    let mut profile = [0.0_f64; 12];

    for (bin, magnitude) in spectrum.magnitudes.iter().enumerate().skip(1) {
        let freq = spectrum.frequency(bin);
        if !(MIN_HZ..=MAX_HZ).contains(&freq) {
            continue;
        }
        let midi = (69.0 + 12.0 * (freq / 440.0).log2()).round() as i32;
        profile[midi.rem_euclid(12) as usize] += power(*magnitude);
    }

    let peak = profile.iter().copied().fold(0.0_f64, f64::max);
    if peak <= f64::from(f32::EPSILON) {
        return Ok(ChromaFeatures {
            profile: vec![0.0; 12],
            dominant_pitch_class: None,
        });
    }

    let dominant = profile
        .iter()
        .position(|value| *value == peak)
        .map(|index| PITCH_CLASSES[index].to_string());
    Ok(ChromaFeatures {
        profile: profile.iter().map(|value| (value / peak) as f32).collect(),
        dominant_pitch_class: dominant,
    })
}
