use super::{
    check_buffer,
    chroma::{chroma_features, PITCH_CLASSES},
    dsp::{amplitude_db, compute_rms},
    Analyzer, FeatureFamily, FeatureModel, MusicalContextFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

/// Krumhansl-Kessler key profiles, starting at the tonic.
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];
/// Level mapped to zero energy.
const ENERGY_FLOOR_DB: f32 = -60.0;

/// Key, mode and overall energy, for downstream arrangement advice.
#[derive(Debug, Default, Clone, Copy)]
pub struct MusicalContextAnalyzer;

impl MusicalContextAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for MusicalContextAnalyzer {
    fn name(&self) -> &str {
        "musical_context"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::MusicalContext
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let chroma = chroma_features(buffer)?;
        let energy_level = ((amplitude_db(compute_rms(buffer.samples())) - ENERGY_FLOOR_DB)
            / -ENERGY_FLOOR_DB)
            .clamp(0.0, 1.0);

        let mut best: Option<(usize, &str, f32)> = None;
        if chroma.dominant_pitch_class.is_some() {
            for tonic in 0..12 {
                for (mode, profile) in [("major", &MAJOR_PROFILE), ("minor", &MINOR_PROFILE)] {
                    let score = correlation(&chroma.profile, profile, tonic);
                    if best.map_or(true, |(_, _, value)| score > value) {
                        best = Some((tonic, mode, score));
                    }
                }
            }
        }

        let features = match best {
            Some((tonic, mode, score)) => MusicalContextFeatures {
                key: Some(PITCH_CLASSES[tonic].to_string()),
                mode: Some(mode.to_string()),
                key_confidence: score.clamp(0.0, 1.0),
                energy_level,
            },
            None => MusicalContextFeatures {
                energy_level,
                ..Default::default()
            },
        };
        Ok(FeatureModel::MusicalContext(features))
    }
}

/// Pearson correlation between the chroma profile and a key profile
/// rotated to `tonic`.
fn correlation(chroma: &[f32], profile: &[f32; 12], tonic: usize) -> f32 {
    let rotated: Vec<f32> = (0..12).map(|i| profile[(i + 12 - tonic) % 12]).collect();
    let mean_a = chroma.iter().sum::<f32>() / 12.0;
    let mean_b = rotated.iter().sum::<f32>() / 12.0;

    let (mut cov, mut var_a, mut var_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (a, b) in chroma.iter().zip(&rotated) {
        cov += (a - mean_a) * (b - mean_b);
        var_a += (a - mean_a).powi(2);
        var_b += (b - mean_b).powi(2);
    }
    if var_a <= f32::EPSILON || var_b <= f32::EPSILON {
        0.0
    } else {
        cov / (var_a.sqrt() * var_b.sqrt())
    }
}
