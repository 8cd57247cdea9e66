use super::{
    check_buffer,
    dsp::{amplitude_db, compute_rms, windowed_rms},
    Analyzer, DynamicsFeatures, FeatureFamily, FeatureModel, RawFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

/// Magnitude at or above which a sample counts as clipped.
pub(crate) const CLIP_LEVEL: f32 = 0.999;
const WINDOW_MS: u32 = 10;

/// Level, crest factor, short-term dynamic range and clipping.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicsAnalyzer;

impl DynamicsAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for DynamicsAnalyzer {
    fn name(&self) -> &str {
        "dynamics"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Dynamics
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("clip_level".to_string(), CLIP_LEVEL.into()),
            ("window_ms".to_string(), WINDOW_MS.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let samples = buffer.samples();
        let rms = compute_rms(samples);
        let peak = buffer.peak();
        let clipped = samples.iter().filter(|s| s.abs() >= CLIP_LEVEL).count();

        let window = (buffer.sample_rate() * WINDOW_MS / 1000).max(1) as usize;
        let levels: Vec<f32> = windowed_rms(&buffer.mono_mix(), window)
            .into_iter()
            .filter(|level| *level > 1e-6)
            .map(amplitude_db)
            .collect();
        let dynamic_range_db = match (
            levels.iter().copied().reduce(f32::max),
            levels.iter().copied().reduce(f32::min),
        ) {
            (Some(loudest), Some(quietest)) => loudest - quietest,
            _ => 0.0,
        };

        Ok(FeatureModel::Dynamics(DynamicsFeatures {
            rms,
            peak,
            rms_db: amplitude_db(rms),
            peak_db: amplitude_db(peak),
            crest_factor_db: amplitude_db(peak) - amplitude_db(rms),
            dynamic_range_db,
            clipping_ratio: clipped as f32 / samples.len() as f32,
        }))
    }
}
