use super::{
    check_buffer,
    dsp::{amplitude_db, compute_rms, windowed_rms},
    dynamics::CLIP_LEVEL,
    Analyzer, FeatureFamily, FeatureModel, QualityFeatures, RawFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

/// Magnitude below which a sample counts as silent (about -80 dBFS).
const SILENCE_LEVEL: f32 = 1e-4;
const WINDOW_MS: u32 = 10;

/// Technical defects: DC offset, clipping, silence and noise floor.
#[derive(Debug, Default, Clone, Copy)]
pub struct QualityAnalyzer;

impl QualityAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for QualityAnalyzer {
    fn name(&self) -> &str {
        "quality"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Quality
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("clip_level".to_string(), CLIP_LEVEL.into()),
            ("silence_level".to_string(), SILENCE_LEVEL.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let samples = buffer.samples();
        let count = samples.len() as f32;
        let dc_offset =
            (samples.iter().map(|&s| f64::from(s)).sum::<f64>() / samples.len() as f64) as f32;
        let clipped_samples = samples.iter().filter(|s| s.abs() >= CLIP_LEVEL).count();
        let silent = samples.iter().filter(|s| s.abs() < SILENCE_LEVEL).count();

        let window = (buffer.sample_rate() * WINDOW_MS / 1000).max(1) as usize;
        let mut levels = windowed_rms(&buffer.mono_mix(), window);
        levels.sort_by(f32::total_cmp);
        let floor = levels[levels.len() / 10];
        let noise_floor_db = amplitude_db(floor);

        Ok(FeatureModel::Quality(QualityFeatures {
            dc_offset,
            clipped_samples,
            silence_ratio: silent as f32 / count,
            noise_floor_db,
            snr_db: amplitude_db(compute_rms(samples)) - noise_floor_db,
        }))
    }
}
