use super::{
    check_buffer,
    dsp::{amplitude_db, zero_crossing_rate, Spectrum},
    Analyzer, FeatureFamily, FeatureModel, TimbreFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

/// Higher spectral moments and peak/valley contrast.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimbreAnalyzer;

impl TimbreAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for TimbreAnalyzer {
    fn name(&self) -> &str {
        "timbre"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Timbre
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let mono = buffer.mono_mix();
        let spectrum = Spectrum::compute(&mono, buffer.sample_rate())?;
        let centroid = spectrum.centroid();
        let spread = spectrum.central_moment(centroid, 2).sqrt();

        let (skewness, kurtosis) = if spread > f32::EPSILON {
            (
                spectrum.central_moment(centroid, 3) / spread.powi(3),
                spectrum.central_moment(centroid, 4) / spread.powi(4),
            )
        } else {
            (0.0, 0.0)
        };

        let contrast_db = if spectrum.is_empty() {
            0.0
        } else {
            let peak = spectrum.magnitudes.iter().copied().fold(0.0_f32, f32::max);
            let mean = spectrum.magnitudes.iter().sum::<f32>() / spectrum.magnitudes.len() as f32;
            if mean <= f32::EPSILON {
                0.0
            } else {
                amplitude_db(peak / mean)
            }
        };

        Ok(FeatureModel::Timbre(TimbreFeatures {
            skewness,
            kurtosis,
            contrast_db,
            zero_crossing_rate: zero_crossing_rate(&mono),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sine_buffer;
    use crate::{RenderEngine, RenderGraph, SignalRenderer, Waveform};
    use std::time::Duration;

    #[test]
    fn tones_have_more_contrast_than_noise() {
        let tone = sine_buffer(1_000.0, 16_000, 2048, 1);
        let noise = SignalRenderer.render(
            &RenderGraph {
                waveform: Waveform::Noise {
                    amplitude: 0.5,
                    seed: 11,
                },
                sample_rate: 16_000,
                channels: 1,
            },
            Duration::from_millis(128),
        );

        let FeatureModel::Timbre(tone) = TimbreAnalyzer.extract_features(&tone).unwrap() else {
            panic!("wrong family");
        };
        let FeatureModel::Timbre(noise) = TimbreAnalyzer.extract_features(&noise).unwrap() else {
            panic!("wrong family");
        };
        assert!(tone.contrast_db > noise.contrast_db);
        assert!(noise.zero_crossing_rate > tone.zero_crossing_rate);
    }
}
