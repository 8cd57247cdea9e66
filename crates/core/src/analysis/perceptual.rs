use super::{
    check_buffer,
    dsp::{compute_rms, power, Spectrum, SILENCE_DB},
    Analyzer, FeatureFamily, FeatureModel, PerceptualFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

/// Loudness and coarse tonal balance descriptors.
#[derive(Debug, Default, Clone, Copy)]
pub struct PerceptualAnalyzer;

impl PerceptualAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for PerceptualAnalyzer {
    fn name(&self) -> &str {
        "perceptual"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Perceptual
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let mono = buffer.mono_mix();
        let mean_square = power(compute_rms(buffer.samples()));
        // Unweighted approximation of integrated loudness.
        let loudness_db = if mean_square <= 1e-12 {
            SILENCE_DB
        } else {
            (-0.691 + 10.0 * mean_square.log10()) as f32
        };

        let spectrum = Spectrum::compute(&mono, buffer.sample_rate())?;
        let nyquist = spectrum.nyquist().max(1.0);
        let total = spectrum.total_energy();
        let sharpness = if total <= f64::from(f32::EPSILON) {
            0.0
        } else {
            let weighted: f64 = spectrum
                .magnitudes
                .iter()
                .enumerate()
                .map(|(i, &m)| power(m) * f64::from(spectrum.frequency(i) / nyquist).powi(2))
                .sum();
            (weighted / total) as f32
        };

        Ok(FeatureModel::Perceptual(PerceptualFeatures {
            loudness_db,
            brightness: spectrum.band_ratio(3_000.0, f32::INFINITY),
            warmth: spectrum.band_ratio(100.0, 500.0),
            sharpness,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sine_buffer;

    fn perceptual(buffer: &AudioBuffer) -> PerceptualFeatures {
        match PerceptualAnalyzer.extract_features(buffer).unwrap() {
            FeatureModel::Perceptual(features) => features,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn low_tones_are_warm_high_tones_bright() {
        let warm = perceptual(&sine_buffer(200.0, 16_000, 2048, 1));
        let bright = perceptual(&sine_buffer(6_000.0, 16_000, 2048, 1));
        assert!(warm.warmth > 0.9);
        assert!(bright.brightness > 0.9);
        assert!(bright.sharpness > warm.sharpness);
    }

    #[test]
    fn louder_signals_report_higher_loudness() {
        let quiet = perceptual(&AudioBuffer::from_interleaved(vec![0.01; 512], 8_000, 1));
        let loud = perceptual(&AudioBuffer::from_interleaved(vec![0.5; 512], 8_000, 1));
        assert!(loud.loudness_db > quiet.loudness_db);
    }
}
