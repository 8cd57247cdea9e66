use super::{check_buffer, dsp::Spectrum, Analyzer, FeatureFamily, FeatureModel, RawFeatures, SpectralFeatures};
use crate::{AnalyzerError, AudioBuffer};

const ROLLOFF_FRACTION: f32 = 0.85;
const LOW_BAND_HZ: f32 = 250.0;
const HIGH_BAND_HZ: f32 = 4_000.0;

/// Spectral shape of the mono downmix.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralAnalyzer;

impl SpectralAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for SpectralAnalyzer {
    fn name(&self) -> &str {
        "spectral"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Spectral
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("rolloff_fraction".to_string(), ROLLOFF_FRACTION.into()),
            ("low_band_hz".to_string(), LOW_BAND_HZ.into()),
            ("high_band_hz".to_string(), HIGH_BAND_HZ.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let spectrum = Spectrum::compute(&buffer.mono_mix(), buffer.sample_rate())?;
        let centroid = spectrum.centroid();
        let nyquist = buffer.sample_rate() as f32 / 2.0;

        Ok(FeatureModel::Spectral(SpectralFeatures {
            centroid_hz: centroid,
            rolloff_hz: spectrum.rolloff(ROLLOFF_FRACTION),
            flatness: spectrum.flatness(),
            bandwidth_hz: spectrum.central_moment(centroid, 2).sqrt(),
            low_energy_ratio: spectrum.band_ratio(0.0, LOW_BAND_HZ),
            mid_energy_ratio: spectrum.band_ratio(LOW_BAND_HZ, HIGH_BAND_HZ),
            high_energy_ratio: spectrum.band_ratio(HIGH_BAND_HZ, nyquist + 1.0),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sine_buffer;

    #[test]
    fn tone_energy_lands_in_its_band() {
        let low = SpectralAnalyzer.extract_features(&sine_buffer(100.0, 8_000, 2048, 1)).unwrap();
        let FeatureModel::Spectral(low) = low else {
            panic!("wrong family");
        };
        assert!(low.low_energy_ratio > 0.9);
        assert!((low.centroid_hz - 100.0).abs() < 50.0);

        let high = SpectralAnalyzer.extract_features(&sine_buffer(3_000.0, 8_000, 2048, 2)).unwrap();
        let FeatureModel::Spectral(high) = high else {
            panic!("wrong family");
        };
        assert!(high.mid_energy_ratio > 0.9);
        assert!(high.rolloff_hz > 2_500.0);
    }

    #[test]
    fn parameters_are_reported() {
        assert_eq!(SpectralAnalyzer.parameters().len(), 3);
    }
}
