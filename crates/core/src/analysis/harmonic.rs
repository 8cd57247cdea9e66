use super::{
    check_buffer,
    dsp::{power, zero_crossing_rate},
    Analyzer, FeatureFamily, FeatureModel, HarmonicFeatures, RawFeatures,
};
use crate::{AnalyzerError, AudioBuffer};

const MIN_PITCH_HZ: f32 = 50.0;
const MAX_PITCH_HZ: f32 = 1_000.0;
const MAX_WINDOW: usize = 4096;
/// Normalised autocorrelation needed before a period is reported.
const VOICING_THRESHOLD: f32 = 0.3;

/// Autocorrelation pitch estimate and periodicity.
#[derive(Debug, Default, Clone, Copy)]
pub struct HarmonicAnalyzer;

impl HarmonicAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for HarmonicAnalyzer {
    fn name(&self) -> &str {
        "harmonic"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Harmonic
    }

    fn parameters(&self) -> RawFeatures {
        RawFeatures::from([
            ("min_pitch_hz".to_string(), MIN_PITCH_HZ.into()),
            ("max_pitch_hz".to_string(), MAX_PITCH_HZ.into()),
            ("voicing_threshold".to_string(), VOICING_THRESHOLD.into()),
        ])
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let mono = buffer.mono_mix();
        let window = &mono[..mono.len().min(MAX_WINDOW)];
        let sample_rate = buffer.sample_rate() as f32;
        let energy: f64 = window.iter().map(|&s| power(s)).sum();

        let min_lag = (sample_rate / MAX_PITCH_HZ).floor().max(1.0) as usize;
        let max_lag = ((sample_rate / MIN_PITCH_HZ).ceil() as usize).min(window.len() / 2);

        let mut best: Option<(usize, f32)> = None;
        if energy > f64::from(f32::EPSILON) {
            for lag in min_lag..=max_lag {
                let correlation = (window
                    .iter()
                    .zip(&window[lag..])
                    .map(|(&a, &b)| f64::from(a) * f64::from(b))
                    .sum::<f64>()
                    / energy) as f32;
                if best.map_or(true, |(_, value)| correlation > value) {
                    best = Some((lag, correlation));
                }
            }
        }

        let (fundamental_hz, harmonicity) = match best {
            Some((lag, correlation)) if correlation >= VOICING_THRESHOLD => {
                (Some(sample_rate / lag as f32), correlation.clamp(0.0, 1.0))
            }
            Some((_, correlation)) => (None, correlation.clamp(0.0, 1.0)),
            None => (None, 0.0),
        };

        Ok(FeatureModel::Harmonic(HarmonicFeatures {
            fundamental_hz,
            harmonicity,
            zero_crossing_rate: zero_crossing_rate(&mono),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::tests::sine_buffer;
    use crate::{RenderEngine, RenderGraph, SignalRenderer, Waveform};

    #[test]
    fn estimates_tone_pitch() {
        let buffer = sine_buffer(200.0, 8_000, 2048, 1);
        let FeatureModel::Harmonic(features) = HarmonicAnalyzer.extract_features(&buffer).unwrap() else {
            panic!("wrong family");
        };
        let pitch = features.fundamental_hz.expect("tone should be voiced");
        assert!((pitch - 200.0).abs() < 5.0);
        assert!(features.harmonicity > 0.5);
    }

    #[test]
    fn noise_is_unvoiced() {
        let buffer = SignalRenderer.render(
            &RenderGraph {
                waveform: Waveform::Noise {
                    amplitude: 0.5,
                    seed: 3,
                },
                sample_rate: 8_000,
                channels: 1,
            },
            std::time::Duration::from_millis(256),
        );
        let FeatureModel::Harmonic(features) = HarmonicAnalyzer.extract_features(&buffer).unwrap() else {
            panic!("wrong family");
        };
        assert!(features.harmonicity < 0.5);
        assert!(features.zero_crossing_rate > 0.2);
    }
}
