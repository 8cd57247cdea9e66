use super::{check_buffer, dsp::compute_rms, Analyzer, FeatureFamily, FeatureModel, SpatialFeatures};
use crate::{AnalyzerError, AudioBuffer};

/// Stereo image of the first two channels. Mono material reports the
/// neutral image.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpatialAnalyzer;

impl SpatialAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for SpatialAnalyzer {
    fn name(&self) -> &str {
        "spatial"
    }

    fn family(&self) -> FeatureFamily {
        FeatureFamily::Spatial
    }

    fn extract_features(&self, buffer: &AudioBuffer) -> Result<FeatureModel, AnalyzerError> {
        if !check_buffer(buffer)? || buffer.channels() < 2 {
            return Ok(FeatureModel::neutral(self.family()));
        }

        let left = buffer.channel(0);
        let right = buffer.channel(1);

        let (mut lr, mut ll, mut rr) = (0.0_f64, 0.0_f64, 0.0_f64);
        for (&l, &r) in left.iter().zip(&right) {
            let (l, r) = (f64::from(l), f64::from(r));
            lr += l * r;
            ll += l * l;
            rr += r * r;
        }
        let silent = f64::from(f32::EPSILON);
        let correlation = if ll <= silent || rr <= silent {
            // One side silent: fully one-sided, but no phase conflict.
            0.0
        } else {
            ((lr / (ll.sqrt() * rr.sqrt())) as f32).clamp(-1.0, 1.0)
        };

        let mid: Vec<f32> = left.iter().zip(&right).map(|(l, r)| (l + r) * 0.5).collect();
        let side: Vec<f32> = left.iter().zip(&right).map(|(l, r)| (l - r) * 0.5).collect();
        let (mid_rms, side_rms) = (compute_rms(&mid), compute_rms(&side));
        let stereo_width = if mid_rms + side_rms <= f32::EPSILON {
            0.0
        } else {
            side_rms / (mid_rms + side_rms)
        };

        let (left_rms, right_rms) = (compute_rms(&left), compute_rms(&right));
        let balance = if left_rms + right_rms <= f32::EPSILON {
            0.0
        } else {
            (right_rms - left_rms) / (left_rms + right_rms)
        };

        Ok(FeatureModel::Spatial(SpatialFeatures {
            correlation,
            stereo_width,
            balance,
            mono_compatible: correlation >= 0.0,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spatial(samples: Vec<f32>) -> SpatialFeatures {
        let buffer = AudioBuffer::from_interleaved(samples, 8_000, 2);
        match SpatialAnalyzer.extract_features(&buffer).unwrap() {
            FeatureModel::Spatial(features) => features,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn identical_channels_are_centered_and_narrow() {
        let features = spatial(vec![0.5, 0.5, -0.25, -0.25, 0.1, 0.1]);
        assert!((features.correlation - 1.0).abs() < 1e-5);
        assert_eq!(features.stereo_width, 0.0);
        assert_eq!(features.balance, 0.0);
    }

    #[test]
    fn inverted_channels_fail_mono_compatibility() {
        let features = spatial(vec![0.5, -0.5, -0.25, 0.25]);
        assert!((features.correlation + 1.0).abs() < 1e-5);
        assert!(!features.mono_compatible);
        assert!((features.stereo_width - 1.0).abs() < 1e-5);
    }

    #[test]
    fn hard_right_balance() {
        let features = spatial(vec![0.0, 0.5, 0.0, -0.5]);
        assert!((features.balance - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mono_buffers_are_neutral() {
        let buffer = AudioBuffer::from_interleaved(vec![0.5; 8], 8_000, 1);
        assert_eq!(
            SpatialAnalyzer.extract_features(&buffer).unwrap(),
            FeatureModel::neutral(FeatureFamily::Spatial)
        );
    }
}
