//! Shared signal helpers for the built-in analyzers.

use std::{cell::RefCell, f32::consts::PI};

use realfft::RealFftPlanner;

use crate::AnalyzerError;

/// Level reported for digital silence.
pub const SILENCE_DB: f32 = -120.0;

thread_local! {
    static PLANNER: RefCell<RealFftPlanner<f32>> = RefCell::new(RealFftPlanner::new());
}

/// Magnitude spectrum of a Hann-windowed block.
#[derive(Debug, Clone, Default)]
pub struct Spectrum {
    pub magnitudes: Vec<f32>,
    pub bin_hz: f32,
}

impl Spectrum {
    /// Computes the spectrum of `samples`. Blocks shorter than two samples
    /// produce an empty spectrum.
    pub fn compute(samples: &[f32], sample_rate: u32) -> Result<Self, AnalyzerError> {
        let len = samples.len();
        if len < 2 {
            return Ok(Self::default());
        }

        let plan = PLANNER.with(|planner| planner.borrow_mut().plan_fft_forward(len));
        let mut input = plan.make_input_vec();
        let mut spectrum = plan.make_output_vec();
        for (index, (slot, value)) in input.iter_mut().zip(samples).enumerate() {
            *slot = *value * hann_value(index, len);
        }
        plan.process(&mut input, &mut spectrum)?;

        Ok(Self {
            magnitudes: spectrum.iter().map(|bin| bin.norm()).collect(),
            bin_hz: sample_rate as f32 / len as f32,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn frequency(&self, bin: usize) -> f32 {
        bin as f32 * self.bin_hz
    }

    pub fn nyquist(&self) -> f32 {
        self.frequency(self.magnitudes.len().saturating_sub(1))
    }

    fn magnitude_sum(&self) -> f32 {
        self.magnitudes.iter().sum()
    }

    /// Sum of squared magnitudes, accumulated in f64 so loud blocks do
    /// not overflow.
    pub fn total_energy(&self) -> f64 {
        self.magnitudes.iter().map(|&m| power(m)).sum()
    }

    /// Magnitude-weighted mean frequency in Hz.
    pub fn centroid(&self) -> f32 {
        let total = self.magnitude_sum();
        if total <= f32::EPSILON {
            return 0.0;
        }
        let weighted: f32 = self
            .magnitudes
            .iter()
            .enumerate()
            .map(|(i, m)| m * self.frequency(i))
            .sum();
        weighted / total
    }

    /// `n`-th central moment of frequency around `centroid`, weighted by
    /// normalised magnitude.
    pub fn central_moment(&self, centroid: f32, n: i32) -> f32 {
        let total = self.magnitude_sum();
        if total <= f32::EPSILON {
            return 0.0;
        }
        self.magnitudes
            .iter()
            .enumerate()
            .map(|(i, m)| (m / total) * (self.frequency(i) - centroid).powi(n))
            .sum()
    }

    /// Share of energy between `low_hz` (inclusive) and `high_hz`
    /// (exclusive).
    pub fn band_ratio(&self, low_hz: f32, high_hz: f32) -> f32 {
        let total = self.total_energy();
        if total <= f64::from(f32::EPSILON) {
            return 0.0;
        }
        let band: f64 = self
            .magnitudes
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let freq = self.frequency(*i);
                freq >= low_hz && freq < high_hz
            })
            .map(|(_, &m)| power(m))
            .sum();
        (band / total) as f32
    }

    /// Frequency below which `fraction` of the energy lies.
    pub fn rolloff(&self, fraction: f32) -> f32 {
        let target = self.total_energy() * f64::from(fraction);
        if target <= f64::from(f32::EPSILON) {
            return 0.0;
        }
        let mut cumulative = 0.0;
        for (i, &m) in self.magnitudes.iter().enumerate() {
            cumulative += power(m);
            if cumulative >= target {
                return self.frequency(i);
            }
        }
        self.nyquist()
    }

    /// Geometric over arithmetic mean of the power spectrum: 1.0 for white
    /// noise, close to 0.0 for a pure tone.
    pub fn flatness(&self) -> f32 {
        let total = self.total_energy();
        if total <= f64::from(f32::EPSILON) {
            return 0.0;
        }
        let count = self.magnitudes.len() as f64;
        let eps = 1e-12_f64;
        let log_mean: f64 = self
            .magnitudes
            .iter()
            .map(|&m| (power(m) + eps).ln())
            .sum::<f64>()
            / count;
        let arithmetic = total / count + eps;
        ((log_mean.exp() / arithmetic) as f32).clamp(0.0, 1.0)
    }
}

pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&sample| power(sample)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Square of a sample or magnitude in f64. Any finite f32 squares to a
/// finite f64.
pub fn power(value: f32) -> f64 {
    let value = f64::from(value);
    value * value
}

pub fn hann_value(index: usize, len: usize) -> f32 {
    if len <= 1 {
        return 1.0;
    }

    0.5 - 0.5 * ((2.0 * PI * index as f32) / (len as f32 - 1.0)).cos()
}

pub fn amplitude_db(amplitude: f32) -> f32 {
    if amplitude <= 1e-6 {
        SILENCE_DB
    } else {
        20.0 * amplitude.log10()
    }
}

/// Sign changes per sample.
pub fn zero_crossing_rate(samples: &[f32]) -> f32 {
    if samples.len() < 2 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0.0) != (pair[1] >= 0.0))
        .count();
    crossings as f32 / (samples.len() - 1) as f32
}

/// RMS of consecutive non-overlapping windows. A trailing partial window
/// is included.
pub fn windowed_rms(samples: &[f32], window: usize) -> Vec<f32> {
    samples.chunks(window.max(1)).map(compute_rms).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn centroid_tracks_tone_frequency() {
        let spectrum = Spectrum::compute(&sine(1_000.0, 16_000, 1024), 16_000).unwrap();
        assert!((spectrum.centroid() - 1_000.0).abs() < 100.0);
        assert!(spectrum.flatness() < 0.1);
    }

    #[test]
    fn silence_has_neutral_spectrum() {
        let spectrum = Spectrum::compute(&[0.0; 256], 8_000).unwrap();
        assert_eq!(spectrum.centroid(), 0.0);
        assert_eq!(spectrum.rolloff(0.85), 0.0);
        assert_eq!(spectrum.band_ratio(0.0, 1_000.0), 0.0);
    }

    #[test]
    fn short_blocks_yield_empty_spectrum() {
        assert!(Spectrum::compute(&[0.5], 8_000).unwrap().is_empty());
    }

    #[test]
    fn level_helpers() {
        assert_eq!(amplitude_db(0.0), SILENCE_DB);
        assert!((amplitude_db(1.0)).abs() < 1e-6);
        assert!((compute_rms(&[1.0, -1.0]) - 1.0).abs() < 1e-6);
        assert_eq!(zero_crossing_rate(&[1.0, -1.0, 1.0]), 1.0);
        assert_eq!(windowed_rms(&[1.0; 5], 2).len(), 3);
    }

    #[test]
    fn loud_blocks_stay_finite() {
        let loud = vec![1.0e20_f32; 512];
        assert!((compute_rms(&loud) / 1.0e20 - 1.0).abs() < 1e-5);

        let loud_tone: Vec<f32> = sine(1_000.0, 16_000, 512).iter().map(|s| s * 1.0e30).collect();
        let spectrum = Spectrum::compute(&loud_tone, 16_000).unwrap();
        assert!(spectrum.total_energy().is_finite());
        assert!(spectrum.flatness().is_finite());
        assert!(spectrum.band_ratio(500.0, 1_500.0) > 0.5);
        assert!((spectrum.rolloff(0.85) - 1_000.0).abs() < 200.0);
    }
}
