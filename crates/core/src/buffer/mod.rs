//! Uniform sample container shared by sources, the router and analyzers.

use serde::{Deserialize, Serialize};

use crate::AnalyzerError;

/// Interleaved block of 32-bit float samples.
///
/// `samples.len()` is always `frames * channels`, and every buffer handed
/// out by a source or the router has been sanitized so it contains only
/// finite values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wraps interleaved samples. Trailing samples that do not form a
    /// complete frame are dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels as usize;
        samples.truncate(whole);
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Zeroed buffer of the requested shape.
    pub fn silent(frames: usize, channels: u16, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        Self {
            samples: vec![0.0; frames * channels as usize],
            sample_rate,
            channels,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [f32] {
        &mut self.samples
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_seconds(&self) -> f32 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.frames() as f32 / self.sample_rate as f32
        }
    }

    /// Checks the structural invariants. Buffers built through the
    /// constructors always pass; deserialized ones may not.
    pub fn validate(&self) -> std::result::Result<(), AnalyzerError> {
        if self.channels == 0 {
            return Err(AnalyzerError::InvalidBuffer("zero channels".into()));
        }
        if self.sample_rate == 0 {
            return Err(AnalyzerError::InvalidBuffer("zero sample rate".into()));
        }
        if self.samples.len() % self.channels as usize != 0 {
            return Err(AnalyzerError::InvalidBuffer(format!(
                "{} samples do not divide into {} channels",
                self.samples.len(),
                self.channels
            )));
        }
        Ok(())
    }

    /// Copies a single channel out of the interleaved data.
    pub fn channel(&self, index: usize) -> Vec<f32> {
        let channels = self.channels as usize;
        if index >= channels {
            return Vec::new();
        }
        self.samples
            .iter()
            .skip(index)
            .step_by(channels)
            .copied()
            .collect()
    }

    /// Average of all channels, one value per frame.
    pub fn mono_mix(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    /// Converts to `target` channels.
    ///
    /// Upmixing: output channel `j` copies input channel `j % src`.
    /// Downmixing: output channel `j` is the mean of every input channel `k`
    /// with `k % dst == j`.
    pub fn remix(&self, target: u16) -> AudioBuffer {
        let src = self.channels.max(1) as usize;
        let dst = target.max(1) as usize;
        if src == dst {
            return self.clone();
        }

        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * dst);
        for frame in self.samples.chunks_exact(src) {
            if dst > src {
                out.extend((0..dst).map(|j| frame[j % src]));
            } else {
                for j in 0..dst {
                    let (sum, count) = frame
                        .iter()
                        .enumerate()
                        .filter(|(k, _)| k % dst == j)
                        .fold((0.0_f32, 0_usize), |(s, c), (_, v)| (s + v, c + 1));
                    out.push(if count == 0 { 0.0 } else { sum / count as f32 });
                }
            }
        }

        AudioBuffer {
            samples: out,
            sample_rate: self.sample_rate,
            channels: dst as u16,
        }
    }

    /// Forces the buffer to exactly `frames` frames, zero-padding or
    /// truncating at the end.
    pub fn fit_frames(&mut self, frames: usize) {
        self.samples.resize(frames * self.channels as usize, 0.0);
    }

    /// Replaces NaN and infinite samples with silence and returns how many
    /// were repaired.
    pub fn sanitize(&mut self) -> usize {
        let mut repaired = 0;
        for sample in self.samples.iter_mut().filter(|s| !s.is_finite()) {
            *sample = 0.0;
            repaired += 1;
        }
        repaired
    }

    pub fn is_finite(&self) -> bool {
        self.samples.iter().all(|s| s.is_finite())
    }

    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0_f32, |peak, s| peak.max(s.abs()))
    }

    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self
            .samples
            .iter()
            .map(|&s| f64::from(s) * f64::from(s))
            .sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Raw little-endian bytes of every sample, used for content hashing.
    pub fn sample_bytes(&self) -> impl Iterator<Item = [u8; 4]> + '_ {
        self.samples.iter().map(|s| s.to_le_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_incomplete_trailing_frame() {
        let buffer = AudioBuffer::from_interleaved(vec![0.1, 0.2, 0.3], 48_000, 2);
        assert_eq!(buffer.frames(), 1);
        assert_eq!(buffer.samples(), &[0.1, 0.2]);
    }

    #[test]
    fn upmix_replicates_channels() {
        let mono = AudioBuffer::from_interleaved(vec![0.5, -0.25], 44_100, 1);
        let stereo = mono.remix(2);
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.samples(), &[0.5, 0.5, -0.25, -0.25]);
    }

    #[test]
    fn downmix_averages_channels() {
        let stereo = AudioBuffer::from_interleaved(vec![1.0, 0.0, 0.5, -0.5], 44_100, 2);
        let mono = stereo.remix(1);
        assert_eq!(mono.samples(), &[0.5, 0.0]);

        let quad = AudioBuffer::from_interleaved(vec![1.0, 0.0, 0.5, 0.25], 44_100, 4);
        let stereo = quad.remix(2);
        assert_eq!(stereo.samples(), &[0.75, 0.125]);
    }

    #[test]
    fn sanitize_replaces_non_finite_values() {
        let mut buffer =
            AudioBuffer::from_interleaved(vec![f32::NAN, 0.5, f32::INFINITY, -0.5], 8_000, 1);
        assert_eq!(buffer.sanitize(), 2);
        assert!(buffer.is_finite());
        assert_eq!(buffer.samples(), &[0.0, 0.5, 0.0, -0.5]);
    }

    #[test]
    fn fit_frames_pads_and_truncates() {
        let mut buffer = AudioBuffer::from_interleaved(vec![1.0; 4], 8_000, 2);
        buffer.fit_frames(3);
        assert_eq!(buffer.samples(), &[1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);
        buffer.fit_frames(1);
        assert_eq!(buffer.samples(), &[1.0, 1.0]);
    }

    #[test]
    fn deserialized_buffers_are_validated() {
        let json = r#"{"samples":[0.0,0.0,0.0],"sample_rate":44100,"channels":2}"#;
        let buffer: AudioBuffer = serde_json::from_str(json).unwrap();
        assert!(matches!(
            buffer.validate(),
            Err(AnalyzerError::InvalidBuffer(_))
        ));
    }
}
