use std::{f32::consts::PI, time::Duration};

use serde::{Deserialize, Serialize};

use crate::AudioBuffer;

/// Signal a generator source asks the rendering engine to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Waveform {
    Silence,
    Sine { frequency: f32, amplitude: f32 },
    /// Deterministic white noise; the same seed always renders the same block.
    Noise { amplitude: f32, seed: u32 },
}

impl Default for Waveform {
    fn default() -> Self {
        Waveform::Sine {
            frequency: 440.0,
            amplitude: 0.5,
        }
    }
}

/// Description of what to render. The native engine accepts arbitrary
/// processing graphs; the toolkit only ever asks for a single oscillator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderGraph {
    pub waveform: Waveform,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Rendering-engine collaborator. Generator sources delegate to it; the
/// pipeline never calls it directly.
pub trait RenderEngine: Send + Sync {
    /// Renders `duration` of audio from t = 0. Implementations must be
    /// stateless so identical requests produce identical buffers.
    fn render(&self, graph: &RenderGraph, duration: Duration) -> AudioBuffer;
}

/// Built-in engine that synthesizes the basic [`Waveform`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalRenderer;

impl RenderEngine for SignalRenderer {
    fn render(&self, graph: &RenderGraph, duration: Duration) -> AudioBuffer {
        let frames = (duration.as_secs_f64() * graph.sample_rate as f64).round() as usize;
        let channels = graph.channels.max(1);
        let sample_rate = graph.sample_rate.max(1) as f32;

        let mono: Vec<f32> = match graph.waveform {
            Waveform::Silence => vec![0.0; frames],
            Waveform::Sine {
                frequency,
                amplitude,
            } => (0..frames)
                .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate).sin())
                .collect(),
            Waveform::Noise { amplitude, seed } => {
                let mut state = seed;
                (0..frames)
                    .map(|_| {
                        state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                        let unit = ((state >> 16) & 0x7fff) as f32 / 16_383.5 - 1.0;
                        amplitude * unit
                    })
                    .collect()
            }
        };

        let mut samples = Vec::with_capacity(frames * channels as usize);
        for value in mono {
            samples.extend(std::iter::repeat(value).take(channels as usize));
        }

        let mut buffer = AudioBuffer::from_interleaved(samples, graph.sample_rate, channels);
        buffer.sanitize();
        buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(waveform: Waveform) -> RenderGraph {
        RenderGraph {
            waveform,
            sample_rate: 1_000,
            channels: 2,
        }
    }

    #[test]
    fn renders_requested_shape() {
        let buffer = SignalRenderer.render(&graph(Waveform::default()), Duration::from_millis(64));
        assert_eq!(buffer.frames(), 64);
        assert_eq!(buffer.channels(), 2);
        assert!(buffer.peak() > 0.0 && buffer.peak() <= 0.5);
    }

    #[test]
    fn rendering_is_deterministic() {
        let noise = graph(Waveform::Noise {
            amplitude: 1.0,
            seed: 7,
        });
        let a = SignalRenderer.render(&noise, Duration::from_millis(32));
        let b = SignalRenderer.render(&noise, Duration::from_millis(32));
        assert_eq!(a, b);
        assert!(a.samples().iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn silence_is_zeroed() {
        let buffer = SignalRenderer.render(&graph(Waveform::Silence), Duration::from_millis(10));
        assert!(buffer.samples().iter().all(|s| *s == 0.0));
    }
}
