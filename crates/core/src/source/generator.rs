use std::{sync::Arc, time::Duration};

use super::{AudioSource, AudioSourceConfig, Pulled};
use crate::{RenderEngine, RenderGraph};

/// Synthesizes its blocks through the rendering engine.
///
/// Every pull renders the same block from t = 0, so a generator with a
/// fixed configuration always yields identical buffers.
pub struct GeneratorSource {
    config: AudioSourceConfig,
    graph: RenderGraph,
    engine: Arc<dyn RenderEngine>,
}

impl GeneratorSource {
    pub fn new(config: AudioSourceConfig, engine: Arc<dyn RenderEngine>) -> Self {
        let graph = RenderGraph {
            waveform: config.waveform.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
        };
        Self {
            config,
            graph,
            engine,
        }
    }

    fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.config.buffer_size as f64 / self.config.sample_rate as f64)
    }
}

impl AudioSource for GeneratorSource {
    fn config(&self) -> &AudioSourceConfig {
        &self.config
    }

    fn next_buffer(&mut self) -> Pulled {
        let mut buffer = self.engine.render(&self.graph, self.block_duration());
        if buffer.channels() != self.config.channels {
            buffer = buffer.remix(self.config.channels);
        }
        buffer.fit_frames(self.config.buffer_size);
        Pulled::ready(buffer)
    }
}

impl std::fmt::Debug for GeneratorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratorSource")
            .field("config", &self.config)
            .finish()
    }
}
