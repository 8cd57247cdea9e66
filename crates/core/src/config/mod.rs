use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::Result;

/// Top-level configuration structure for the toolkit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Reads a JSON configuration file. Missing sections fall back to
    /// their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Shape of the buses produced by the router and default source shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: usize,
    /// Chunks a live feed may queue before the producer is told to back off.
    pub live_queue_depth: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            buffer_size: 1024,
            live_queue_depth: 32,
        }
    }
}

impl AudioConfig {
    /// Wall-clock length of one buffer, i.e. the real-time cadence.
    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.buffer_size as f64 / self.sample_rate.max(1) as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub size_limit: usize,
    /// `None` disables time-based expiry.
    pub ttl_seconds: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size_limit: 256,
            ttl_seconds: Some(300),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_seconds.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of metrics snapshots retained before the oldest drop.
    pub metrics_history: usize,
    /// Capacity of the real-time to worker handoff queue.
    pub queue_capacity: usize,
    /// Run analyzer families on scoped threads on a cache miss.
    pub parallel_analyzers: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metrics_history: 512,
            queue_capacity: 8,
            parallel_analyzers: true,
        }
    }
}
