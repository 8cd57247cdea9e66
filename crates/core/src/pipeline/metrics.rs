use std::{collections::VecDeque, time::Duration};

use serde::Serialize;

/// Timing and cache snapshot recorded for each processed buffer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineMetrics {
    pub processing_time: Duration,
    pub cache_hit: bool,
    /// Cumulative cache hit rate after this buffer.
    pub cache_hit_rate: f64,
    /// Frames in the processed buffer.
    pub buffer_size: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub source: Option<String>,
    pub analyzers_failed: usize,
    pub recorded_at_ms: u64,
}

/// Bounded, insertion-ordered metrics log. The oldest snapshot drops once
/// `capacity` is reached.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    entries: VecDeque<PipelineMetrics>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, metrics: PipelineMetrics) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(metrics);
    }

    pub fn latest(&self) -> Option<&PipelineMetrics> {
        self.entries.back()
    }

    pub fn snapshot(&self) -> Vec<PipelineMetrics> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
