use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::PullStatus;

/// Liveness counters for one source, updated on every pull.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceHealth {
    pub is_alive: bool,
    pub underrun_count: u64,
    pub buffers_served: u64,
    pub last_buffer_timestamp: Option<SystemTime>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            is_alive: true,
            underrun_count: 0,
            buffers_served: 0,
            last_buffer_timestamp: None,
        }
    }
}

impl SourceHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of a pull. Underruns and disconnects still
    /// count as served buffers since the caller received silence.
    pub(crate) fn record(&mut self, status: PullStatus) {
        self.buffers_served += 1;
        self.last_buffer_timestamp = Some(SystemTime::now());
        match status {
            PullStatus::Ready => self.is_alive = true,
            PullStatus::Underrun => self.underrun_count += 1,
            PullStatus::Disconnected => {
                self.underrun_count += 1;
                self.is_alive = false;
            }
        }
    }
}
