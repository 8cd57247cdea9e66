use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError, TrySendError};

use super::{AudioSource, AudioSourceConfig, PullStatus, Pulled};
use crate::AudioBuffer;

/// Producer side of a live input. Cloneable; the source reports itself as
/// disconnected once every feed has been dropped.
#[derive(Debug, Clone)]
pub struct LiveFeed {
    tx: Sender<Vec<f32>>,
}

impl LiveFeed {
    /// Queues interleaved samples without blocking. Returns `false` when
    /// the queue is full or the source has been removed.
    pub fn push(&self, samples: Vec<f32>) -> bool {
        match self.tx.try_send(samples) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("live feed queue full, chunk dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Pulls from an external real-time feed and substitutes silence when the
/// feed cannot fill a block in time.
#[derive(Debug)]
pub struct LiveInputSource {
    config: AudioSourceConfig,
    rx: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    disconnected: bool,
}

impl LiveInputSource {
    /// Creates the source together with the feed that drives it.
    pub fn new(config: AudioSourceConfig, queue_depth: usize) -> (Self, LiveFeed) {
        let (tx, rx) = bounded(queue_depth.max(1));
        let source = Self {
            pending: Vec::with_capacity(config.block_len() * 2),
            config,
            rx,
            disconnected: false,
        };
        (source, LiveFeed { tx })
    }

    fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.config.poll_timeout_ms)
    }

    /// Moves queued chunks into `pending` until a block is available, the
    /// queue is empty, or the poll timeout elapses.
    fn fill_pending(&mut self) {
        let needed = self.config.block_len();
        let deadline = Instant::now() + self.poll_timeout();

        while self.pending.len() < needed {
            let chunk = match self.rx.try_recv() {
                Ok(chunk) => chunk,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
                Err(TryRecvError::Empty) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match self.rx.recv_timeout(remaining) {
                        Ok(chunk) => chunk,
                        Err(RecvTimeoutError::Timeout) => break,
                        Err(RecvTimeoutError::Disconnected) => {
                            self.disconnected = true;
                            break;
                        }
                    }
                }
            };
            self.pending.extend(chunk);
        }
    }
}

impl AudioSource for LiveInputSource {
    fn config(&self) -> &AudioSourceConfig {
        &self.config
    }

    fn next_buffer(&mut self) -> Pulled {
        self.fill_pending();

        let needed = self.config.block_len();
        if self.pending.len() < needed {
            let status = if self.disconnected {
                PullStatus::Disconnected
            } else {
                PullStatus::Underrun
            };
            tracing::debug!(
                source = %self.config.name,
                queued = self.pending.len(),
                needed,
                ?status,
                "live input underrun"
            );
            return Pulled {
                buffer: self.config.silence(),
                status,
            };
        }

        let block: Vec<f32> = self.pending.drain(..needed).collect();
        let mut buffer = AudioBuffer::from_interleaved(block, self.config.sample_rate, self.config.channels);
        let repaired = buffer.sanitize();
        if repaired > 0 {
            tracing::warn!(source = %self.config.name, repaired, "replaced non-finite live samples");
        }
        Pulled::ready(buffer)
    }
}
