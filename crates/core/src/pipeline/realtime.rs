use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{bounded, select, tick, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use super::{AnalysisPipeline, AnalysisResult, ProcessOptions};
use crate::AudioBuffer;

struct AnalysisRequest {
    source: String,
    buffer: AudioBuffer,
    captured_at: Instant,
}

/// One analyzed buffer delivered by the driver.
#[derive(Debug, Clone)]
pub struct RealtimeOutput {
    pub source: String,
    pub result: AnalysisResult,
    /// Capture to result, including time spent queued.
    pub latency: Duration,
}

/// Pulls buffers at the audio cadence on a capture thread and hands them
/// to an analysis worker through a bounded queue.
///
/// The capture thread only touches the router and the queue. When the
/// worker falls behind, the oldest queued request is dropped so the
/// newest audio is always analyzed.
pub struct RealtimeDriver {
    shutdown: Option<Sender<()>>,
    capture: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
    results: Receiver<RealtimeOutput>,
    dropped: Arc<AtomicU64>,
}

impl RealtimeDriver {
    /// Starts driving `sources`, or every registered source when empty.
    pub fn start(
        pipeline: Arc<AnalysisPipeline>,
        sources: Vec<String>,
        options: ProcessOptions,
    ) -> std::io::Result<Self> {
        let cadence = pipeline.router().audio_config().buffer_duration();
        let capacity = pipeline.config().queue_capacity.max(1);
        let (request_tx, request_rx) = bounded::<AnalysisRequest>(capacity);
        let (result_tx, results) = unbounded();
        let (shutdown, shutdown_rx) = bounded::<()>(0);
        let dropped = Arc::new(AtomicU64::new(0));

        let capture = {
            let pipeline = Arc::clone(&pipeline);
            let oldest = request_rx.clone();
            let dropped = Arc::clone(&dropped);
            thread::Builder::new()
                .name("soundcheck-capture".into())
                .spawn(move || {
                    let ticker = tick(cadence);
                    loop {
                        let stopping = select! {
                            recv(ticker) -> _ => false,
                            recv(shutdown_rx) -> _ => true,
                        };
                        if stopping {
                            break;
                        }

                        let names = if sources.is_empty() {
                            pipeline.router().source_names()
                        } else {
                            sources.clone()
                        };
                        for source in names {
                            let buffer = match pipeline.router().get_buffer(&source) {
                                Ok(buffer) => buffer,
                                Err(err) => {
                                    debug!(source = %source, error = %err, "capture skipped source");
                                    continue;
                                }
                            };
                            let request = AnalysisRequest {
                                source,
                                buffer,
                                captured_at: Instant::now(),
                            };
                            enqueue_latest(&request_tx, &oldest, request, &dropped);
                        }
                    }
                    debug!("capture thread stopped");
                })?
        };

        let worker = thread::Builder::new()
            .name("soundcheck-analysis".into())
            .spawn(move || {
                for request in request_rx.iter() {
                    let result = pipeline.process_labeled(&request.source, &request.buffer, options);
                    let output = RealtimeOutput {
                        source: request.source,
                        result,
                        latency: request.captured_at.elapsed(),
                    };
                    if result_tx.send(output).is_err() {
                        break;
                    }
                }
                debug!("analysis worker stopped");
            })?;

        info!(cadence_ms = cadence.as_millis() as u64, capacity, "real-time driver started");
        Ok(Self {
            shutdown: Some(shutdown),
            capture: Some(capture),
            worker: Some(worker),
            results,
            dropped,
        })
    }

    /// Channel on which analyzed buffers arrive, in processing order.
    pub fn results(&self) -> &Receiver<RealtimeOutput> {
        &self.results
    }

    /// Requests discarded because the worker fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stops capture, lets the worker drain what is queued, and joins both
    /// threads.
    pub fn stop(&mut self) {
        // Dropping the sender disconnects the shutdown channel, which wakes
        // the capture select.
        self.shutdown.take();
        if let Some(capture) = self.capture.take() {
            if capture.join().is_err() {
                warn!("capture thread panicked");
            }
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("analysis worker panicked");
            }
        }
    }
}

impl Drop for RealtimeDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Never blocks: on a full queue the oldest pending request makes room.
fn enqueue_latest<T>(tx: &Sender<T>, oldest: &Receiver<T>, item: T, dropped: &AtomicU64) -> bool {
    let mut item = item;
    loop {
        match tx.try_send(item) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(rejected)) => {
                item = rejected;
                if oldest.try_recv().is_ok() {
                    let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(dropped = total, "analysis queue full, dropped oldest request");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{source::AudioSourceConfig, AppConfig, AudioConfig};

    #[test]
    fn full_queue_drops_oldest() {
        let (tx, rx) = bounded(2);
        let dropped = AtomicU64::new(0);
        for value in 1..=4 {
            assert!(enqueue_latest(&tx, &rx, value, &dropped));
        }
        assert_eq!(dropped.load(Ordering::Relaxed), 2);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![3, 4]);
    }

    #[test]
    fn delivers_results_at_audio_cadence() {
        let config = AppConfig {
            audio: AudioConfig {
                sample_rate: 8_000,
                channels: 1,
                buffer_size: 80,
                ..Default::default()
            },
            ..Default::default()
        };
        let pipeline = Arc::new(AnalysisPipeline::new(&config));
        pipeline
            .router()
            .create_source(AudioSourceConfig::generator("tone", 8_000, 1, 80))
            .unwrap();

        let mut driver =
            RealtimeDriver::start(Arc::clone(&pipeline), Vec::new(), ProcessOptions::default())
                .unwrap();
        let output = driver
            .results()
            .recv_timeout(Duration::from_secs(5))
            .unwrap();
        driver.stop();

        assert_eq!(output.source, "tone");
        assert_eq!(output.result.sample_rate, 8_000);
        assert_eq!(output.result.frames, 80);
        assert!(!pipeline.get_metrics().is_empty());
        assert_eq!(
            pipeline.get_metrics()[0].source.as_deref(),
            Some("tone")
        );
    }
}
