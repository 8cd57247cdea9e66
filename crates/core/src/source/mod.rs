//! Audio sources: anything that can hand the router a fixed-size block on
//! demand.

mod file;
mod generator;
mod health;
mod live;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, AudioConfig, SourceError, Waveform};

pub use file::FileSource;
pub use generator::GeneratorSource;
pub use health::SourceHealth;
pub use live::{LiveFeed, LiveInputSource};

/// Kind of input backing a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    File,
    Generator,
    LiveInput,
}

/// What a file source does once it runs out of material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndOfFilePolicy {
    /// Wrap around to the first frame.
    #[default]
    Loop,
    /// Fill the remainder with silence and stay at the end.
    PadSilence,
}

/// Registration request for a named source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSourceConfig {
    pub name: String,
    pub source_type: SourceType,
    pub sample_rate: u32,
    pub channels: u16,
    pub buffer_size: usize,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    #[serde(default)]
    pub end_of_file: EndOfFilePolicy,
    #[serde(default)]
    pub waveform: Waveform,
    /// How long a live pull may wait for data before reporting an underrun.
    #[serde(default)]
    pub poll_timeout_ms: u64,
}

impl AudioSourceConfig {
    pub fn new(
        name: impl Into<String>,
        source_type: SourceType,
        sample_rate: u32,
        channels: u16,
        buffer_size: usize,
    ) -> Self {
        Self {
            name: name.into(),
            source_type,
            sample_rate,
            channels,
            buffer_size,
            file_path: None,
            end_of_file: EndOfFilePolicy::default(),
            waveform: Waveform::default(),
            poll_timeout_ms: 0,
        }
    }

    pub fn generator(name: impl Into<String>, sample_rate: u32, channels: u16, buffer_size: usize) -> Self {
        Self::new(name, SourceType::Generator, sample_rate, channels, buffer_size)
    }

    pub fn live_input(name: impl Into<String>, sample_rate: u32, channels: u16, buffer_size: usize) -> Self {
        Self::new(name, SourceType::LiveInput, sample_rate, channels, buffer_size)
    }

    pub fn file(name: impl Into<String>, path: impl Into<PathBuf>, audio: &AudioConfig) -> Self {
        let mut config = Self::new(
            name,
            SourceType::File,
            audio.sample_rate,
            audio.channels,
            audio.buffer_size,
        );
        config.file_path = Some(path.into());
        config
    }

    /// Source shaped like the configured buses.
    pub fn from_audio(name: impl Into<String>, source_type: SourceType, audio: &AudioConfig) -> Self {
        Self::new(
            name,
            source_type,
            audio.sample_rate,
            audio.channels,
            audio.buffer_size,
        )
    }

    pub fn with_waveform(mut self, waveform: Waveform) -> Self {
        self.waveform = waveform;
        self
    }

    pub fn with_end_of_file(mut self, policy: EndOfFilePolicy) -> Self {
        self.end_of_file = policy;
        self
    }

    pub fn with_poll_timeout_ms(mut self, millis: u64) -> Self {
        self.poll_timeout_ms = millis;
        self
    }

    /// Checks everything that can be checked without touching the disk.
    pub fn validate(&self) -> Result<(), SourceError> {
        let invalid = |reason| SourceError::InvalidConfig {
            name: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.sample_rate == 0 {
            return Err(invalid("sample rate must be positive"));
        }
        if self.channels == 0 {
            return Err(invalid("channel count must be positive"));
        }
        if self.buffer_size == 0 {
            return Err(invalid("buffer size must be positive"));
        }
        if self.source_type == SourceType::File && self.file_path.is_none() {
            return Err(SourceError::MissingFilePath(self.name.clone()));
        }
        Ok(())
    }

    /// Number of interleaved samples in one block.
    pub fn block_len(&self) -> usize {
        self.buffer_size * self.channels as usize
    }

    pub(crate) fn silence(&self) -> AudioBuffer {
        AudioBuffer::silent(self.buffer_size, self.channels, self.sample_rate)
    }
}

/// Outcome of a single pull, used by the router to update health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullStatus {
    /// Real data was delivered.
    Ready,
    /// Not enough data arrived in time; the buffer is silence.
    Underrun,
    /// The upstream feed is gone; the buffer is silence.
    Disconnected,
}

/// Block produced by [`AudioSource::next_buffer`].
#[derive(Debug, Clone)]
pub struct Pulled {
    pub buffer: AudioBuffer,
    pub status: PullStatus,
}

impl Pulled {
    pub fn ready(buffer: AudioBuffer) -> Self {
        Self {
            buffer,
            status: PullStatus::Ready,
        }
    }
}

/// A producer of fixed-size blocks.
///
/// `next_buffer` is called from the real-time thread and must not block
/// for longer than the source's configured poll timeout.
pub trait AudioSource: Send {
    fn config(&self) -> &AudioSourceConfig;

    fn next_buffer(&mut self) -> Pulled;

    fn name(&self) -> &str {
        &self.config().name
    }

    fn source_type(&self) -> SourceType {
        self.config().source_type
    }
}
