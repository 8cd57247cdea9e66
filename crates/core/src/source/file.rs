use std::path::Path;

use super::{AudioSource, AudioSourceConfig, EndOfFilePolicy, Pulled};
use crate::{AudioBuffer, AudioDecoder, SourceError};

/// Serves sequential blocks out of a fully decoded file.
#[derive(Debug)]
pub struct FileSource {
    config: AudioSourceConfig,
    data: AudioBuffer,
    cursor: usize,
}

impl FileSource {
    /// Decodes the configured file. This is the only blocking step; later
    /// pulls only copy from memory.
    pub fn open(config: AudioSourceConfig, decoder: &dyn AudioDecoder) -> Result<Self, SourceError> {
        let path = config
            .file_path
            .clone()
            .ok_or_else(|| SourceError::MissingFilePath(config.name.clone()))?;
        let decoded = decoder
            .decode(&path)
            .map_err(|source| SourceError::DecodeFailure {
                name: config.name.clone(),
                source,
            })?;
        Ok(Self::from_buffer(config, decoded, &path))
    }

    fn from_buffer(config: AudioSourceConfig, decoded: AudioBuffer, path: &Path) -> Self {
        if decoded.sample_rate() != config.sample_rate {
            tracing::warn!(
                source = %config.name,
                path = %path.display(),
                file_rate = decoded.sample_rate(),
                configured_rate = config.sample_rate,
                "file sample rate differs from configuration; serving at file rate"
            );
        }
        let data = if decoded.channels() == config.channels {
            decoded
        } else {
            tracing::debug!(
                source = %config.name,
                from = decoded.channels(),
                to = config.channels,
                "remixing decoded file"
            );
            decoded.remix(config.channels)
        };

        Self {
            config,
            data,
            cursor: 0,
        }
    }

    /// Total frames available in the decoded file.
    pub fn total_frames(&self) -> usize {
        self.data.frames()
    }

    /// Frame index the next pull starts at.
    pub fn position(&self) -> usize {
        self.cursor
    }
}

impl AudioSource for FileSource {
    fn config(&self) -> &AudioSourceConfig {
        &self.config
    }

    fn next_buffer(&mut self) -> Pulled {
        let channels = self.config.channels as usize;
        let total = self.data.frames();
        let wanted = self.config.buffer_size;
        let mut out = Vec::with_capacity(wanted * channels);

        if total > 0 {
            let source = self.data.samples();
            while out.len() < wanted * channels {
                if self.cursor >= total {
                    match self.config.end_of_file {
                        EndOfFilePolicy::Loop => self.cursor = 0,
                        EndOfFilePolicy::PadSilence => break,
                    }
                }
                let take = (wanted - out.len() / channels).min(total - self.cursor);
                let start = self.cursor * channels;
                out.extend_from_slice(&source[start..start + take * channels]);
                self.cursor += take;
            }
        }

        let mut buffer = AudioBuffer::from_interleaved(out, self.data.sample_rate(), self.config.channels);
        buffer.fit_frames(wanted);
        Pulled::ready(buffer)
    }
}
