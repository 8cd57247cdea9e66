//! Decoder collaborator: turns a path into an [`AudioBuffer`].

use std::path::Path;

use crate::{detect_audio_format, AudioBuffer, AudioFormat, DecodeError};

/// Anything that can load a whole file into memory.
///
/// File sources call this once at creation time, so implementations are
/// free to block on IO.
pub trait AudioDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<AudioBuffer, DecodeError>;
}

/// Default decoder backed by `hound`. Only WAV is supported; other known
/// formats are rejected with [`DecodeError::UnsupportedFormat`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WavDecoder;

impl WavDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl AudioDecoder for WavDecoder {
    fn decode(&self, path: &Path) -> Result<AudioBuffer, DecodeError> {
        let format = detect_audio_format(path);
        if format != AudioFormat::Wav && format != AudioFormat::Unknown {
            return Err(DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: format.to_string(),
            });
        }

        let wav_err = |source| DecodeError::Wav {
            path: path.to_path_buf(),
            source,
        };
        let reader = hound::WavReader::open(path).map_err(|err| match err {
            hound::Error::IoError(source) => DecodeError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => wav_err(other),
        })?;

        let spec = reader.spec();
        if spec.channels == 0 || spec.sample_rate == 0 {
            return Err(DecodeError::Empty(path.to_path_buf()));
        }

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(wav_err)?,
            hound::SampleFormat::Int => {
                let scale = (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(wav_err)?
            }
        };

        let mut buffer = AudioBuffer::from_interleaved(samples, spec.sample_rate, spec.channels);
        let repaired = buffer.sanitize();
        if repaired > 0 {
            tracing::warn!(path = %path.display(), repaired, "replaced non-finite samples");
        }
        tracing::debug!(
            path = %path.display(),
            frames = buffer.frames(),
            channels = buffer.channels(),
            sample_rate = buffer.sample_rate(),
            "decoded wav file"
        );
        Ok(buffer)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    /// Writes a 16-bit WAV fixture and returns its path inside `dir`.
    pub(crate) fn write_wav(dir: &Path, name: &str, channels: u16, samples: &[f32]) -> PathBuf {
        let path = dir.join(name);
        let spec = hound::WavSpec {
            channels,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in samples {
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn decodes_integer_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "tone.wav", 2, &[0.5, -0.5, 0.25, -0.25]);

        let buffer = WavDecoder::new().decode(&path).unwrap();
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.sample_rate(), 8_000);
        assert_eq!(buffer.frames(), 2);
        assert!((buffer.samples()[0] - 0.5).abs() < 1e-3);
        assert!((buffer.samples()[1] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn rejects_formats_without_decoder() {
        let err = WavDecoder::new().decode(Path::new("song.mp3")).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_files_report_io_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = WavDecoder::new()
            .decode(&dir.path().join("absent.wav"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io { .. }));
    }
}
