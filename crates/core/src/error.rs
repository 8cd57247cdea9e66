use std::path::PathBuf;

/// Result alias that carries the crate-level [`SoundcheckError`] type.
pub type Result<T> = std::result::Result<T, SoundcheckError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SoundcheckError {
    /// Free-form failure surfaced by the application layer.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A source could not be created or read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// A file could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// A configuration document was malformed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl SoundcheckError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SoundcheckError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SoundcheckError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

/// Errors raised while registering or pulling from an audio source.
///
/// These are returned to the caller and never cross the real-time boundary
/// as panics.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// A source with the same name is already registered.
    #[error("source `{0}` is already registered")]
    DuplicateName(String),
    /// A file source was configured without a path.
    #[error("file source `{0}` requires a file path")]
    MissingFilePath(String),
    /// The decoder could not open the file backing a source.
    #[error("failed to decode `{name}`: {source}")]
    DecodeFailure {
        name: String,
        #[source]
        source: DecodeError,
    },
    /// No source with that name exists (or it was removed mid-pull).
    #[error("source `{0}` not found")]
    NotFound(String),
    /// The buffer shape in the configuration is unusable.
    #[error("invalid configuration for source `{name}`: {reason}")]
    InvalidConfig { name: String, reason: &'static str },
}

/// Errors produced by the decoder collaborator.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The container was recognised but no decoder is compiled in for it.
    #[error("{path}: unsupported audio format {format}")]
    UnsupportedFormat { path: PathBuf, format: String },
    #[error("{path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },
    /// The stream declared zero channels or a zero sample rate.
    #[error("{0}: stream has no usable audio")]
    Empty(PathBuf),
}

/// Failures reported by a single analyzer.
///
/// The pipeline absorbs these per analyzer and marks the family absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzerError {
    /// The buffer violates its structural invariants.
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),
    /// The analyzer itself failed.
    #[error("analyzer failure: {0}")]
    InternalFailure(String),
}

impl From<realfft::FftError> for AnalyzerError {
    fn from(value: realfft::FftError) -> Self {
        Self::InternalFailure(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_render_names() {
        let err = SoundcheckError::from(SourceError::DuplicateName("mic".into()));
        assert!(err.to_string().contains("mic"));

        let err = SourceError::DecodeFailure {
            name: "song".into(),
            source: DecodeError::Empty(PathBuf::from("song.wav")),
        };
        assert!(err.to_string().contains("song.wav"));
    }

    #[test]
    fn message_helpers_wrap_strings() {
        let err: SoundcheckError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
