use std::{fmt, path::Path};

use serde::{Deserialize, Serialize};

/// Container formats the toolkit knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Flac,
    Ogg,
    Aiff,
    Unknown,
}

impl AudioFormat {
    /// Whether the bundled decoder can read this format.
    pub fn is_decodable(self) -> bool {
        matches!(self, AudioFormat::Wav)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Wav => "WAV",
            AudioFormat::Mp3 => "MP3",
            AudioFormat::Flac => "FLAC",
            AudioFormat::Ogg => "OGG",
            AudioFormat::Aiff => "AIFF",
            AudioFormat::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Maps a file extension onto a known format. Case-insensitive; anything
/// unrecognised (or extension-less) is [`AudioFormat::Unknown`].
pub fn detect_audio_format(path: impl AsRef<Path>) -> AudioFormat {
    let Some(extension) = path.as_ref().extension().and_then(|ext| ext.to_str()) else {
        return AudioFormat::Unknown;
    };

    match extension.to_ascii_lowercase().as_str() {
        "wav" | "wave" => AudioFormat::Wav,
        "mp3" => AudioFormat::Mp3,
        "flac" => AudioFormat::Flac,
        "ogg" | "oga" => AudioFormat::Ogg,
        "aif" | "aiff" | "aifc" => AudioFormat::Aiff,
        _ => AudioFormat::Unknown,
    }
}
