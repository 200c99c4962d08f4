//! Audio container detection from magic bytes.

use std::fmt;

/// Audio container of a downloaded voice note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Ogg,
    Mp3,
    M4a,
    Wav,
    Flac,
    Webm,
    Unknown,
}

const EBML_MAGIC: [u8; 4] = [0x1A, 0x45, 0xDF, 0xA3];

impl AudioFormat {
    /// Extension used for the file name sent to the transcription API.
    pub fn extension(self) -> &'static str {
        match self {
            AudioFormat::Ogg => "ogg",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Webm => "webm",
            AudioFormat::M4a | AudioFormat::Unknown => "m4a",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Webm => "audio/webm",
            AudioFormat::M4a | AudioFormat::Unknown => "audio/mp4",
        }
    }

    /// File name for the multipart upload, e.g. `audio.ogg`.
    pub fn upload_file_name(self) -> String {
        format!("audio.{}", self.extension())
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AudioFormat::Unknown => "unknown",
            other => other.extension(),
        };
        write!(f, "{}", name)
    }
}

/// Detects the audio container from the first bytes of `content`.
///
/// Rules are checked in order and the first match wins: OGG, MP3 (ID3 tag
/// or frame sync), MP4/M4A (`ftyp` box), WAV, FLAC, WebM. Buffers shorter
/// than 12 bytes are `Unknown`. Anything else is assumed to be M4A, the
/// usual container of WhatsApp voice notes.
pub fn detect_audio_format(content: &[u8]) -> AudioFormat {
    if content.len() < 12 {
        return AudioFormat::Unknown;
    }

    if &content[..4] == b"OggS" {
        return AudioFormat::Ogg;
    }

    if &content[..3] == b"ID3" || (content[0] == 0xFF && content[1] & 0xE0 == 0xE0) {
        return AudioFormat::Mp3;
    }

    if &content[4..8] == b"ftyp" {
        let brand = &content[8..12];
        tracing::debug!("ftyp brand: {}", String::from_utf8_lossy(brand));
        return AudioFormat::M4a;
    }

    if &content[..4] == b"RIFF" && &content[8..12] == b"WAVE" {
        return AudioFormat::Wav;
    }

    if &content[..4] == b"fLaC" {
        return AudioFormat::Flac;
    }

    if content[..4] == EBML_MAGIC {
        return AudioFormat::Webm;
    }

    tracing::warn!(
        "Unrecognized audio format, assuming m4a. First bytes: {}",
        hex::encode(&content[..12])
    );
    AudioFormat::M4a
}
