//! Accepted input formats and exportable output formats

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Input extensions the app accepts
pub const SUPPORTED_FORMATS: &[&str] = &["mp3", "wav", "flac", "m4a", "ogg"];

/// Largest accepted input file (50 MiB)
pub const MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Check an extension against [`SUPPORTED_FORMATS`] (case-insensitive)
pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_FORMATS
        .iter()
        .any(|supported| supported.eq_ignore_ascii_case(ext))
}

/// Lowercased extension of a file name or path
pub fn extension_of(path: impl AsRef<Path>) -> Option<String> {
    path.as_ref()
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown output format: {0} (expected mp3 or wav)")]
pub struct UnknownFormat(pub String);

/// Format of a rendered file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    #[default]
    Mp3,
    Wav,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Wav => "wav",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Mp3 => "audio/mpeg",
            Self::Wav => "audio/wav",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "wav" => Ok(Self::Wav),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_extensions() {
        assert!(is_supported_extension("mp3"));
        assert!(is_supported_extension("FLAC"));
        assert!(!is_supported_extension("aiff"));
        assert!(!is_supported_extension(""));
    }

    #[test]
    fn test_extension_of_lowercases() {
        assert_eq!(extension_of("Song.M4A").as_deref(), Some("m4a"));
        assert_eq!(extension_of("no_extension"), None);
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!("MP3".parse::<OutputFormat>().unwrap(), OutputFormat::Mp3);
        assert_eq!(" wav ".parse::<OutputFormat>().unwrap(), OutputFormat::Wav);
        assert!("ogg".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(OutputFormat::Mp3.mime_type(), "audio/mpeg");
        assert_eq!(OutputFormat::Wav.mime_type(), "audio/wav");
        assert_eq!(OutputFormat::default(), OutputFormat::Mp3);
    }
}
