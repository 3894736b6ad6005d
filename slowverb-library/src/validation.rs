//! Input file validation before a track is accepted

use crate::formats::{is_supported_extension, MAX_FILE_SIZE};
use crate::loader::{LoadError, TrackLoader};
use crate::track::TrackSource;
use thiserror::Error;

/// Files below this size are treated as truncated
pub const MIN_FILE_SIZE: u64 = 1024;

/// Why an input file was rejected
#[derive(Error, Debug)]
pub enum ValidationIssue {
    #[error("File is empty (0 bytes)")]
    Empty,
    #[error("File is too small ({0} bytes), it may be corrupted")]
    TooSmall(u64),
    #[error("File is too large ({0} bytes, limit is {MAX_FILE_SIZE})")]
    TooLarge(u64),
    #[error("Unsupported file type: {}", .0.as_deref().unwrap_or("no extension"))]
    UnsupportedExtension(Option<String>),
    #[error("File cannot be read: {0}")]
    Unreadable(#[from] std::io::Error),
    #[error("File is corrupted or in an unsupported format: {0}")]
    Undecodable(LoadError),
    #[error("Could not determine the audio duration (the file may be corrupted)")]
    InvalidDuration,
}

/// Facts about a file that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAudio {
    pub duration_secs: f64,
    pub size_bytes: u64,
}

/// Check size, extension and decodability of an input
///
/// The container duration is used when present; otherwise the file is decoded
/// to measure it.
pub fn validate(
    source: &TrackSource,
    loader: &TrackLoader,
) -> Result<ValidatedAudio, ValidationIssue> {
    let size_bytes = source.size_bytes()?;
    if size_bytes == 0 {
        return Err(ValidationIssue::Empty);
    }
    if size_bytes < MIN_FILE_SIZE {
        return Err(ValidationIssue::TooSmall(size_bytes));
    }
    if size_bytes > MAX_FILE_SIZE {
        return Err(ValidationIssue::TooLarge(size_bytes));
    }

    match source.extension() {
        Some(ext) if is_supported_extension(ext) => {}
        other => {
            return Err(ValidationIssue::UnsupportedExtension(
                other.map(|e| e.to_ascii_lowercase()),
            ))
        }
    }

    let inspected = loader.inspect(source).map_err(into_issue)?;
    let duration_secs = match inspected.duration_secs {
        Some(secs) => secs,
        None => loader.load(source).map_err(into_issue)?.duration_secs,
    };

    if !(duration_secs.is_finite() && duration_secs > 0.0) {
        return Err(ValidationIssue::InvalidDuration);
    }

    Ok(ValidatedAudio {
        duration_secs,
        size_bytes,
    })
}

fn into_issue(err: LoadError) -> ValidationIssue {
    match err {
        LoadError::Io(e) => ValidationIssue::Unreadable(e),
        LoadError::InvalidDuration => ValidationIssue::InvalidDuration,
        other => ValidationIssue::Undecodable(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::wav_bytes;

    fn check(bytes: Vec<u8>, ext: Option<&str>) -> Result<ValidatedAudio, ValidationIssue> {
        validate(&TrackSource::from_bytes(bytes, ext), &TrackLoader::new())
    }

    #[test]
    fn test_valid_wav() {
        let bytes = wav_bytes(44100, 2, 1.0);
        let size = bytes.len() as u64;
        let validated = check(bytes, Some("wav")).unwrap();
        assert!((validated.duration_secs - 1.0).abs() < 1e-3);
        assert_eq!(validated.size_bytes, size);
    }

    #[test]
    fn test_empty_file() {
        assert!(matches!(check(Vec::new(), Some("mp3")), Err(ValidationIssue::Empty)));
    }

    #[test]
    fn test_tiny_file() {
        assert!(matches!(
            check(vec![1u8; 512], Some("mp3")),
            Err(ValidationIssue::TooSmall(512))
        ));
    }

    #[test]
    fn test_unsupported_extension() {
        let result = check(wav_bytes(44100, 2, 0.5), Some("aiff"));
        match result {
            Err(ValidationIssue::UnsupportedExtension(ext)) => {
                assert_eq!(ext.as_deref(), Some("aiff"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            check(wav_bytes(44100, 2, 0.5), None),
            Err(ValidationIssue::UnsupportedExtension(None))
        ));
    }

    #[test]
    fn test_corrupted_file() {
        let result = check(vec![0x13u8; 8192], Some("wav"));
        assert!(matches!(result, Err(ValidationIssue::Undecodable(_))));
    }

    #[test]
    fn test_zero_length_audio() {
        // A valid header with no frames is still over the size floor once padded out
        let mut bytes = wav_bytes(44100, 2, 0.0);
        bytes.resize(2048, 0);
        let result = check(bytes, Some("wav"));
        assert!(result.is_err());
    }
}
