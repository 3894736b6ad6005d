//! Track model - what the player and the render pipeline consume

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where the encoded audio of a track lives
#[derive(Clone)]
pub enum TrackSource {
    /// A file on disk
    Path(PathBuf),
    /// An encoded file already held in memory (uploads, downloads, tests)
    Memory {
        bytes: Arc<[u8]>,
        /// Extension hint for the demuxer ("mp3", "wav", ...)
        extension: Option<String>,
    },
}

impl TrackSource {
    /// Wrap an in-memory encoded file
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>, extension: Option<&str>) -> Self {
        Self::Memory {
            bytes: bytes.into(),
            extension: extension.map(|e| e.to_ascii_lowercase()),
        }
    }

    /// File extension used as a format hint, if known
    pub fn extension(&self) -> Option<&str> {
        match self {
            Self::Path(path) => path.extension().and_then(|e| e.to_str()),
            Self::Memory { extension, .. } => extension.as_deref(),
        }
    }

    /// Size of the encoded file in bytes
    pub fn size_bytes(&self) -> io::Result<u64> {
        match self {
            Self::Path(path) => Ok(std::fs::metadata(path)?.len()),
            Self::Memory { bytes, .. } => Ok(bytes.len() as u64),
        }
    }

    /// Read the whole encoded file
    pub fn read_bytes(&self) -> io::Result<Arc<[u8]>> {
        match self {
            Self::Path(path) => Ok(std::fs::read(path)?.into()),
            Self::Memory { bytes, .. } => Ok(bytes.clone()),
        }
    }
}

impl fmt::Debug for TrackSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => f.debug_tuple("Path").field(path).finish(),
            Self::Memory { bytes, extension } => f
                .debug_struct("Memory")
                .field("len", &bytes.len())
                .field("extension", extension)
                .finish(),
        }
    }
}

/// A playable track
#[derive(Debug, Clone)]
pub struct Track {
    /// Unique identifier (used for "is this the active track" checks)
    pub id: String,
    /// Human-readable title
    pub title: String,
    /// Encoded audio
    pub source: TrackSource,
    /// Duration in seconds, once known
    pub duration_secs: Option<f64>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, source: TrackSource) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            source,
            duration_secs: None,
        }
    }

    /// Track backed by a file; the path doubles as the id, the file stem as the title
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Unknown")
            .to_string();
        Self::new(
            path.to_string_lossy().into_owned(),
            title,
            TrackSource::Path(path.to_path_buf()),
        )
    }

    pub fn with_duration(mut self, duration_secs: f64) -> Self {
        self.duration_secs = Some(duration_secs);
        self
    }
}
