//! Track handling for slowverb - decoding, probing, validation, and config

mod config;
mod formats;
mod loader;
mod playlist;
mod track;
mod validation;

#[cfg(test)]
mod fixtures;

pub use config::{Config, DEFAULT_REVERB_SECONDS, DEFAULT_VOLUME};
pub use formats::{
    extension_of, is_supported_extension, OutputFormat, UnknownFormat, MAX_FILE_SIZE,
    SUPPORTED_FORMATS,
};
pub use loader::{DecodedAudio, LoadError, MediaInfo, TrackLoader};
pub use playlist::TrackList;
pub use track::{Track, TrackSource};
pub use validation::{validate, ValidatedAudio, ValidationIssue, MIN_FILE_SIZE};
