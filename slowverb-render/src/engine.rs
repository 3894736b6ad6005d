//! Offline codec engine interface
//!
//! An engine owns a private file namespace (its "virtual filesystem") and runs
//! ffmpeg-style argument lists against files in it.

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a codec engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Codec engine is not available on this system")]
    Unsupported,
    #[error("Failed to load codec engine: {0}")]
    Load(String),
    #[error("Invalid file name: {0}")]
    InvalidName(String),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Codec engine failed (exit code {code:?}): {message}")]
    Exec { code: Option<i32>, message: String },
}

/// An offline transcoder with its own file namespace
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Whether the engine can run here at all
    fn is_supported(&self) -> bool;

    /// One-time initialization
    async fn load(&self) -> Result<(), EngineError>;

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError>;

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError>;

    async fn delete_file(&self, name: &str) -> Result<(), EngineError>;

    /// Run one command; `progress` receives completion fractions in [0, 1]
    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), EngineError>;
}
