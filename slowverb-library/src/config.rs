//! Simple configuration persistence for slowverb
//!
//! Stores the codec engine location and render/playback defaults.

use crate::formats::OutputFormat;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Default output volume
pub const DEFAULT_VOLUME: f32 = 0.7;

/// Default reverb tail length in seconds
pub const DEFAULT_REVERB_SECONDS: f32 = 2.0;

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Explicit ffmpeg binary; None means look it up on PATH
    pub ffmpeg_path: Option<PathBuf>,
    /// Format used by `render` when none is given
    pub output_format: OutputFormat,
    /// Directory rendered files are written to; None means next to the input
    pub output_dir: Option<PathBuf>,
    /// Initial playback volume (0.0 - 1.0)
    pub volume: f32,
    /// Length of the generated reverb impulse
    pub reverb_seconds: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            output_format: OutputFormat::default(),
            output_dir: None,
            volume: DEFAULT_VOLUME,
            reverb_seconds: DEFAULT_REVERB_SECONDS,
        }
    }
}

impl Config {
    /// Load config from the default location
    ///
    /// Returns default config if file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let path = Self::config_path();
        Self::load_from(&path).unwrap_or_default()
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> io::Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Save config to the default location
    pub fn save(&self) -> io::Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.serialize())
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("slowverb")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match key.trim() {
                "ffmpeg_path" => config.ffmpeg_path = Some(PathBuf::from(value)),
                "output_dir" => config.output_dir = Some(PathBuf::from(value)),
                "output_format" => match value.parse() {
                    Ok(format) => config.output_format = format,
                    Err(e) => tracing::warn!("Ignoring config entry: {}", e),
                },
                "volume" => {
                    if let Some(v) = parse_finite(value) {
                        config.volume = v.clamp(0.0, 1.0);
                    }
                }
                "reverb_seconds" => {
                    if let Some(v) = parse_finite(value).filter(|v| *v > 0.0) {
                        config.reverb_seconds = v;
                    }
                }
                _ => {} // Ignore unknown keys
            }
        }

        config
    }

    /// Serialize config to simple key=value format
    fn serialize(&self) -> String {
        let mut lines = vec!["# slowverb configuration".to_string()];

        if let Some(ref path) = self.ffmpeg_path {
            lines.push(format!("ffmpeg_path={}", path.display()));
        }
        lines.push(format!("output_format={}", self.output_format));
        if let Some(ref dir) = self.output_dir {
            lines.push(format!("output_dir={}", dir.display()));
        }
        lines.push(format!("volume={}", self.volume));
        lines.push(format!("reverb_seconds={}", self.reverb_seconds));

        lines.join("\n")
    }
}

fn parse_finite(value: &str) -> Option<f32> {
    value.parse::<f32>().ok().filter(|v| v.is_finite())
}
