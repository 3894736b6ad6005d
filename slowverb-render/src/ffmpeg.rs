//! ffmpeg-backed codec engine
//!
//! Runs the system `ffmpeg` binary as a child process. The engine's file
//! namespace is a private directory under the system temp dir, and progress is
//! read from ffmpeg's machine-readable `-progress` stream.

use crate::engine::{CodecEngine, EngineError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use uuid::Uuid;

/// Lines of stderr kept for error messages
const STDERR_TAIL_LINES: usize = 12;

/// Codec engine driving an ffmpeg executable
#[derive(Debug)]
pub struct FfmpegEngine {
    binary: PathBuf,
    work_dir: PathBuf,
    supported: bool,
}

impl Default for FfmpegEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegEngine {
    /// Engine using `ffmpeg` from PATH
    pub fn new() -> Self {
        Self::with_binary("ffmpeg")
    }

    /// Engine using a specific ffmpeg binary (a bare name is looked up on PATH)
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        let supported = resolve_binary(&binary).is_some();
        if !supported {
            tracing::debug!(binary = %binary.display(), "ffmpeg binary not found");
        }

        Self {
            binary,
            work_dir: std::env::temp_dir().join(format!("slowverb-{}", Uuid::new_v4())),
            supported,
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Directory backing the engine's file namespace
    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, EngineError> {
        if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        Ok(self.work_dir.join(name))
    }
}

impl Drop for FfmpegEngine {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.work_dir);
    }
}

#[async_trait]
impl CodecEngine for FfmpegEngine {
    fn is_supported(&self) -> bool {
        self.supported
    }

    async fn load(&self) -> Result<(), EngineError> {
        if !self.supported {
            return Err(EngineError::Unsupported);
        }

        tokio::fs::create_dir_all(&self.work_dir).await?;

        let output = Command::new(&self.binary)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::Load(e.to_string()))?;

        if !output.status.success() {
            return Err(EngineError::Load(format!(
                "{} -version exited with {}",
                self.binary.display(),
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = stdout.lines().next().unwrap_or_default();
        tracing::info!(%version, work_dir = %self.work_dir.display(), "codec engine loaded");
        Ok(())
    }

    async fn write_file(&self, name: &str, bytes: &[u8]) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.work_dir).await?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn read_file(&self, name: &str) -> Result<Vec<u8>, EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::read(path).await.map_err(|e| not_found(e, name))
    }

    async fn delete_file(&self, name: &str) -> Result<(), EngineError> {
        let path = self.path_for(name)?;
        tokio::fs::remove_file(path).await.map_err(|e| not_found(e, name))
    }

    async fn exec(
        &self,
        args: &[String],
        progress: &(dyn Fn(f64) + Send + Sync),
    ) -> Result<(), EngineError> {
        tracing::debug!(?args, "running ffmpeg");

        let mut child = Command::new(&self.binary)
            .args(["-hide_banner", "-nostdin", "-nostats", "-progress", "pipe:1"])
            .args(args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(EngineError::Exec {
                code: None,
                message: "ffmpeg output pipes were not captured".to_string(),
            });
        };

        // Input duration, announced on stderr before progress starts
        let duration: Mutex<Option<f64>> = Mutex::new(None);

        let read_stderr = async {
            let mut lines = BufReader::new(stderr).lines();
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            while let Ok(Some(line)) = lines.next_line().await {
                {
                    let mut known = duration.lock();
                    if known.is_none() {
                        *known = parse_duration(&line);
                    }
                }
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            Vec::from(tail).join("\n")
        };

        let read_progress = async {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(ProgressLine::OutTime(secs)) => {
                        let total = *duration.lock();
                        if let Some(total) = total.filter(|t| *t > 0.0) {
                            progress((secs / total).clamp(0.0, 1.0));
                        }
                    }
                    Some(ProgressLine::End) => progress(1.0),
                    None => {}
                }
            }
        };

        let (stderr_tail, (), status) = tokio::join!(read_stderr, read_progress, child.wait());
        let status = status?;

        if !status.success() {
            return Err(EngineError::Exec {
                code: status.code(),
                message: stderr_tail,
            });
        }
        Ok(())
    }
}

fn not_found(err: std::io::Error, name: &str) -> EngineError {
    if err.kind() == ErrorKind::NotFound {
        EngineError::NotFound(name.to_string())
    } else {
        EngineError::Io(err)
    }
}

/// Locate an executable: explicit paths must exist, bare names are searched on PATH
fn resolve_binary(binary: &Path) -> Option<PathBuf> {
    if binary.components().count() > 1 || binary.is_absolute() {
        return binary.is_file().then(|| binary.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .flat_map(|dir| {
            let plain = dir.join(binary);
            let exe = plain.with_extension(std::env::consts::EXE_EXTENSION);
            [plain, exe]
        })
        .find(|candidate| candidate.is_file())
}

/// Parse `HH:MM:SS.frac` into seconds
fn parse_clock(text: &str) -> Option<f64> {
    let mut parts = text.trim().split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let total = hours * 3600.0 + minutes * 60.0 + seconds;
    (total.is_finite() && total >= 0.0).then_some(total)
}

/// Input duration from an ffmpeg banner line (`  Duration: 00:03:25.47, start: ...`)
pub(crate) fn parse_duration(line: &str) -> Option<f64> {
    let rest = line.trim_start().strip_prefix("Duration:")?;
    let value = rest.split(',').next()?;
    parse_clock(value)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ProgressLine {
    /// Output timestamp reached, in seconds
    OutTime(f64),
    End,
}

/// One `key=value` line of ffmpeg's `-progress` output
pub(crate) fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" => {
            let micros: i64 = value.parse().ok()?;
            (micros >= 0).then(|| ProgressLine::OutTime(micros as f64 / 1_000_000.0))
        }
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}
