//! Batch render pipeline
//!
//! One render copies the input into the engine's namespace, runs a single
//! filter/encode command and reads the result back. Renders share one engine
//! and run one at a time; each job still gets unique file names.

use crate::engine::{CodecEngine, EngineError};
use crate::filters::{build_filter_graph, BatchPreset, FilterOp};
use crate::manager::ProcessorManager;
use slowverb_library::{extension_of, MediaInfo, OutputFormat, TrackLoader, TrackSource};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// MP3 encoder bitrate
pub const MP3_BITRATE: &str = "320k";

/// Receives integer completion percentages in [0, 100]
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Offline rendering is not available on this system")]
    Unavailable,
    #[error("Failed to load the codec engine: {0}")]
    EngineLoad(#[source] EngineError),
    #[error("Transcoding failed: {0}")]
    Transcode(#[source] EngineError),
}

/// An encoded input file
#[derive(Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input".to_string());
        Ok(Self::new(name, bytes))
    }

    /// Lowercased extension of the file name
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    pub fn size_bytes(&self) -> u64 {
        self.bytes.len() as u64
    }
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// One render request
pub struct RenderJob {
    pub input: InputFile,
    pub ops: Vec<FilterOp>,
    pub format: OutputFormat,
    /// Preset id, carried through to the result
    pub preset: Option<String>,
    pub progress: Option<ProgressCallback>,
}

impl RenderJob {
    pub fn new(input: InputFile, ops: Vec<FilterOp>, format: OutputFormat) -> Self {
        Self {
            input,
            ops,
            format,
            preset: None,
            progress: None,
        }
    }

    pub fn from_preset(input: InputFile, preset: &BatchPreset, format: OutputFormat) -> Self {
        Self {
            preset: Some(preset.id.to_string()),
            ..Self::new(input, preset.ops.clone(), format)
        }
    }

    pub fn with_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(callback));
        self
    }

    fn report(&self, percent: u8) {
        if let Some(callback) = &self.progress {
            callback(percent);
        }
    }
}

/// Output of a successful render
#[derive(Debug, Clone)]
pub struct RenderedAudio {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub preset: Option<String>,
    pub format: OutputFormat,
}

/// Basic facts about an input file
#[derive(Debug, Clone, PartialEq)]
pub struct AudioInfo {
    /// 0 when the duration cannot be read
    pub duration_secs: f64,
    pub format_extension: String,
    pub size_bytes: u64,
}

/// Renders jobs through a shared codec engine
pub struct RenderPipeline<E> {
    manager: Arc<ProcessorManager<E>>,
}

impl<E> Clone for RenderPipeline<E> {
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
        }
    }
}

impl<E: CodecEngine + 'static> RenderPipeline<E> {
    pub fn new(manager: Arc<ProcessorManager<E>>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<ProcessorManager<E>> {
        &self.manager
    }

    /// Render one job
    ///
    /// Once the engine is loaded the job runs on its own task, so dropping
    /// the returned future does not leave files behind in the engine.
    pub async fn render(&self, job: RenderJob) -> Result<RenderedAudio, RenderError> {
        if !self.manager.is_available() {
            return Err(RenderError::Unavailable);
        }

        if let Err(e) = self.manager.load().await {
            job.report(0);
            return Err(match e {
                EngineError::Unsupported => RenderError::Unavailable,
                other => RenderError::EngineLoad(other),
            });
        }

        let manager = Arc::clone(&self.manager);
        tokio::spawn(run_job(manager, job))
            .await
            .map_err(|e| {
                RenderError::Transcode(EngineError::Exec {
                    code: None,
                    message: format!("render task failed: {}", e),
                })
            })?
    }
}

async fn run_job<E: CodecEngine>(
    manager: Arc<ProcessorManager<E>>,
    job: RenderJob,
) -> Result<RenderedAudio, RenderError> {
    let _session = manager.session().await;
    let engine = manager.engine();

    let id = Uuid::new_v4();
    let input_ext = job.input.extension().unwrap_or_else(|| "bin".to_string());
    let input_name = format!("input-{}.{}", id, input_ext);
    let output_name = format!("output-{}.{}", id, job.format.extension());
    let filters = build_filter_graph(&job.ops);

    tracing::info!(
        input = %job.input.name,
        preset = ?job.preset,
        format = %job.format,
        %filters,
        "rendering"
    );

    let result = transcode(engine, &job, &input_name, &output_name, &filters).await;
    cleanup(engine, &[&input_name, &output_name]).await;

    match result {
        Ok(bytes) => {
            tracing::info!(input = %job.input.name, bytes = bytes.len(), "render finished");
            Ok(RenderedAudio {
                bytes,
                mime_type: job.format.mime_type(),
                preset: job.preset,
                format: job.format,
            })
        }
        Err(e) => {
            tracing::warn!(input = %job.input.name, error = %e, "render failed");
            job.report(0);
            Err(RenderError::Transcode(e))
        }
    }
}

async fn transcode<E: CodecEngine>(
    engine: &E,
    job: &RenderJob,
    input_name: &str,
    output_name: &str,
    filters: &str,
) -> Result<Vec<u8>, EngineError> {
    engine.write_file(input_name, &job.input.bytes).await?;

    let args = build_args(input_name, output_name, filters, job.format);
    let progress = job.progress.clone();
    let on_fraction = move |fraction: f64| {
        if let Some(callback) = &progress {
            callback(to_percent(fraction));
        }
    };
    engine.exec(&args, &on_fraction).await?;

    engine.read_file(output_name).await
}

async fn cleanup<E: CodecEngine>(engine: &E, names: &[&str]) {
    for name in names {
        match engine.delete_file(name).await {
            Ok(()) => {}
            Err(EngineError::NotFound(_)) => {
                tracing::debug!(file = %name, "nothing to clean up");
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "failed to delete render file");
            }
        }
    }
}

/// Arguments for one render command
pub(crate) fn build_args(
    input_name: &str,
    output_name: &str,
    filters: &str,
    format: OutputFormat,
) -> Vec<String> {
    let mut args = vec!["-i".to_string(), input_name.to_string()];
    if !filters.is_empty() {
        args.push("-af".to_string());
        args.push(filters.to_string());
    }
    match format {
        OutputFormat::Mp3 => args.extend(
            ["-c:a", "libmp3lame", "-b:a", MP3_BITRATE].map(String::from),
        ),
        OutputFormat::Wav => args.extend(["-c:a", "pcm_s16le"].map(String::from)),
    }
    args.push("-y".to_string());
    args.push(output_name.to_string());
    args
}

/// Engine fraction to a rounded, clamped percentage
pub(crate) fn to_percent(fraction: f64) -> u8 {
    if !fraction.is_finite() {
        return 0;
    }
    (fraction.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Duration, extension and size of an input file
pub async fn get_info(input: &InputFile) -> AudioInfo {
    let format_extension = input.extension().unwrap_or_default();
    let source = TrackSource::from_bytes(Arc::clone(&input.bytes), Some(&format_extension));

    let duration_secs = tokio::task::spawn_blocking(move || measure_duration(&source))
        .await
        .unwrap_or(0.0);

    AudioInfo {
        duration_secs,
        format_extension,
        size_bytes: input.size_bytes(),
    }
}

fn measure_duration(source: &TrackSource) -> f64 {
    let loader = TrackLoader::new();
    let measured = match loader.inspect(source) {
        Ok(MediaInfo {
            duration_secs: Some(secs),
            ..
        }) => Ok(secs),
        Ok(_) => loader.load(source).map(|audio| audio.duration_secs),
        Err(e) => Err(e),
    };

    match measured {
        Ok(secs) if secs.is_finite() && secs >= 0.0 => secs,
        Ok(_) => 0.0,
        Err(e) => {
            tracing::warn!(error = %e, "could not read audio duration");
            0.0
        }
    }
}
