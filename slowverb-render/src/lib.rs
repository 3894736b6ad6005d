//! Offline rendering for slowverb
//!
//! - Filters: batch filter operations, ordering and presets
//! - Engine: the codec engine interface, with an ffmpeg implementation
//! - Manager: lazy, shared engine loading
//! - Pipeline: render jobs and input inspection

mod engine;
mod ffmpeg;
mod filters;
mod manager;
mod pipeline;

#[cfg(test)]
mod mock;

pub use engine::{CodecEngine, EngineError};
pub use ffmpeg::FfmpegEngine;
pub use filters::{
    batch_presets, build_filter_graph, find_batch_preset, order_filters, BatchPreset, FilterError,
    FilterKind, FilterOp,
};
pub use manager::{ProcessorManager, ProcessorState};
pub use pipeline::{
    get_info, AudioInfo, InputFile, ProgressCallback, RenderError, RenderJob, RenderPipeline,
    RenderedAudio, MP3_BITRATE,
};
