//! slowverb - slowed + reverb audio tool
//!
//! Plays files through the realtime effect chain, or renders them offline
//! through ffmpeg.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use slowverb_audio::{
    EffectControls, GraphRenderer, Phase, Player, SignalGraph, TransportSnapshot, PRESETS,
};
use slowverb_library::{
    validate, Config, OutputFormat, Track, TrackList, TrackLoader, TrackSource,
};
use slowverb_render::{
    batch_presets, find_batch_preset, get_info, CodecEngine, FfmpegEngine, FilterOp, InputFile,
    ProcessorManager, RenderJob, RenderPipeline,
};

/// Status line refresh period
const STATUS_INTERVAL: Duration = Duration::from_millis(250);

/// Range offered for speed and pitch ratio on the command line
const RATIO_RANGE: std::ops::RangeInclusive<f32> = 0.25..=4.0;

/// Sample rate assumed for pitch filters when the input cannot be inspected
const FALLBACK_SAMPLE_RATE: u32 = 44100;

#[derive(Parser)]
#[command(name = "slowverb")]
#[command(about = "Slowed + reverb audio effects: realtime playback and offline rendering", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play files through the realtime effect chain
    Play(PlayArgs),
    /// Render a file with a batch preset or explicit filters
    Render(RenderArgs),
    /// Validate files and print their duration and size
    Info {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List realtime and batch presets
    Presets,
}

#[derive(Args)]
struct PlayArgs {
    /// Files to play, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Realtime preset id
    #[arg(short, long, default_value = "slowed")]
    preset: String,
    /// Playback speed (0.25 - 4.0)
    #[arg(long, value_parser = parse_ratio)]
    speed: Option<f32>,
    /// Pitch ratio (0.25 - 4.0)
    #[arg(long, value_parser = parse_ratio)]
    pitch: Option<f32>,
    /// Reverb wet mix (0.0 - 1.0)
    #[arg(long)]
    reverb: Option<f32>,
    /// Change speed without changing pitch
    #[arg(long)]
    keep_pitch: bool,
    /// Output volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,
    /// Reverb tail length in seconds
    #[arg(long)]
    reverb_seconds: Option<f32>,
}

#[derive(Args)]
struct RenderArgs {
    /// Input audio file
    input: PathBuf,
    /// Batch preset id, used when no explicit filter is given
    #[arg(short, long, default_value = "slowed-reverb")]
    preset: String,
    /// Tempo factor
    #[arg(long)]
    tempo: Option<f32>,
    /// Pitch shift in semitones
    #[arg(long, allow_hyphen_values = true)]
    pitch: Option<f32>,
    /// Reverb room size (0.0 - 1.0)
    #[arg(long)]
    room: Option<f32>,
    /// Reverb damping (0.0 - 1.0)
    #[arg(long, default_value_t = 0.5)]
    damping: f32,
    /// Bass gain in dB
    #[arg(long, allow_hyphen_values = true)]
    bass: Option<f32>,
    /// Linear gain
    #[arg(long)]
    gain: Option<f32>,
    /// Apply loudness normalization
    #[arg(long)]
    normalize: bool,
    /// Output format (mp3 or wav)
    #[arg(short, long)]
    format: Option<OutputFormat>,
    /// Output file
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// ffmpeg binary
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

fn parse_ratio(value: &str) -> Result<f32, String> {
    let ratio: f32 = value.parse().map_err(|e| format!("{}", e))?;
    if RATIO_RANGE.contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!(
            "must be between {} and {}",
            RATIO_RANGE.start(),
            RATIO_RANGE.end()
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slowverb=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Play(args) => play(args, &config).await,
        Commands::Render(args) => render(args, &config).await,
        Commands::Info { files } => info(&files).await,
        Commands::Presets => {
            list_presets();
            Ok(())
        }
    }
}

async fn play(args: PlayArgs, config: &Config) -> anyhow::Result<()> {
    let mut tracks = TrackList::new();
    for file in &args.files {
        tracks.add(Track::from_path(file));
    }

    let mut controls = EffectControls::new();
    controls.apply_preset(&args.preset)?;
    if let Some(speed) = args.speed {
        controls.set_speed(speed);
    }
    if let Some(pitch) = args.pitch {
        controls.set_pitch_ratio(pitch);
    }
    if let Some(reverb) = args.reverb {
        controls.set_reverb_mix(reverb);
    }
    if args.keep_pitch && !controls.params().keep_pitch {
        controls.toggle_keep_pitch();
    }

    let (sample_rate, channels) = device_format()?;
    let graph = SignalGraph::with_loader(sample_rate)
        .with_reverb_seconds(args.reverb_seconds.unwrap_or(config.reverb_seconds));
    let renderer = graph.renderer();
    let player = Player::with_volume(
        graph,
        Arc::new(slowverb_audio::SystemClock),
        args.volume.unwrap_or(config.volume),
    );
    player.apply_effects(controls.params());

    let output = AudioOutput::start(renderer, sample_rate, channels)?;
    tracing::info!(sample_rate, channels, params = ?controls.params(), "audio output started");

    let result = run_playback(&player, &tracks).await;
    player.stop();
    output.shutdown();
    println!();
    result
}

async fn run_playback(player: &Player, tracks: &TrackList) -> anyhow::Result<()> {
    if !player.play_next(tracks).await? {
        return Ok(());
    }

    let mut interval = tokio::time::interval(STATUS_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            _ = interval.tick() => {
                let snapshot = player.tick();
                print_status(&snapshot);
                if snapshot.phase == Phase::Ended && !player.play_next(tracks).await? {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn print_status(snapshot: &TransportSnapshot) {
    let title = snapshot.title.as_deref().unwrap_or("-");
    print!(
        "\r{:<8} {}  {} / {}  (-{})  {:>5.1}%   ",
        snapshot.phase,
        title,
        snapshot.formatted_position,
        snapshot.formatted_duration,
        snapshot.formatted_remaining,
        snapshot.progress_percent
    );
    let _ = std::io::stdout().flush();
}

/// Sample rate and channel count of the default output device
fn device_format() -> anyhow::Result<(u32, u16)> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| anyhow!("No audio output device found"))?;
    let config = device
        .default_output_config()
        .context("Failed to get audio config")?;
    Ok((config.sample_rate().0, config.channels()))
}

/// Dedicated thread owning the output stream
struct AudioOutput {
    shutdown_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl AudioOutput {
    fn start(renderer: GraphRenderer, sample_rate: u32, channels: u16) -> anyhow::Result<Self> {
        let (ready_tx, ready_rx) = bounded::<Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("slowverb-audio".into())
            .spawn(move || run_audio_thread(renderer, sample_rate, channels, ready_tx, shutdown_rx))
            .context("Failed to spawn audio thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                shutdown_tx,
                handle,
            }),
            Ok(Err(message)) => {
                let _ = handle.join();
                bail!(message)
            }
            Err(_) => bail!("Audio thread exited before starting"),
        }
    }

    fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.handle.join();
    }
}

fn run_audio_thread(
    renderer: GraphRenderer,
    sample_rate: u32,
    channels: u16,
    ready_tx: Sender<Result<(), String>>,
    shutdown_rx: Receiver<()>,
) {
    let Some(device) = cpal::default_host().default_output_device() else {
        let _ = ready_tx.send(Err("No audio output device found".into()));
        return;
    };

    let config = cpal::StreamConfig {
        channels,
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };
    let out_channels = channels as usize;

    // Stereo scratch for devices that are not 2-channel
    let mut stereo = vec![0.0f32; 16384];

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
            if out_channels == 2 {
                renderer.process(data);
                return;
            }

            let frames = data.len() / out_channels.max(1);
            if stereo.len() < frames * 2 {
                stereo.resize(frames * 2, 0.0);
            }
            let stereo = &mut stereo[..frames * 2];
            renderer.process(stereo);

            for (frame, out) in stereo.chunks_exact(2).zip(data.chunks_exact_mut(out_channels)) {
                if out_channels == 1 {
                    out[0] = (frame[0] + frame[1]) * 0.5;
                } else {
                    out[0] = frame[0];
                    out[1] = frame[1];
                    out[2..].fill(0.0);
                }
            }
        },
        |err| tracing::warn!(error = %err, "audio stream error"),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Failed to create audio stream: {}", e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(format!("Failed to start audio: {}", e)));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Keep the stream alive until asked to stop
    let _ = shutdown_rx.recv();
}

async fn render(args: RenderArgs, config: &Config) -> anyhow::Result<()> {
    let format = args.format.unwrap_or(config.output_format);
    let input = InputFile::from_path(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;

    let ops = explicit_ops(&args)?;
    let job = if ops.is_empty() {
        let preset = find_batch_preset(&args.preset)
            .ok_or_else(|| anyhow!("Unknown batch preset: {}", args.preset))?;
        RenderJob::from_preset(input, preset, format)
    } else {
        RenderJob::new(input, ops, format)
    };
    let label = job.preset.clone().unwrap_or_else(|| "custom".to_string());
    let job = job.with_progress(|percent| {
        eprint!("\rrendering {:>3}%", percent);
        let _ = std::io::stderr().flush();
    });

    let engine = match args.ffmpeg.as_ref().or(config.ffmpeg_path.as_ref()) {
        Some(path) => FfmpegEngine::with_binary(path),
        None => FfmpegEngine::new(),
    };
    if !engine.is_supported() {
        bail!(
            "ffmpeg not found ({}); install it or set ffmpeg_path in {}",
            engine.binary().display(),
            Config::config_path().display()
        );
    }
    let pipeline = RenderPipeline::new(Arc::new(ProcessorManager::new(engine)));

    let rendered = pipeline.render(job).await;
    eprintln!();
    let rendered = rendered.context("Render failed")?;

    let output = args.output.clone().unwrap_or_else(|| {
        default_output_path(&args.input, config.output_dir.as_deref(), &label, format)
    });
    tokio::fs::write(&output, &rendered.bytes)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} ({}, {} bytes)",
        output.display(),
        rendered.mime_type,
        rendered.bytes.len()
    );
    Ok(())
}

/// Filter ops from command-line flags, in flag order
fn explicit_ops(args: &RenderArgs) -> anyhow::Result<Vec<FilterOp>> {
    let mut ops = Vec::new();
    if let Some(tempo) = args.tempo {
        ops.push(FilterOp::tempo(tempo)?);
    }
    if let Some(semitones) = args.pitch {
        let sample_rate = TrackLoader::new()
            .inspect(&TrackSource::Path(args.input.clone()))
            .ok()
            .and_then(|info| info.sample_rate)
            .unwrap_or(FALLBACK_SAMPLE_RATE);
        ops.push(FilterOp::pitch_semitones(sample_rate, semitones)?);
    }
    if let Some(room) = args.room {
        ops.push(FilterOp::reverb(room, args.damping)?);
    }
    if let Some(bass) = args.bass {
        ops.push(FilterOp::bass(bass)?);
    }
    if let Some(gain) = args.gain {
        ops.push(FilterOp::volume(gain)?);
    }
    if args.normalize {
        ops.push(FilterOp::normalize());
    }
    Ok(ops)
}

fn default_output_path(
    input: &Path,
    output_dir: Option<&Path>,
    label: &str,
    format: OutputFormat,
) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}-{}.{}", stem, label, format.extension()))
}

async fn info(files: &[PathBuf]) -> anyhow::Result<()> {
    let loader = TrackLoader::new();
    for file in files {
        let source = TrackSource::Path(file.clone());
        match validate(&source, &loader) {
            Ok(validated) => {
                let input = InputFile::from_path(file)
                    .await
                    .with_context(|| format!("Failed to read {}", file.display()))?;
                let info = get_info(&input).await;
                println!(
                    "{}: {} {:.2}s {} bytes",
                    file.display(),
                    info.format_extension,
                    validated.duration_secs,
                    info.size_bytes
                );
            }
            Err(issue) => println!("{}: rejected: {}", file.display(), issue),
        }
    }
    Ok(())
}

fn list_presets() {
    println!("Realtime presets (play --preset):");
    for preset in PRESETS {
        let p = preset.params;
        println!(
            "  {:<12} {:<16} speed {:.2}  pitch {:.2}  reverb {:.2}{}",
            preset.id,
            preset.name,
            p.speed,
            p.pitch_ratio,
            p.reverb_mix,
            if p.keep_pitch { "  keep pitch" } else { "" }
        );
    }

    println!("Batch presets (render --preset):");
    for preset in batch_presets() {
        println!("  {:<14} {:<16} {}", preset.id, preset.name, preset.description);
    }
}
