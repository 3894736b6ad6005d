//! Audio file loading, decoding and probing

use crate::track::TrackSource;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// Errors that can occur during track loading
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("No audio track found in file")]
    NoAudioTrack,
    #[error("Unsupported format")]
    UnsupportedFormat,
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Audio has zero or non-finite duration")]
    InvalidDuration,
}

/// A decoded track ready for playback
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved stereo samples (f32, normalized to -1.0 to 1.0)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Channel count of the encoded source (output is always stereo)
    pub source_channels: u16,
    /// Duration in seconds
    pub duration_secs: f64,
}

impl DecodedAudio {
    /// Number of stereo frames
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

/// Stream parameters read from the container without decoding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaInfo {
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

/// Audio file loader using Symphonia
pub struct TrackLoader {
    target_sample_rate: u32,
}

impl Default for TrackLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackLoader {
    /// Create a new track loader with default 48kHz sample rate
    pub fn new() -> Self {
        Self::with_sample_rate(48000)
    }

    /// Create a new track loader with specific sample rate
    pub fn with_sample_rate(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decode a whole source into stereo samples at the target sample rate
    pub fn load(&self, source: &TrackSource) -> Result<DecodedAudio, LoadError> {
        let mut format = open_format(source)?;

        // Find first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(LoadError::NoAudioTrack)?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let source_sample_rate = codec_params.sample_rate.unwrap_or(44100);
        let mut channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| LoadError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                Err(_) => break,
            };

            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(d) => d,
                // Corrupt packets are skipped, the rest of the stream may be fine
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(e) => return Err(LoadError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let capacity = decoded.capacity() as u64;

            let mut sample_buf = SampleBuffer::<f32>::new(capacity, spec);
            sample_buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(sample_buf.samples());
        }

        if channels == 0 {
            return Err(LoadError::NoAudioTrack);
        }

        let total_frames = samples.len() / channels as usize;
        let duration_secs = total_frames as f64 / source_sample_rate as f64;
        if total_frames == 0 || !duration_secs.is_finite() {
            return Err(LoadError::InvalidDuration);
        }

        let stereo = to_stereo(&samples, channels);

        let (samples, sample_rate) = if source_sample_rate != self.target_sample_rate {
            (
                self.resample(&stereo, source_sample_rate, 2)?,
                self.target_sample_rate,
            )
        } else {
            (stereo, source_sample_rate)
        };

        tracing::debug!(
            frames = samples.len() / 2,
            sample_rate,
            duration_secs,
            "decoded track"
        );

        Ok(DecodedAudio {
            samples,
            sample_rate,
            source_channels: channels,
            duration_secs,
        })
    }

    /// Read stream parameters without decoding the audio
    pub fn inspect(&self, source: &TrackSource) -> Result<MediaInfo, LoadError> {
        let format = open_format(source)?;
        let track = format
            .default_track()
            .filter(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .or_else(|| {
                format
                    .tracks()
                    .iter()
                    .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            })
            .ok_or(LoadError::NoAudioTrack)?;

        let params = &track.codec_params;
        Ok(MediaInfo {
            duration_secs: container_duration(params),
            sample_rate: params.sample_rate,
            channels: params.channels.map(|c| c.count() as u16),
        })
    }

    /// Resample audio to target sample rate
    fn resample(
        &self,
        samples: &[f32],
        source_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>, LoadError> {
        use rubato::{FftFixedInOut, Resampler};

        let channels_usize = channels as usize;
        let frames = samples.len() / channels_usize;

        let mut resampler = FftFixedInOut::<f32>::new(
            source_rate as usize,
            self.target_sample_rate as usize,
            1024,
            channels_usize,
        )
        .map_err(|e| LoadError::Decode(e.to_string()))?;

        // Deinterleave
        let deinterleaved: Vec<Vec<f32>> = (0..channels_usize)
            .map(|ch| {
                (0..frames)
                    .map(|f| samples[f * channels_usize + ch])
                    .collect()
            })
            .collect();

        let chunk_size = resampler.input_frames_next();
        let mut output: Vec<Vec<f32>> = vec![Vec::new(); channels_usize];

        let mut pos = 0;
        while pos + chunk_size <= frames {
            let input_refs: Vec<&[f32]> = deinterleaved
                .iter()
                .map(|ch| &ch[pos..pos + chunk_size])
                .collect();

            let resampled = resampler
                .process(&input_refs, None)
                .map_err(|e| LoadError::Decode(e.to_string()))?;

            for (ch, data) in resampled.into_iter().enumerate() {
                output[ch].extend(data);
            }

            pos += chunk_size;
        }

        // Tail: pad with zeros and keep the proportional share of the output
        if pos < frames {
            let remaining = frames - pos;
            let padded: Vec<Vec<f32>> = deinterleaved
                .iter()
                .map(|ch| {
                    let mut v = ch[pos..].to_vec();
                    v.resize(chunk_size, 0.0);
                    v
                })
                .collect();

            let input_refs: Vec<&[f32]> = padded.iter().map(|v| v.as_slice()).collect();

            let resampled = resampler
                .process(&input_refs, None)
                .map_err(|e| LoadError::Decode(e.to_string()))?;
            let output_frames =
                (remaining * self.target_sample_rate as usize) / source_rate as usize;
            for (ch, data) in resampled.into_iter().enumerate() {
                output[ch].extend(&data[..output_frames.min(data.len())]);
            }
        }

        // Reinterleave
        let output_frames = output[0].len();
        let mut interleaved = Vec::with_capacity(output_frames * channels_usize);
        for frame_idx in 0..output_frames {
            for channel in &output {
                interleaved.push(channel[frame_idx]);
            }
        }

        Ok(interleaved)
    }
}

/// Open a source and detect its container format
fn open_format(source: &TrackSource) -> Result<Box<dyn FormatReader>, LoadError> {
    let media: Box<dyn MediaSource> = match source {
        TrackSource::Path(path) => Box::new(std::fs::File::open(path)?),
        TrackSource::Memory { bytes, .. } => Box::new(Cursor::new(bytes.clone())),
    };
    let mss = MediaSourceStream::new(media, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = source.extension() {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| match e {
            SymphoniaError::Unsupported(_) => LoadError::UnsupportedFormat,
            SymphoniaError::IoError(io) => LoadError::Io(io),
            other => LoadError::Decode(other.to_string()),
        })?;

    Ok(detected.format)
}

/// Duration declared by the container, if any
fn container_duration(params: &CodecParameters) -> Option<f64> {
    let frames = params.n_frames?;
    let secs = match (params.sample_rate, params.time_base) {
        (Some(rate), _) if rate > 0 => frames as f64 / rate as f64,
        (_, Some(time_base)) => {
            let time = time_base.calc_time(frames);
            time.seconds as f64 + time.frac
        }
        _ => return None,
    };
    (secs.is_finite() && secs > 0.0).then_some(secs)
}

/// Fold any channel layout into interleaved stereo
fn to_stereo(samples: &[f32], channels: u16) -> Vec<f32> {
    match channels {
        2 => samples.to_vec(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        n => samples
            .chunks_exact(n as usize)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::wav_bytes;

    #[test]
    fn test_decode_wav_from_memory() {
        let source = TrackSource::from_bytes(wav_bytes(48000, 2, 1.5), Some("wav"));
        let decoded = TrackLoader::with_sample_rate(48000).load(&source).unwrap();

        assert_eq!(decoded.sample_rate, 48000);
        assert_eq!(decoded.source_channels, 2);
        assert!((decoded.duration_secs - 1.5).abs() < 1e-3);
        assert_eq!(decoded.frames(), 72000);
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let source = TrackSource::from_bytes(wav_bytes(44100, 1, 0.5), Some("wav"));
        let decoded = TrackLoader::with_sample_rate(44100).load(&source).unwrap();

        assert_eq!(decoded.source_channels, 1);
        for frame in decoded.samples.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_resamples_to_target_rate() {
        let source = TrackSource::from_bytes(wav_bytes(44100, 2, 1.0), Some("wav"));
        let decoded = TrackLoader::with_sample_rate(48000).load(&source).unwrap();

        assert_eq!(decoded.sample_rate, 48000);
        // Duration is reported from the source, frame count follows the new rate
        assert!((decoded.duration_secs - 1.0).abs() < 1e-3);
        let expected = 48000.0;
        assert!((decoded.frames() as f64 - expected).abs() < 1100.0);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let source = TrackSource::from_bytes(vec![0x42u8; 4096], Some("mp3"));
        assert!(TrackLoader::new().load(&source).is_err());
    }

    #[test]
    fn test_empty_wav_has_invalid_duration() {
        let source = TrackSource::from_bytes(wav_bytes(48000, 2, 0.0), Some("wav"));
        let result = TrackLoader::new().load(&source);
        assert!(matches!(result, Err(LoadError::InvalidDuration)));
    }

    #[test]
    fn test_inspect_reads_container_duration() {
        let source = TrackSource::from_bytes(wav_bytes(22050, 1, 2.0), Some("wav"));
        let info = TrackLoader::new().inspect(&source).unwrap();

        assert_eq!(info.sample_rate, Some(22050));
        assert_eq!(info.channels, Some(1));
        assert!((info.duration_secs.unwrap() - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let source = TrackSource::Path("/definitely/not/here.wav".into());
        assert!(matches!(
            TrackLoader::new().inspect(&source),
            Err(LoadError::Io(_))
        ));
    }

    #[test]
    fn test_to_stereo_drops_extra_channels() {
        let samples = [0.1, 0.2, 0.3, 0.4, 0.5, 0.6];
        assert_eq!(to_stereo(&samples, 3), vec![0.1, 0.2, 0.4, 0.5]);
    }
}
