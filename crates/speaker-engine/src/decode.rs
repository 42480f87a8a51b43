//! Source decode stage.
//!
//! Uses Symphonia to:
//! - probe the input container/codec from a file extension hint
//! - decode packets into interleaved `f32` samples, one packet per pull
//!
//! Backends are pluggable through [`DecoderBackend`] and looked up by file
//! extension in a [`DecoderRegistry`].

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CODEC_TYPE_MP3, CODEC_TYPE_PCM_F32BE, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_F64LE,
    CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE, CODEC_TYPE_PCM_S24BE, CODEC_TYPE_PCM_S24LE,
    CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8, CODEC_TYPE_VORBIS, CodecParameters, CodecType,
    Decoder, DecoderOptions,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{EngineError, Result};

/// Consecutive undecodable packets tolerated before the stream is declared corrupt.
const MAX_CONSECUTIVE_DECODE_ERRORS: usize = 16;

/// Native sample layout of a decoded stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamSpec {
    pub rate: u32,
    pub channels: usize,
}

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Duration in milliseconds (best-effort).
    pub duration_ms: Option<u64>,
    /// Backend that opened the source.
    pub backend: &'static str,
}

/// A lazy, finite, non-restartable stream of interleaved `f32` samples.
pub trait SourceDecoder: Send {
    fn spec(&self) -> StreamSpec;

    fn info(&self) -> SourceInfo {
        SourceInfo::default()
    }

    /// Packets dropped so far because they failed to decode.
    fn skipped_packets(&self) -> u64 {
        0
    }

    /// Append the next decoded chunk to `out` and return how many samples were added.
    ///
    /// Returns `Ok(0)` at end of stream and on every call after it. Every chunk
    /// must be in the layout [`spec`](Self::spec) reported at open.
    fn pull(&mut self, out: &mut Vec<f32>) -> Result<usize>;
}

/// Opens a [`SourceDecoder`] for a family of container formats.
pub trait DecoderBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case extensions (without the dot) this backend claims.
    fn extensions(&self) -> &[&'static str];

    fn open(&self, path: &Path) -> Result<Box<dyn SourceDecoder>>;
}

/// Extension → backend lookup.
#[derive(Clone, Default)]
pub struct DecoderRegistry {
    backends: HashMap<String, Arc<dyn DecoderBackend>>,
}

impl DecoderRegistry {
    /// Empty registry; every extension is unsupported.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Symphonia backend for Ogg Vorbis, WAV and MP3.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SymphoniaBackend::default()));
        registry
    }

    /// Register `backend` for all of its extensions, replacing earlier claims.
    pub fn register(&mut self, backend: Arc<dyn DecoderBackend>) {
        for ext in backend.extensions() {
            self.backends.insert(ext.to_ascii_lowercase(), backend.clone());
        }
    }

    /// Backend for `path`'s extension, if any.
    pub fn backend_for(&self, path: &Path) -> Option<&Arc<dyn DecoderBackend>> {
        let ext = extension_of(path)?;
        self.backends.get(&ext)
    }

    /// Open `path` with the backend registered for its extension.
    pub fn open(&self, path: &Path) -> Result<Box<dyn SourceDecoder>> {
        let backend = self.backend_for(path).ok_or_else(|| {
            EngineError::UnsupportedFormat(
                extension_of(path).unwrap_or_else(|| "<none>".to_string()),
            )
        })?;
        tracing::debug!(path = ?path, backend = backend.name(), "opening source");
        backend.open(path)
    }
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

/// Symphonia-backed decoding for the formats compiled into the workspace.
pub struct SymphoniaBackend {
    extensions: Vec<&'static str>,
}

impl Default for SymphoniaBackend {
    fn default() -> Self {
        Self {
            extensions: vec!["ogg", "oga", "wav", "wave", "mp3"],
        }
    }
}

impl DecoderBackend for SymphoniaBackend {
    fn name(&self) -> &'static str {
        "symphonia"
    }

    fn extensions(&self) -> &[&'static str] {
        &self.extensions
    }

    fn open(&self, path: &Path) -> Result<Box<dyn SourceDecoder>> {
        Ok(Box::new(SymphoniaDecoder::open(path)?))
    }
}

/// Packet-at-a-time Symphonia decoder.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    spec: StreamSpec,
    info: SourceInfo,
    skipped_packets: u64,
    eof: bool,
}

impl SymphoniaDecoder {
    /// Probe `path` (with its extension as a hint) and prepare the default track.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EngineError::FileNotFound(path.to_path_buf()),
            _ => EngineError::Format(format!("open {:?}: {e}", path)),
        })?;

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| EngineError::Format(format!("probe {:?}: {e}", path)))?;

        let format = probed.format;
        let track = format
            .default_track()
            .ok_or_else(|| EngineError::Format("no default audio track".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .ok_or_else(|| EngineError::Format("unknown channel count".to_string()))?
            .count();
        let rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| EngineError::Format("unknown sample rate".to_string()))?;

        let codec_params: CodecParameters = track.codec_params.clone();
        let track_id = track.id;
        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| EngineError::Format(format!("codec: {e}")))?;

        let info = probe_info(&codec_params);

        Ok(Self {
            format,
            decoder,
            track_id,
            spec: StreamSpec { rate, channels },
            info,
            skipped_packets: 0,
            eof: false,
        })
    }
}

impl SourceDecoder for SymphoniaDecoder {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn info(&self) -> SourceInfo {
        self.info.clone()
    }

    fn skipped_packets(&self) -> u64 {
        self.skipped_packets
    }

    fn pull(&mut self, out: &mut Vec<f32>) -> Result<usize> {
        let mut consecutive_errors = 0usize;

        while !self.eof {
            let packet = match self.format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    break;
                }
                // Chained streams are not followed.
                Err(SymphoniaError::ResetRequired) => {
                    self.eof = true;
                    break;
                }
                Err(e) => return Err(EngineError::Decode(format!("read packet: {e}"))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(d) => d,
                Err(SymphoniaError::DecodeError(msg)) => {
                    self.skipped_packets += 1;
                    consecutive_errors += 1;
                    tracing::debug!(reason = msg, "skipping undecodable packet");
                    if consecutive_errors >= MAX_CONSECUTIVE_DECODE_ERRORS {
                        return Err(EngineError::Decode(format!(
                            "{consecutive_errors} consecutive undecodable packets: {msg}"
                        )));
                    }
                    continue;
                }
                Err(SymphoniaError::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.eof = true;
                    break;
                }
                Err(e) => return Err(EngineError::Decode(e.to_string())),
            };

            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            if spec.rate != self.spec.rate || spec.channels.count() != self.spec.channels {
                self.eof = true;
                return Err(EngineError::FormatMismatch {
                    rate: spec.rate,
                    channels: spec.channels.count(),
                    expected_rate: self.spec.rate,
                    expected_channels: self.spec.channels,
                });
            }

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let samples = sample_buf.samples();
            out.extend_from_slice(samples);
            return Ok(samples.len());
        }

        Ok(0)
    }
}

/// Codec label and duration from the track's codec parameters.
fn probe_info(params: &CodecParameters) -> SourceInfo {
    let duration_ms = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => Some(frames.saturating_mul(1000) / rate as u64),
        _ => None,
    };
    SourceInfo {
        codec: codec_label(params.codec).map(str::to_string),
        duration_ms,
        backend: "symphonia",
    }
}

fn codec_label(codec: CodecType) -> Option<&'static str> {
    let label = match codec {
        CODEC_TYPE_VORBIS => "vorbis",
        CODEC_TYPE_MP3 => "mp3",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE | CODEC_TYPE_PCM_U8 => "pcm",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE | CODEC_TYPE_PCM_S32LE => "pcm",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE | CODEC_TYPE_PCM_F64LE => "pcm_float",
        _ => return None,
    };
    Some(label)
}
