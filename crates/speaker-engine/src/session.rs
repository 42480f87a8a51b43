//! One file-to-transport playback session.
//!
//! A session owns every per-playback resource: decoder handle, optional rate
//! converter, staging queue, pacer credit, ring buffer and encoder. Nothing is
//! opened until the first tick, and [`PlaybackSession::close`] releases it all.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{EngineConfig, FormatPolicy};
use crate::decode::{DecoderRegistry, SourceDecoder, StreamSpec};
use crate::encode::{EncoderFactory, FrameEncoder};
use crate::error::{EngineError, Result};
use crate::pacer::Pacer;
use crate::resample::RateConverter;
use crate::ring::RingBuffer;
use crate::status::SessionStats;
use crate::transport::{EncodedFrame, TrackInfo, Transport};
use crate::{FRAME_SAMPLES, OPERATING_CHANNELS, OPERATING_RATE_HZ};

/// Shared collaborators a session needs while ticking.
pub struct SessionEnv<'a> {
    pub config: &'a EngineConfig,
    pub registry: &'a DecoderRegistry,
    pub encoder_factory: &'a EncoderFactory,
}

/// Result of one tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickProgress {
    /// Samples the pacer released into the ring buffer.
    pub released: usize,
    /// Frames encoded and handed to the transport.
    pub frames_sent: usize,
    /// The source is exhausted and every full frame has been sent.
    pub finished: bool,
}

struct Pipeline {
    decoder: Box<dyn SourceDecoder>,
    /// Format reported at open; the decoder must keep to it.
    source_spec: StreamSpec,
    converter: Option<RateConverter>,
    /// Decoded (and converted) samples not yet released by the pacer.
    staging: VecDeque<f32>,
    pull_buf: Vec<f32>,
    convert_buf: Vec<f32>,
    pacer: Pacer,
    ring: RingBuffer,
    encoder: Box<dyn FrameEncoder>,
    frame_buf: Vec<f32>,
    payload_buf: Vec<u8>,
    eof: bool,
}

pub struct PlaybackSession {
    path: PathBuf,
    pipeline: Option<Pipeline>,
    stats: SessionStats,
    announced: bool,
}

impl PlaybackSession {
    pub fn new(path: PathBuf) -> Self {
        let stats = SessionStats {
            path: Some(path.clone()),
            ..Default::default()
        };
        Self {
            path,
            pipeline: None,
            stats,
            announced: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Whether the transport has been told about this session's source.
    pub fn announced(&self) -> bool {
        self.announced
    }

    /// Advance the pipeline by `elapsed` wall-clock time.
    ///
    /// Work is bounded by the pacer credit and `decode_chunk_limit` pulls. The
    /// encode loop stops once less than one frame is buffered. Stats are kept
    /// current as frames go out, so they are accurate even when this errors.
    pub fn tick<T: Transport + ?Sized>(
        &mut self,
        elapsed: Duration,
        env: &SessionEnv<'_>,
        transport: &mut T,
        emitter_id: u8,
    ) -> Result<TickProgress> {
        if self.pipeline.is_none() {
            let pipeline = open_pipeline(&self.path, env, &mut self.stats)?;
            let spec = self.stats.source.unwrap_or(StreamSpec {
                rate: OPERATING_RATE_HZ,
                channels: OPERATING_CHANNELS,
            });
            transport.begin(
                emitter_id,
                TrackInfo {
                    sample_rate: spec.rate,
                    channels: spec.channels as u16,
                    duration_ms: self.stats.duration_ms,
                },
            );
            self.announced = true;
            self.pipeline = Some(pipeline);
        }
        let Some(p) = self.pipeline.as_mut() else {
            return Ok(TickProgress::default());
        };

        p.pacer.accrue(elapsed);
        let budget = p.pacer.budget();

        let mut pulls = 0usize;
        while !p.eof && p.staging.len() < budget && pulls < env.config.decode_chunk_limit.max(1) {
            p.pull_buf.clear();
            let n = p.decoder.pull(&mut p.pull_buf)?;
            pulls += 1;
            self.stats.skipped_packets = p.decoder.skipped_packets();

            let now = p.decoder.spec();
            if now != p.source_spec {
                tracing::warn!(
                    path = ?self.path,
                    rate_hz = now.rate,
                    channels = now.channels,
                    "source format changed mid-stream"
                );
                return Err(EngineError::FormatMismatch {
                    rate: now.rate,
                    channels: now.channels,
                    expected_rate: p.source_spec.rate,
                    expected_channels: p.source_spec.channels,
                });
            }

            p.convert_buf.clear();
            if n == 0 {
                p.eof = true;
                if let Some(conv) = p.converter.as_mut() {
                    conv.flush(&mut p.convert_buf)?;
                    p.staging.extend(p.convert_buf.iter().copied());
                }
                tracing::debug!(path = ?self.path, "source exhausted");
                break;
            }

            match p.converter.as_mut() {
                Some(conv) => {
                    conv.push(&p.pull_buf, &mut p.convert_buf)?;
                    p.staging.extend(p.convert_buf.iter().copied());
                }
                None => p.staging.extend(p.pull_buf.iter().copied()),
            }
        }

        let released = p.pacer.release(p.staging.len());
        self.stats.samples_released += released as u64;

        // Move released samples into the ring no faster than it has room for,
        // encoding whole frames in between; a long tick must not overwrite
        // audio that is about to be sent.
        let mut pending = released;
        let mut frames_sent = 0usize;
        loop {
            let room = p.ring.capacity() - p.ring.len();
            let chunk = pending.min(room);
            for sample in p.staging.drain(..chunk) {
                p.ring.write(sample);
            }
            pending -= chunk;

            while p.ring.len() >= FRAME_SAMPLES {
                p.ring.read_into(&mut p.frame_buf, FRAME_SAMPLES, 0)?;
                send_frame(p, transport, emitter_id, &mut self.stats)?;
                frames_sent += 1;
            }
            if pending == 0 || chunk == 0 {
                break;
            }
        }

        let finished = p.eof && p.staging.is_empty() && p.ring.len() < FRAME_SAMPLES;
        if finished && env.config.pad_final_frame && !p.ring.is_empty() {
            let tail = p.ring.len();
            p.frame_buf.fill(0.0);
            p.ring.read_into(&mut p.frame_buf, tail, 0)?;
            send_frame(p, transport, emitter_id, &mut self.stats)?;
            frames_sent += 1;
        } else if finished && !p.ring.is_empty() {
            tracing::debug!(samples = p.ring.len(), "discarding partial final frame");
        }

        self.stats.ring_len = p.ring.len();
        self.stats.dropped_samples = p.ring.dropped();

        tracing::trace!(released, frames_sent, credit = p.pacer.credit(), "tick");

        Ok(TickProgress {
            released,
            frames_sent,
            finished,
        })
    }

    /// Release the decoder, encoder and buffers; return the final stats.
    pub fn close(mut self) -> SessionStats {
        if let Some(mut p) = self.pipeline.take() {
            p.ring.clear();
            p.staging.clear();
            p.pacer.reset();
            self.stats.ring_len = 0;
        }
        self.stats
    }
}

fn open_pipeline(path: &Path, env: &SessionEnv<'_>, stats: &mut SessionStats) -> Result<Pipeline> {
    let decoder = env.registry.open(path)?;
    let spec = decoder.spec();
    let info = decoder.info();
    stats.source = Some(spec);
    stats.codec = info.codec.clone();
    stats.duration_ms = info.duration_ms;

    let at_operating_point = spec.rate == OPERATING_RATE_HZ && spec.channels == OPERATING_CHANNELS;
    let converter = if at_operating_point {
        None
    } else {
        match env.config.format_policy {
            FormatPolicy::Strict => {
                return Err(EngineError::FormatMismatch {
                    rate: spec.rate,
                    channels: spec.channels,
                    expected_rate: OPERATING_RATE_HZ,
                    expected_channels: OPERATING_CHANNELS,
                });
            }
            FormatPolicy::Convert => Some(RateConverter::new(
                spec,
                OPERATING_RATE_HZ,
                env.config.resample_chunk_frames,
            )?),
        }
    };
    stats.resampling = Some(converter.is_some());

    let encoder = (env.encoder_factory)(env.config)?;
    let ring = RingBuffer::new(env.config.ring_capacity_samples());
    stats.ring_capacity = ring.capacity();

    tracing::info!(
        path = ?path,
        rate_hz = spec.rate,
        channels = spec.channels,
        codec = info.codec.as_deref().unwrap_or("unknown"),
        resampling = converter.is_some(),
        "source opened"
    );

    Ok(Pipeline {
        decoder,
        source_spec: spec,
        converter,
        staging: VecDeque::new(),
        pull_buf: Vec::new(),
        convert_buf: Vec::new(),
        pacer: Pacer::new(OPERATING_RATE_HZ as f64 * OPERATING_CHANNELS as f64),
        ring,
        encoder,
        frame_buf: vec![0.0; FRAME_SAMPLES],
        payload_buf: vec![0u8; env.config.max_payload_bytes.max(1)],
        eof: false,
    })
}

fn send_frame<T: Transport + ?Sized>(
    p: &mut Pipeline,
    transport: &mut T,
    emitter_id: u8,
    stats: &mut SessionStats,
) -> Result<()> {
    let len = p.encoder.encode(&p.frame_buf, &mut p.payload_buf)?;
    if len > p.payload_buf.len() {
        return Err(EngineError::Encode(format!(
            "encoder reported {len} bytes for a {} byte buffer",
            p.payload_buf.len()
        )));
    }
    tracing::trace!(bytes = len, "frame encoded");
    transport.send(EncodedFrame {
        emitter_id,
        payload: p.payload_buf[..len].to_vec(),
    });
    stats.frames_sent += 1;
    stats.bytes_sent += len as u64;
    Ok(())
}
