//! Transport boundary for encoded frames.
//!
//! The engine hands every encoded frame to a [`Transport`] and never waits for
//! delivery. Implementations here cover in-process channels, UDP fan-out to a
//! recipient list, and framed dump files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::net::{SocketAddr, UdpSocket};
use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use speaker_proto::{FrameKind, TrackInfoPayload};
use speaker_types::PlaybackEndReason;

/// One compressed voice frame tagged with its emitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Controller id of the originating speaker.
    pub emitter_id: u8,
    pub payload: Vec<u8>,
}

impl EncodedFrame {
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Source description announced when a session starts producing frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: Option<u64>,
}

/// Fire-and-forget sink for encoded frames.
pub trait Transport {
    fn send(&mut self, frame: EncodedFrame);

    /// Called once per session before its first frame.
    fn begin(&mut self, _emitter_id: u8, _info: TrackInfo) {}

    /// Called once when a session that reached `begin` ends.
    fn end(&mut self, _emitter_id: u8, _reason: PlaybackEndReason) {}
}

/// Forwards frames into a crossbeam channel; a closed channel drops frames.
pub struct ChannelTransport {
    tx: Sender<EncodedFrame>,
}

impl ChannelTransport {
    pub fn new(tx: Sender<EncodedFrame>) -> Self {
        Self { tx }
    }
}

impl Transport for ChannelTransport {
    fn send(&mut self, frame: EncodedFrame) {
        let _ = self.tx.send(frame);
    }
}

/// Counts and discards frames.
#[derive(Debug, Default)]
pub struct NullTransport {
    pub frames: u64,
    pub bytes: u64,
}

impl Transport for NullTransport {
    fn send(&mut self, frame: EncodedFrame) {
        self.frames += 1;
        self.bytes += frame.len() as u64;
    }
}

/// Sends each frame as one datagram to every recipient.
///
/// Datagrams use the `speaker-proto` frame layout (kind, emitter, len, payload).
pub struct UdpTransport {
    socket: UdpSocket,
    recipients: Vec<SocketAddr>,
    send_errors: u64,
}

impl UdpTransport {
    /// Bind an ephemeral local socket for sending to `recipients`.
    pub fn bind(recipients: Vec<SocketAddr>) -> Result<Self> {
        let local: SocketAddr = if recipients.iter().any(|r| r.is_ipv6()) {
            "[::]:0".parse()?
        } else {
            "0.0.0.0:0".parse()?
        };
        let socket = UdpSocket::bind(local).with_context(|| format!("bind udp {local}"))?;
        tracing::info!(
            local = %socket.local_addr()?,
            recipients = recipients.len(),
            "udp transport ready"
        );
        Ok(Self {
            socket,
            recipients,
            send_errors: 0,
        })
    }

    pub fn recipients(&self) -> &[SocketAddr] {
        &self.recipients
    }

    pub fn send_errors(&self) -> u64 {
        self.send_errors
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, frame: EncodedFrame) {
        let datagram = match speaker_proto::encode_frame(FrameKind::Audio, frame.emitter_id, &frame.payload) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!("udp frame encode error: {e}");
                return;
            }
        };
        for addr in &self.recipients {
            if let Err(e) = self.socket.send_to(&datagram, addr) {
                self.send_errors += 1;
                tracing::warn!(recipient = %addr, "udp send error: {e}");
            }
        }
    }
}

/// Appends framed output to a file (see `speaker-proto`).
pub struct DumpTransport {
    writer: BufWriter<File>,
    frames: u64,
    failed: bool,
}

impl DumpTransport {
    /// Create/truncate `path` and write the stream prelude.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create dump {:?}", path))?;
        let mut writer = BufWriter::new(file);
        speaker_proto::write_prelude(&mut writer).context("write dump prelude")?;
        Ok(Self {
            writer,
            frames: 0,
            failed: false,
        })
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn write(&mut self, kind: FrameKind, emitter: u8, payload: &[u8]) {
        if self.failed {
            return;
        }
        if let Err(e) = speaker_proto::write_frame(&mut self.writer, kind, emitter, payload) {
            // Stop writing after the first failure; the dump is truncated anyway.
            self.failed = true;
            tracing::warn!("dump write error: {e}");
        }
    }

    /// Flush buffered frames to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("flush dump")
    }
}

impl Transport for DumpTransport {
    fn send(&mut self, frame: EncodedFrame) {
        self.write(FrameKind::Audio, frame.emitter_id, &frame.payload);
        self.frames += 1;
    }

    fn begin(&mut self, emitter_id: u8, info: TrackInfo) {
        let payload = TrackInfoPayload {
            sample_rate: info.sample_rate,
            channels: info.channels,
            duration_ms: info.duration_ms,
        };
        self.write(FrameKind::TrackInfo, emitter_id, &payload.to_bytes());
    }

    fn end(&mut self, emitter_id: u8, reason: PlaybackEndReason) {
        self.write(FrameKind::End, emitter_id, &[reason.as_u8()]);
        if let Err(e) = self.flush() {
            tracing::warn!("{e:#}");
        }
    }
}

impl Drop for DumpTransport {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, frame: EncodedFrame) {
        (**self).send(frame);
    }

    fn begin(&mut self, emitter_id: u8, info: TrackInfo) {
        (**self).begin(emitter_id, info);
    }

    fn end(&mut self, emitter_id: u8, reason: PlaybackEndReason) {
        (**self).end(emitter_id, reason);
    }
}
