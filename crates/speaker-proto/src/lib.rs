//! Framing for encoded speaker audio.
//!
//! Used for frame dumps written by the `speaker` CLI and for UDP datagrams
//! (one `Audio` frame each, no prelude).
//!
//! Dump layout:
//! - prelude, once: `b"SPKR"` then version as u16 LE
//! - frames, repeated: kind u8, emitter u8, len u16 LE, `len` payload bytes
//!
//! All integers are little-endian.

use std::io::{self, Read, Write};

pub const MAGIC: [u8; 4] = *b"SPKR";
pub const VERSION: u16 = 1;

/// Prelude size in bytes (magic + version).
pub const PRELUDE_LEN: usize = 6;

/// Frame header size in bytes (kind + emitter + len).
pub const FRAME_HEADER_LEN: usize = 4;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// One encoded voice frame.
    Audio = 0x01,
    /// Playback ended; payload is one end-reason byte.
    End = 0x12,
    /// Source description, sent before a session's first audio frame.
    TrackInfo = 0x30,
}

impl TryFrom<u8> for FrameKind {
    type Error = io::Error;

    fn try_from(b: u8) -> io::Result<Self> {
        match b {
            0x01 => Ok(FrameKind::Audio),
            0x12 => Ok(FrameKind::End),
            0x30 => Ok(FrameKind::TrackInfo),
            other => Err(invalid_data(format!("unknown frame kind {other:#04x}"))),
        }
    }
}

/// One frame read back from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameKind,
    pub emitter: u8,
    pub payload: Vec<u8>,
}

pub fn write_prelude(mut w: impl Write) -> io::Result<()> {
    let mut prelude = [0u8; PRELUDE_LEN];
    prelude[..4].copy_from_slice(&MAGIC);
    prelude[4..].copy_from_slice(&VERSION.to_le_bytes());
    w.write_all(&prelude)
}

/// Read the prelude and check magic and version.
pub fn read_prelude(mut r: impl Read) -> io::Result<()> {
    let mut prelude = [0u8; PRELUDE_LEN];
    r.read_exact(&mut prelude)?;
    if prelude[..4] != MAGIC {
        return Err(invalid_data("not a speaker frame stream (bad magic)"));
    }
    match u16::from_le_bytes([prelude[4], prelude[5]]) {
        VERSION => Ok(()),
        v => Err(invalid_data(format!("unsupported stream version {v}"))),
    }
}

/// Header and payload in one buffer, ready for a datagram or a write.
pub fn encode_frame(kind: FrameKind, emitter: u8, payload: &[u8]) -> io::Result<Vec<u8>> {
    let Ok(len) = u16::try_from(payload.len()) else {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("payload of {} bytes exceeds {MAX_PAYLOAD_LEN}", payload.len()),
        ));
    };
    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&[kind as u8, emitter]);
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

pub fn write_frame(mut w: impl Write, kind: FrameKind, emitter: u8, payload: &[u8]) -> io::Result<()> {
    w.write_all(&encode_frame(kind, emitter, payload)?)
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end of stream at a frame boundary; a stream
/// that ends inside a frame is an `UnexpectedEof` error.
pub fn read_frame(mut r: impl Read) -> io::Result<Option<Frame>> {
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        match r.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended {filled} bytes into a frame header"),
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let kind = FrameKind::try_from(header[0])?;
    let len = u16::from_le_bytes([header[2], header[3]]) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok(Some(Frame {
        kind,
        emitter: header[1],
        payload,
    }))
}

/// `TrackInfo` payload: sample rate u32, channels u16, duration_ms u64 (0 = unknown).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackInfoPayload {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: Option<u64>,
}

impl TrackInfoPayload {
    pub const LEN: usize = 14;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let mut out = [0u8; Self::LEN];
        out[0..4].copy_from_slice(&self.sample_rate.to_le_bytes());
        out[4..6].copy_from_slice(&self.channels.to_le_bytes());
        out[6..14].copy_from_slice(&self.duration_ms.unwrap_or(0).to_le_bytes());
        out
    }

    pub fn from_bytes(payload: &[u8]) -> io::Result<Self> {
        let bytes: &[u8; Self::LEN] = payload.try_into().map_err(|_| {
            invalid_data(format!(
                "track info payload is {} bytes, expected {}",
                payload.len(),
                Self::LEN
            ))
        })?;
        let mut rate = [0u8; 4];
        rate.copy_from_slice(&bytes[0..4]);
        let mut dur = [0u8; 8];
        dur.copy_from_slice(&bytes[6..14]);
        let duration_ms = u64::from_le_bytes(dur);
        Ok(Self {
            sample_rate: u32::from_le_bytes(rate),
            channels: u16::from_le_bytes([bytes[4], bytes[5]]),
            duration_ms: (duration_ms != 0).then_some(duration_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn prelude_is_accepted_by_reader() {
        let mut buf = Vec::new();
        write_prelude(&mut buf).unwrap();
        assert_eq!(buf.len(), PRELUDE_LEN);
        assert_eq!(&buf[..4], b"SPKR");
        read_prelude(Cursor::new(buf)).unwrap();
    }

    #[test]
    fn foreign_magic_and_future_version_are_rejected() {
        let err = read_prelude(Cursor::new(b"RIFF\x01\x00".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut buf = MAGIC.to_vec();
        buf.extend_from_slice(&(VERSION + 1).to_le_bytes());
        let err = read_prelude(Cursor::new(buf)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(err.to_string().contains("version"));
    }

    #[test]
    fn short_prelude_is_unexpected_eof() {
        let err = read_prelude(Cursor::new(b"SPK".to_vec())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn frames_read_back_in_order_then_clean_eof() {
        let mut buf = Vec::new();
        write_frame(&mut buf, FrameKind::Audio, 7, b"abc").unwrap();
        write_frame(&mut buf, FrameKind::End, 7, &[0]).unwrap();

        let mut cur = Cursor::new(buf);
        let first = read_frame(&mut cur).unwrap().unwrap();
        assert_eq!(first.kind, FrameKind::Audio);
        assert_eq!(first.emitter, 7);
        assert_eq!(first.payload, b"abc");

        let second = read_frame(&mut cur).unwrap().unwrap();
        assert_eq!(second.kind, FrameKind::End);
        assert!(read_frame(&mut cur).unwrap().is_none());
    }

    #[test]
    fn header_layout_is_kind_emitter_len() {
        let buf = encode_frame(FrameKind::TrackInfo, 3, &[9; 258]).unwrap();
        assert_eq!(&buf[..FRAME_HEADER_LEN], &[0x30, 3, 0x02, 0x01]);
        assert_eq!(buf.len(), FRAME_HEADER_LEN + 258);
    }

    #[test]
    fn empty_payload_is_allowed() {
        let buf = encode_frame(FrameKind::Audio, 0, &[]).unwrap();
        let frame = read_frame(Cursor::new(buf)).unwrap().unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn truncation_inside_a_frame_is_unexpected_eof() {
        let err = read_frame(Cursor::new(vec![FrameKind::Audio as u8, 1])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        let mut frame = encode_frame(FrameKind::Audio, 1, b"hello").unwrap();
        frame.truncate(frame.len() - 2);
        let err = read_frame(Cursor::new(frame)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn oversized_payload_is_invalid_input() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        let err = encode_frame(FrameKind::Audio, 0, &payload).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn unknown_kind_byte_is_invalid_data() {
        let err = read_frame(Cursor::new(vec![0xEE, 0, 0, 0])).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn track_info_zero_duration_means_unknown() {
        let info = TrackInfoPayload {
            sample_rate: 44_100,
            channels: 2,
            duration_ms: None,
        };
        let bytes = info.to_bytes();
        assert_eq!(&bytes[6..], &[0u8; 8]);
        assert_eq!(TrackInfoPayload::from_bytes(&bytes).unwrap(), info);

        let known = TrackInfoPayload {
            duration_ms: Some(1500),
            ..info
        };
        assert_eq!(TrackInfoPayload::from_bytes(&known.to_bytes()).unwrap(), known);
    }

    #[test]
    fn track_info_rejects_wrong_length() {
        let err = TrackInfoPayload::from_bytes(&[0u8; 10]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
