//! Frame dump inspection.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use speaker_proto::{FrameKind, TrackInfoPayload};
use speaker_types::PlaybackEndReason;

/// Per-emitter counters from a dump.
#[derive(Debug, Default, Serialize, PartialEq)]
pub struct EmitterSummary {
    pub frames: u64,
    pub bytes: u64,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub duration_ms: Option<u64>,
    pub end_reason: Option<PlaybackEndReason>,
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct DumpSummary {
    pub audio_frames: u64,
    pub payload_bytes: u64,
    pub min_payload: Option<usize>,
    pub max_payload: Option<usize>,
    pub emitters: BTreeMap<u8, EmitterSummary>,
}

impl DumpSummary {
    pub fn avg_payload(&self) -> Option<f64> {
        if self.audio_frames == 0 {
            None
        } else {
            Some(self.payload_bytes as f64 / self.audio_frames as f64)
        }
    }

    /// Audio time covered, assuming 10 ms per frame.
    pub fn audio_ms(&self) -> u64 {
        self.audio_frames * 10
    }
}

/// Read a whole dump stream and tally its frames.
pub fn summarize(mut r: impl Read) -> Result<DumpSummary> {
    speaker_proto::read_prelude(&mut r).context("read dump prelude")?;

    let mut summary = DumpSummary::default();
    let mut index = 0u64;
    while let Some(frame) =
        speaker_proto::read_frame(&mut r).with_context(|| format!("read frame {index}"))?
    {
        index += 1;
        let entry = summary.emitters.entry(frame.emitter).or_default();
        match frame.kind {
            FrameKind::Audio => {
                let len = frame.payload.len();
                summary.audio_frames += 1;
                summary.payload_bytes += len as u64;
                summary.min_payload = Some(summary.min_payload.map_or(len, |m| m.min(len)));
                summary.max_payload = Some(summary.max_payload.map_or(len, |m| m.max(len)));
                entry.frames += 1;
                entry.bytes += len as u64;
            }
            FrameKind::TrackInfo => {
                let info = TrackInfoPayload::from_bytes(&frame.payload)
                    .with_context(|| format!("decode track info in frame {index}"))?;
                entry.sample_rate = Some(info.sample_rate);
                entry.channels = Some(info.channels);
                entry.duration_ms = info.duration_ms;
            }
            FrameKind::End => {
                entry.end_reason = frame
                    .payload
                    .first()
                    .and_then(|b| PlaybackEndReason::from_u8(*b));
            }
        }
    }
    Ok(summary)
}

pub fn summarize_file(path: &Path) -> Result<DumpSummary> {
    let file = File::open(path).with_context(|| format!("open dump {:?}", path))?;
    summarize(BufReader::new(file)).with_context(|| format!("inspect {:?}", path))
}

/// Human-readable report lines.
pub fn render(summary: &DumpSummary) -> String {
    let mut out = format!(
        "frames: {} ({} ms)\npayload bytes: {}\n",
        summary.audio_frames,
        summary.audio_ms(),
        summary.payload_bytes
    );
    if let (Some(min), Some(avg), Some(max)) = (
        summary.min_payload,
        summary.avg_payload(),
        summary.max_payload,
    ) {
        out.push_str(&format!("payload min/avg/max: {min}/{avg:.1}/{max}\n"));
    }
    for (id, e) in &summary.emitters {
        out.push_str(&format!("emitter {id}: {} frames, {} bytes", e.frames, e.bytes));
        if let (Some(rate), Some(ch)) = (e.sample_rate, e.channels) {
            out.push_str(&format!(", source {rate} Hz x{ch}"));
        }
        if let Some(reason) = e.end_reason {
            out.push_str(&format!(", ended {reason:?}"));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn dump(frames: &[(FrameKind, u8, Vec<u8>)]) -> Vec<u8> {
        let mut buf = Vec::new();
        speaker_proto::write_prelude(&mut buf).unwrap();
        for (kind, id, payload) in frames {
            speaker_proto::write_frame(&mut buf, *kind, *id, payload).unwrap();
        }
        buf
    }

    #[test]
    fn tallies_frames_per_emitter() {
        let buf = dump(&[
            (
                FrameKind::TrackInfo,
                1,
                TrackInfoPayload {
                    sample_rate: 48_000,
                    channels: 1,
                    duration_ms: Some(20),
                }
                .to_bytes()
                .to_vec(),
            ),
            (FrameKind::Audio, 1, vec![0; 40]),
            (FrameKind::Audio, 1, vec![0; 60]),
            (FrameKind::Audio, 2, vec![0; 50]),
            (FrameKind::End, 1, vec![PlaybackEndReason::Eof.as_u8()]),
        ]);

        let s = summarize(Cursor::new(buf)).unwrap();
        assert_eq!(s.audio_frames, 3);
        assert_eq!(s.payload_bytes, 150);
        assert_eq!(s.min_payload, Some(40));
        assert_eq!(s.max_payload, Some(60));
        assert_eq!(s.avg_payload(), Some(50.0));
        assert_eq!(s.audio_ms(), 30);

        let one = &s.emitters[&1];
        assert_eq!(one.frames, 2);
        assert_eq!(one.sample_rate, Some(48_000));
        assert_eq!(one.end_reason, Some(PlaybackEndReason::Eof));
        assert_eq!(s.emitters[&2].frames, 1);

        let text = render(&s);
        assert!(text.contains("frames: 3 (30 ms)"));
        assert!(text.contains("payload min/avg/max: 40/50.0/60"));
    }

    #[test]
    fn empty_dump_has_no_payload_stats() {
        let s = summarize(Cursor::new(dump(&[]))).unwrap();
        assert_eq!(s, DumpSummary::default());
        assert!(s.avg_payload().is_none());
    }

    #[test]
    fn truncated_dump_is_an_error() {
        let mut buf = dump(&[(FrameKind::Audio, 1, vec![7; 30])]);
        buf.truncate(buf.len() - 5);
        let err = summarize(Cursor::new(buf)).unwrap_err();
        assert!(format!("{err:#}").contains("read frame 0"));
    }

    #[test]
    fn foreign_file_is_rejected() {
        assert!(summarize(Cursor::new(b"RIFF0000WAVE".to_vec())).is_err());
    }
}
