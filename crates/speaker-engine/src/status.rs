use std::path::PathBuf;

use speaker_types::{EmitterParams, PlaybackEndReason, PlaybackState, SpeakerStatus};

use crate::decode::StreamSpec;

/// Counters and source details accumulated by one playback session.
#[derive(Clone, Debug, Default)]
pub struct SessionStats {
    /// File being played.
    pub path: Option<PathBuf>,
    /// Encoded frames handed to the transport.
    pub frames_sent: u64,
    /// Encoded payload bytes handed to the transport.
    pub bytes_sent: u64,
    /// Samples released by the pacer.
    pub samples_released: u64,
    /// Samples dropped by ring buffer overflow.
    pub dropped_samples: u64,
    /// Source packets skipped because they failed to decode.
    pub skipped_packets: u64,
    /// Samples waiting in the ring buffer.
    pub ring_len: usize,
    /// Ring buffer capacity in samples.
    pub ring_capacity: usize,
    /// Native source layout, once the decoder is open.
    pub source: Option<StreamSpec>,
    /// Whether a rate converter is inserted.
    pub resampling: Option<bool>,
    /// Source codec label.
    pub codec: Option<String>,
    /// Source duration in milliseconds.
    pub duration_ms: Option<u64>,
}

impl SessionStats {
    /// Build an API/log snapshot from these stats plus speaker-level state.
    pub fn snapshot(
        &self,
        state: PlaybackState,
        end_reason: Option<PlaybackEndReason>,
        params: EmitterParams,
    ) -> SpeakerStatus {
        let now_playing = if state == PlaybackState::Playing {
            self.path.as_ref().map(|p| p.display().to_string())
        } else {
            None
        };
        SpeakerStatus {
            state,
            now_playing,
            end_reason,
            params,
            frames_sent: self.frames_sent,
            samples_released: self.samples_released,
            ring_len: self.ring_len,
            ring_capacity: self.ring_capacity,
            dropped_samples: self.dropped_samples,
            skipped_packets: self.skipped_packets,
            source_rate: self.source.map(|s| s.rate),
            source_channels: self.source.map(|s| s.channels as u16),
            resampling: self.resampling,
            source_codec: self.codec.clone(),
            duration_ms: self.duration_ms,
        }
    }
}
