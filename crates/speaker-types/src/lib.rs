use serde::{Deserialize, Serialize};

/// Reason why a playback session ended.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackEndReason {
    /// Natural end of stream/file.
    Eof,
    /// Decoder, format, or encoder error interrupted playback.
    Error,
    /// Playback was explicitly stopped (or replaced by a new `play`).
    Stopped,
}

impl PlaybackEndReason {
    /// Single-byte tag used on the wire.
    pub fn as_u8(self) -> u8 {
        match self {
            PlaybackEndReason::Eof => 0,
            PlaybackEndReason::Error => 1,
            PlaybackEndReason::Stopped => 2,
        }
    }

    pub fn from_u8(b: u8) -> Option<Self> {
        match b {
            0 => Some(PlaybackEndReason::Eof),
            1 => Some(PlaybackEndReason::Error),
            2 => Some(PlaybackEndReason::Stopped),
            _ => None,
        }
    }
}

/// Lifecycle state of a speaker's playback session.
///
/// Terminal states (`Stopped`, `Completed`, `Errored`) behave like `Idle` for a
/// subsequent play request; they are kept so callers can see how the last
/// session ended.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing,
    Stopped,
    Completed,
    Errored,
}

impl PlaybackState {
    /// State reached when a session ends for `reason`.
    pub fn from_end_reason(reason: PlaybackEndReason) -> Self {
        match reason {
            PlaybackEndReason::Eof => PlaybackState::Completed,
            PlaybackEndReason::Error => PlaybackState::Errored,
            PlaybackEndReason::Stopped => PlaybackState::Stopped,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PlaybackState::Stopped | PlaybackState::Completed | PlaybackState::Errored
        )
    }
}

/// Emitter-owned playback parameters (mirrored to clients by the host).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmitterParams {
    /// Routing key carried with every encoded frame.
    pub controller_id: u8,
    /// Playback volume (0.0 and up).
    pub volume: f32,
    /// Distance at which the source reaches full volume.
    pub min_distance: f32,
    /// Distance beyond which the source is inaudible.
    pub max_distance: f32,
    /// Whether clients spatialize the source.
    pub is_spatial: bool,
}

impl Default for EmitterParams {
    fn default() -> Self {
        Self {
            controller_id: 0,
            volume: 1.0,
            min_distance: 1.0,
            max_distance: 15.0,
            is_spatial: true,
        }
    }
}

/// Point-in-time status of a speaker, suitable for logs and JSON output.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SpeakerStatus {
    /// Current lifecycle state.
    pub state: PlaybackState,
    /// Path of the file being played, if any.
    pub now_playing: Option<String>,
    /// How the last session ended.
    pub end_reason: Option<PlaybackEndReason>,
    /// Emitter parameters in effect.
    pub params: EmitterParams,
    /// Encoded frames handed to the transport by the current/last session.
    pub frames_sent: u64,
    /// Samples released by the pacer into the ring buffer.
    pub samples_released: u64,
    /// Samples currently waiting in the ring buffer.
    pub ring_len: usize,
    /// Ring buffer capacity in samples.
    pub ring_capacity: usize,
    /// Samples discarded by the ring buffer's drop-oldest policy.
    pub dropped_samples: u64,
    /// Source packets skipped because they failed to decode.
    pub skipped_packets: u64,
    /// Source sample rate before conversion (Hz).
    pub source_rate: Option<u32>,
    /// Source channel count before conversion.
    pub source_channels: Option<u16>,
    /// Whether a rate/channel conversion stage is active.
    pub resampling: Option<bool>,
    /// Source codec (for example `vorbis`, `mp3`).
    pub source_codec: Option<String>,
    /// Total media duration in milliseconds when known.
    pub duration_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_reason_wire_tag_roundtrip() {
        for reason in [
            PlaybackEndReason::Eof,
            PlaybackEndReason::Error,
            PlaybackEndReason::Stopped,
        ] {
            assert_eq!(PlaybackEndReason::from_u8(reason.as_u8()), Some(reason));
        }
        assert_eq!(PlaybackEndReason::from_u8(9), None);
    }

    #[test]
    fn terminal_state_mapping() {
        assert_eq!(
            PlaybackState::from_end_reason(PlaybackEndReason::Eof),
            PlaybackState::Completed
        );
        assert!(PlaybackState::Stopped.is_terminal());
        assert!(!PlaybackState::Playing.is_terminal());
        assert!(!PlaybackState::Idle.is_terminal());
    }

    #[test]
    fn status_serializes_snake_case_state() {
        let status = SpeakerStatus {
            state: PlaybackState::Completed,
            end_reason: Some(PlaybackEndReason::Eof),
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "completed");
        assert_eq!(json["end_reason"], "eof");
    }

    #[test]
    fn emitter_params_fill_missing_fields_with_defaults() {
        let params: EmitterParams = serde_json::from_str(r#"{"controller_id": 4}"#).unwrap();
        assert_eq!(params.controller_id, 4);
        assert_eq!(params.volume, 1.0);
        assert!(params.is_spatial);
    }
}
