use serde::Deserialize;

use crate::FRAME_SAMPLES;

/// How a session treats sources that are not 48 kHz mono.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FormatPolicy {
    /// Reject with `FormatMismatch` before any frame is encoded.
    #[default]
    Strict,
    /// Downmix to mono and resample to 48 kHz.
    Convert,
}

/// Engine tuning parameters shared by decode/convert/pace/encode stages.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ring buffer capacity, in 480-sample frames.
    pub ring_capacity_frames: usize,
    /// Max decoder pulls per tick.
    pub decode_chunk_limit: usize,
    /// Upper bound for one encoded payload in bytes.
    pub max_payload_bytes: usize,
    /// Optional encoder bitrate; codec default when unset.
    pub bitrate_bps: Option<i32>,
    /// Source format handling.
    pub format_policy: FormatPolicy,
    /// Rate converter input chunk size in frames.
    pub resample_chunk_frames: usize,
    /// Zero-pad and send a trailing partial frame at end of stream.
    pub pad_final_frame: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ring_capacity_frames: 8,
            decode_chunk_limit: 64,
            max_payload_bytes: 512,
            bitrate_bps: None,
            format_policy: FormatPolicy::Strict,
            resample_chunk_frames: 1024,
            pad_final_frame: false,
        }
    }
}

impl EngineConfig {
    /// Ring buffer capacity in samples (at least one frame).
    pub fn ring_capacity_samples(&self) -> usize {
        FRAME_SAMPLES.saturating_mul(self.ring_capacity_frames.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ring_holds_eight_frames() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ring_capacity_samples(), 480 * 8);
        assert_eq!(cfg.format_policy, FormatPolicy::Strict);
    }

    #[test]
    fn ring_capacity_never_below_one_frame() {
        let cfg = EngineConfig {
            ring_capacity_frames: 0,
            ..EngineConfig::default()
        };
        assert_eq!(cfg.ring_capacity_samples(), 480);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: EngineConfig = toml::from_str(
            r#"
            format_policy = "convert"
            bitrate_bps = 24000
            "#,
        )
        .unwrap();
        assert_eq!(cfg.format_policy, FormatPolicy::Convert);
        assert_eq!(cfg.bitrate_bps, Some(24_000));
        assert_eq!(cfg.ring_capacity_frames, 8);
        assert!(!cfg.pad_final_frame);
    }
}
