//! Frame encode stage.
//!
//! Compresses fixed 10 ms frames of 48 kHz mono `f32` into voice-codec
//! payloads. One encoder lives for the whole session so the codec's
//! predictive state carries across frames.

use std::sync::Arc;

use audiopus::coder::Encoder as OpusEncoder;
use audiopus::{Application, Bitrate, Channels, SampleRate};

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::FRAME_SAMPLES;

/// Compresses one fixed-size frame per call.
pub trait FrameEncoder {
    /// Encode `frame` into `out`, returning the payload length.
    fn encode(&mut self, frame: &[f32], out: &mut [u8]) -> Result<usize>;
}

/// Builds a fresh encoder for each session.
pub type EncoderFactory = Arc<dyn Fn(&EngineConfig) -> Result<Box<dyn FrameEncoder>> + Send + Sync>;

/// Factory producing [`OpusFrameEncoder`]s.
pub fn opus_factory() -> EncoderFactory {
    Arc::new(|cfg: &EngineConfig| -> Result<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusFrameEncoder::new(cfg.bitrate_bps)?))
    })
}

/// Opus encoder fixed at 48 kHz, mono, VoIP application.
pub struct OpusFrameEncoder {
    encoder: OpusEncoder,
}

impl OpusFrameEncoder {
    pub fn new(bitrate_bps: Option<i32>) -> Result<Self> {
        let mut encoder = OpusEncoder::new(SampleRate::Hz48000, Channels::Mono, Application::Voip)
            .map_err(|e| EngineError::Encode(format!("init: {e}")))?;
        if let Some(bps) = bitrate_bps {
            encoder
                .set_bitrate(Bitrate::BitsPerSecond(bps))
                .map_err(|e| EngineError::Encode(format!("bitrate {bps}: {e}")))?;
        }
        Ok(Self { encoder })
    }
}

impl FrameEncoder for OpusFrameEncoder {
    fn encode(&mut self, frame: &[f32], out: &mut [u8]) -> Result<usize> {
        if frame.len() != FRAME_SAMPLES {
            return Err(EngineError::Encode(format!(
                "frame has {} samples, codec needs {FRAME_SAMPLES}",
                frame.len()
            )));
        }
        self.encoder
            .encode_float(frame, out)
            .map_err(|e| EngineError::Encode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_silence_within_payload_bound() {
        let mut enc = OpusFrameEncoder::new(None).unwrap();
        let frame = [0.0f32; FRAME_SAMPLES];
        let mut out = [0u8; 512];
        let len = enc.encode(&frame, &mut out).unwrap();
        assert!(len > 0 && len <= out.len());
    }

    #[test]
    fn keeps_state_across_frames() {
        let mut enc = OpusFrameEncoder::new(Some(24_000)).unwrap();
        let mut out = [0u8; 512];
        for n in 0..10 {
            let frame: Vec<f32> = (0..FRAME_SAMPLES)
                .map(|i| (((n * FRAME_SAMPLES + i) as f32) * 0.05).sin() * 0.4)
                .collect();
            let len = enc.encode(&frame, &mut out).unwrap();
            assert!(len > 0);
        }
    }

    #[test]
    fn rejects_wrong_frame_size() {
        let mut enc = OpusFrameEncoder::new(None).unwrap();
        let mut out = [0u8; 512];
        assert!(matches!(
            enc.encode(&[0.0; 960], &mut out),
            Err(EngineError::Encode(_))
        ));
    }

    #[test]
    fn factory_builds_independent_encoders() {
        let factory = opus_factory();
        let cfg = EngineConfig::default();
        let mut a = factory(&cfg).unwrap();
        let mut b = factory(&cfg).unwrap();
        let mut out = [0u8; 512];
        assert!(a.encode(&[0.0; FRAME_SAMPLES], &mut out).is_ok());
        assert!(b.encode(&[0.0; FRAME_SAMPLES], &mut out).is_ok());
    }
}
