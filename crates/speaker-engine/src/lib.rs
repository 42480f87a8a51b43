//! Streaming playback engine for speaker emitters.
//!
//! A session moves samples through
//! decode → (convert) → pace → ring buffer → encode → transport,
//! one cooperative step per host tick via [`speaker::Speaker::advance`].

pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod pacer;
pub mod resample;
pub mod ring;
pub mod session;
pub mod speaker;
pub mod status;
pub mod transport;

pub use config::{EngineConfig, FormatPolicy};
pub use error::EngineError;
pub use speaker::{PlaybackEvent, Speaker, StopHandle, TickReport};
pub use transport::{EncodedFrame, Transport};

/// Encoder operating sample rate (Hz).
pub const OPERATING_RATE_HZ: u32 = 48_000;
/// Encoder operating channel count.
pub const OPERATING_CHANNELS: usize = 1;
/// Samples per encoded frame: 10 ms at 48 kHz mono.
pub const FRAME_SAMPLES: usize = 480;
