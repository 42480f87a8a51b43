//! Error taxonomy for the playback engine.
//!
//! None of these escape a session: `Speaker::play` reports missing files as
//! `false`, and failures during `advance` end the session as `Errored`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Play requested for a path that does not exist.
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),

    /// No decoder backend is registered for the extension.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decoded stream disagrees with the encoder operating point.
    #[error(
        "format mismatch: expected {expected_rate} Hz / {expected_channels} ch, got {rate} Hz / {channels} ch"
    )]
    FormatMismatch {
        rate: u32,
        channels: usize,
        expected_rate: u32,
        expected_channels: usize,
    },

    /// Container could not be opened or probed.
    #[error("format error: {0}")]
    Format(String),

    /// Container is corrupt or truncated.
    #[error("decode error: {0}")]
    Decode(String),

    #[error("resample error: {0}")]
    Resample(String),

    #[error("encode error: {0}")]
    Encode(String),

    /// `read_into` asked for more samples than are buffered.
    #[error("ring buffer underflow: requested {requested}, available {available}")]
    Underflow { requested: usize, available: usize },

    /// Caller-provided storage cannot hold the requested samples.
    #[error("destination too short: need {needed}, have {len}")]
    Destination { needed: usize, len: usize },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
