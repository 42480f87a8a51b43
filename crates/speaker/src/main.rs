//! Speaker: streams a local audio file as paced 10 ms voice frames.
//!
//! ## Pipeline
//! 1. **Decode**: Symphonia decodes the file into interleaved `f32`, a bounded
//!    number of packets per tick.
//! 2. **Convert** (optional): Rubato resamples to 48 kHz mono.
//! 3. **Pace**: a rate credit releases exactly as many samples as wall-clock
//!    time allows into a small ring buffer.
//! 4. **Encode**: each full 480-sample frame goes through Opus and out to UDP
//!    recipients and/or a frame dump.
//!
//! ## Modes
//! - `play`: stream one file until it ends or Ctrl-C.
//! - `inspect`: summarize a frame dump.

use anyhow::Result;
use clap::Parser;
use speaker::cli::{Args, Command};
use speaker::config::{self, SpeakerFileConfig};
use speaker::runtime;
use speaker_types::PlaybackState;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,speaker=info,speaker_engine=info")
        }))
        .init();

    match &args.cmd {
        Command::Play(play) => {
            let file = SpeakerFileConfig::load_or_default(args.config.as_deref())?;
            let play_config = config::resolve_play(file, play)?;
            let status = runtime::run_play(play_config, true)?;
            println!("{}", serde_json::to_string(&status)?);
            if status.state == PlaybackState::Errored {
                anyhow::bail!("playback ended with an error");
            }
        }
        Command::Inspect { dump, json } => runtime::run_inspect(dump, *json)?,
    }

    Ok(())
}
