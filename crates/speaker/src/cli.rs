use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "speaker", version = VERSION)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Optional config file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream a local file as encoded voice frames
    Play(PlayArgs),

    /// Summarize a frame dump written by `play --dump`
    Inspect {
        /// Path to the dump file
        dump: PathBuf,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Flags for `play`; anything left unset falls back to the config file.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct PlayArgs {
    /// Path to audio file (48 kHz mono unless --convert)
    pub path: PathBuf,

    /// Emitter id carried with every frame
    #[arg(long)]
    pub controller_id: Option<u8>,

    /// Playback volume
    #[arg(long)]
    pub volume: Option<f32>,

    /// Distance at which the source reaches full volume
    #[arg(long)]
    pub min_distance: Option<f32>,

    /// Distance beyond which the source is inaudible
    #[arg(long)]
    pub max_distance: Option<f32>,

    /// Send frames as UDP datagrams to this address (repeatable)
    #[arg(long = "udp", value_name = "ADDR")]
    pub udp: Vec<SocketAddr>,

    /// Write framed output to this file
    #[arg(long, value_name = "FILE")]
    pub dump: Option<PathBuf>,

    /// Tick interval in milliseconds
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Downmix and resample sources that are not 48 kHz mono
    #[arg(long)]
    pub convert: bool,

    /// Zero-pad and send a trailing partial frame
    #[arg(long)]
    pub pad_final_frame: bool,

    /// Encoder bitrate in bits per second
    #[arg(long)]
    pub bitrate: Option<i32>,
}
