//! Configuration loading and parsing.
//!
//! A TOML file supplies defaults; `play` flags override it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use speaker_engine::{EngineConfig, FormatPolicy};
use speaker_types::EmitterParams;

use crate::cli::PlayArgs;

/// Default host tick: one 60 Hz render frame.
pub const DEFAULT_TICK_MS: u64 = 16;

/// Top-level CLI configuration loaded from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SpeakerFileConfig {
    /// Engine tuning.
    pub engine: EngineConfig,
    /// Default emitter parameters.
    pub emitter: EmitterParams,
    /// Frame destinations.
    pub transport: TransportConfig,
    /// Tick interval in milliseconds.
    pub tick_ms: Option<u64>,
}

/// Frame destinations from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// UDP recipients (host:port).
    pub udp: Vec<String>,
    /// Frame dump path.
    pub dump: Option<PathBuf>,
}

impl SpeakerFileConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<SpeakerFileConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    /// Load `path` if given, otherwise use built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// Fully resolved settings for one `play` run.
#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub params: EmitterParams,
    pub engine: EngineConfig,
    pub udp: Vec<SocketAddr>,
    pub dump: Option<PathBuf>,
    pub tick: Duration,
}

/// Merge file config and flags; flags win.
pub fn resolve_play(file: SpeakerFileConfig, args: &PlayArgs) -> Result<PlayConfig> {
    let mut params = file.emitter;
    if let Some(id) = args.controller_id {
        params.controller_id = id;
    }
    if let Some(v) = args.volume {
        params.volume = v;
    }
    if let Some(d) = args.min_distance {
        params.min_distance = d;
    }
    if let Some(d) = args.max_distance {
        params.max_distance = d;
    }
    validate_params(&params)?;

    let mut engine = file.engine;
    if args.convert {
        engine.format_policy = FormatPolicy::Convert;
    }
    if args.pad_final_frame {
        engine.pad_final_frame = true;
    }
    if args.bitrate.is_some() {
        engine.bitrate_bps = args.bitrate;
    }

    let udp = if args.udp.is_empty() {
        file.transport
            .udp
            .iter()
            .map(|addr| {
                addr.parse::<SocketAddr>()
                    .with_context(|| format!("parse udp recipient {addr}"))
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        args.udp.clone()
    };

    let tick_ms = args.tick_ms.or(file.tick_ms).unwrap_or(DEFAULT_TICK_MS);
    if tick_ms == 0 {
        anyhow::bail!("tick_ms must be at least 1");
    }

    Ok(PlayConfig {
        path: args.path.clone(),
        params,
        engine,
        udp,
        dump: args.dump.clone().or(file.transport.dump),
        tick: Duration::from_millis(tick_ms),
    })
}

fn validate_params(params: &EmitterParams) -> Result<()> {
    if !params.volume.is_finite() || params.volume < 0.0 {
        anyhow::bail!("volume must be a non-negative number, got {}", params.volume);
    }
    if !(params.min_distance >= 0.0 && params.min_distance <= params.max_distance) {
        anyhow::bail!(
            "distances must satisfy 0 <= min ({}) <= max ({})",
            params.min_distance,
            params.max_distance
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play_args(path: &str) -> PlayArgs {
        PlayArgs {
            path: PathBuf::from(path),
            ..PlayArgs::default()
        }
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let cfg = resolve_play(SpeakerFileConfig::default(), &play_args("a.wav")).unwrap();
        assert_eq!(cfg.params, EmitterParams::default());
        assert_eq!(cfg.engine.format_policy, FormatPolicy::Strict);
        assert!(cfg.udp.is_empty());
        assert!(cfg.dump.is_none());
        assert_eq!(cfg.tick, Duration::from_millis(DEFAULT_TICK_MS));
    }

    #[test]
    fn file_values_apply_and_flags_override() {
        let file: SpeakerFileConfig = toml::from_str(
            r#"
            tick_ms = 20

            [engine]
            ring_capacity_frames = 4

            [emitter]
            controller_id = 3
            volume = 0.5

            [transport]
            udp = ["127.0.0.1:9000"]
            dump = "out.spkr"
            "#,
        )
        .unwrap();

        let mut args = play_args("a.wav");
        args.volume = Some(0.8);
        args.convert = true;
        let cfg = resolve_play(file, &args).unwrap();

        assert_eq!(cfg.params.controller_id, 3);
        assert_eq!(cfg.params.volume, 0.8);
        assert_eq!(cfg.params.max_distance, 15.0);
        assert_eq!(cfg.engine.ring_capacity_frames, 4);
        assert_eq!(cfg.engine.format_policy, FormatPolicy::Convert);
        assert_eq!(cfg.udp, vec!["127.0.0.1:9000".parse::<SocketAddr>().unwrap()]);
        assert_eq!(cfg.dump, Some(PathBuf::from("out.spkr")));
        assert_eq!(cfg.tick, Duration::from_millis(20));
    }

    #[test]
    fn udp_flags_replace_file_recipients() {
        let file: SpeakerFileConfig = toml::from_str(
            r#"
            [transport]
            udp = ["not an address"]
            "#,
        )
        .unwrap();
        let mut args = play_args("a.wav");
        args.udp = vec!["127.0.0.1:7000".parse().unwrap()];
        let cfg = resolve_play(file, &args).unwrap();
        assert_eq!(cfg.udp.len(), 1);
    }

    #[test]
    fn bad_file_recipient_is_an_error() {
        let file: SpeakerFileConfig = toml::from_str(
            r#"
            [transport]
            udp = ["not an address"]
            "#,
        )
        .unwrap();
        let err = resolve_play(file, &play_args("a.wav")).unwrap_err();
        assert!(format!("{err:#}").contains("not an address"));
    }

    #[test]
    fn rejects_inverted_distances_and_zero_tick() {
        let mut args = play_args("a.wav");
        args.min_distance = Some(20.0);
        args.max_distance = Some(10.0);
        assert!(resolve_play(SpeakerFileConfig::default(), &args).is_err());

        let mut args = play_args("a.wav");
        args.tick_ms = Some(0);
        assert!(resolve_play(SpeakerFileConfig::default(), &args).is_err());

        let mut args = play_args("a.wav");
        args.volume = Some(-1.0);
        assert!(resolve_play(SpeakerFileConfig::default(), &args).is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SpeakerFileConfig::load(&dir.path().join("nope.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("read config"));
    }

    #[test]
    fn load_or_default_without_path() {
        let cfg = SpeakerFileConfig::load_or_default(None).unwrap();
        assert!(cfg.tick_ms.is_none());
    }
}
