//! Speaker runtime helpers.
//!
//! Hosts one emitter on a fixed-interval tick loop and inspects frame dumps.

use std::time::{Duration, Instant};

use anyhow::Result;
use speaker_engine::Speaker;
use speaker_engine::transport::{DumpTransport, NullTransport, UdpTransport};
use speaker_types::{PlaybackState, SpeakerStatus};

use crate::config::PlayConfig;
use crate::inspect;
use crate::sink::FanoutTransport;

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// Build the frame destinations named by `config`; counts frames when none are set.
pub fn build_transport(config: &PlayConfig) -> Result<FanoutTransport> {
    let mut fanout = FanoutTransport::default();
    if !config.udp.is_empty() {
        fanout.push(Box::new(UdpTransport::bind(config.udp.clone())?));
    }
    if let Some(path) = config.dump.as_deref() {
        fanout.push(Box::new(DumpTransport::create(path)?));
        tracing::info!(path = ?path, "writing frame dump");
    }
    if fanout.is_empty() {
        tracing::info!("no udp recipients or dump file; frames are counted and discarded");
        fanout.push(Box::new(NullTransport::default()));
    }
    Ok(fanout)
}

/// Play one file to completion (or Ctrl-C) and return the final status.
pub fn run_play(config: PlayConfig, install_ctrlc: bool) -> Result<SpeakerStatus> {
    let transport = build_transport(&config)?;
    let mut speaker = Speaker::new(config.params, transport).with_config(config.engine.clone());

    if install_ctrlc {
        let stop = speaker.stop_handle();
        let _ = ctrlc::set_handler(move || {
            tracing::info!("interrupt received; stopping");
            stop.stop();
        });
    }

    if !speaker.play(&config.path) {
        anyhow::bail!("audio file not found: {:?}", config.path);
    }

    drive(&mut speaker, config.tick);

    let status = speaker.status();
    tracing::info!(
        state = ?status.state,
        frames = speaker.transport().frames(),
        bytes = speaker.transport().bytes(),
        dropped_samples = status.dropped_samples,
        skipped_packets = status.skipped_packets,
        "playback finished"
    );
    Ok(status)
}

/// Tick `speaker` every `tick` until its session reaches a terminal state.
pub fn drive<T: speaker_engine::Transport>(speaker: &mut Speaker<T>, tick: Duration) -> PlaybackState {
    let mut last = Instant::now();
    let mut last_log = last;
    loop {
        std::thread::sleep(tick);
        let now = Instant::now();
        let report = speaker.advance(now.duration_since(last));
        last = now;

        if report.state != PlaybackState::Playing {
            return report.state;
        }
        if now.duration_since(last_log) >= STATUS_LOG_INTERVAL {
            last_log = now;
            let status = speaker.status();
            tracing::debug!(
                frames_sent = status.frames_sent,
                ring_len = status.ring_len,
                dropped_samples = status.dropped_samples,
                "playing"
            );
        }
    }
}

/// Print a dump summary, as text or JSON.
pub fn run_inspect(path: &std::path::Path, json: bool) -> Result<()> {
    let summary = inspect::summarize_file(path)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", inspect::render(&summary));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use speaker_engine::{EngineConfig, FormatPolicy};
    use speaker_types::{EmitterParams, PlaybackEndReason};
    use std::path::{Path, PathBuf};

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut w = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames * channels as usize {
            w.write_sample(((i % 64) as i16 - 32) * 200).unwrap();
        }
        w.finalize().unwrap();
    }

    fn play_config(path: PathBuf, dump: Option<PathBuf>) -> PlayConfig {
        PlayConfig {
            path,
            params: EmitterParams {
                controller_id: 4,
                ..EmitterParams::default()
            },
            engine: EngineConfig::default(),
            udp: Vec::new(),
            dump,
            tick: Duration::from_millis(2),
        }
    }

    #[test]
    fn plays_file_into_dump_and_inspects_it() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("clip.wav");
        let out = dir.path().join("clip.spkr");
        write_wav(&wav, 48_000, 1, 960);

        let status = run_play(play_config(wav, Some(out.clone())), false).unwrap();
        assert_eq!(status.state, PlaybackState::Completed);
        assert_eq!(status.frames_sent, 2);

        let summary = inspect::summarize_file(&out).unwrap();
        assert_eq!(summary.audio_frames, 2);
        let emitter = &summary.emitters[&4];
        assert_eq!(emitter.sample_rate, Some(48_000));
        assert_eq!(emitter.channels, Some(1));
        assert_eq!(emitter.end_reason, Some(PlaybackEndReason::Eof));
    }

    #[test]
    fn mismatched_source_ends_errored_without_audio() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("cd.wav");
        let out = dir.path().join("cd.spkr");
        write_wav(&wav, 44_100, 2, 4410);

        let status = run_play(play_config(wav, Some(out.clone())), false).unwrap();
        assert_eq!(status.state, PlaybackState::Errored);
        assert_eq!(status.frames_sent, 0);

        let summary = inspect::summarize_file(&out).unwrap();
        assert_eq!(summary.audio_frames, 0);
        assert!(summary.emitters.is_empty());
    }

    #[test]
    fn convert_policy_plays_mismatched_source() {
        let dir = tempfile::tempdir().unwrap();
        let wav = dir.path().join("cd.wav");
        write_wav(&wav, 44_100, 2, 4410);

        let mut cfg = play_config(wav, None);
        cfg.engine.format_policy = FormatPolicy::Convert;
        let status = run_play(cfg, false).unwrap();
        assert_eq!(status.state, PlaybackState::Completed);
        assert!(status.frames_sent >= 8);
        assert_eq!(status.resampling, Some(true));
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_play(play_config(dir.path().join("nope.ogg"), None), false).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
