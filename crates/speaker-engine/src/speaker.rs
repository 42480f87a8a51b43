//! Speaker emitter: owns at most one playback session and drives it per tick.
//!
//! State machine: `Idle → Playing → (Stopped | Completed | Errored)`; a
//! terminal state accepts a new `play` like `Idle` does. Work only happens
//! inside [`Speaker::advance`], so the host's tick source is the scheduler.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use speaker_types::{EmitterParams, PlaybackEndReason, PlaybackState, SpeakerStatus};

use crate::config::EngineConfig;
use crate::decode::DecoderRegistry;
use crate::encode::{EncoderFactory, opus_factory};
use crate::session::{PlaybackSession, SessionEnv};
use crate::status::SessionStats;
use crate::transport::Transport;

/// Cooperative cancellation flag for a speaker.
///
/// Cheap to clone and safe to trigger from other threads or signal handlers;
/// the speaker observes it at the start of its next tick.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop. Idempotent.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::Relaxed);
    }
}

/// Lifecycle notifications, in the order they happen.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started {
        path: PathBuf,
    },
    Ended {
        path: PathBuf,
        reason: PlaybackEndReason,
        frames_sent: u64,
    },
}

/// What one call to [`Speaker::advance`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickReport {
    pub released: usize,
    pub frames_sent: usize,
    pub state: PlaybackState,
}

pub struct Speaker<T: Transport> {
    params: EmitterParams,
    config: EngineConfig,
    registry: DecoderRegistry,
    encoder_factory: EncoderFactory,
    transport: T,
    session: Option<PlaybackSession>,
    state: PlaybackState,
    end_reason: Option<PlaybackEndReason>,
    last_stats: SessionStats,
    stop: StopHandle,
    events_tx: Sender<PlaybackEvent>,
    events_rx: Receiver<PlaybackEvent>,
}

impl<T: Transport> Speaker<T> {
    /// Speaker with default engine config, Symphonia decoders and the Opus encoder.
    pub fn new(params: EmitterParams, transport: T) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Self {
            params,
            config: EngineConfig::default(),
            registry: DecoderRegistry::with_defaults(),
            encoder_factory: opus_factory(),
            transport,
            session: None,
            state: PlaybackState::Idle,
            end_reason: None,
            last_stats: SessionStats::default(),
            stop: StopHandle::default(),
            events_tx,
            events_rx,
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: DecoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_encoder_factory(mut self, factory: EncoderFactory) -> Self {
        self.encoder_factory = factory;
        self
    }

    pub fn params(&self) -> &EmitterParams {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut EmitterParams {
        &mut self.params
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// How the most recent session ended.
    pub fn end_reason(&self) -> Option<PlaybackEndReason> {
        self.end_reason
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Lifecycle events for this speaker.
    pub fn events(&self) -> Receiver<PlaybackEvent> {
        self.events_rx.clone()
    }

    /// Play `path` with the current emitter parameters.
    pub fn play(&mut self, path: impl AsRef<Path>) -> bool {
        let params = self.params;
        self.play_with(path, params.volume, params.min_distance, params.max_distance)
    }

    /// Play `path`, applying volume and distance parameters first.
    ///
    /// Any session already playing ends as `Stopped` before the new one starts.
    /// Returns `false` without touching the current state if the file does not
    /// exist. Format and decode problems surface later as `Errored`.
    pub fn play_with(
        &mut self,
        path: impl AsRef<Path>,
        volume: f32,
        min_distance: f32,
        max_distance: f32,
    ) -> bool {
        let path = path.as_ref();
        if self.state == PlaybackState::Playing {
            self.finish(PlaybackEndReason::Stopped);
        }

        if !path.exists() {
            tracing::warn!(path = ?path, "tried playing audio but no file was found");
            return false;
        }

        self.params.volume = volume;
        self.params.min_distance = min_distance;
        self.params.max_distance = max_distance;

        self.stop.clear();
        self.session = Some(PlaybackSession::new(path.to_path_buf()));
        self.state = PlaybackState::Playing;
        self.end_reason = None;
        self.last_stats = SessionStats::default();

        tracing::info!(
            path = ?path,
            controller_id = self.params.controller_id,
            volume,
            min_distance,
            max_distance,
            "playback started"
        );
        let _ = self.events_tx.send(PlaybackEvent::Started {
            path: path.to_path_buf(),
        });
        true
    }

    /// Request a cooperative stop; takes effect on the next [`advance`](Self::advance).
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Run one tick of the active session, if any.
    pub fn advance(&mut self, elapsed: Duration) -> TickReport {
        let Some(session) = self.session.as_mut() else {
            return TickReport {
                released: 0,
                frames_sent: 0,
                state: self.state,
            };
        };

        if self.stop.is_requested() {
            self.finish(PlaybackEndReason::Stopped);
            return TickReport {
                released: 0,
                frames_sent: 0,
                state: self.state,
            };
        }

        let env = SessionEnv {
            config: &self.config,
            registry: &self.registry,
            encoder_factory: &self.encoder_factory,
        };
        let before = (session.stats().samples_released, session.stats().frames_sent);
        match session.tick(elapsed, &env, &mut self.transport, self.params.controller_id) {
            Ok(progress) => {
                if progress.finished {
                    self.finish(PlaybackEndReason::Eof);
                }
                TickReport {
                    released: progress.released,
                    frames_sent: progress.frames_sent,
                    state: self.state,
                }
            }
            Err(e) => {
                tracing::error!(path = ?session.path(), "playback failed: {e}");
                // Work done before the failure still happened.
                let stats = session.stats();
                let released = (stats.samples_released - before.0) as usize;
                let frames_sent = (stats.frames_sent - before.1) as usize;
                self.finish(PlaybackEndReason::Error);
                TickReport {
                    released,
                    frames_sent,
                    state: self.state,
                }
            }
        }
    }

    pub fn status(&self) -> SpeakerStatus {
        let stats = self
            .session
            .as_ref()
            .map(|s| s.stats())
            .unwrap_or(&self.last_stats);
        stats.snapshot(self.state, self.end_reason, self.params)
    }

    /// End the active session with `reason`, releasing all its resources.
    fn finish(&mut self, reason: PlaybackEndReason) {
        let Some(session) = self.session.take() else {
            return;
        };
        let announced = session.announced();
        let path = session.path().to_path_buf();
        let stats = session.close();

        if announced {
            self.transport.end(self.params.controller_id, reason);
        }

        self.state = PlaybackState::from_end_reason(reason);
        self.end_reason = Some(reason);
        tracing::info!(
            path = ?path,
            reason = ?reason,
            frames_sent = stats.frames_sent,
            dropped_samples = stats.dropped_samples,
            "playback ended"
        );
        let _ = self.events_tx.send(PlaybackEvent::Ended {
            path,
            reason,
            frames_sent: stats.frames_sent,
        });
        self.last_stats = stats;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::NullTransport;

    #[test]
    fn stop_handle_is_shared_and_idempotent() {
        let handle = StopHandle::default();
        let other = handle.clone();
        other.stop();
        other.stop();
        assert!(handle.is_requested());
        handle.clear();
        assert!(!other.is_requested());
    }

    #[test]
    fn idle_speaker_ticks_are_no_ops() {
        let mut speaker = Speaker::new(EmitterParams::default(), NullTransport::default());
        speaker.stop();
        let report = speaker.advance(Duration::from_millis(16));
        assert_eq!(report.state, PlaybackState::Idle);
        assert_eq!(report.released, 0);
        assert!(speaker.events().try_recv().is_err());
        assert_eq!(speaker.transport().frames, 0);
    }

    #[test]
    fn status_reports_params_before_any_play() {
        let params = EmitterParams {
            controller_id: 12,
            ..EmitterParams::default()
        };
        let speaker = Speaker::new(params, NullTransport::default());
        let status = speaker.status();
        assert_eq!(status.state, PlaybackState::Idle);
        assert_eq!(status.params.controller_id, 12);
        assert!(status.now_playing.is_none());
        assert!(status.end_reason.is_none());
    }
}
