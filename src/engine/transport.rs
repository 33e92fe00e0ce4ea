//! Transport commands from the UI and the media surface

use crate::audio::SourceState;
use crate::error::{PlaybackError, Result};
use crate::model::{RepeatMode, Step, Track};

use super::actor::EngineCore;
use super::media::{MediaCommand, MediaPlayback};
use super::Op;

impl EngineCore {
    pub(super) async fn apply(&mut self, op: Op) -> Result<()> {
        match op {
            Op::PlayQueue {
                tracks,
                start,
                autoplay,
            } => self.play_queue(tracks, start, autoplay).await,
            Op::PlayTrackAt(index) => self.play_track_at(index).await,
            Op::TogglePlayPause => self.toggle_play_pause().await,
            Op::Play => self.play().await,
            Op::Pause => {
                self.pause();
                Ok(())
            }
            Op::Stop => {
                self.stop();
                Ok(())
            }
            Op::Next => self.next().await,
            Op::Previous => self.previous().await,
            Op::Seek(seconds) => {
                self.seek(seconds);
                Ok(())
            }
            Op::SeekBy(delta) => {
                self.seek(self.state.position_seconds + delta);
                Ok(())
            }
            Op::SetVolume(volume) => {
                self.set_volume(volume);
                Ok(())
            }
            Op::SetMuted(muted) => {
                self.source.set_muted(muted);
                self.state.muted = muted;
                Ok(())
            }
            Op::SetRepeatMode(mode) => {
                self.set_repeat_mode(mode);
                Ok(())
            }
            Op::CycleRepeatMode => {
                self.set_repeat_mode(self.queue.repeat_mode().cycle());
                Ok(())
            }
            Op::SetShuffle(enabled) => {
                self.queue.set_shuffle(enabled);
                self.state.shuffle = enabled;
                self.sync_queue();
                tracing::info!(enabled, "Shuffle changed");
                Ok(())
            }
            Op::RefreshSession => self.refresh_session().await,
            // Handled by the run loop before dispatch
            Op::Shutdown => Ok(()),
        }
    }

    async fn play_queue(&mut self, tracks: Vec<Track>, start: usize, autoplay: bool) -> Result<()> {
        tracing::info!(tracks = tracks.len(), start, autoplay, "Replacing queue");
        self.queue.set_queue(tracks, start)?;
        if autoplay {
            self.user_has_interacted = true;
        }
        self.playing_intent = autoplay;
        self.transition_in_flight = false;
        self.load_current(None).await
    }

    async fn play_track_at(&mut self, index: usize) -> Result<()> {
        self.user_has_interacted = true;
        self.queue.jump_to(index)?;
        self.playing_intent = true;
        self.transition_in_flight = false;
        self.load_current(None).await
    }

    async fn toggle_play_pause(&mut self) -> Result<()> {
        match self.source.state() {
            SourceState::Playing => {
                self.pause();
                Ok(())
            }
            SourceState::Loading if self.playing_intent => {
                self.user_has_interacted = true;
                self.playing_intent = false;
                tracing::debug!("Play intent withdrawn while loading");
                Ok(())
            }
            _ => self.play().await,
        }
    }

    async fn play(&mut self) -> Result<()> {
        self.user_has_interacted = true;
        if self.queue.current().is_none() {
            tracing::debug!("Play requested with an empty queue");
            return Ok(());
        }
        self.playing_intent = true;

        match self.source.state() {
            SourceState::Playing | SourceState::Loading => Ok(()),
            SourceState::Ready | SourceState::Paused | SourceState::Ended => {
                if self.state.exhausted || self.source.state() == SourceState::Ended {
                    self.source.seek(0.0);
                    self.state.exhausted = false;
                }
                self.start_playback()
            }
            SourceState::Idle | SourceState::Errored => {
                // Errored or never loaded: start over with a fresh session
                self.load_current(None).await
            }
        }
    }

    fn pause(&mut self) {
        self.user_has_interacted = true;
        self.playing_intent = false;
        if self.source.state() == SourceState::Playing {
            self.pause_playback();
        }
    }

    fn stop(&mut self) {
        self.pause();
        self.source.seek(0.0);
        self.state.exhausted = false;
        self.publish_position(0.0, true);
        self.media.publish_playback(MediaPlayback::Stopped);
        tracing::info!("Playback stopped");
    }

    async fn next(&mut self) -> Result<()> {
        self.user_has_interacted = true;
        match self.queue.advance() {
            Step::Moved(index) => {
                tracing::info!(index, "Skipping to next track");
                self.transition_in_flight = true;
                self.load_current(None).await
            }
            Step::Repeat => {
                tracing::info!("Repeat one, restarting track");
                self.transition_in_flight = true;
                self.load_current(None).await
            }
            Step::Exhausted => {
                self.hold_at_end();
                Ok(())
            }
            Step::Empty => {
                tracing::debug!("Next with an empty queue");
                Ok(())
            }
        }
    }

    async fn previous(&mut self) -> Result<()> {
        self.user_has_interacted = true;
        if self.queue.current().is_none() {
            tracing::debug!("Previous with an empty queue");
            return Ok(());
        }

        let threshold = self.config.previous_restart_threshold_secs;
        if threshold > 0.0 && self.source.state().is_loaded() && self.source.position() > threshold {
            tracing::debug!("Restarting current track");
            self.seek(0.0);
            return Ok(());
        }

        match self.queue.retreat() {
            Step::Moved(index) => {
                tracing::info!(index, "Skipping to previous track");
                self.transition_in_flight = true;
                self.load_current(None).await
            }
            Step::Repeat => {
                self.transition_in_flight = true;
                self.load_current(None).await
            }
            Step::Exhausted => {
                // Already at the first track
                self.seek(0.0);
                Ok(())
            }
            Step::Empty => Ok(()),
        }
    }

    /// Optimistic seek; before the resource is Ready the target is applied on load
    fn seek(&mut self, seconds: f64) {
        if self.queue.current().is_none() {
            return;
        }
        let target = match self.source.seek(seconds) {
            Some(target) => target,
            None => {
                let target = if seconds.is_finite() {
                    seconds.clamp(0.0, self.state.duration_seconds.max(0.0))
                } else {
                    0.0
                };
                self.resume_at = Some(target);
                target
            }
        };
        tracing::debug!(target, "Seek");
        if target < self.state.duration_seconds {
            self.state.exhausted = false;
        }
        self.state.position_seconds = target;
        self.publish_position(target, true);
    }

    fn set_volume(&mut self, volume: f32) {
        let applied = self.source.set_volume(volume);
        self.state.volume = applied;
        self.media.publish_volume(applied);
    }

    /// Volume changed on the device: adopt it unless it is our own echo
    fn on_device_volume(&mut self, volume: f32) {
        if (volume - self.state.volume).abs() <= self.config.volume_epsilon {
            tracing::trace!(volume, "Ignoring device volume echo");
            return;
        }
        self.state.volume = self.source.set_volume(volume);
        tracing::debug!(volume = self.state.volume, "Device volume adopted");
    }

    fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.queue.set_repeat_mode(mode);
        self.state.repeat_mode = mode;
        tracing::info!(mode = %mode, "Repeat mode changed");
    }

    async fn refresh_session(&mut self) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::QueueEmpty);
        }
        let position = if self.source.state().is_loaded() {
            self.source.position()
        } else {
            self.state.position_seconds
        };
        if self.state.is_playing {
            self.playing_intent = true;
        }
        tracing::info!(position, "Refreshing playback session");
        self.load_current(Some(position)).await
    }

    pub(super) async fn handle_media_command(&mut self, command: MediaCommand) {
        let Some(command) = self.media.admit(command, self.transition_in_flight) else {
            return;
        };
        tracing::debug!(?command, "Media command");

        let result = match command {
            MediaCommand::Play => self.play().await,
            MediaCommand::Pause => {
                self.pause();
                Ok(())
            }
            MediaCommand::Toggle => self.toggle_play_pause().await,
            MediaCommand::Stop => {
                self.stop();
                Ok(())
            }
            MediaCommand::SeekTo(seconds) => {
                self.seek(seconds);
                Ok(())
            }
            MediaCommand::SeekBy(delta) => {
                self.seek(self.state.position_seconds + delta);
                Ok(())
            }
            MediaCommand::Next => self.next().await,
            MediaCommand::Previous => self.previous().await,
            MediaCommand::VolumeChanged(volume) => {
                self.on_device_volume(volume);
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!(?command, error = %e, "Media command failed");
        }
    }
}
