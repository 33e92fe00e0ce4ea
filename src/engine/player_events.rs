//! Load cycle and continuations: session, stream load, retries, track end

use crate::audio::{LoadOutcome, SourceState};
use crate::error::{PlaybackError, Result};
use crate::model::{PlaybackSession, Step, TrackId};

use super::actor::{EngineCore, Internal};
use super::media::MediaPlayback;
use super::retry::RetryDecision;
use super::EngineEvent;

impl EngineCore {
    /// Start a fresh load of the queue's current track.
    ///
    /// Destroys the outgoing session, cancels anything still in flight for
    /// the previous load and bumps the generation so late results are
    /// ignored. `resume_at` seeks once the new resource is Ready.
    pub(super) async fn load_current(&mut self, resume_at: Option<f64>) -> Result<()> {
        let Some(track) = self.queue.current().cloned() else {
            return Err(PlaybackError::QueueEmpty);
        };

        self.close_span();
        self.tracker.stop();
        self.cancel_pending();
        self.retry.clear();
        if let Some(session) = self.session.take() {
            self.gateway.invalidate(&session.track_id).await;
        }

        self.generation += 1;
        self.source.unload();
        self.sampler.reset();
        self.resume_at = resume_at;

        let index = self.queue.index();
        self.state.track = Some(track.clone());
        self.sync_queue();
        self.state.is_loading = true;
        self.state.is_playing = false;
        self.state.position_seconds = resume_at.unwrap_or(0.0);
        self.state.duration_seconds = track.duration_seconds;
        self.state.last_error = None;
        self.state.exhausted = false;

        tracing::info!(
            track_id = %track.id,
            title = %track.title,
            index = ?index,
            generation = self.generation,
            "Loading track"
        );
        self.media.publish_metadata(&track, track.duration_seconds);
        self.media.publish_playback(MediaPlayback::Paused);
        if let Some(index) = index {
            self.emit(EngineEvent::TrackChanged {
                index,
                track_id: track.id.clone(),
            });
        }

        self.acquire_session(track.id);
        Ok(())
    }

    fn acquire_session(&mut self, track_id: TrackId) {
        let gateway = self.gateway.clone();
        let tx = self.internal_tx.clone();
        let generation = self.generation;
        self.state.is_loading = true;

        self.pending = Some(tokio::spawn(async move {
            let result = gateway.acquire(&track_id).await;
            let _ = tx.send(Internal::SessionReady {
                generation,
                track_id,
                result,
            });
        }));
    }

    pub(super) fn on_session_ready(
        &mut self,
        generation: u64,
        track_id: TrackId,
        result: Result<PlaybackSession>,
    ) {
        if !self.is_current(generation, &track_id) {
            tracing::debug!(track_id = %track_id, generation, "Ignoring stale session");
            return;
        }

        let session = match result {
            Ok(session) => session,
            Err(e) => {
                self.pending = None;
                self.on_load_error(track_id, e);
                return;
            }
        };
        let Some(track) = self.queue.current() else {
            return;
        };

        let uri = session.stream_uri(&self.config.stream_base_url, track);
        let load = self.source.begin_load(uri, track.duration_seconds);
        self.session = Some(session);

        let tx = self.internal_tx.clone();
        self.pending = Some(tokio::spawn(async move {
            let outcome = load.await;
            let _ = tx.send(Internal::Loaded {
                generation,
                track_id,
                outcome,
            });
        }));
    }

    pub(super) fn on_loaded(&mut self, generation: u64, track_id: TrackId, outcome: LoadOutcome) {
        if !self.is_current(generation, &track_id) {
            tracing::debug!(track_id = %track_id, generation, "Ignoring stale load");
            return;
        }
        self.pending = None;

        if let Err(e) = self.source.finish_load(outcome) {
            self.on_load_error(track_id, PlaybackError::AudioLoad(e));
            return;
        }
        if self.source.state() != SourceState::Ready {
            return;
        }

        self.retry.clear();
        self.transition_in_flight = false;
        self.state.is_loading = false;
        self.state.duration_seconds = self.source.duration();
        if let Some(track) = self.queue.current() {
            self.media.publish_metadata(track, self.state.duration_seconds);
        }

        // An exhausted queue keeps holding at the end of the freshly loaded track
        let resume_at = self.resume_at.take();
        let target = if self.state.exhausted {
            Some(self.source.duration())
        } else {
            resume_at
        };
        if let Some(position) = target {
            self.source.seek(position);
        }
        self.sample_position(true);
        tracing::info!(track_id = %track_id, duration = self.state.duration_seconds, "Track ready");

        if self.playing_intent && self.user_has_interacted {
            let _ = self.start_playback();
        }
    }

    /// Route a token or load failure through the retry policy
    pub(super) fn on_load_error(&mut self, track_id: TrackId, error: PlaybackError) {
        match self.retry.on_failure(&track_id, &error) {
            RetryDecision::Retry { attempt, delay } => {
                tracing::warn!(
                    track_id = %track_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Stream load failed, retrying"
                );
                self.state.is_loading = true;
                self.emit(EngineEvent::RetryScheduled {
                    track_id: track_id.clone(),
                    attempt,
                    delay,
                });

                let tx = self.internal_tx.clone();
                let generation = self.generation;
                self.retry.arm(tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(Internal::RetryDue { generation, track_id });
                }));
            }
            RetryDecision::Exhausted { attempts } => {
                self.emit(EngineEvent::StreamUnavailable {
                    track_id: track_id.clone(),
                    attempts,
                });
                self.fail(PlaybackError::StreamUnavailable { track_id, attempts });
            }
            RetryDecision::Fatal => self.fail(error),
        }
    }

    /// The backoff elapsed: drop the old token and try again from scratch
    pub(super) async fn on_retry_due(&mut self, generation: u64, track_id: TrackId) {
        if !self.is_current(generation, &track_id) {
            tracing::debug!(track_id = %track_id, "Ignoring stale retry");
            return;
        }
        self.retry.fired();

        tracing::debug!(
            track_id = %track_id,
            retry = self.retry.retries_for(&track_id),
            waited = ?self.retry.last_delay(),
            "Retrying stream load"
        );
        self.session = None;
        self.gateway.invalidate(&track_id).await;
        self.acquire_session(track_id);
    }

    pub(super) async fn on_tick(&mut self) {
        if self.source.poll_ended() {
            self.on_track_ended().await;
            return;
        }
        if self.source.state() == SourceState::Playing {
            self.sample_position(false);
        }
    }

    /// Natural end of the current track
    pub(super) async fn on_track_ended(&mut self) {
        tracing::info!(track_id = ?self.state.track.as_ref().map(|t| t.id.clone()), "Track ended");
        self.close_span();
        self.tracker.stop();
        self.state.is_playing = false;
        self.state.position_seconds = self.source.duration();

        let result = match self.queue.advance() {
            Step::Moved(_) | Step::Repeat => {
                self.playing_intent = true;
                self.load_current(None).await
            }
            Step::Exhausted => {
                self.hold_at_end();
                self.emit(EngineEvent::QueueCompleted);
                Ok(())
            }
            Step::Empty => Ok(()),
        };
        if let Err(e) = result {
            tracing::error!(error = %e, "Failed to continue after track end");
        }
    }

    /// Ready/Paused → Playing, opening a play span
    pub(super) fn start_playback(&mut self) -> Result<()> {
        match self.source.play() {
            Ok(true) => {
                tracing::info!("Playback started");
                self.state.is_playing = true;
                self.state.last_error = None;
                self.open_span();
                self.tracker.start();
                self.media.publish_playback(MediaPlayback::Playing);
                self.sample_position(true);
                Ok(())
            }
            Ok(false) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "Playback rejected");
                self.playing_intent = false;
                self.state.is_playing = false;
                self.state.last_error = Some(e.clone());
                if let PlaybackError::PlaybackRejected(reason) = &e {
                    self.emit(EngineEvent::PlaybackRejected(reason.clone()));
                }
                Err(e)
            }
        }
    }

    /// Playing → Paused, closing the play span
    pub(super) fn pause_playback(&mut self) {
        if self.source.pause() {
            tracing::info!("Playback paused");
        }
        self.close_span();
        self.tracker.stop();
        self.state.is_playing = false;
        self.media.publish_playback(MediaPlayback::Paused);
        self.sample_position(true);
    }

    /// Queue ran out: stop and hold the position at the end of the last track
    pub(super) fn hold_at_end(&mut self) {
        tracing::info!("Queue exhausted");
        self.playing_intent = false;
        self.transition_in_flight = false;
        self.pause_playback();

        let end = self.source.duration();
        if self.source.state() != SourceState::Ended {
            self.source.seek(end);
        }
        self.state.exhausted = true;
        self.publish_position(end, true);
        self.emit(EngineEvent::QueueExhausted);
    }
}
