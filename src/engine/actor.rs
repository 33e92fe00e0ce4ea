//! Engine task: owned state, the event loop and play-span bookkeeping

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;

use super::media::{MediaCommand, MediaControlBridge, MediaPlayback, PositionState};
use super::position::{PositionSampler, PositionTracker};
use super::retry::RetryPolicy;
use super::{EngineBuilder, EngineEvent, Op, Request};
use crate::api::CompletionReporter;
use crate::audio::{LoadOutcome, StreamSource};
use crate::auth::TokenGateway;
use crate::config::EngineConfig;
use crate::error::{PlaybackError, Result};
use crate::model::{PlaySpan, PlaybackSession, PlaybackState, Queue, TrackId};

/// Continuations of work spawned by the engine
pub(super) enum Internal {
    SessionReady {
        generation: u64,
        track_id: TrackId,
        result: Result<PlaybackSession>,
    },
    Loaded {
        generation: u64,
        track_id: TrackId,
        outcome: LoadOutcome,
    },
    RetryDue {
        generation: u64,
        track_id: TrackId,
    },
    Tick,
    MediaFlush,
}

pub(super) struct EngineCore {
    pub(super) config: EngineConfig,
    pub(super) queue: Queue,
    pub(super) source: StreamSource,
    pub(super) gateway: TokenGateway,
    pub(super) reporter: Arc<dyn CompletionReporter>,
    pub(super) retry: RetryPolicy,
    pub(super) tracker: PositionTracker,
    pub(super) sampler: PositionSampler,
    pub(super) media: MediaControlBridge,
    /// Working copy of the observable state, published after every message
    pub(super) state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
    events: broadcast::Sender<EngineEvent>,
    pub(super) internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    pub(super) session: Option<PlaybackSession>,
    span: Option<PlaySpan>,
    /// Completion reports still in flight, drained on shutdown
    reports: JoinSet<()>,
    /// Token fetch or stream load for the current generation
    pub(super) pending: Option<JoinHandle<()>>,
    /// Bumped on every track (re)load; continuations from older generations are dropped
    pub(super) generation: u64,
    /// Position to seek to once the current load is Ready
    pub(super) resume_at: Option<f64>,
    /// Play once loaded (play) vs. just load (cue)
    pub(super) playing_intent: bool,
    /// Automatic play requires at least one explicit user command
    pub(super) user_has_interacted: bool,
    /// A next/previous load is still running
    pub(super) transition_in_flight: bool,
}

impl EngineCore {
    pub(super) fn new(
        builder: EngineBuilder,
        state_tx: watch::Sender<PlaybackState>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        let EngineBuilder {
            fetcher,
            backend,
            reporter,
            config,
            retry,
            media_session,
            rng,
        } = builder;

        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let tick_tx = internal_tx.clone();
        let tracker = PositionTracker::spawn(config.ui_sample_interval(), move || {
            tick_tx.send(Internal::Tick).is_ok()
        });

        let queue = Queue::with_rng(rng.unwrap_or_else(StdRng::from_os_rng));

        let mut source = StreamSource::new(backend).with_load_timeout(config.load_timeout());
        let state = state_tx.borrow().clone();
        source.set_volume(state.volume);

        Self {
            gateway: TokenGateway::new(
                fetcher,
                config.token_refresh_margin(),
                config.default_token_lifetime(),
            ),
            sampler: PositionSampler::new(config.position_epsilon, config.os_publish_interval()),
            media: MediaControlBridge::new(media_session, config.media_debounce()),
            retry: RetryPolicy::new(retry),
            config,
            queue,
            source,
            reporter,
            tracker,
            state,
            state_tx,
            events,
            internal_tx,
            internal_rx: Some(internal_rx),
            session: None,
            span: None,
            reports: JoinSet::new(),
            pending: None,
            generation: 0,
            resume_at: None,
            playing_intent: false,
            user_has_interacted: false,
            transition_in_flight: false,
        }
    }

    pub(super) async fn run(
        mut self,
        mut requests: mpsc::Receiver<Request>,
        mut media: mpsc::UnboundedReceiver<MediaCommand>,
    ) {
        let Some(mut internal) = self.internal_rx.take() else {
            return;
        };
        let mut media_open = true;
        tracing::info!("Playback engine started");

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request { op: Op::Shutdown, reply }) => {
                        self.shutdown().await;
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    Some(Request { op, reply }) => {
                        let result = self.apply(op).await;
                        self.publish();
                        let _ = reply.send(result);
                    }
                    None => {
                        tracing::debug!("All engine handles dropped");
                        self.shutdown().await;
                        break;
                    }
                },
                Some(event) = internal.recv() => {
                    self.handle_internal(event).await;
                    self.publish();
                }
                command = media.recv(), if media_open => match command {
                    Some(command) => {
                        self.handle_media_command(command).await;
                        self.publish();
                    }
                    None => media_open = false,
                },
            }
        }

        tracing::info!("Playback engine stopped");
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::SessionReady {
                generation,
                track_id,
                result,
            } => self.on_session_ready(generation, track_id, result),
            Internal::Loaded {
                generation,
                track_id,
                outcome,
            } => self.on_loaded(generation, track_id, outcome),
            Internal::RetryDue { generation, track_id } => self.on_retry_due(generation, track_id).await,
            Internal::Tick => self.on_tick().await,
            Internal::MediaFlush => {
                if let Some(delay) = self.media.flush(Instant::now()) {
                    self.schedule_media_flush(delay);
                }
            }
        }
    }

    /// Push the working state to subscribers if anything changed
    pub(super) fn publish(&mut self) {
        let state = &self.state;
        self.state_tx.send_if_modified(|current| {
            if *current == *state {
                return false;
            }
            *current = state.clone();
            true
        });
    }

    /// Mirror the queue's order and cursor into the state
    pub(super) fn sync_queue(&mut self) {
        self.state.queue = self.queue.tracks().cloned().collect();
        self.state.queue_index = self.queue.index();
        self.state.queue_length = self.queue.len();
    }

    pub(super) fn emit(&self, event: EngineEvent) {
        tracing::trace!(?event, "Engine event");
        let _ = self.events.send(event);
    }

    /// True if a continuation still belongs to the current load
    pub(super) fn is_current(&self, generation: u64, track_id: &TrackId) -> bool {
        generation == self.generation && self.queue.current().is_some_and(|t| &t.id == track_id)
    }

    pub(super) fn cancel_pending(&mut self) {
        if let Some(task) = self.pending.take() {
            task.abort();
        }
    }

    /// Open a span on a transition to playing
    pub(super) fn open_span(&mut self) {
        if self.span.is_some() {
            return;
        }
        let Some(session) = &self.session else {
            tracing::warn!("Playing without a session, play span not recorded");
            return;
        };
        self.span = Some(PlaySpan::begin(
            session.track_id.clone(),
            session.play_id.clone(),
            self.source.duration(),
            Instant::now(),
        ));
    }

    /// Close the open span, if any, and report it in the background
    pub(super) fn close_span(&mut self) {
        let Some(span) = self.span.take() else {
            return;
        };
        let report = span.close(Instant::now());
        tracing::debug!(
            track_id = %report.track_id,
            played = report.played_duration_seconds,
            "Play span closed"
        );

        while self.reports.try_join_next().is_some() {}

        let reporter = Arc::clone(&self.reporter);
        let events = self.events.clone();
        self.reports.spawn(async move {
            let ack = match reporter.report(report.clone()).await {
                Ok(ack) => Some(ack),
                Err(e) => {
                    tracing::warn!(track_id = %report.track_id, error = %e, "Completion report failed");
                    None
                }
            };
            let _ = events.send(EngineEvent::CompletionReported { report, ack });
        });
    }

    /// Sample the source and republish its position
    pub(super) fn sample_position(&mut self, force: bool) {
        let position = if self.source.state().is_loaded() {
            self.source.position()
        } else {
            self.state.position_seconds
        };
        self.publish_position(position, force);
    }

    pub(super) fn publish_position(&mut self, position: f64, force: bool) {
        let now = Instant::now();
        let sample = if force {
            self.sampler.force(position, now)
        } else {
            self.sampler.sample(position, now)
        };

        if let Some(ui) = sample.ui {
            self.state.position_seconds = ui;
        }
        if let Some(os) = sample.os {
            let position = PositionState {
                position_seconds: os,
                duration_seconds: self.state.duration_seconds,
                playback_rate: if self.state.is_playing { 1.0 } else { 0.0 },
            };
            if let Some(delay) = self.media.publish_position(position, now) {
                self.schedule_media_flush(delay);
            }
        }
    }

    fn schedule_media_flush(&self, delay: Duration) {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::MediaFlush);
        });
    }

    /// Terminal failure: surface the error and stop
    pub(super) fn fail(&mut self, error: PlaybackError) {
        tracing::error!(error = %error, "Playback failed");
        self.close_span();
        self.tracker.stop();
        self.transition_in_flight = false;
        self.state.last_error = Some(error);
        self.state.is_loading = false;
        self.state.is_playing = false;
        self.media.publish_playback(MediaPlayback::Paused);
    }

    /// Flush the open span and any in-flight reports, then release everything
    async fn shutdown(&mut self) {
        tracing::info!("Shutting down playback engine");
        self.cancel_pending();
        self.retry.clear();
        self.tracker.dispose();
        self.source.pause();

        self.close_span();
        let timeout = self.config.shutdown_flush_timeout();
        let drain = async {
            while let Some(joined) = self.reports.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!(error = %e, "Completion report task failed");
                }
            }
        };
        if tokio::time::timeout(timeout, drain).await.is_err() {
            tracing::warn!(
                ?timeout,
                pending = self.reports.len(),
                "Completion reports still in flight at shutdown, dropping"
            );
            self.reports.abort_all();
        }

        if let Some(session) = self.session.take() {
            self.gateway.invalidate(&session.track_id).await;
        }
        self.source.dispose();
        self.media.clear();

        self.state.is_playing = false;
        self.state.is_loading = false;
        self.publish();
    }
}
