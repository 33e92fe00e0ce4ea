//! Playback engine - the orchestrator the UI talks to
//!
//! The engine runs as a single task that owns the queue, the stream source,
//! the current session and all timers. [`PlaybackEngine`] is a cheap handle
//! that sends commands to it. Submodules add `impl EngineCore` blocks by
//! responsibility:
//!
//! - `actor`: the event loop, state publication and play spans
//! - `transport`: user and media-surface commands
//! - `player_events`: token, load, retry and end-of-track continuations
//! - `retry`: failure classification and backoff
//! - `position`: position sampling
//! - `media`: the media-surface mirror

mod actor;
mod media;
mod player_events;
mod position;
mod retry;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::api::CompletionReporter;
use crate::audio::AudioBackend;
use crate::auth::TokenFetcher;
use crate::config::{EngineConfig, RetryConfig};
use crate::error::{PlaybackError, Result};
use crate::model::{CompletionAck, CompletionReport, PlaybackState, RepeatMode, Track, TrackId};

use self::actor::EngineCore;

pub use media::{MediaCommand, MediaControlBridge, MediaMetadata, MediaPlayback, MediaSession, PositionState};
pub use position::{PositionSampler, PositionTracker, Sample};
pub use retry::{Classification, RetryDecision, RetryPolicy, classify};

/// Notifications that are not part of the observable state
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    TrackChanged { index: usize, track_id: TrackId },
    /// `next` ran past the last track with repeat off
    QueueExhausted,
    /// The last track finished on its own with repeat off
    QueueCompleted,
    PlaybackRejected(String),
    RetryScheduled { track_id: TrackId, attempt: u32, delay: Duration },
    StreamUnavailable { track_id: TrackId, attempts: u32 },
    CompletionReported { report: CompletionReport, ack: Option<CompletionAck> },
}

pub(crate) enum Op {
    PlayQueue { tracks: Vec<Track>, start: usize, autoplay: bool },
    PlayTrackAt(usize),
    TogglePlayPause,
    Play,
    Pause,
    Stop,
    Next,
    Previous,
    Seek(f64),
    SeekBy(f64),
    SetVolume(f32),
    SetMuted(bool),
    SetRepeatMode(RepeatMode),
    CycleRepeatMode,
    SetShuffle(bool),
    RefreshSession,
    Shutdown,
}

pub(crate) struct Request {
    op: Op,
    reply: oneshot::Sender<Result<()>>,
}

const REQUEST_BUFFER: usize = 64;
const EVENT_BUFFER: usize = 128;

/// Handle to a running engine.
///
/// Every command resolves once the engine has applied its immediate effect;
/// loads and retries continue in the background and show up in
/// [`PlaybackEngine::subscribe`].
#[derive(Clone)]
pub struct PlaybackEngine {
    requests: mpsc::Sender<Request>,
    media: mpsc::UnboundedSender<MediaCommand>,
    state: watch::Receiver<PlaybackState>,
    events: broadcast::Sender<EngineEvent>,
}

impl PlaybackEngine {
    pub fn builder(
        fetcher: Arc<dyn TokenFetcher>,
        backend: Arc<dyn AudioBackend>,
        reporter: Arc<dyn CompletionReporter>,
    ) -> EngineBuilder {
        EngineBuilder {
            fetcher,
            backend,
            reporter,
            config: EngineConfig::default(),
            retry: RetryConfig::default(),
            media_session: None,
            rng: None,
        }
    }

    async fn send(&self, op: Op) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { op, reply })
            .await
            .map_err(|_| PlaybackError::EngineClosed)?;
        response.await.map_err(|_| PlaybackError::EngineClosed)?
    }

    /// Replace the queue and start playing at `start_index`
    pub async fn play_queue(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.send(Op::PlayQueue {
            tracks,
            start: start_index,
            autoplay: true,
        })
        .await
    }

    /// Replace the queue and load `start_index` without playing it
    pub async fn cue_queue(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.send(Op::PlayQueue {
            tracks,
            start: start_index,
            autoplay: false,
        })
        .await
    }

    pub async fn play_track_at(&self, index: usize) -> Result<()> {
        self.send(Op::PlayTrackAt(index)).await
    }

    pub async fn toggle_play_pause(&self) -> Result<()> {
        self.send(Op::TogglePlayPause).await
    }

    pub async fn play(&self) -> Result<()> {
        self.send(Op::Play).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(Op::Pause).await
    }

    /// Pause and rewind to the start of the current track
    pub async fn stop(&self) -> Result<()> {
        self.send(Op::Stop).await
    }

    pub async fn next(&self) -> Result<()> {
        self.send(Op::Next).await
    }

    pub async fn previous(&self) -> Result<()> {
        self.send(Op::Previous).await
    }

    pub async fn seek(&self, seconds: f64) -> Result<()> {
        self.send(Op::Seek(seconds)).await
    }

    pub async fn seek_by(&self, delta_seconds: f64) -> Result<()> {
        self.send(Op::SeekBy(delta_seconds)).await
    }

    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Op::SetVolume(volume)).await
    }

    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        self.send(Op::SetMuted(muted)).await
    }

    pub async fn set_repeat_mode(&self, mode: RepeatMode) -> Result<()> {
        self.send(Op::SetRepeatMode(mode)).await
    }

    /// `off → all → one → off`
    pub async fn cycle_repeat_mode(&self) -> Result<()> {
        self.send(Op::CycleRepeatMode).await
    }

    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        self.send(Op::SetShuffle(enabled)).await
    }

    /// Fetch a new token and reload the current track where it left off
    pub async fn refresh_session(&self) -> Result<()> {
        self.send(Op::RefreshSession).await
    }

    /// Flush the open play span and stop the engine. Safe to call twice.
    pub async fn shutdown(&self) -> Result<()> {
        match self.send(Op::Shutdown).await {
            Err(PlaybackError::EngineClosed) => Ok(()),
            other => other,
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Inbound side of the media surface
    pub fn media_commands(&self) -> mpsc::UnboundedSender<MediaCommand> {
        self.media.clone()
    }
}

pub struct EngineBuilder {
    fetcher: Arc<dyn TokenFetcher>,
    backend: Arc<dyn AudioBackend>,
    reporter: Arc<dyn CompletionReporter>,
    config: EngineConfig,
    retry: RetryConfig,
    media_session: Option<Box<dyn MediaSession>>,
    rng: Option<StdRng>,
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn media_session(mut self, session: Box<dyn MediaSession>) -> Self {
        self.media_session = Some(session);
        self
    }

    /// Seed the shuffle order, for reproducible runs
    pub fn shuffle_seed(mut self, seed: u64) -> Self {
        self.rng = Some(StdRng::seed_from_u64(seed));
        self
    }

    /// Start the engine task. Must be called inside a tokio runtime.
    pub fn spawn(self) -> PlaybackEngine {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_BUFFER);
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);

        let initial = PlaybackState {
            volume: self.config.initial_volume.clamp(0.0, 1.0),
            ..PlaybackState::default()
        };
        let (state_tx, state_rx) = watch::channel(initial);

        let core = EngineCore::new(self, state_tx, events_tx.clone());
        tokio::spawn(core.run(request_rx, media_rx));

        PlaybackEngine {
            requests: request_tx,
            media: media_tx,
            state: state_rx,
            events: events_tx,
        }
    }
}
