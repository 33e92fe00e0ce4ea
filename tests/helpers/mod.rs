//! In-memory collaborators for driving the engine under a paused clock
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use tunestream::api::CompletionReporter;
use tunestream::audio::{AudioBackend, AudioHandle};
use tunestream::auth::TokenFetcher;
use tunestream::config::EngineConfig;
use tunestream::engine::{
    EngineEvent, MediaMetadata, MediaPlayback, MediaSession, PlaybackEngine, PositionState,
};
use tunestream::model::{CompletionAck, CompletionReport, PlaybackState, TokenGrant, Track, TrackId};
use tunestream::{AudioLoadError, LoadErrorKind, PlaybackError, Result};

const WAIT_LIMIT: Duration = Duration::from_secs(120);

/// A track served by [`FakeBackend`] under `mem://<id>`
pub fn track(id: &str, duration: f64) -> Track {
    let mut track = Track::new(id, format!("Title {id}"), "Artist").with_duration(duration);
    track.source_uri = format!("mem://{id}");
    track
}

pub fn tracks(ids: &[&str], duration: f64) -> Vec<Track> {
    ids.iter().map(|id| track(id, duration)).collect()
}

/// Track id encoded in a `mem://` stream locator
fn id_from_uri(uri: &str) -> &str {
    let rest = uri.trim_start_matches("mem://");
    rest.split('?').next().unwrap_or(rest)
}

#[derive(Default)]
pub struct FakeFetcher {
    calls: Mutex<Vec<TrackId>>,
    delays: Mutex<HashMap<TrackId, Duration>>,
    failures: Mutex<VecDeque<PlaybackError>>,
}

impl FakeFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, id: &str, delay: Duration) {
        self.delays.lock().unwrap().insert(TrackId::from(id), delay);
    }

    pub fn fail_next(&self, error: PlaybackError) {
        self.failures.lock().unwrap().push_back(error);
    }

    pub fn calls_for(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|t| t.as_str() == id).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl TokenFetcher for FakeFetcher {
    async fn fetch(&self, track_id: &TrackId) -> Result<TokenGrant> {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(track_id.clone());
            calls.iter().filter(|t| *t == track_id).count()
        };
        let delay = self.delays.lock().unwrap().get(track_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(TokenGrant {
            token: format!("tok-{track_id}-{n}"),
            play_id: format!("play-{track_id}-{n}"),
            expiry_seconds: Some(300),
        })
    }
}

#[derive(Debug)]
pub struct HandleState {
    pub id: String,
    pub duration: f64,
    base: f64,
    playing_since: Option<Instant>,
    pub volume: f32,
    reject_play: bool,
}

impl HandleState {
    fn position(&self) -> f64 {
        let elapsed = self
            .playing_since
            .map(|since| since.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        (self.base + elapsed).min(self.duration)
    }

    pub fn is_playing(&self) -> bool {
        self.playing_since.is_some()
    }
}

/// Plays silence in virtual time
pub struct FakeHandle(Arc<Mutex<HandleState>>);

impl AudioHandle for FakeHandle {
    fn play(&mut self) -> std::result::Result<(), String> {
        let mut state = self.0.lock().unwrap();
        if state.reject_play {
            return Err("no user gesture".to_string());
        }
        if state.playing_since.is_none() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        let mut state = self.0.lock().unwrap();
        state.base = state.position();
        state.playing_since = None;
    }

    fn seek(&mut self, position: f64) -> std::result::Result<(), String> {
        let mut state = self.0.lock().unwrap();
        state.base = position;
        if state.playing_since.is_some() {
            state.playing_since = Some(Instant::now());
        }
        Ok(())
    }

    fn position(&self) -> f64 {
        self.0.lock().unwrap().position()
    }

    fn duration(&self) -> Option<f64> {
        Some(self.0.lock().unwrap().duration)
    }

    fn is_finished(&self) -> bool {
        let state = self.0.lock().unwrap();
        state.playing_since.is_some() && state.position() >= state.duration
    }

    fn set_volume(&mut self, volume: f32) {
        self.0.lock().unwrap().volume = volume;
    }
}

#[derive(Default)]
pub struct FakeBackend {
    opens: Mutex<Vec<String>>,
    handles: Mutex<Vec<Arc<Mutex<HandleState>>>>,
    durations: Mutex<HashMap<String, f64>>,
    failures: Mutex<VecDeque<LoadErrorKind>>,
    always_fail: Mutex<Option<LoadErrorKind>>,
    reject_play: AtomicBool,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Authoritative duration reported once `id` loads
    pub fn set_duration(&self, id: &str, seconds: f64) {
        self.durations.lock().unwrap().insert(id.to_string(), seconds);
    }

    pub fn fail_next(&self, kind: LoadErrorKind, times: usize) {
        let mut failures = self.failures.lock().unwrap();
        failures.extend(std::iter::repeat_n(kind, times));
    }

    pub fn fail_always(&self, kind: LoadErrorKind) {
        *self.always_fail.lock().unwrap() = Some(kind);
    }

    pub fn reject_play(&self, reject: bool) {
        self.reject_play.store(reject, Ordering::SeqCst);
        for handle in self.handles.lock().unwrap().iter() {
            handle.lock().unwrap().reject_play = reject;
        }
    }

    pub fn opens(&self) -> Vec<String> {
        self.opens.lock().unwrap().clone()
    }

    pub fn opens_for(&self, id: &str) -> usize {
        self.opens.lock().unwrap().iter().filter(|u| id_from_uri(u) == id).count()
    }

    /// Shared state of the most recently opened handle
    pub fn last_handle(&self) -> Option<Arc<Mutex<HandleState>>> {
        self.handles.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn open(&self, uri: &str) -> std::result::Result<Box<dyn AudioHandle>, AudioLoadError> {
        self.opens.lock().unwrap().push(uri.to_string());
        if let Some(kind) = *self.always_fail.lock().unwrap() {
            return Err(AudioLoadError::new(kind, "scripted failure"));
        }
        if let Some(kind) = self.failures.lock().unwrap().pop_front() {
            return Err(AudioLoadError::new(kind, "scripted failure"));
        }

        let id = id_from_uri(uri).to_string();
        let duration = self.durations.lock().unwrap().get(&id).copied().unwrap_or(180.0);
        let state = Arc::new(Mutex::new(HandleState {
            id,
            duration,
            base: 0.0,
            playing_since: None,
            volume: 1.0,
            reject_play: self.reject_play.load(Ordering::SeqCst),
        }));
        self.handles.lock().unwrap().push(Arc::clone(&state));
        Ok(Box::new(FakeHandle(state)))
    }
}

#[derive(Default)]
pub struct FakeReporter {
    reports: Mutex<Vec<CompletionReport>>,
    delay: Mutex<Option<Duration>>,
}

impl FakeReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn reports(&self) -> Vec<CompletionReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionReporter for FakeReporter {
    async fn report(&self, report: CompletionReport) -> Result<CompletionAck> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let counted = report.played_duration_seconds >= 30.0;
        self.reports.lock().unwrap().push(report);
        Ok(CompletionAck {
            counted_as_play: counted,
            accumulated_duration_seconds: None,
        })
    }
}

#[derive(Debug, Default)]
pub struct MediaLog {
    pub metadata: Vec<MediaMetadata>,
    pub playback: Vec<MediaPlayback>,
    pub positions: Vec<PositionState>,
    pub volumes: Vec<f32>,
    pub cleared: usize,
}

/// Records everything the engine mirrors onto the media surface
#[derive(Clone, Default)]
pub struct FakeMediaSession(pub Arc<Mutex<MediaLog>>);

impl FakeMediaSession {
    pub fn log(&self) -> std::sync::MutexGuard<'_, MediaLog> {
        self.0.lock().unwrap()
    }
}

impl MediaSession for FakeMediaSession {
    fn set_metadata(&mut self, metadata: &MediaMetadata) {
        self.log().metadata.push(metadata.clone());
    }

    fn set_playback(&mut self, status: MediaPlayback) {
        self.log().playback.push(status);
    }

    fn set_position(&mut self, position: PositionState) {
        self.log().positions.push(position);
    }

    fn set_volume(&mut self, volume: f32) {
        self.log().volumes.push(volume);
    }

    fn clear(&mut self) {
        self.log().cleared += 1;
    }
}

pub struct Harness {
    pub engine: PlaybackEngine,
    pub fetcher: Arc<FakeFetcher>,
    pub backend: Arc<FakeBackend>,
    pub reporter: Arc<FakeReporter>,
    pub media: FakeMediaSession,
    pub state: watch::Receiver<PlaybackState>,
    pub events: broadcast::Receiver<EngineEvent>,
}

impl Harness {
    pub fn new() -> Self {
        let fetcher = FakeFetcher::new();
        let backend = FakeBackend::new();
        let reporter = FakeReporter::new();
        Self::with(fetcher, backend, reporter)
    }

    pub fn with(fetcher: Arc<FakeFetcher>, backend: Arc<FakeBackend>, reporter: Arc<FakeReporter>) -> Self {
        Self::with_config(fetcher, backend, reporter, EngineConfig::default())
    }

    pub fn with_config(
        fetcher: Arc<FakeFetcher>,
        backend: Arc<FakeBackend>,
        reporter: Arc<FakeReporter>,
        config: EngineConfig,
    ) -> Self {
        let media = FakeMediaSession::default();
        let engine = PlaybackEngine::builder(fetcher.clone(), backend.clone(), reporter.clone())
            .config(config)
            .media_session(Box::new(media.clone()))
            .shuffle_seed(42)
            .spawn();
        let state = engine.subscribe();
        let events = engine.events();
        Self {
            engine,
            fetcher,
            backend,
            reporter,
            media,
            state,
            events,
        }
    }

    pub fn current(&self) -> PlaybackState {
        self.engine.state()
    }

    pub async fn wait_for(&mut self, predicate: impl FnMut(&PlaybackState) -> bool) -> PlaybackState {
        wait_for(&mut self.state, predicate).await
    }

    pub async fn wait_for_event(&mut self, predicate: impl FnMut(&EngineEvent) -> bool) -> EngineEvent {
        wait_for_event(&mut self.events, predicate).await
    }

    /// Wait until `id` is loaded and audibly playing
    pub async fn wait_playing(&mut self, id: &str) -> PlaybackState {
        let id = id.to_string();
        self.wait_for(move |s| {
            s.is_playing && !s.is_loading && s.track.as_ref().is_some_and(|t| t.id.as_str() == id)
        })
        .await
    }
}

impl Harness {
    /// Like [`Harness::wait_playing`], once `id` has been opened `opens` times
    pub async fn wait_playing_after_opens(&mut self, id: &str, opens: usize) -> PlaybackState {
        let id = id.to_string();
        let backend = Arc::clone(&self.backend);
        self.wait_for(move |s| {
            s.is_playing
                && !s.is_loading
                && s.track.as_ref().is_some_and(|t| t.id.as_str() == id)
                && backend.opens_for(&id) == opens
        })
        .await
    }
}

pub async fn wait_for(
    rx: &mut watch::Receiver<PlaybackState>,
    mut predicate: impl FnMut(&PlaybackState) -> bool,
) -> PlaybackState {
    tokio::time::timeout(WAIT_LIMIT, rx.wait_for(|s| predicate(s)))
        .await
        .expect("timed out waiting for playback state")
        .expect("engine stopped")
        .clone()
}

pub async fn wait_for_event(
    rx: &mut broadcast::Receiver<EngineEvent>,
    mut predicate: impl FnMut(&EngineEvent) -> bool,
) -> EngineEvent {
    tokio::time::timeout(WAIT_LIMIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if predicate(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for engine event")
}

pub fn index_of(state: &PlaybackState) -> Option<usize> {
    state.queue_index
}

pub fn track_id(state: &PlaybackState) -> Option<&str> {
    state.track.as_ref().map(|t| t.id.as_str())
}
