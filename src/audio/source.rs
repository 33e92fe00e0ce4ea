//! Stream source state machine

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture, FutureExt};

use super::{AudioBackend, AudioHandle};
use crate::error::{AudioLoadError, LoadErrorKind, PlaybackError};

/// A seek counts as confirmed once the backend reports a position this close
/// to the target; until then reads return the target.
const SEEK_CONFIRM_TOLERANCE: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Errored,
}

impl SourceState {
    /// True once a resource is loaded and seekable
    pub fn is_loaded(self) -> bool {
        matches!(self, Self::Ready | Self::Playing | Self::Paused | Self::Ended)
    }
}

/// Result of a load started with [`StreamSource::begin_load`]
pub struct LoadOutcome {
    ticket: u64,
    result: Result<Box<dyn AudioHandle>, AudioLoadError>,
}

/// Uniform handle over a single decodable resource.
///
/// `Idle → Loading → Ready → Playing ⇄ Paused → Ended`, any state may move to
/// `Errored`. Each load gets a ticket; outcomes of superseded loads are
/// discarded so a slow response can never overwrite a newer resource.
pub struct StreamSource {
    backend: Arc<dyn AudioBackend>,
    handle: Option<Box<dyn AudioHandle>>,
    state: SourceState,
    ticket: u64,
    advisory_duration: f64,
    duration: Option<f64>,
    position: f64,
    seek_target: Option<f64>,
    volume: f32,
    muted: bool,
    last_error: Option<AudioLoadError>,
    load_timeout: Duration,
    disposed: bool,
}

impl StreamSource {
    pub fn new(backend: Arc<dyn AudioBackend>) -> Self {
        Self {
            backend,
            handle: None,
            state: SourceState::Idle,
            ticket: 0,
            advisory_duration: 0.0,
            duration: None,
            position: 0.0,
            seek_target: None,
            volume: 1.0,
            muted: false,
            last_error: None,
            load_timeout: Duration::from_secs(30),
            disposed: false,
        }
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    #[cfg(test)]
    pub fn last_error(&self) -> Option<&AudioLoadError> {
        self.last_error.as_ref()
    }

    /// Authoritative once Ready, the track's advisory value before that
    pub fn duration(&self) -> f64 {
        self.duration.unwrap_or(self.advisory_duration).max(0.0)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Move to `Loading` and return the fetch/decode work.
    ///
    /// The returned future owns everything it needs, so the caller can spawn
    /// it and hand the outcome back to [`StreamSource::finish_load`]. Any
    /// previously loaded resource is released immediately.
    pub fn begin_load(&mut self, uri: String, advisory_duration: f64) -> BoxFuture<'static, LoadOutcome> {
        if self.disposed {
            let outcome = LoadOutcome {
                ticket: self.ticket,
                result: Err(AudioLoadError::new(LoadErrorKind::Network, "source disposed")),
            };
            return future::ready(outcome).boxed();
        }

        self.release();
        self.ticket += 1;
        self.state = SourceState::Loading;
        self.advisory_duration = advisory_duration;
        self.duration = None;
        self.position = 0.0;
        self.seek_target = None;
        self.last_error = None;

        let backend = Arc::clone(&self.backend);
        let ticket = self.ticket;
        let timeout = self.load_timeout;
        tracing::debug!(ticket, uri = %redact(&uri), "Stream load started");

        async move {
            let result = match tokio::time::timeout(timeout, backend.open(&uri)).await {
                Ok(result) => result,
                Err(_) => Err(AudioLoadError::new(
                    LoadErrorKind::Network,
                    format!("load timed out after {}s", timeout.as_secs()),
                )),
            };
            LoadOutcome { ticket, result }
        }
        .boxed()
    }

    /// Apply a finished load; stale outcomes are dropped and report `Ok`
    pub fn finish_load(&mut self, outcome: LoadOutcome) -> Result<(), AudioLoadError> {
        if self.disposed || outcome.ticket != self.ticket || self.state != SourceState::Loading {
            tracing::trace!(ticket = outcome.ticket, current = self.ticket, "Discarding stale load outcome");
            return Ok(());
        }

        match outcome.result {
            Ok(mut handle) => {
                handle.set_volume(self.effective_volume());
                self.duration = Some(handle.duration().unwrap_or(self.advisory_duration));
                self.handle = Some(handle);
                self.state = SourceState::Ready;
                tracing::debug!(ticket = self.ticket, duration = self.duration(), "Stream ready");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(ticket = self.ticket, error = %e, retryable = e.is_retryable(), "Stream load failed");
                self.state = SourceState::Errored;
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// `begin_load` and `finish_load` in one step
    #[cfg(test)]
    pub async fn load(&mut self, uri: String, advisory_duration: f64) -> Result<(), AudioLoadError> {
        let outcome = self.begin_load(uri, advisory_duration).await;
        self.finish_load(outcome)
    }

    /// Ready/Paused → Playing. Returns whether the source is now playing.
    ///
    /// A backend refusal leaves the state untouched and surfaces as
    /// `PlaybackRejected`.
    pub fn play(&mut self) -> Result<bool, PlaybackError> {
        if self.disposed {
            return Ok(false);
        }
        match self.state {
            SourceState::Playing => Ok(true),
            SourceState::Ready | SourceState::Paused => {
                let Some(handle) = self.handle.as_mut() else {
                    return Ok(false);
                };
                handle.play().map_err(PlaybackError::PlaybackRejected)?;
                self.state = SourceState::Playing;
                Ok(true)
            }
            SourceState::Errored => {
                tracing::debug!(error = ?self.last_error, "Play ignored after a failed load");
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Playing → Paused
    pub fn pause(&mut self) -> bool {
        if self.disposed || self.state != SourceState::Playing {
            return false;
        }
        self.position = self.position();
        if let Some(handle) = self.handle.as_mut() {
            handle.pause();
        }
        self.state = SourceState::Paused;
        true
    }

    /// Seek to `seconds`, clamped to `[0, duration]`.
    ///
    /// Returns the applied target, or `None` before the resource is Ready or
    /// when the backend refuses. Seeking an ended source leaves it Paused.
    pub fn seek(&mut self, seconds: f64) -> Option<f64> {
        if self.disposed || !self.state.is_loaded() {
            return None;
        }
        let target = if seconds.is_finite() {
            seconds.clamp(0.0, self.duration())
        } else {
            0.0
        };
        let handle = self.handle.as_mut()?;
        if let Err(reason) = handle.seek(target) {
            tracing::warn!(target, %reason, "Backend refused seek");
            return None;
        }
        self.seek_target = Some(target);
        self.position = target;
        if self.state == SourceState::Ended {
            self.state = SourceState::Paused;
        }
        Some(target)
    }

    /// Current position; a pending seek target wins until the backend confirms it
    pub fn position(&mut self) -> f64 {
        if self.state == SourceState::Ended {
            return self.duration();
        }
        if let Some(handle) = &self.handle {
            let reported = handle.position();
            if let Some(target) = self.seek_target {
                if (reported - target).abs() > SEEK_CONFIRM_TOLERANCE {
                    return target;
                }
                self.seek_target = None;
            }
            self.position = reported.clamp(0.0, self.duration());
        }
        self.position
    }

    /// Detect the end of a playing resource; true exactly once per end
    pub fn poll_ended(&mut self) -> bool {
        if self.state != SourceState::Playing {
            return false;
        }
        let finished = self.handle.as_ref().is_some_and(|h| h.is_finished());
        if finished {
            self.state = SourceState::Ended;
            self.seek_target = None;
            self.position = self.duration();
        }
        finished
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        if !volume.is_nan() {
            self.volume = volume.clamp(0.0, 1.0);
        }
        let effective = self.effective_volume();
        if let Some(handle) = self.handle.as_mut() {
            handle.set_volume(effective);
        }
        self.volume
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        let effective = self.effective_volume();
        if let Some(handle) = self.handle.as_mut() {
            handle.set_volume(effective);
        }
    }

    /// Drop the current resource and return to Idle; in-flight loads go stale
    pub fn unload(&mut self) {
        if self.disposed {
            return;
        }
        self.release();
        self.ticket += 1;
        self.state = SourceState::Idle;
        self.duration = None;
        self.position = 0.0;
        self.seek_target = None;
    }

    /// Release everything; later calls on this source are no-ops
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.unload();
        self.disposed = true;
        tracing::debug!("Stream source disposed");
    }

    fn effective_volume(&self) -> f32 {
        if self.muted { 0.0 } else { self.volume }
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.pause();
        }
    }
}

/// Strip the query string so tokens never reach the logs
fn redact(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        playing: bool,
        position: f64,
        finished: bool,
        volume: f32,
        reject_play: bool,
    }

    struct MockHandle(Arc<Mutex<MockState>>, Option<f64>);

    impl AudioHandle for MockHandle {
        fn play(&mut self) -> Result<(), String> {
            let mut state = self.0.lock().unwrap();
            if state.reject_play {
                return Err("autoplay blocked".to_string());
            }
            state.playing = true;
            Ok(())
        }
        fn pause(&mut self) {
            self.0.lock().unwrap().playing = false;
        }
        fn seek(&mut self, position: f64) -> Result<(), String> {
            self.0.lock().unwrap().position = position;
            Ok(())
        }
        fn position(&self) -> f64 {
            self.0.lock().unwrap().position
        }
        fn duration(&self) -> Option<f64> {
            self.1
        }
        fn is_finished(&self) -> bool {
            self.0.lock().unwrap().finished
        }
        fn set_volume(&mut self, volume: f32) {
            self.0.lock().unwrap().volume = volume;
        }
    }

    struct MockBackend {
        shared: Arc<Mutex<MockState>>,
        fail: Option<AudioLoadError>,
        duration: Option<f64>,
    }

    #[async_trait]
    impl AudioBackend for MockBackend {
        async fn open(&self, _uri: &str) -> Result<Box<dyn AudioHandle>, AudioLoadError> {
            match &self.fail {
                Some(e) => Err(e.clone()),
                None => Ok(Box::new(MockHandle(Arc::clone(&self.shared), self.duration))),
            }
        }
    }

    fn source(fail: Option<AudioLoadError>) -> (StreamSource, Arc<Mutex<MockState>>) {
        let shared = Arc::new(Mutex::new(MockState::default()));
        let backend = MockBackend {
            shared: Arc::clone(&shared),
            fail,
            duration: Some(200.0),
        };
        (StreamSource::new(Arc::new(backend)), shared)
    }

    #[tokio::test]
    async fn load_makes_duration_authoritative() {
        let (mut source, _) = source(None);
        let pending = source.begin_load("https://s/a/?token=x".to_string(), 180.0);
        assert_eq!(source.state(), SourceState::Loading);
        assert_eq!(source.duration(), 180.0);

        source.finish_load(pending.await).unwrap();
        assert_eq!(source.state(), SourceState::Ready);
        assert_eq!(source.duration(), 200.0);
    }

    #[tokio::test]
    async fn failed_load_carries_classification() {
        let error = AudioLoadError::new(LoadErrorKind::UnsupportedFormat, "not audio");
        let (mut source, _) = source(Some(error.clone()));
        let err = source.load("u".to_string(), 10.0).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(source.state(), SourceState::Errored);
        assert_eq!(source.last_error(), Some(&error));
    }

    #[tokio::test]
    async fn stale_outcome_is_discarded() {
        let (mut source, _) = source(None);
        let first = source.begin_load("first".to_string(), 10.0);
        let second = source.begin_load("second".to_string(), 20.0);

        source.finish_load(first.await).unwrap();
        assert_eq!(source.state(), SourceState::Loading);
        source.finish_load(second.await).unwrap();
        assert_eq!(source.state(), SourceState::Ready);
    }

    #[tokio::test]
    async fn play_pause_and_rejection() {
        let (mut source, shared) = source(None);
        assert!(!source.play().unwrap());
        source.load("u".to_string(), 0.0).await.unwrap();

        shared.lock().unwrap().reject_play = true;
        let err = source.play().unwrap_err();
        assert!(matches!(err, PlaybackError::PlaybackRejected(_)));
        assert_eq!(source.state(), SourceState::Ready);

        shared.lock().unwrap().reject_play = false;
        assert!(source.play().unwrap());
        assert_eq!(source.state(), SourceState::Playing);
        assert!(source.pause());
        assert_eq!(source.state(), SourceState::Paused);
        assert!(!source.pause());
    }

    #[tokio::test]
    async fn seek_is_clamped_and_optimistic() {
        let (mut source, _) = source(None);
        assert_eq!(source.seek(5.0), None);
        source.load("u".to_string(), 0.0).await.unwrap();

        assert_eq!(source.seek(500.0), Some(200.0));
        assert_eq!(source.seek(-3.0), Some(0.0));
        assert_eq!(source.seek(42.0), Some(42.0));
        assert_eq!(source.position(), 42.0);
    }

    #[tokio::test]
    async fn ended_source_seeks_back_to_paused() {
        let (mut source, shared) = source(None);
        source.load("u".to_string(), 0.0).await.unwrap();
        source.play().unwrap();
        assert!(!source.poll_ended());

        shared.lock().unwrap().finished = true;
        assert!(source.poll_ended());
        assert!(!source.poll_ended());
        assert_eq!(source.state(), SourceState::Ended);
        assert_eq!(source.position(), 200.0);

        source.seek(0.0);
        assert_eq!(source.state(), SourceState::Paused);
    }

    #[tokio::test]
    async fn volume_and_mute_reach_the_handle() {
        let (mut source, shared) = source(None);
        assert_eq!(source.set_volume(1.7), 1.0);
        source.load("u".to_string(), 0.0).await.unwrap();
        source.set_volume(0.4);
        assert_eq!(shared.lock().unwrap().volume, 0.4);
        source.set_muted(true);
        assert_eq!(shared.lock().unwrap().volume, 0.0);
        source.set_muted(false);
        assert_eq!(shared.lock().unwrap().volume, 0.4);
    }

    #[tokio::test]
    async fn dispose_is_idempotent() {
        let (mut source, _) = source(None);
        source.load("u".to_string(), 0.0).await.unwrap();
        source.dispose();
        source.dispose();
        assert_eq!(source.state(), SourceState::Idle);
        assert!(!source.play().unwrap());
        assert_eq!(source.seek(1.0), None);

        source.load("u".to_string(), 0.0).await.unwrap();
        assert_eq!(source.state(), SourceState::Idle);
    }
}
