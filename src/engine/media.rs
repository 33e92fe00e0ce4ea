//! Mirror of engine state onto an OS-style media control surface

use std::time::Duration;

use tokio::time::Instant;

use crate::model::Track;

/// Metadata shown on the media surface
#[derive(Clone, Debug, PartialEq)]
pub struct MediaMetadata {
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub artwork_uri: Option<String>,
    pub duration_seconds: f64,
}

impl From<&Track> for MediaMetadata {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            artist: track.artist.clone(),
            album: track.album.clone(),
            artwork_uri: track.artwork_uri.clone(),
            duration_seconds: track.duration_seconds,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaPlayback {
    Playing,
    Paused,
    Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionState {
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub playback_rate: f64,
}

/// Transport commands relayed from the surface into the engine
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MediaCommand {
    Play,
    Pause,
    Toggle,
    Stop,
    SeekTo(f64),
    SeekBy(f64),
    Next,
    Previous,
    /// The device volume changed outside the engine
    VolumeChanged(f32),
}

/// Platform media session (lock screen, media keys, notification controls)
pub trait MediaSession: Send {
    fn set_metadata(&mut self, metadata: &MediaMetadata);
    fn set_playback(&mut self, status: MediaPlayback);
    fn set_position(&mut self, position: PositionState);
    fn set_volume(&mut self, volume: f32);
    fn clear(&mut self);
}

/// Engine-side half of the media surface.
///
/// Without a session every call is a no-op. Position updates closer together
/// than the debounce window are coalesced into one trailing publication; the
/// caller owns the timer and calls [`MediaControlBridge::flush`] when the
/// returned delay elapses.
pub struct MediaControlBridge {
    session: Option<Box<dyn MediaSession>>,
    debounce: Duration,
    last_position_at: Option<Instant>,
    pending_position: Option<PositionState>,
    flush_scheduled: bool,
}

impl MediaControlBridge {
    pub fn new(session: Option<Box<dyn MediaSession>>, debounce: Duration) -> Self {
        if session.is_none() {
            tracing::info!("No media session available, media controls disabled");
        }
        Self {
            session,
            debounce,
            last_position_at: None,
            pending_position: None,
            flush_scheduled: false,
        }
    }

    #[cfg(test)]
    pub fn is_available(&self) -> bool {
        self.session.is_some()
    }

    pub fn publish_metadata(&mut self, track: &Track, duration_seconds: f64) {
        if let Some(session) = self.session.as_mut() {
            let metadata = MediaMetadata {
                duration_seconds,
                ..MediaMetadata::from(track)
            };
            session.set_metadata(&metadata);
        }
    }

    pub fn publish_playback(&mut self, status: MediaPlayback) {
        if let Some(session) = self.session.as_mut() {
            session.set_playback(status);
        }
    }

    pub fn publish_volume(&mut self, volume: f32) {
        if let Some(session) = self.session.as_mut() {
            session.set_volume(volume);
        }
    }

    /// Publish now, or return the delay after which a flush is due
    pub fn publish_position(&mut self, position: PositionState, now: Instant) -> Option<Duration> {
        let session = self.session.as_mut()?;

        match self.last_position_at {
            Some(at) if now.saturating_duration_since(at) < self.debounce => {
                self.pending_position = Some(position);
                if self.flush_scheduled {
                    return None;
                }
                self.flush_scheduled = true;
                Some(self.debounce - now.saturating_duration_since(at))
            }
            _ => {
                session.set_position(position);
                self.last_position_at = Some(now);
                self.pending_position = None;
                None
            }
        }
    }

    /// Trailing edge of the debounce window
    pub fn flush(&mut self, now: Instant) -> Option<Duration> {
        self.flush_scheduled = false;
        let position = self.pending_position.take()?;
        self.publish_position(position, now)
    }

    /// Gate an inbound command. Next/previous are dropped while a track
    /// transition is still loading.
    pub fn admit(&self, command: MediaCommand, transition_in_flight: bool) -> Option<MediaCommand> {
        match command {
            MediaCommand::Next | MediaCommand::Previous if transition_in_flight => {
                tracing::debug!(?command, "Transition in flight, dropping media command");
                None
            }
            command => Some(command),
        }
    }

    pub fn clear(&mut self) {
        self.pending_position = None;
        self.flush_scheduled = false;
        if let Some(session) = self.session.as_mut() {
            session.clear();
        }
    }
}
