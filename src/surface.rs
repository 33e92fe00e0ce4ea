//! Terminal stand-in for the OS media control surface
//!
//! The engine mirrors metadata, play state and position here exactly as it
//! would onto a lock screen; the view renders the mirrored copy.

use tokio::sync::watch;
use tunestream::engine::{MediaMetadata, MediaPlayback, MediaSession, PositionState};

#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceState {
    pub metadata: Option<MediaMetadata>,
    pub playback: MediaPlayback,
    pub position: Option<PositionState>,
    pub volume: Option<f32>,
}

impl Default for SurfaceState {
    fn default() -> Self {
        Self {
            metadata: None,
            playback: MediaPlayback::Stopped,
            position: None,
            volume: None,
        }
    }
}

pub struct TerminalSurface {
    state: watch::Sender<SurfaceState>,
}

impl TerminalSurface {
    pub fn new() -> (Self, watch::Receiver<SurfaceState>) {
        let (state, receiver) = watch::channel(SurfaceState::default());
        (Self { state }, receiver)
    }
}

impl MediaSession for TerminalSurface {
    fn set_metadata(&mut self, metadata: &MediaMetadata) {
        tracing::trace!(title = %metadata.title, "Surface metadata");
        self.state.send_modify(|s| s.metadata = Some(metadata.clone()));
    }

    fn set_playback(&mut self, status: MediaPlayback) {
        self.state.send_modify(|s| s.playback = status);
    }

    fn set_position(&mut self, position: PositionState) {
        self.state.send_modify(|s| s.position = Some(position));
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.send_modify(|s| s.volume = Some(volume));
    }

    fn clear(&mut self) {
        self.state.send_replace(SurfaceState::default());
    }
}
