//! Terminal-local UI state

use tunestream::engine::EngineEvent;
use tunestream::model::PlaybackState;
use tunestream::PlaybackError;

#[derive(Debug, Default)]
pub struct UiState {
    /// Highlighted row in the queue list
    pub selected: usize,
    pub show_help_popup: bool,
    /// Local errors, e.g. a command the engine refused
    pub error_message: Option<String>,
    /// Engine error the user already dismissed
    dismissed_error: Option<PlaybackError>,
    /// Short status line fed by engine events
    pub status: Option<String>,
    pub should_quit: bool,
}

impl UiState {
    /// The error popup text, if one should be shown
    pub fn visible_error(&self, playback: &PlaybackState) -> Option<String> {
        if let Some(message) = &self.error_message {
            return Some(message.clone());
        }
        match &playback.last_error {
            Some(error) if self.dismissed_error.as_ref() != Some(error) => Some(error.to_string()),
            _ => None,
        }
    }

    pub fn dismiss_error(&mut self, playback: &PlaybackState) {
        self.error_message = None;
        self.dismissed_error = playback.last_error.clone();
    }

    pub fn set_error(&mut self, error: &PlaybackError) {
        tracing::warn!(error = %error, "Command failed");
        self.error_message = Some(error.to_string());
    }

    pub fn move_up(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    pub fn move_down(&mut self, queue_len: usize) {
        if self.selected + 1 < queue_len {
            self.selected += 1;
        }
    }

    pub fn on_engine_event(&mut self, event: &EngineEvent) {
        let status = match event {
            EngineEvent::TrackChanged { index, .. } => {
                self.selected = *index;
                return;
            }
            EngineEvent::QueueExhausted => "End of queue".to_string(),
            EngineEvent::QueueCompleted => "Queue finished".to_string(),
            EngineEvent::PlaybackRejected(reason) => format!("Playback blocked: {}", reason),
            EngineEvent::RetryScheduled { attempt, delay, .. } => {
                format!("Stream failed, retry {} in {}s", attempt, delay.as_secs())
            }
            EngineEvent::StreamUnavailable { attempts, .. } => {
                format!("Stream unavailable after {} attempts", attempts)
            }
            EngineEvent::CompletionReported { report, ack } => match ack {
                Some(ack) if ack.counted_as_play => format!("Play counted ({:.0}s)", report.played_duration_seconds),
                _ => return,
            },
        };
        self.status = Some(status);
    }
}
