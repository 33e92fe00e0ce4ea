//! Playback-related types and state management

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use super::types::{RepeatMode, Track, TrackId};
use crate::error::PlaybackError;

/// Complete playback information for rendering.
///
/// The engine is the only writer; UIs and the media bridge only read.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackState {
    pub track: Option<Track>,
    /// Tracks in traversal order (shuffled order while shuffle is on)
    pub queue: Vec<Track>,
    pub queue_index: Option<usize>,
    pub queue_length: usize,
    pub is_playing: bool,
    pub is_loading: bool,
    pub position_seconds: f64,
    pub duration_seconds: f64,
    pub volume: f32,
    pub muted: bool,
    pub repeat_mode: RepeatMode,
    pub shuffle: bool,
    /// Set when the queue ran out with repeat off
    pub exhausted: bool,
    pub last_error: Option<PlaybackError>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            track: None,
            queue: Vec::new(),
            queue_index: None,
            queue_length: 0,
            is_playing: false,
            is_loading: false,
            position_seconds: 0.0,
            duration_seconds: 0.0,
            volume: 1.0,
            muted: false,
            repeat_mode: RepeatMode::Off,
            shuffle: false,
            exhausted: false,
            last_error: None,
        }
    }
}

impl PlaybackState {
    pub fn progress_ratio(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            (self.position_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Body sent to the play-completion endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionReport {
    pub track_id: TrackId,
    pub play_id: String,
    pub played_duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub play_percentage: Option<f64>,
}

/// Answer of the play-completion endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionAck {
    pub counted_as_play: bool,
    #[serde(default)]
    pub accumulated_duration_seconds: Option<f64>,
}

/// A contiguous interval of audible playback.
///
/// Opened on a transition to playing and closed exactly once on the next
/// pause, stop, end, track change or teardown.
#[derive(Clone, Debug)]
pub struct PlaySpan {
    track_id: TrackId,
    play_id: String,
    track_duration: f64,
    started_at: Instant,
}

impl PlaySpan {
    pub fn begin(track_id: TrackId, play_id: String, track_duration: f64, now: Instant) -> Self {
        Self {
            track_id,
            play_id,
            track_duration,
            started_at: now,
        }
    }

    pub fn track_id(&self) -> &TrackId {
        &self.track_id
    }

    pub fn close(self, now: Instant) -> CompletionReport {
        let played = now.saturating_duration_since(self.started_at).as_secs_f64();
        let play_percentage = (self.track_duration > 0.0)
            .then(|| (played / self.track_duration * 100.0).min(100.0));
        CompletionReport {
            track_id: self.track_id,
            play_id: self.play_id,
            played_duration_seconds: played,
            play_percentage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn span_measures_wall_clock() {
        let start = Instant::now();
        let span = PlaySpan::begin(TrackId::from("a"), "p".to_string(), 100.0, start);
        let report = span.close(start + Duration::from_millis(5200));
        assert!((report.played_duration_seconds - 5.2).abs() < 1e-9);
        assert!((report.play_percentage.unwrap() - 5.2).abs() < 1e-9);
    }

    #[test]
    fn span_without_duration_has_no_percentage() {
        let start = Instant::now();
        let span = PlaySpan::begin(TrackId::from("a"), "p".to_string(), 0.0, start);
        let report = span.close(start + Duration::from_secs(2));
        assert_eq!(report.play_percentage, None);
    }

    #[test]
    fn report_serializes_camel_case() {
        let report = CompletionReport {
            track_id: TrackId::from("t9"),
            play_id: "p9".to_string(),
            played_duration_seconds: 2.0,
            play_percentage: None,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["trackId"], "t9");
        assert_eq!(json["playedDurationSeconds"], 2.0);
        assert!(json.get("playPercentage").is_none());
    }
}
