//! Core type definitions shared by the engine and its collaborators

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque track identifier, unique within a queue
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(Arc<str>);

impl TrackId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TrackId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// A single playable audio item.
///
/// Tracks are immutable once enqueued; a metadata change replaces the whole
/// value. `duration_seconds` is advisory until the stream has loaded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: TrackId,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub artwork_uri: Option<String>,
    #[serde(default)]
    pub duration_seconds: f64,
    /// Stream locator without the token. Empty means "derive it from the
    /// configured stream endpoint and the track id".
    #[serde(default)]
    pub source_uri: String,
}

impl Track {
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: artist.into(),
            album: None,
            artwork_uri: None,
            duration_seconds: 0.0,
            source_uri: String::new(),
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }
}

/// Repeat mode state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    One,
}

impl RepeatMode {
    /// Next mode for a UI toggle: off → all → one → off
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RepeatMode::Off => "off",
            RepeatMode::All => "all",
            RepeatMode::One => "one",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_cycle() {
        assert_eq!(RepeatMode::Off.cycle(), RepeatMode::All);
        assert_eq!(RepeatMode::All.cycle(), RepeatMode::One);
        assert_eq!(RepeatMode::One.cycle(), RepeatMode::Off);
    }

    #[test]
    fn track_id_is_a_plain_json_string() {
        let id = TrackId::from("t-9");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""t-9""#);
        let back: TrackId = serde_json::from_str(r#""t-9""#).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn track_from_camel_case_json() {
        let json = r#"{
            "id": "t-1",
            "title": "Intro",
            "artist": "Someone",
            "artworkUri": "https://img/1.jpg",
            "durationSeconds": 181.5
        }"#;
        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.id.as_str(), "t-1");
        assert_eq!(track.artwork_uri.as_deref(), Some("https://img/1.jpg"));
        assert_eq!(track.album, None);
        assert!(track.source_uri.is_empty());
        assert!((track.duration_seconds - 181.5).abs() < f64::EPSILON);
    }
}
