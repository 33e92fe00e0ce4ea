//! Error taxonomy for the playback engine
//!
//! Every variant is `Clone` so a failure can be stored in the observable
//! [`PlaybackState`](crate::model::PlaybackState) and handed to every caller
//! awaiting a coalesced token request.

use std::fmt;
use thiserror::Error;

use crate::model::TrackId;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlaybackError {
    /// Token endpoint rejected the request or answered with a non-2xx status
    #[error("token rejected: {0}")]
    Auth(String),

    /// Transport failure talking to a remote endpoint
    #[error("network error: {0}")]
    Network(String),

    /// The audio resource could not be fetched or decoded
    #[error(transparent)]
    AudioLoad(#[from] AudioLoadError),

    /// The platform refused to start audio, usually for lack of a user gesture
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue exhausted")]
    QueueExhausted,

    /// Retries for a track were used up
    #[error("stream unavailable for track {track_id} after {attempts} attempts")]
    StreamUnavailable { track_id: TrackId, attempts: u32 },

    #[error("invalid queue: {0}")]
    InvalidQueue(String),

    /// No audio output device could be opened
    #[error("audio output unavailable: {0}")]
    Output(String),

    /// The engine task has stopped and no longer accepts commands
    #[error("playback engine is closed")]
    EngineClosed,
}

/// Why a stream failed to load
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadErrorKind {
    /// Transport failure or timeout while fetching the resource
    Network,
    /// 5xx, 408 or 429 from the stream endpoint
    Server,
    /// 401/403; the token most likely expired
    Unauthorized,
    /// The resource does not exist
    NotFound,
    /// The bytes arrived but could not be decoded
    Decode,
    /// The container or codec is not supported
    UnsupportedFormat,
}

impl LoadErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::Server | Self::Unauthorized)
    }

    /// Classify an HTTP status returned by the stream endpoint
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Unauthorized,
            404 | 410 => Self::NotFound,
            408 | 429 => Self::Server,
            415 => Self::UnsupportedFormat,
            s if s >= 500 => Self::Server,
            _ => Self::NotFound,
        }
    }
}

impl fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Network => "network",
            Self::Server => "server",
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not found",
            Self::Decode => "decode",
            Self::UnsupportedFormat => "unsupported format",
        };
        f.write_str(text)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("audio load failed ({kind}): {message}")]
pub struct AudioLoadError {
    pub kind: LoadErrorKind,
    pub message: String,
}

impl AudioLoadError {
    pub fn new(kind: LoadErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }
}

/// Convenience Result type using [`PlaybackError`]
pub type Result<T> = std::result::Result<T, PlaybackError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(LoadErrorKind::from_status(401), LoadErrorKind::Unauthorized);
        assert_eq!(LoadErrorKind::from_status(503), LoadErrorKind::Server);
        assert_eq!(LoadErrorKind::from_status(429), LoadErrorKind::Server);
        assert_eq!(LoadErrorKind::from_status(404), LoadErrorKind::NotFound);
        assert!(LoadErrorKind::from_status(500).is_retryable());
        assert!(!LoadErrorKind::from_status(404).is_retryable());
        assert!(!LoadErrorKind::UnsupportedFormat.is_retryable());
    }
}
