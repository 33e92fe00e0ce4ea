//! Token-scoped authorization to stream one track

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Track, TrackId};

/// Raw answer of the token endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenGrant {
    pub token: String,
    pub play_id: String,
    #[serde(default)]
    pub expiry_seconds: Option<u64>,
}

/// A signed token bound to exactly one track.
///
/// Sessions are never shared across tracks; the engine destroys the session
/// whenever the current track changes.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackSession {
    pub track_id: TrackId,
    pub token: String,
    pub play_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PlaybackSession {
    pub fn from_grant(
        track_id: TrackId,
        grant: TokenGrant,
        issued_at: DateTime<Utc>,
        default_lifetime: Duration,
    ) -> Self {
        let lifetime = grant
            .expiry_seconds
            .and_then(|secs| i64::try_from(secs).ok())
            .map(Duration::seconds)
            .unwrap_or(default_lifetime);
        Self {
            track_id,
            token: grant.token,
            play_id: grant.play_id,
            issued_at,
            expires_at: issued_at + lifetime,
        }
    }

    /// True once fewer than `margin` remain before expiry
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let remaining = self.expires_at - now;
        remaining < margin
    }

    /// Token-qualified stream locator.
    ///
    /// Uses the track's own `source_uri` when present, otherwise
    /// `<base>/<trackId>/`. The token is percent-encoded.
    pub fn stream_uri(&self, base: &str, track: &Track) -> String {
        let locator = if track.source_uri.is_empty() {
            format!("{}/{}/", base.trim_end_matches('/'), track.id)
        } else {
            track.source_uri.clone()
        };
        let separator = if locator.contains('?') { '&' } else { '?' };
        format!(
            "{}{}token={}",
            locator,
            separator,
            urlencoding::encode(&self.token)
        )
    }
}
