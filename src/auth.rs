use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::{PlaybackSession, TokenGrant, TrackId};

/// Network seam for the signed-stream-token endpoint
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Fetch a fresh grant; `Auth` on non-2xx, `Network` on transport failure
    async fn fetch(&self, track_id: &TrackId) -> Result<TokenGrant>;
}

type InFlight = Shared<BoxFuture<'static, Result<PlaybackSession>>>;

#[derive(Default)]
struct GatewayState {
    sessions: HashMap<TrackId, PlaybackSession>,
    in_flight: HashMap<TrackId, (u64, InFlight)>,
    next_ticket: u64,
}

/// Obtains and caches short-lived playback sessions, one per track.
///
/// Concurrent `acquire` calls for the same track share a single request.
/// Each request carries a ticket; a request that was invalidated while in
/// flight neither caches its result nor clears a newer request's slot.
#[derive(Clone)]
pub struct TokenGateway {
    fetcher: Arc<dyn TokenFetcher>,
    state: Arc<Mutex<GatewayState>>,
    refresh_margin: Duration,
    default_lifetime: Duration,
}

impl TokenGateway {
    pub fn new(fetcher: Arc<dyn TokenFetcher>, refresh_margin: Duration, default_lifetime: Duration) -> Self {
        Self {
            fetcher,
            state: Arc::new(Mutex::new(GatewayState::default())),
            refresh_margin,
            default_lifetime,
        }
    }

    pub async fn acquire(&self, track_id: &TrackId) -> Result<PlaybackSession> {
        let request = {
            let mut state = self.state.lock().await;

            if let Some(session) = state.sessions.get(track_id) {
                if !session.needs_refresh(Utc::now(), self.refresh_margin) {
                    tracing::trace!(track_id = %track_id, "Reusing cached playback session");
                    return Ok(session.clone());
                }
                tracing::debug!(track_id = %track_id, "Cached playback session expiring, refetching");
                state.sessions.remove(track_id);
            }

            if let Some((_, existing)) = state.in_flight.get(track_id) {
                tracing::debug!(track_id = %track_id, "Joining in-flight token request");
                existing.clone()
            } else {
                state.next_ticket += 1;
                let ticket = state.next_ticket;
                let request = self.clone().request(track_id.clone(), ticket).boxed().shared();
                state.in_flight.insert(track_id.clone(), (ticket, request.clone()));
                request
            }
        };

        request.await
    }

    /// Drop any cached or in-flight session so the next `acquire` hits the network
    pub async fn invalidate(&self, track_id: &TrackId) {
        let mut state = self.state.lock().await;
        let cached = state.sessions.remove(track_id).is_some();
        let pending = state.in_flight.remove(track_id).is_some();
        if cached || pending {
            tracing::debug!(track_id = %track_id, cached, pending, "Playback session invalidated");
        }
    }

    async fn request(self, track_id: TrackId, ticket: u64) -> Result<PlaybackSession> {
        tracing::debug!(track_id = %track_id, "Requesting stream token");
        let result = self.fetcher.fetch(&track_id).await.map(|grant| {
            PlaybackSession::from_grant(track_id.clone(), grant, Utc::now(), self.default_lifetime)
        });

        let mut state = self.state.lock().await;
        let still_current = matches!(state.in_flight.get(&track_id), Some((t, _)) if *t == ticket);
        if still_current {
            state.in_flight.remove(&track_id);
            if let Ok(session) = &result {
                state.sessions.insert(track_id.clone(), session.clone());
            }
        }

        match &result {
            Ok(session) => tracing::info!(track_id = %track_id, play_id = %session.play_id, "Stream token acquired"),
            Err(e) => tracing::warn!(track_id = %track_id, error = %e, "Stream token request failed"),
        }
        result
    }
}
