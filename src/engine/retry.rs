//! Retry classification and backoff for failed stream loads

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::config::RetryConfig;
use crate::error::PlaybackError;
use crate::model::TrackId;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Retryable,
    Fatal,
}

/// Network, server and token failures are worth another attempt; broken or
/// unsupported media and platform refusals are not.
pub fn classify(error: &PlaybackError) -> Classification {
    match error {
        PlaybackError::Auth(_) | PlaybackError::Network(_) => Classification::Retryable,
        PlaybackError::AudioLoad(e) if e.is_retryable() => Classification::Retryable,
        _ => Classification::Fatal,
    }
}

/// What the engine should do after a failed attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reattempt after `delay`; `attempt` counts retries for this track, from 1
    Retry { attempt: u32, delay: Duration },
    /// The retry budget is spent; `attempts` includes the first try
    Exhausted { attempts: u32 },
    Fatal,
}

struct RetryState {
    track_id: TrackId,
    retries: u32,
    last_delay: Duration,
}

/// Per-track retry bookkeeping plus the single pending retry timer
pub struct RetryPolicy {
    config: RetryConfig,
    state: Option<RetryState>,
    timer: Option<JoinHandle<()>>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            state: None,
            timer: None,
        }
    }

    /// Delay before retry number `attempt` (1-based): base · 2^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let delay = self.config.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.config.max_delay_ms))
    }

    pub fn on_failure(&mut self, track_id: &TrackId, error: &PlaybackError) -> RetryDecision {
        if classify(error) == Classification::Fatal {
            self.clear();
            return RetryDecision::Fatal;
        }
        self.schedule_retry(track_id)
    }

    /// Count one more retry for `track_id`; a different track starts over
    pub fn schedule_retry(&mut self, track_id: &TrackId) -> RetryDecision {
        if self.state.as_ref().is_some_and(|s| &s.track_id != track_id) {
            self.clear();
        }
        let state = self.state.get_or_insert_with(|| RetryState {
            track_id: track_id.clone(),
            retries: 0,
            last_delay: Duration::ZERO,
        });

        if state.retries >= self.config.max_retries {
            let attempts = state.retries + 1;
            self.clear();
            return RetryDecision::Exhausted { attempts };
        }

        state.retries += 1;
        let attempt = state.retries;
        let delay = self.backoff(attempt);
        if let Some(state) = self.state.as_mut() {
            state.last_delay = delay;
        }
        RetryDecision::Retry { attempt, delay }
    }

    /// Install the timer for the scheduled retry, cancelling any older one
    pub fn arm(&mut self, timer: JoinHandle<()>) {
        if let Some(old) = self.timer.replace(timer) {
            old.abort();
        }
    }

    /// The armed timer has fired
    pub fn fired(&mut self) {
        self.timer = None;
    }

    pub fn retries_for(&self, track_id: &TrackId) -> u32 {
        match &self.state {
            Some(state) if &state.track_id == track_id => state.retries,
            _ => 0,
        }
    }

    pub fn last_delay(&self) -> Option<Duration> {
        self.state.as_ref().map(|s| s.last_delay)
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Forget the counter and abort any pending retry
    pub fn clear(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
            tracing::debug!("Pending retry cancelled");
        }
        self.state = None;
    }
}

impl Drop for RetryPolicy {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
