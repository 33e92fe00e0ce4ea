//! HTTP clients for the token and play-completion endpoints

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::TokenFetcher;
use crate::config::ApiConfig;
use crate::error::{PlaybackError, Result};
use crate::model::{CompletionAck, CompletionReport, TokenGrant, TrackId};
use crate::{log_api_request, log_api_result};

/// Fire-and-forget sink for play-completion reports
#[async_trait]
pub trait CompletionReporter: Send + Sync {
    async fn report(&self, report: CompletionReport) -> Result<CompletionAck>;
}

/// Reporter that drops every report, for setups without a completion endpoint
pub struct NullReporter;

#[async_trait]
impl CompletionReporter for NullReporter {
    async fn report(&self, report: CompletionReport) -> Result<CompletionAck> {
        tracing::trace!(track_id = %report.track_id, "Completion report discarded");
        Ok(CompletionAck {
            counted_as_play: false,
            accumulated_duration_seconds: None,
        })
    }
}

/// Backend API client shared by the token gateway and the completion reporter
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    token_url: String,
    completion_url: String,
    bearer_token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PlaybackError::Network(e.to_string()))?;
        Ok(Self {
            http,
            token_url: config.token_url.trim_end_matches('/').to_string(),
            completion_url: config.completion_url.clone(),
            bearer_token: config.bearer_token.clone(),
        })
    }

    /// Underlying HTTP client, reused for stream downloads
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn request_token(&self, track_id: &TrackId) -> Result<TokenGrant> {
        let url = format!("{}/{}", self.token_url, urlencoding::encode(track_id.as_str()));
        log_api_request!("stream_token", track_id = %track_id, url = %url);

        let response = self
            .authorize(self.http.get(&url))
            .send()
            .await
            .map_err(|e| PlaybackError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    PlaybackError::Auth(format!("token endpoint refused access ({})", status))
                }
                _ => PlaybackError::Auth(format!("token endpoint returned {}", status)),
            });
        }

        response
            .json::<TokenGrant>()
            .await
            .map_err(|e| PlaybackError::Auth(format!("malformed token response: {}", e)))
    }

    async fn send_completion(&self, report: &CompletionReport) -> Result<CompletionAck> {
        log_api_request!(
            "play_completion",
            track_id = %report.track_id,
            played = report.played_duration_seconds
        );

        let response = self
            .authorize(self.http.post(&self.completion_url))
            .json(report)
            .send()
            .await
            .map_err(|e| PlaybackError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PlaybackError::Network(format!(
                "completion endpoint returned {}",
                status
            )));
        }

        response
            .json::<CompletionAck>()
            .await
            .map_err(|e| PlaybackError::Network(format!("malformed completion response: {}", e)))
    }
}

#[async_trait]
impl TokenFetcher for ApiClient {
    async fn fetch(&self, track_id: &TrackId) -> Result<TokenGrant> {
        let result = self.request_token(track_id).await;
        log_api_result!("stream_token", result);
        result
    }
}

#[async_trait]
impl CompletionReporter for ApiClient {
    async fn report(&self, report: CompletionReport) -> Result<CompletionAck> {
        let result = self.send_completion(&report).await;
        log_api_result!("play_completion", result);
        if let Ok(ack) = &result {
            tracing::info!(
                track_id = %report.track_id,
                counted = ack.counted_as_play,
                accumulated = ?ack.accumulated_duration_seconds,
                "Play completion recorded"
            );
        }
        result
    }
}
