//! # Spotify Integration Module
//!
//! Thin client for the parts of the Spotify Web API the playlist generator
//! uses. Every call takes the caller's access token; the client itself holds
//! no credentials and can be shared between all sessions.
//!
//! ## API Coverage
//!
//! ### Search
//! - `GET /search?type=track` - Ranked track search
//!
//! ### User Data
//! - `GET /me` - Current user's id, needed to create playlists
//! - `GET /me/playlists` - Current user's playlists
//!
//! ### Playlist Operations
//! - `POST /users/{user_id}/playlists` - Create new playlists
//! - `POST /playlists/{playlist_id}/tracks` - Add tracks, 100 per request
//!
//! ## Error Handling
//!
//! - **502 Bad Gateway**: retried after a short pause, for reads only
//! - **429 Too Many Requests**: retried when `Retry-After` is short enough
//! - Everything else surfaces as [`ApiError`]; at most [`MAX_ATTEMPTS`]
//!   requests are made per call

mod playlist;
mod search;

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, header::RETRY_AFTER};
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

pub use playlist::TRACKS_PER_REQUEST;

pub const MAX_ATTEMPTS: u32 = 3;
pub const MAX_RETRY_AFTER_SECS: u64 = 10;
const BAD_GATEWAY_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Retry {
    /// Safe to repeat after a 502.
    Idempotent,
    /// Only repeated when the upstream refused it outright (429).
    Write,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("spotify api returned {status}: {message}")]
    Status { status: StatusCode, message: String },

    #[error("spotify api request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ApiError {
    /// Worth retrying later: timeouts, connection failures, 5xx and 429.
    pub fn is_unavailable(&self) -> bool {
        match self {
            ApiError::Transport(e) => e.is_timeout() || e.is_connect(),
            ApiError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
        }
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Transport(e) => e.status(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpotifyClient {
    http: Client,
    base: Url,
}

impl SpotifyClient {
    /// Creates a client for the API rooted at `api_url`.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client, timeouts included
    /// * `api_url` - Base URL such as `https://api.spotify.com/v1`
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] if `api_url` does not parse or cannot
    /// carry path segments (`mailto:`, `data:` and the like).
    pub fn new(http: Client, api_url: &str) -> Result<Self, url::ParseError> {
        let base = Url::parse(api_url)?;
        if base.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(SpotifyClient { http, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        // `new` only accepts bases with a path, so this always succeeds.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Sends an idempotent request, retrying transient failures.
    ///
    /// # Arguments
    ///
    /// * `build` - Builds the request; called again for every attempt
    ///
    /// # Returns
    ///
    /// The first successful response. A 502 is retried after a short pause,
    /// a 429 after its `Retry-After` delay when that is at most
    /// [`MAX_RETRY_AFTER_SECS`]. At most [`MAX_ATTEMPTS`] requests are made.
    ///
    /// # Errors
    ///
    /// [`ApiError::Status`] for the last non-success response and
    /// [`ApiError::Transport`] when the request could not be sent.
    async fn send<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send_with(Retry::Idempotent, build).await
    }

    /// Sends a request that changes state upstream.
    ///
    /// Same as [`SpotifyClient::send`] except that a 502 is returned as is:
    /// the gateway may fail after the write was applied, and repeating it
    /// would create a second playlist or add the tracks twice. A 429 is
    /// still retried, Spotify rejects those before doing anything.
    async fn send_write<F>(&self, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        self.send_with(Retry::Write, build).await
    }

    async fn send_with<F>(&self, retry: Retry, build: F) -> Result<Response, ApiError>
    where
        F: Fn(&Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let res = build(&self.http).send().await?;
            let status = res.status();
            if status.is_success() {
                return Ok(res);
            }

            if attempt < MAX_ATTEMPTS {
                if status == StatusCode::BAD_GATEWAY && retry == Retry::Idempotent {
                    sleep(BAD_GATEWAY_PAUSE).await;
                    continue;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    if let Some(wait) = retry_after(&res) {
                        if wait <= MAX_RETRY_AFTER_SECS {
                            sleep(Duration::from_secs(wait)).await;
                            continue;
                        }
                    }
                }
            }

            return Err(ApiError::Status {
                status,
                message: error_message(res).await,
            });
        }
    }
}

fn retry_after(res: &Response) -> Option<u64> {
    res.headers()
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
}

// Spotify wraps errors as {"error": {"status": 401, "message": "..."}}.
async fn error_message(res: Response) -> String {
    let fallback = res.status().to_string();
    match res.json::<serde_json::Value>().await {
        Ok(json) => json["error"]["message"]
            .as_str()
            .or_else(|| json["error"].as_str())
            .map(str::to_string)
            .unwrap_or(fallback),
        Err(_) => fallback,
    }
}
