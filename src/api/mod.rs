//! # API Module
//!
//! HTTP route handlers of the playlist generator.
//!
//! ## Endpoints
//!
//! ### Authentication
//!
//! - [`index`] - Start page; sends unauthenticated sessions to Spotify
//! - [`callback`] - OAuth redirect target, exchanges the authorization code
//! - [`sign_out`] - Forgets the session's credential
//!
//! ### Music
//!
//! - [`search_song`] / [`search_songs`] - Track search
//! - [`generate_suggestions`] - Similar songs from the LLM
//! - [`generate_playlist`] / [`import_to_existing_playlist`] - Playlist writes
//! - [`playlists`] - The signed-in user's playlists
//! - [`success`] - Confirmation page
//!
//! ### Monitoring
//!
//! - [`health`] - Status and version
//!
//! Every handler that talks to Spotify on the user's behalf asks the
//! [`AuthGate`] first. Page routes turn a missing sign-in into a `303` to the
//! authorization page, JSON routes into a `401` carrying the same URL.

mod callback;
mod health;
mod playlist;
mod search;
mod suggest;

use std::sync::Arc;

use axum_extra::extract::CookieJar;

use crate::{
    auth::{AuthGate, Scopes},
    error::AppError,
    session::{SessionId, SessionStore, session_from_jar},
    spotify::SpotifyClient,
    suggest::SuggestionClient,
    types::Credential,
};

pub use callback::{callback, index, sign_out};
pub use health::health;
pub use playlist::{generate_playlist, import_to_existing_playlist, playlists, success};
pub use search::{search_song, search_songs};
pub use suggest::generate_suggestions;

/// Shared state handed to every handler.
pub struct AppState<S> {
    pub gate: Arc<AuthGate<S>>,
    pub spotify: SpotifyClient,
    pub suggest: SuggestionClient,
    pub secure_cookies: bool,
    /// Legacy single-account mode: playlists are created for this user id
    /// instead of the signed-in one.
    pub user_name: Option<String>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        AppState {
            gate: Arc::clone(&self.gate),
            spotify: self.spotify.clone(),
            suggest: self.suggest.clone(),
            secure_cookies: self.secure_cookies,
            user_name: self.user_name.clone(),
        }
    }
}

impl<S: SessionStore> AppState<S> {
    fn session(&self, jar: CookieJar) -> (CookieJar, SessionId) {
        session_from_jar(jar, self.secure_cookies)
    }

    async fn credential(
        &self,
        session: &SessionId,
        required: &Scopes,
    ) -> Result<Credential, AppError> {
        Ok(self.gate.ensure_authenticated(session, required).await?)
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body>{body}</body></html>"
    )
}

/// Trims a form or query value, treating blank input as missing.
fn required(value: Option<&str>, name: &'static str) -> Result<String, AppError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(AppError::MissingInput(name)),
    }
}
