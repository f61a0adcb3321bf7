//! # Auth Module
//!
//! Session-scoped authentication against the Spotify accounts service.
//!
//! ## Overview
//!
//! Every route that calls the Spotify Web API on a user's behalf first asks
//! the [`AuthGate`] for a credential. The gate either hands back a usable
//! [`Credential`](crate::types::Credential) or a [`RedirectTo`] pointing at
//! the Spotify authorization page, which the route returns instead of doing
//! its work.
//!
//! ```text
//! Unauthenticated ──complete_authorization──▶ Authenticated
//!        ▲                                        │  │
//!        └──── refresh rejected / sign_out ───────┘  └─ refresh (silent)
//! ```
//!
//! ## Authentication Flow
//!
//! 1. **Gate check**: a request without a usable credential gets a redirect
//!    to the authorization endpoint with `client_id`, `redirect_uri`,
//!    `response_type=code` and the needed `scope`
//! 2. **User consent**: Spotify redirects back to `/callback?code=...`
//! 3. **Code exchange**: [`AuthGate::complete_authorization`] trades the
//!    one-time code for an access/refresh token pair and stores it
//! 4. **Refresh**: once the access token is about to expire the gate trades
//!    the refresh token for a new one, at most once per session at a time
//!
//! ## Concurrency
//!
//! Sessions are independent. Within one session the gate holds a lock across
//! refresh and commit, so a second request waits and reuses the refreshed
//! credential instead of refreshing again. The refresh runs on its own task
//! and is committed even if the request that started it was dropped.
//!
//! ## Related Modules
//!
//! - [`crate::session`] - Credential storage
//! - [`crate::config`] - Client registration and endpoints

mod accounts;
mod gate;
mod scope;

use thiserror::Error;

use crate::session::StoreError;

pub use accounts::{AccountsClient, TokenError};
pub use gate::{AuthGate, EXPIRY_LEEWAY_SECS, credential_from_grant};
pub use scope::{PLAYLIST_MODIFY_PRIVATE, PLAYLIST_MODIFY_PUBLIC, PLAYLIST_READ_PRIVATE, Scopes};

/// Where to send a caller that has to sign in first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTo(pub String);

impl RedirectTo {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    /// The accounts service refused the authorization code.
    #[error("authorization failed: {0}")]
    ExchangeFailed(String),

    /// The accounts service could not be reached or answered with an error.
    #[error("accounts service unavailable: {0}")]
    Upstream(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected { .. } => AuthError::ExchangeFailed(err.to_string()),
            TokenError::Server(_) | TokenError::Transport(_) => AuthError::Upstream(err.to_string()),
        }
    }
}
