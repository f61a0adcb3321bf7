//! # Session Module
//!
//! Server-side sessions keyed by an opaque id that travels in a cookie. A
//! session holds at most one [`Credential`]; everything else about the user
//! is fetched from Spotify when needed.
//!
//! Storage is a capability, [`SessionStore`], injected into the auth gate.
//! Two implementations ship with the crate:
//!
//! - [`MemorySessionStore`] keeps credentials in a map and loses them on restart
//! - [`FileSessionStore`] writes one JSON file per session to a directory
//!
//! Both support compare-and-swap so a refreshed credential replaces the old
//! one only if nobody changed it in between.

mod cookie;
mod file;
mod memory;

use std::{fmt, future::Future};

use thiserror::Error;

use crate::{types::Credential, utils};

pub use cookie::{SESSION_COOKIE_NAME, session_cookie, session_from_jar};
pub use file::FileSessionStore;
pub use memory::MemorySessionStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session record is not valid json: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        SessionId(utils::generate_session_id())
    }

    /// Accepts only ids of the shape produced by [`SessionId::generate`].
    pub fn parse(raw: &str) -> Option<Self> {
        utils::is_session_id(raw).then(|| SessionId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    // Only a prefix, ids end up in logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &self.0[..8.min(self.0.len())])
    }
}

/// Credential storage keyed by session id.
///
/// Implementations must make `compare_and_swap` atomic with respect to every
/// other write on the same id.
pub trait SessionStore: Send + Sync + 'static {
    /// Returns the credential cached for the session, if any.
    fn get(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Credential>, StoreError>> + Send;

    /// Stores a credential, replacing whatever was there.
    fn set(
        &self,
        id: &SessionId,
        credential: Credential,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Replaces the stored credential with `new` only if it currently equals
    /// `expected`. `None` on either side means "no credential". Returns
    /// whether the swap happened.
    fn compare_and_swap(
        &self,
        id: &SessionId,
        expected: Option<&Credential>,
        new: Option<Credential>,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Drops the session's credential. Removing an unknown id is not an error.
    fn remove(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse_back() {
        let id = SessionId::generate();
        assert_eq!(SessionId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(SessionId::parse("").is_none());
        assert!(SessionId::parse("short").is_none());
        assert!(SessionId::parse(&"../".repeat(22)[..64]).is_none());
    }

    #[test]
    fn display_does_not_leak_the_full_id() {
        let id = SessionId::generate();
        let shown = id.to_string();
        assert!(shown.starts_with(&id.as_str()[..8]));
        assert!(!shown.contains(id.as_str()));
    }
}
