use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};

pub const SESSION_ID_LEN: usize = 64;

pub fn generate_session_id() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

pub fn is_session_id(value: &str) -> bool {
    value.len() == SESSION_ID_LEN && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// File-system safe name derived from a session id.
pub fn session_file_stem(session_id: &str) -> String {
    let hash = Sha256::digest(session_id.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// OAuth `state` value bound to a session.
///
/// Only a browser holding the session cookie can know it, so a callback
/// carrying someone else's authorization code is refused.
pub fn oauth_state(session_id: &str) -> String {
    let hash = Sha256::digest(format!("oauth-state:{session_id}").as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Splits a textarea of song names into trimmed, non-empty lines.
pub fn song_lines(input: &str) -> Vec<String> {
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
