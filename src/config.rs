//! Configuration management for the playlist generator.
//!
//! This module loads configuration values from environment variables and
//! `.env` files and turns them into one explicit [`Config`] object that is
//! built once at startup and handed to the auth gate, the upstream clients
//! and the router. Nothing in the crate reads the environment after that.
//!
//! The configuration system follows a hierarchical approach:
//! 1. Environment variables (highest priority)
//! 2. `.env` file in the working directory
//! 3. `.env` file in the local data directory
//! 4. Application defaults (where applicable)

use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use thiserror::Error;

use crate::auth::Scopes;

pub const DEFAULT_SCOPE: &str = "playlist-modify-public playlist-read-private playlist-modify-private";
pub const DEFAULT_AUTH_URL: &str = "https://accounts.spotify.com/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
pub const DEFAULT_API_URL: &str = "https://api.spotify.com/v1";
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SERVER_ADDRESS: &str = "127.0.0.1:5000";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid configuration value for '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where session credentials are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionBackend {
    Memory,
    File(PathBuf),
}

/// Client registration and endpoints of the Spotify accounts service.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub auth_url: url::Url,
    pub token_url: String,
    /// Scopes always requested on sign-in, in addition to what a route needs.
    pub default_scopes: Scopes,
    /// Ask Spotify to show the consent dialog even for returning users.
    pub show_dialog: bool,
}

/// Chat-completion endpoint used for song suggestions.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: SocketAddr,
    pub oauth: OAuthSettings,
    pub api_url: String,
    pub llm: LlmSettings,
    pub sessions: SessionBackend,
    pub upstream_timeout: Duration,
    pub secure_cookies: bool,
    /// Legacy single-account mode: every playlist is created for this user.
    pub user_name: Option<String>,
}

/// Loads environment variables from `.env` files.
///
/// Looks first in the working directory, then in the platform-specific local
/// data directory under `playlistgen/.env`. Missing files are fine, variables
/// may as well come from the process environment. Values already present in
/// the environment are never overwritten.
///
/// # Directory Structure
///
/// - Linux: `~/.local/share/playlistgen/.env`
/// - macOS: `~/Library/Application Support/playlistgen/.env`
/// - Windows: `%LOCALAPPDATA%/playlistgen/.env`
pub async fn load_env() {
    let _ = dotenv::dotenv();

    let path = data_dir().join(".env");
    if async_fs::metadata(&path).await.is_ok() {
        let _ = dotenv::from_path(path);
    }
}

/// Base directory for files owned by the application.
pub fn data_dir() -> PathBuf {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("playlistgen");
    path
}

impl Config {
    /// Builds the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `CLIENT_ID`, `CLIENT_SECRET` or
    /// `REDIRECT_URI` are absent and [`ConfigError::Invalid`] when a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .map(|value| value.trim().to_string())
                .find(|value| !value.is_empty())
        };

        let client_id =
            get(&["CLIENT_ID", "SPOTIPY_CLIENT_ID"]).ok_or(ConfigError::Missing("CLIENT_ID"))?;
        let client_secret = get(&["CLIENT_SECRET", "SPOTIPY_CLIENT_SECRET"])
            .ok_or(ConfigError::Missing("CLIENT_SECRET"))?;
        let redirect_uri = get(&["REDIRECT_URI", "SPOTIPY_REDIRECT_URI"])
            .ok_or(ConfigError::Missing("REDIRECT_URI"))?;
        url::Url::parse(&redirect_uri).map_err(|e| ConfigError::Invalid {
            key: "REDIRECT_URI",
            reason: e.to_string(),
        })?;

        let auth_url = url::Url::parse(
            &get(&["SPOTIFY_AUTH_URL"]).unwrap_or_else(|| DEFAULT_AUTH_URL.to_string()),
        )
        .map_err(|e| ConfigError::Invalid {
            key: "SPOTIFY_AUTH_URL",
            reason: e.to_string(),
        })?;

        let server_addr = get(&["SERVER_ADDRESS"])
            .unwrap_or_else(|| DEFAULT_SERVER_ADDRESS.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "SERVER_ADDRESS",
                reason: e.to_string(),
            })?;

        let upstream_timeout = match get(&["UPSTREAM_TIMEOUT_SECS"]) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "UPSTREAM_TIMEOUT_SECS",
                        reason: format!("expected a positive number of seconds, got '{raw}'"),
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        };

        let sessions = match get(&["SESSION_STORE"]).as_deref() {
            None | Some("file") => SessionBackend::File(
                get(&["SESSION_DIR"])
                    .map(PathBuf::from)
                    .unwrap_or_else(|| data_dir().join("sessions")),
            ),
            Some("memory") => SessionBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "SESSION_STORE",
                    reason: format!("expected 'file' or 'memory', got '{other}'"),
                });
            }
        };

        Ok(Config {
            server_addr,
            oauth: OAuthSettings {
                client_id,
                client_secret,
                redirect_uri,
                auth_url,
                token_url: get(&["SPOTIFY_TOKEN_URL"])
                    .unwrap_or_else(|| DEFAULT_TOKEN_URL.into()),
                default_scopes: Scopes::parse(
                    &get(&["AUTH_SCOPE"]).unwrap_or_else(|| DEFAULT_SCOPE.into()),
                ),
                show_dialog: parse_flag(get(&["SHOW_DIALOG"]), "SHOW_DIALOG")?,
            },
            api_url: trim_base(get(&["SPOTIFY_API_URL"]).unwrap_or_else(|| DEFAULT_API_URL.into())),
            llm: LlmSettings {
                api_key: get(&["LLM_API_KEY", "OPENAI_API_KEY"]),
                base_url: trim_base(
                    get(&["LLM_BASE_URL", "OPENAI_BASE_URL"])
                        .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.into()),
                ),
                model: get(&["LLM_MODEL"]).unwrap_or_else(|| DEFAULT_LLM_MODEL.into()),
            },
            sessions,
            upstream_timeout,
            secure_cookies: parse_flag(get(&["SECURE_COOKIES"]), "SECURE_COOKIES")?,
            user_name: get(&["USER_NAME", "SPOTIPY_USER_NAME"]),
        })
    }
}

fn parse_flag(raw: Option<String>, key: &'static str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            key,
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("CLIENT_ID", "client"),
        ("CLIENT_SECRET", "secret"),
        ("REDIRECT_URI", "http://127.0.0.1:5000/callback"),
    ];

    #[test]
    fn defaults_are_applied() {
        let config = Config::from_lookup(lookup(&REQUIRED)).unwrap();

        assert_eq!(config.server_addr.to_string(), DEFAULT_SERVER_ADDRESS);
        assert_eq!(config.oauth.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.oauth.default_scopes, Scopes::parse(DEFAULT_SCOPE));
        assert_eq!(config.upstream_timeout, Duration::from_secs(10));
        assert!(matches!(config.sessions, SessionBackend::File(_)));
        assert!(config.user_name.is_none());
        assert!(!config.secure_cookies);
    }

    #[test]
    fn legacy_spotipy_names_are_accepted() {
        let config = Config::from_lookup(lookup(&[
            ("SPOTIPY_CLIENT_ID", "client"),
            ("SPOTIPY_CLIENT_SECRET", "secret"),
            ("SPOTIPY_REDIRECT_URI", "http://localhost/callback"),
            ("SPOTIPY_USER_NAME", "someone"),
        ]))
        .unwrap();

        assert_eq!(config.oauth.client_id, "client");
        assert_eq!(config.user_name.as_deref(), Some("someone"));
    }

    #[test]
    fn missing_client_id_is_reported() {
        let err = Config::from_lookup(lookup(&REQUIRED[1..])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("CLIENT_ID"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("UPSTREAM_TIMEOUT_SECS", "0"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "UPSTREAM_TIMEOUT_SECS", .. })
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SESSION_STORE", "redis"));
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(ConfigError::Invalid { key: "SESSION_STORE", .. })
        ));
    }

    #[test]
    fn base_urls_lose_trailing_slashes() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("SPOTIFY_API_URL", "http://localhost:9000/v1/"));
        pairs.push(("SESSION_STORE", "memory"));
        let config = Config::from_lookup(lookup(&pairs)).unwrap();

        assert_eq!(config.api_url, "http://localhost:9000/v1");
        assert_eq!(config.sessions, SessionBackend::Memory);
    }
}
