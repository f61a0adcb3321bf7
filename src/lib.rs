//! Playlist Generator Library
//!
//! This library provides a small web server that signs a user in to Spotify,
//! searches tracks, asks an LLM for songs similar to a seed song and turns the
//! suggestions into a new or an existing playlist on the user's account.
//!
//! # Modules
//!
//! - `api` - HTTP route handlers
//! - `auth` - Session-scoped auth gate and the Spotify accounts client
//! - `config` - Configuration management and environment variables
//! - `error` - Error types shared by the handlers
//! - `server` - Router construction and the HTTP listener
//! - `session` - Session ids, cookies and credential storage
//! - `spotify` - Spotify Web API client implementation
//! - `suggest` - LLM completion client and suggestion parsing
//! - `types` - Data structures and type definitions
//! - `utils` - Utility functions and helpers
//!
//! # Example
//!
//! ```
//! use playlistgen::{config, server};
//!
//! #[tokio::main]
//! async fn main() -> playlistgen::Res<()> {
//!     config::load_env().await;
//!     let config = config::Config::from_env()?;
//!     server::run(config).await
//! }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod spotify;
pub mod suggest;
pub mod types;
pub mod utils;

/// A convenient Result type alias for operations that may fail.
///
/// Used at the top level of the binary where any error ends the process.
/// Library code returns the typed errors from [`error`] instead.
pub type Res<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Prints an informational message with a blue bullet point.
///
/// # Example
///
/// ```
/// info!("Listening on {}", addr);
/// ```
#[macro_export]
macro_rules! info {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "o".blue().bold(), std::format_args!($($arg)*));
  })
}

/// Prints a success message with a green checkmark.
///
/// # Example
///
/// ```
/// success!("Session signed in");
/// ```
#[macro_export]
macro_rules! success {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    println!("[{}] {}", "✓".green().bold(), std::format_args!($($arg)*));
  })
}

/// Prints an error message with a red exclamation mark and exits the program.
///
/// Only used while the process starts up. Request handling never calls it.
///
/// # Example
///
/// ```
/// error!("Missing required environment variable: {}", var_name);
/// // Program exits here - code after this will not execute
/// ```
#[macro_export]
macro_rules! error {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".red().bold(), std::format_args!($($arg)*));
    std::process::exit(1);
  })
}

/// Prints a warning message with a yellow exclamation mark.
///
/// Used for recoverable problems such as a failed refresh or an upstream
/// call that timed out.
///
/// # Example
///
/// ```
/// warning!("Token refresh failed: {}", err);
/// ```
#[macro_export]
macro_rules! warning {
  ($($arg:tt)*) => ({
    use colored::Colorize;
    eprintln!("[{}] {}", "!".yellow().bold(), std::format_args!($($arg)*));
  })
}
