use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use reqwest::Client;
use tokio::{net::TcpListener, signal};

use crate::{
    Res,
    api::{self, AppState},
    auth::{AccountsClient, AuthGate},
    config::{Config, SessionBackend},
    info,
    session::{FileSessionStore, MemorySessionStore, SessionStore},
    spotify::SpotifyClient,
    suggest::SuggestionClient,
};

/// All routes of the web app.
pub fn create_router<S: SessionStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(api::index::<S>))
        .route("/callback", get(api::callback::<S>))
        .route("/sign_out", get(api::sign_out::<S>))
        .route("/search_song", get(api::search_song::<S>))
        .route("/search_songs", get(api::search_songs::<S>))
        .route("/generate_suggestions", post(api::generate_suggestions::<S>))
        .route("/generate_playlist", post(api::generate_playlist::<S>))
        .route(
            "/import_to_existing_playlist",
            post(api::import_to_existing_playlist::<S>),
        )
        .route("/playlists", get(api::playlists::<S>))
        .route("/success", get(api::success))
        .route("/health", get(api::health))
        .with_state(state)
}

/// Wires the gate and the upstream clients around `store`.
///
/// All upstream clients share `http`, so its timeout bounds every call made
/// on behalf of a request.
pub fn build_state<S: SessionStore>(
    config: &Config,
    http: Client,
    store: Arc<S>,
) -> Result<AppState<S>, url::ParseError> {
    let accounts = AccountsClient::new(http.clone(), config.oauth.clone());

    Ok(AppState {
        gate: Arc::new(AuthGate::new(store, accounts)),
        spotify: SpotifyClient::new(http.clone(), &config.api_url)?,
        suggest: SuggestionClient::new(http, config.llm.clone()),
        secure_cookies: config.secure_cookies,
        user_name: config.user_name.clone(),
    })
}

/// Starts the HTTP server and serves until Ctrl+C or SIGTERM.
pub async fn run(config: Config) -> Res<()> {
    let http = Client::builder().timeout(config.upstream_timeout).build()?;

    match config.sessions.clone() {
        SessionBackend::Memory => {
            info!("Keeping sessions in memory");
            serve(&config, http, MemorySessionStore::new()).await
        }
        SessionBackend::File(dir) => {
            info!("Keeping sessions in {}", dir.display());
            serve(&config, http, FileSessionStore::new(dir)).await
        }
    }
}

async fn serve<S: SessionStore>(config: &Config, http: Client, store: S) -> Res<()> {
    let state = build_state(config, http, Arc::new(store))?;
    let listener = TcpListener::bind(config.server_addr).await?;

    info!("Listening on http://{}", listener.local_addr()?);
    if config.user_name.is_some() {
        info!("Playlists are created for the configured USER_NAME");
    }

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
