use axum::{
    Json,
    extract::{Query, State},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{AppState, required};
use crate::{auth::Scopes, error::JsonError, session::SessionStore};

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub song_name: Option<String>,
    pub limit: Option<u32>,
}

/// Top hit for `song_name` with its preview url.
pub async fn search_song<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Query(params): Query<SearchParams>,
) -> (CookieJar, Result<Json<Value>, JsonError>) {
    let (jar, session) = state.session(jar);
    let result = async {
        let song = required(params.song_name.as_deref(), "song_name")?;
        let credential = state.credential(&session, &Scopes::none()).await?;
        let track = state
            .spotify
            .search_first(&credential.access_token, &song)
            .await?;

        let song_url = track.as_ref().and_then(|t| t.preview_url.clone());
        Ok::<_, JsonError>(Json(json!({ "song_url": song_url, "track": track })))
    }
    .await;
    (jar, result)
}

pub async fn search_songs<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Query(params): Query<SearchParams>,
) -> (CookieJar, Result<Json<Value>, JsonError>) {
    let (jar, session) = state.session(jar);
    let result = async {
        let song = required(params.song_name.as_deref(), "song_name")?;
        let credential = state.credential(&session, &Scopes::none()).await?;
        let tracks = state
            .spotify
            .search_tracks(
                &credential.access_token,
                &song,
                params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT),
            )
            .await?;
        Ok::<_, JsonError>(Json(json!({ "tracks": tracks })))
    }
    .await;
    (jar, result)
}
