use axum::{
    Form, Json,
    extract::{Query, State},
    response::{Html, Redirect},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use serde_json::{Value, json};
use url::form_urlencoded;

use super::{AppState, page, required};
use crate::{
    auth::{PLAYLIST_MODIFY_PRIVATE, PLAYLIST_MODIFY_PUBLIC, PLAYLIST_READ_PRIVATE, Scopes},
    error::{AppError, JsonError, escape_html},
    session::SessionStore,
    spotify::{ApiError, SpotifyClient},
    types::CreatePlaylistRequest,
    utils::song_lines,
};

const PLAYLIST_PAGE_SIZE: u32 = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeneratePlaylistForm {
    pub playlist_name: String,
    pub playlist_description: String,
    pub song_recommendations: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ImportForm {
    pub playlist_id: String,
    pub song_recommendations: String,
}

#[derive(Debug, Deserialize)]
pub struct SuccessParams {
    pub playlist_name: Option<String>,
}

fn modify_scopes() -> Scopes {
    Scopes::from_iter([PLAYLIST_MODIFY_PUBLIC, PLAYLIST_MODIFY_PRIVATE])
}

/// Creates a playlist from one song per line.
///
/// Each line is searched and its best match added; lines without a match
/// are skipped. Nothing is created unless every search succeeded.
pub async fn generate_playlist<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Form(form): Form<GeneratePlaylistForm>,
) -> (CookieJar, Result<Redirect, AppError>) {
    let (jar, session) = state.session(jar);
    let result = async {
        let name = required(Some(form.playlist_name.as_str()), "playlist_name")?;
        let songs = song_lines(&form.song_recommendations);
        if songs.is_empty() {
            return Err(AppError::MissingInput("song_recommendations"));
        }

        let credential = state.credential(&session, &modify_scopes()).await?;
        let token = credential.access_token.as_str();

        // Search first so a failing lookup leaves no empty playlist behind.
        let uris = resolve_tracks(&state.spotify, token, &songs).await?;

        let owner = match &state.user_name {
            Some(user) => user.clone(),
            None => state.spotify.current_user(token).await?.id,
        };
        let request = CreatePlaylistRequest {
            name: name.clone(),
            description: form.playlist_description.trim().to_string(),
            public: true,
            collaborative: false,
        };
        let playlist = state
            .spotify
            .create_playlist(token, &owner, &request)
            .await?;
        state.spotify.add_tracks(token, &playlist.id, &uris).await?;

        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair("playlist_name", &name)
            .finish();
        Ok::<_, AppError>(Redirect::to(&format!("/success?{query}")))
    }
    .await;
    (jar, result)
}

/// Adds one song per line to a playlist the user already owns.
pub async fn import_to_existing_playlist<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Form(form): Form<ImportForm>,
) -> (CookieJar, Result<Redirect, AppError>) {
    let (jar, session) = state.session(jar);
    let result = async {
        let playlist_id = required(Some(form.playlist_id.as_str()), "playlist_id")?;
        let songs = song_lines(&form.song_recommendations);
        if songs.is_empty() {
            return Err(AppError::MissingInput("song_recommendations"));
        }

        let credential = state.credential(&session, &modify_scopes()).await?;
        let token = credential.access_token.as_str();

        let uris = resolve_tracks(&state.spotify, token, &songs).await?;
        state.spotify.add_tracks(token, &playlist_id, &uris).await?;
        Ok::<_, AppError>(Redirect::to("/success"))
    }
    .await;
    (jar, result)
}

pub async fn playlists<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
) -> (CookieJar, Result<Json<Value>, JsonError>) {
    let (jar, session) = state.session(jar);
    let result = async {
        let scopes = Scopes::from_iter([PLAYLIST_READ_PRIVATE]);
        let credential = state.credential(&session, &scopes).await?;
        let listing = state
            .spotify
            .current_user_playlists(&credential.access_token, PLAYLIST_PAGE_SIZE)
            .await?;
        Ok::<_, JsonError>(Json(json!({ "items": listing.items })))
    }
    .await;
    (jar, result)
}

pub async fn success(Query(params): Query<SuccessParams>) -> Html<String> {
    let body = match params.playlist_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => format!(
            "<h2>Playlist \"{}\" is ready.</h2><p><a href=\"/\">Make another one</a></p>",
            escape_html(name)
        ),
        _ => "<h2>Songs added.</h2><p><a href=\"/\">Back</a></p>".to_string(),
    };
    Html(page("Done", &body))
}

async fn resolve_tracks(
    spotify: &SpotifyClient,
    token: &str,
    songs: &[String],
) -> Result<Vec<String>, ApiError> {
    let mut uris = Vec::with_capacity(songs.len());
    for song in songs {
        if let Some(track) = spotify.search_first(token, song).await? {
            uris.push(track.uri);
        }
    }
    Ok(uris)
}
