use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::{AppState, page, required};
use crate::{
    error::{AppError, escape_html},
    session::{SessionId, SessionStore},
};

#[derive(Debug, Default, Deserialize)]
pub struct AuthParams {
    pub code: Option<String>,
    pub error: Option<String>,
    pub state: Option<String>,
}

const INDEX_BODY: &str = r#"<h1>Playlist Generator</h1>
<form id="suggest">
  <input name="song" placeholder="Seed song" required>
  <input name="num_suggestions" type="number" min="1" max="50" value="10">
  <button>Suggest</button>
</form>
<form method="post" action="/generate_playlist">
  <input name="playlist_name" placeholder="Playlist name" required>
  <input name="playlist_description" placeholder="Description">
  <textarea name="song_recommendations" rows="12" cols="60"></textarea>
  <button>Create playlist</button>
</form>
<p><a href="/sign_out">Sign out</a></p>
<script>
document.getElementById("suggest").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const res = await fetch("/generate_suggestions", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ song: form.get("song"), numSuggestions: form.get("num_suggestions") }),
  });
  if (res.ok) {
    const data = await res.json();
    document.querySelector("textarea").value = data.suggestions.join("\n");
  }
});
</script>"#;

/// Start page.
///
/// Also accepts the authorization redirect itself (`/?code=...`) for
/// registrations whose redirect URI is the site root.
pub async fn index<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Query(params): Query<AuthParams>,
) -> (CookieJar, Result<Response, AppError>) {
    let (jar, session) = state.session(jar);
    if params.code.is_some() || params.error.is_some() {
        return (jar, finish_sign_in(&state, &session, params).await);
    }

    let defaults = state.gate.accounts().settings().default_scopes.clone();
    let result = state
        .credential(&session, &defaults)
        .await
        .map(|_| Html(page("Playlist Generator", INDEX_BODY)).into_response());
    (jar, result)
}

/// OAuth redirect target.
pub async fn callback<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
    Query(params): Query<AuthParams>,
) -> (CookieJar, Result<Response, AppError>) {
    let (jar, session) = state.session(jar);
    (jar, finish_sign_in(&state, &session, params).await)
}

pub async fn sign_out<S: SessionStore>(
    State(state): State<AppState<S>>,
    jar: CookieJar,
) -> (CookieJar, Result<Redirect, AppError>) {
    let (jar, session) = state.session(jar);
    let result = match state.gate.sign_out(&session).await {
        Ok(()) => Ok(Redirect::to("/")),
        Err(e) => Err(e.into()),
    };
    (jar, result)
}

async fn finish_sign_in<S: SessionStore>(
    state: &AppState<S>,
    session: &SessionId,
    params: AuthParams,
) -> Result<Response, AppError> {
    // The user declined, or Spotify refused the request.
    if let Some(error) = params.error {
        let body = format!(
            "<h2>Sign-in was not completed.</h2><p>{}</p><p><a href=\"/\">Try again</a></p>",
            escape_html(&error)
        );
        return Ok((StatusCode::BAD_REQUEST, Html(page("Sign-in failed", &body))).into_response());
    }

    let code = required(params.code.as_deref(), "code")?;
    let issued = params
        .state
        .as_deref()
        .is_some_and(|value| state.gate.verify_state(session, value));
    if !issued {
        return Err(AppError::InvalidState);
    }
    state.gate.complete_authorization(session, &code).await?;
    Ok(Redirect::to("/").into_response())
}
