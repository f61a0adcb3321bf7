use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::SessionId;

pub const SESSION_COOKIE_NAME: &str = "playlistgen_session";

/// Create the session cookie.
pub fn session_cookie(id: &SessionId, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, id.as_str().to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .build()
}

/// Returns the session carried by the request, or starts a new one.
///
/// A missing or malformed cookie yields a fresh id and a jar that sets it.
pub fn session_from_jar(jar: CookieJar, secure: bool) -> (CookieJar, SessionId) {
    if let Some(id) = jar
        .get(SESSION_COOKIE_NAME)
        .and_then(|cookie| SessionId::parse(cookie.value()))
    {
        return (jar, id);
    }

    let id = SessionId::generate();
    let jar = jar.add(session_cookie(&id, secure));
    (jar, id)
}
