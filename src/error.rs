use axum::{
    Json,
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
};
use serde_json::json;

use crate::{
    auth::{AuthError, RedirectTo},
    spotify::ApiError,
    suggest::SuggestError,
    warning,
};

/// Errors returned by route handlers.
///
/// Renders as a small HTML page, or as a redirect for
/// [`AppError::NotAuthenticated`]. Wrap it in [`JsonError`] for routes that
/// answer with JSON.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The session has to sign in first.
    #[error("not authenticated")]
    NotAuthenticated(RedirectTo),

    /// The accounts service refused the authorization code.
    #[error("authorization failed: {0}")]
    AuthExchangeFailed(String),

    /// An upstream service timed out or is overloaded.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// An upstream service answered with an error.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("missing input: {0}")]
    MissingInput(&'static str),

    /// The callback's `state` was not issued for this session.
    #[error("sign-in state does not match this session")]
    InvalidState,

    #[error("not configured: {0}")]
    NotConfigured(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated(_) => StatusCode::SEE_OTHER,
            Self::AuthExchangeFailed(_) | Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamUnavailable(_) | Self::NotConfigured(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::MissingInput(_) | Self::InvalidState => StatusCode::BAD_REQUEST,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::NotAuthenticated(_) => "not_authenticated",
            Self::AuthExchangeFailed(_) => "auth_exchange_failed",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::Upstream(_) => "upstream_error",
            Self::MissingInput(_) => "missing_input",
            Self::InvalidState => "invalid_state",
            Self::NotConfigured(_) => "not_configured",
        }
    }

    fn log(&self) {
        if matches!(
            self,
            Self::UpstreamUnavailable(_)
                | Self::Upstream(_)
                | Self::AuthExchangeFailed(_)
                | Self::InvalidState
        ) {
            warning!("{}", self);
        }
    }
}

impl From<RedirectTo> for AppError {
    fn from(to: RedirectTo) -> Self {
        AppError::NotAuthenticated(to)
    }
}

impl From<ApiError> for AppError {
    fn from(err: ApiError) -> Self {
        if err.is_unavailable() {
            AppError::UpstreamUnavailable(err.to_string())
        } else {
            AppError::Upstream(err.to_string())
        }
    }
}

impl From<SuggestError> for AppError {
    fn from(err: SuggestError) -> Self {
        match err {
            SuggestError::NotConfigured => AppError::NotConfigured(err.to_string()),
            e if e.is_unavailable() => AppError::UpstreamUnavailable(e.to_string()),
            e => AppError::Upstream(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::ExchangeFailed(msg) => AppError::AuthExchangeFailed(msg),
            AuthError::Upstream(msg) => AppError::UpstreamUnavailable(msg),
            AuthError::Store(e) => AppError::Upstream(format!("session store: {e}")),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        match self {
            Self::NotAuthenticated(to) => Redirect::to(to.as_str()).into_response(),
            other => {
                let page = format!(
                    "<h2>Something went wrong.</h2><p>{}</p><p><a href=\"/\">Back</a></p>",
                    escape_html(&other.to_string())
                );
                (other.status(), Html(page)).into_response()
            }
        }
    }
}

/// [`AppError`] rendered as JSON.
///
/// A missing sign-in becomes `401 {"error":"not_authenticated","auth_url":...}`
/// so script clients can follow it themselves.
#[derive(Debug)]
pub struct JsonError(pub AppError);

impl<E> From<E> for JsonError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        JsonError(err.into())
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let err = self.0;
        err.log();
        match err {
            AppError::NotAuthenticated(to) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "not_authenticated", "auth_url": to.as_str() })),
            )
                .into_response(),
            other => (
                other.status(),
                Json(json!({ "error": other.code(), "message": other.to_string() })),
            )
                .into_response(),
        }
    }
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
