use reqwest::{Client, StatusCode};
use thiserror::Error;

use super::{RedirectTo, Scopes};
use crate::{
    config::OAuthSettings,
    types::{TokenErrorResponse, TokenResponse},
};

#[derive(Debug, Error)]
pub enum TokenError {
    /// The accounts service refused the grant (bad, reused or revoked).
    #[error("token request rejected with {status}: {error}")]
    Rejected { status: StatusCode, error: String },

    /// The accounts service answered with a server error.
    #[error("accounts service returned {0}")]
    Server(StatusCode),

    /// Timeout, connection failure or an unreadable response body.
    #[error("accounts service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl TokenError {
    pub fn is_rejected(&self) -> bool {
        matches!(self, TokenError::Rejected { .. })
    }
}

/// Client for the Spotify accounts service.
///
/// Builds authorization URLs and talks to the token endpoint using the
/// client credentials from [`OAuthSettings`]. The request timeout is the one
/// configured on the shared [`Client`].
#[derive(Debug, Clone)]
pub struct AccountsClient {
    http: Client,
    settings: OAuthSettings,
}

impl AccountsClient {
    pub fn new(http: Client, settings: OAuthSettings) -> Self {
        AccountsClient { http, settings }
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Authorization endpoint URL asking for `scopes`.
    ///
    /// `state` is echoed back on the callback untouched.
    pub fn authorize_url(&self, scopes: &Scopes, state: &str) -> RedirectTo {
        let mut url = self.settings.auth_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.settings.client_id)
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &self.settings.redirect_uri)
                .append_pair("scope", &scopes.to_string())
                .append_pair("state", state);
            if self.settings.show_dialog {
                query.append_pair("show_dialog", "true");
            }
        }
        RedirectTo(url.to_string())
    }

    /// Exchanges a one-time authorization code for a token pair.
    ///
    /// Codes are single use: a second exchange of the same code is rejected
    /// by the accounts service and surfaces as [`TokenError::Rejected`].
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, TokenError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.settings.redirect_uri),
        ])
        .await
    }

    /// Trades a refresh token for a new access token.
    ///
    /// The response may omit `refresh_token` and `scope`; callers keep the
    /// previous values in that case.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, TokenError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ])
        .await
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, TokenError> {
        let res = self
            .http
            .post(&self.settings.token_url)
            .basic_auth(&self.settings.client_id, Some(&self.settings.client_secret))
            .form(form)
            .send()
            .await?;

        let status = res.status();
        if status.is_success() {
            return Ok(res.json::<TokenResponse>().await?);
        }

        if status.is_server_error() {
            return Err(TokenError::Server(status));
        }

        let error = match res.json::<TokenErrorResponse>().await {
            Ok(body) => match body.error_description {
                Some(description) => format!("{} ({})", body.error, description),
                None => body.error,
            },
            Err(_) => status.to_string(),
        };
        Err(TokenError::Rejected { status, error })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn settings(server: &MockServer, show_dialog: bool) -> OAuthSettings {
        OAuthSettings {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://127.0.0.1:5000/callback".to_string(),
            auth_url: url::Url::parse("https://accounts.example.com/authorize").unwrap(),
            token_url: format!("{}/api/token", server.uri()),
            default_scopes: Scopes::parse("playlist-modify-public"),
            show_dialog,
        }
    }

    #[tokio::test]
    async fn authorize_url_carries_the_client_and_scopes() {
        let server = MockServer::start().await;
        let client = AccountsClient::new(Client::new(), settings(&server, true));

        let RedirectTo(raw) = client.authorize_url(&Scopes::parse("b a"), "st4te");
        let url = url::Url::parse(&raw).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert_eq!(url.path(), "/authorize");
        assert!(pairs.contains(&("client_id".into(), "client-id".into())));
        assert!(pairs.contains(&("response_type".into(), "code".into())));
        assert!(pairs.contains(&(
            "redirect_uri".into(),
            "http://127.0.0.1:5000/callback".into()
        )));
        assert!(pairs.contains(&("scope".into(), "a b".into())));
        assert!(pairs.contains(&("show_dialog".into(), "true".into())));
        assert!(pairs.contains(&("state".into(), "st4te".into())));
    }

    #[tokio::test]
    async fn exchange_sends_code_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header_exists("authorization"))
            .and(body_string_contains("grant_type=authorization_code"))
            .and(body_string_contains("code=ABC123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "access",
                "token_type": "Bearer",
                "expires_in": 3600,
                "refresh_token": "refresh",
                "scope": "playlist-modify-public"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = AccountsClient::new(Client::new(), settings(&server, false));
        let token = client.exchange_code("ABC123").await.unwrap();

        assert_eq!(token.access_token, "access");
        assert_eq!(token.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(token.expires_in, 3600);
    }

    #[tokio::test]
    async fn invalid_grant_is_a_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })))
            .mount(&server)
            .await;

        let client = AccountsClient::new(Client::new(), settings(&server, false));
        let err = client.exchange_code("used").await.unwrap_err();

        assert!(err.is_rejected());
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn server_errors_and_timeouts_are_not_rejections() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("refresh_token=slow"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("refresh_token=broken"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let client = AccountsClient::new(http, settings(&server, false));

        let err = client.refresh("broken").await.unwrap_err();
        assert!(matches!(err, TokenError::Server(StatusCode::SERVICE_UNAVAILABLE)));

        let err = client.refresh("slow").await.unwrap_err();
        assert!(matches!(err, TokenError::Transport(ref e) if e.is_timeout()));
    }
}
