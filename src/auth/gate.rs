use std::{
    collections::HashMap,
    sync::{Arc, Mutex as StdMutex},
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use super::{AccountsClient, AuthError, RedirectTo, Scopes};
use crate::{
    session::{SessionId, SessionStore},
    success,
    types::{Credential, TokenResponse},
    utils::oauth_state,
    warning,
};

/// Access tokens closer to expiry than this are treated as expired.
pub const EXPIRY_LEEWAY_SECS: i64 = 60;

type LockTable = StdMutex<HashMap<SessionId, Arc<Mutex<()>>>>;

/// Per-request authentication gate in front of every Spotify call.
///
/// Holds no per-user state of its own: credentials live in the injected
/// [`SessionStore`], the gate only adds a lock per session so refreshes and
/// sign-ins of one session never interleave.
pub struct AuthGate<S> {
    store: Arc<S>,
    accounts: Arc<AccountsClient>,
    locks: Arc<LockTable>,
    leeway: Duration,
}

impl<S: SessionStore> AuthGate<S> {
    pub fn new(store: Arc<S>, accounts: AccountsClient) -> Self {
        AuthGate {
            store,
            accounts: Arc::new(accounts),
            locks: Arc::new(StdMutex::new(HashMap::new())),
            leeway: Duration::seconds(EXPIRY_LEEWAY_SECS),
        }
    }

    /// Overrides the expiry leeway.
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn accounts(&self) -> &AccountsClient {
        &self.accounts
    }

    /// Authorization URL for the session to sign in at.
    ///
    /// # Arguments
    ///
    /// * `session` - Session the resulting code will belong to
    /// * `required` - Scopes the caller needs, added to the configured defaults
    ///
    /// # Returns
    ///
    /// A [`RedirectTo`] whose `state` parameter is derived from the session,
    /// see [`AuthGate::verify_state`].
    pub fn authorize_url(&self, session: &SessionId, required: &Scopes) -> RedirectTo {
        let scopes = self.accounts.settings().default_scopes.union(required);
        self.accounts.authorize_url(&scopes, &oauth_state(session.as_str()))
    }

    /// Whether `state` from a callback was issued for this session.
    pub fn verify_state(&self, session: &SessionId, state: &str) -> bool {
        oauth_state(session.as_str()) == state
    }

    /// Returns a usable credential for the session or the URL to sign in at.
    ///
    /// # Arguments
    ///
    /// * `session` - Session whose stored credential is checked
    /// * `required` - Scopes the route needs; the credential must grant all
    ///
    /// # Errors
    ///
    /// Returns a [`RedirectTo`] to the authorization page when there is no
    /// credential, it lacks a scope, or it expired and could not be refreshed.
    ///
    /// A cached credential that is still valid and grants `required` comes
    /// back without any network call. An expired one is refreshed once;
    /// concurrent callers on the same session wait for that refresh and reuse
    /// its result. The refresh keeps running if the caller goes away.
    pub async fn ensure_authenticated(
        &self,
        session: &SessionId,
        required: &Scopes,
    ) -> Result<Credential, RedirectTo> {
        match load(&*self.store, session).await {
            Some(cached) if !cached.scope.covers(required) => {
                return Err(self.authorize_url(session, required));
            }
            Some(cached) if cached.is_valid_at(Utc::now(), self.leeway) => return Ok(cached),
            Some(cached) if cached.refresh_token.is_some() => {}
            _ => return Err(self.authorize_url(session, required)),
        }

        match self.refresh(session).await {
            Some(fresh) if fresh.scope.covers(required) => Ok(fresh),
            _ => Err(self.authorize_url(session, required)),
        }
    }

    /// Finishes the redirect round trip by exchanging `code` for tokens.
    ///
    /// The session is only written when the exchange succeeded. The code is
    /// never retried: a second submission fails upstream and is reported.
    ///
    /// # Errors
    ///
    /// * [`AuthError::ExchangeFailed`] - the accounts service refused the code
    /// * [`AuthError::Upstream`] - it timed out or answered with a 5xx
    /// * [`AuthError::Store`] - the credential could not be saved
    pub async fn complete_authorization(
        &self,
        session: &SessionId,
        code: &str,
    ) -> Result<Credential, AuthError> {
        let guard = self.session_lock(session).lock_owned().await;

        let store = Arc::clone(&self.store);
        let accounts = Arc::clone(&self.accounts);
        let id = session.clone();
        let code = code.to_string();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let response = accounts.exchange_code(&code).await?;
            let fallback = &accounts.settings().default_scopes;
            let credential = credential_from_grant(response, None, fallback, Utc::now());
            store.set(&id, credential.clone()).await?;
            Ok::<_, AuthError>(credential)
        });

        let result = match task.await {
            Ok(result) => result,
            Err(e) => Err(AuthError::Upstream(format!("token exchange task failed: {e}"))),
        };
        self.prune_locks();

        match &result {
            Ok(_) => success!("Session {} signed in", session),
            Err(e) => warning!("Sign-in for session {} failed: {}", session, e),
        }
        result
    }

    /// Forgets the session's credential.
    pub async fn sign_out(&self, session: &SessionId) -> Result<(), AuthError> {
        let _guard = self.session_lock(session).lock_owned().await;
        self.store.remove(session).await?;
        Ok(())
    }

    async fn refresh(&self, session: &SessionId) -> Option<Credential> {
        let guard = self.session_lock(session).lock_owned().await;

        let store = Arc::clone(&self.store);
        let accounts = Arc::clone(&self.accounts);
        let id = session.clone();
        let leeway = self.leeway;
        let task = tokio::spawn(async move {
            let _guard = guard;
            refresh_locked(&*store, &accounts, &id, leeway).await
        });

        let refreshed = match task.await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warning!("Refresh task for session {} failed: {}", session, e);
                None
            }
        };
        self.prune_locks();
        refreshed
    }

    fn session_lock(&self, session: &SessionId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(session.clone()).or_default())
    }

    fn prune_locks(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

async fn load<S: SessionStore>(store: &S, session: &SessionId) -> Option<Credential> {
    match store.get(session).await {
        Ok(cached) => cached,
        Err(e) => {
            warning!("Cannot read session {}: {}", session, e);
            None
        }
    }
}

// Runs with the session lock held.
async fn refresh_locked<S: SessionStore>(
    store: &S,
    accounts: &AccountsClient,
    session: &SessionId,
    leeway: Duration,
) -> Option<Credential> {
    let stale = load(store, session).await?;
    if stale.is_valid_at(Utc::now(), leeway) {
        // Somebody else refreshed while we waited for the lock.
        return Some(stale);
    }
    let refresh_token = stale.refresh_token.clone()?;

    let response = match accounts.refresh(&refresh_token).await {
        Ok(response) => response,
        Err(e) if e.is_rejected() => {
            warning!("Refresh for session {} rejected: {}", session, e);
            if let Err(e) = store.compare_and_swap(session, Some(&stale), None).await {
                warning!("Cannot clear session {}: {}", session, e);
            }
            return None;
        }
        Err(e) => {
            warning!("Refresh for session {} failed: {}", session, e);
            return None;
        }
    };

    let fresh = credential_from_grant(response, Some(&stale), &stale.scope, Utc::now());
    match store
        .compare_and_swap(session, Some(&stale), Some(fresh.clone()))
        .await
    {
        Ok(true) => Some(fresh),
        Ok(false) => load(store, session)
            .await
            .filter(|current| current.is_valid_at(Utc::now(), leeway)),
        Err(e) => {
            warning!("Cannot store refreshed credential for session {}: {}", session, e);
            None
        }
    }
}

/// Turns a token endpoint response into a credential.
///
/// Missing `refresh_token` and `scope` fall back to `previous`, then to
/// `fallback_scope`.
pub fn credential_from_grant(
    response: TokenResponse,
    previous: Option<&Credential>,
    fallback_scope: &Scopes,
    now: DateTime<Utc>,
) -> Credential {
    let refresh_token = response
        .refresh_token
        .filter(|token| !token.is_empty())
        .or_else(|| previous.and_then(|p| p.refresh_token.clone()));
    let scope = response
        .scope
        .map(|raw| Scopes::parse(&raw))
        .or_else(|| previous.map(|p| p.scope.clone()))
        .unwrap_or_else(|| fallback_scope.clone());

    Credential {
        access_token: response.access_token,
        refresh_token,
        expires_at: now + Duration::seconds(response.expires_in.max(0)),
        scope,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use reqwest::Client;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{config::OAuthSettings, session::MemorySessionStore};

    const SCOPE: &str = "playlist-modify-public playlist-read-private";

    fn gate(server: &MockServer) -> AuthGate<MemorySessionStore> {
        let settings = OAuthSettings {
            client_id: "client-id".to_string(),
            client_secret: "client-secret".to_string(),
            redirect_uri: "http://127.0.0.1:5000/callback".to_string(),
            auth_url: url::Url::parse("https://accounts.example.com/authorize").unwrap(),
            token_url: format!("{}/api/token", server.uri()),
            default_scopes: Scopes::parse("playlist-modify-public"),
            show_dialog: false,
        };
        let http = Client::builder()
            .timeout(StdDuration::from_secs(2))
            .build()
            .unwrap();
        AuthGate::new(Arc::new(MemorySessionStore::new()), AccountsClient::new(http, settings))
    }

    fn credential(token: &str, expires_in: i64, refresh: Option<&str>) -> Credential {
        Credential {
            access_token: token.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scope: Scopes::parse(SCOPE),
        }
    }

    fn token_body(access: &str, refresh: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "access_token": access,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": SCOPE,
        });
        if let Some(refresh) = refresh {
            body["refresh_token"] = serde_json::Value::from(refresh);
        }
        body
    }

    #[tokio::test]
    async fn empty_session_is_redirected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let gate = gate(&server);

        let redirect = gate
            .ensure_authenticated(&SessionId::generate(), &Scopes::parse("playlist-read-private"))
            .await
            .unwrap_err();

        let url = url::Url::parse(&redirect.0).unwrap();
        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(Scopes::parse(&scope), Scopes::parse(SCOPE));
    }

    #[tokio::test]
    async fn redirect_state_belongs_to_the_session() {
        let server = MockServer::start().await;
        let gate = gate(&server);
        let session = SessionId::generate();
        let other = SessionId::generate();

        let redirect = gate
            .ensure_authenticated(&session, &Scopes::none())
            .await
            .unwrap_err();
        let url = url::Url::parse(&redirect.0).unwrap();
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        assert!(gate.verify_state(&session, &state));
        assert!(!gate.verify_state(&other, &state));
        assert!(!gate.verify_state(&session, ""));
    }

    #[tokio::test]
    async fn valid_credential_is_returned_without_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        let cached = credential("cached", 3600, Some("refresh"));
        gate.store().set(&session, cached.clone()).await.unwrap();

        let got = gate
            .ensure_authenticated(&session, &Scopes::parse("playlist-read-private"))
            .await
            .unwrap();
        assert_eq!(got, cached);
    }

    #[tokio::test]
    async fn insufficient_scope_redirects_even_when_valid() {
        let server = MockServer::start().await;
        let gate = gate(&server);
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("cached", 3600, Some("refresh")))
            .await
            .unwrap();

        let result = gate
            .ensure_authenticated(&session, &Scopes::parse("playlist-modify-private"))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn expired_credential_is_refreshed_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("fresh", None)))
            .expect(1)
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        let stale = credential("stale", -10, Some("refresh"));
        gate.store().set(&session, stale.clone()).await.unwrap();

        let fresh = gate
            .ensure_authenticated(&session, &Scopes::none())
            .await
            .unwrap();

        assert_eq!(fresh.access_token, "fresh");
        assert!(fresh.expires_at > stale.expires_at);
        assert_eq!(fresh.refresh_token.as_deref(), Some("refresh"));
        assert_eq!(gate.store().get(&session).await.unwrap(), Some(fresh.clone()));

        // The old credential never comes back.
        let again = gate
            .ensure_authenticated(&session, &Scopes::none())
            .await
            .unwrap();
        assert_eq!(again, fresh);
        assert_eq!(gate.tracked_sessions(), 0);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("shared", Some("rotated")))
                    .set_delay(StdDuration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let gate = Arc::new(gate(&server));
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("stale", -10, Some("refresh")))
            .await
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                let session = session.clone();
                tokio::spawn(async move {
                    gate.ensure_authenticated(&session, &Scopes::none()).await
                })
            })
            .collect();

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert!(results.iter().all(|c| c == &results[0]));
        assert_eq!(results[0].access_token, "shared");
        assert_eq!(results[0].refresh_token.as_deref(), Some("rotated"));
    }

    #[tokio::test]
    async fn rejected_refresh_signs_the_session_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("stale", -10, Some("revoked")))
            .await
            .unwrap();

        assert!(gate.ensure_authenticated(&session, &Scopes::none()).await.is_err());
        assert_eq!(gate.store().get(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn transient_refresh_failure_keeps_the_session_but_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        let stale = credential("stale", -10, Some("refresh"));
        gate.store().set(&session, stale.clone()).await.unwrap();

        assert!(gate.ensure_authenticated(&session, &Scopes::none()).await.is_err());
        assert_eq!(gate.store().get(&session).await.unwrap(), Some(stale));
    }

    #[tokio::test]
    async fn expired_without_refresh_token_redirects() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("stale", -10, None))
            .await
            .unwrap();

        assert!(gate.ensure_authenticated(&session, &Scopes::none()).await.is_err());
    }

    #[tokio::test]
    async fn refresh_commits_even_if_the_caller_goes_away() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(token_body("late", None))
                    .set_delay(StdDuration::from_millis(300)),
            )
            .expect(1)
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("stale", -10, Some("refresh")))
            .await
            .unwrap();

        let aborted = tokio::time::timeout(
            StdDuration::from_millis(50),
            gate.ensure_authenticated(&session, &Scopes::none()),
        )
        .await;
        assert!(aborted.is_err());

        tokio::time::sleep(StdDuration::from_millis(600)).await;
        let stored = gate.store().get(&session).await.unwrap().unwrap();
        assert_eq!(stored.access_token, "late");
    }

    #[tokio::test]
    async fn authorization_code_is_single_use() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("code=ABC123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_body("first", Some("r"))))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("code=ABC123"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": "invalid_grant",
                "error_description": "Invalid authorization code"
            })))
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();

        let first = gate.complete_authorization(&session, "ABC123").await.unwrap();
        let second = gate.complete_authorization(&session, "ABC123").await;

        assert!(matches!(second, Err(AuthError::ExchangeFailed(_))));
        assert_eq!(gate.store().get(&session).await.unwrap(), Some(first.clone()));
        let ahead = first.expires_at - Utc::now();
        assert!(ahead > Duration::seconds(3500) && ahead <= Duration::seconds(3600));
    }

    #[tokio::test]
    async fn failed_exchange_leaves_the_session_untouched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let gate = gate(&server);
        let session = SessionId::generate();
        let existing = credential("existing", 3600, Some("refresh"));
        gate.store().set(&session, existing.clone()).await.unwrap();

        let result = gate.complete_authorization(&session, "whatever").await;

        assert!(matches!(result, Err(AuthError::Upstream(_))));
        assert_eq!(gate.store().get(&session).await.unwrap(), Some(existing));
    }

    #[tokio::test]
    async fn sign_out_removes_the_credential() {
        let server = MockServer::start().await;
        let gate = gate(&server);
        let session = SessionId::generate();
        gate.store()
            .set(&session, credential("cached", 3600, None))
            .await
            .unwrap();

        gate.sign_out(&session).await.unwrap();
        assert!(gate.ensure_authenticated(&session, &Scopes::none()).await.is_err());
    }

    #[test]
    fn grant_without_refresh_token_or_scope_keeps_previous_values() {
        let now = Utc::now();
        let previous = credential("old", -10, Some("keep-me"));
        let response = TokenResponse {
            access_token: "new".to_string(),
            token_type: Some("Bearer".to_string()),
            expires_in: 3600,
            refresh_token: None,
            scope: None,
        };

        let next = credential_from_grant(response, Some(&previous), &Scopes::none(), now);

        assert_eq!(next.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(next.scope, previous.scope);
        assert_eq!(next.expires_at, now + Duration::seconds(3600));
    }
}
