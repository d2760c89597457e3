//! Process-wide OAuth2 client-credentials token cache.
//!
//! One [`SharedTokenCache`] is created at start-up and shared by every
//! virtual user through an `Arc`. Callers hit a lock-free-in-practice fast
//! path while the token is valid; when it is not, a single caller performs
//! the token exchange while the rest wait on the authentication lock and then
//! pick up the fresh token on the double-check.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use scoreload_domain::{
    AccessToken, AuthSettings, CachedToken, ClientIdentity, RequestSpec, StatusCode,
    TokenResponse,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::ports::{Clock, HttpClient, HttpClientError, SettingsSource};

/// Why a token could not be obtained.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token endpoint answered with something other than `200 OK`.
    #[error("authentication failed: {status} - {body}")]
    Rejected {
        /// Response status
        status: StatusCode,
        /// Response body, for diagnostics
        body: String,
    },

    /// `200 OK` without a usable `access_token` field.
    #[error("access token not found in response: {body}")]
    MissingAccessToken {
        /// Response body, for diagnostics
        body: String,
    },

    /// `200 OK` with a body that is not a token response.
    #[error("malformed token response: {message}")]
    MalformedResponse {
        /// Decoder message
        message: String,
        /// Response body, for diagnostics
        body: String,
    },

    /// The grant request could not be encoded.
    #[error("failed to encode token request: {0}")]
    Encode(#[source] serde_json::Error),

    /// The token request never got an answer.
    #[error(transparent)]
    Transport(#[from] HttpClientError),
}

impl TokenError {
    /// True for network failures, as opposed to answers the server gave.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Observable state of the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStatus {
    /// No token has been obtained, or it was cleared.
    Empty,
    /// A token is cached, unexpired and issued to the current identity.
    Valid {
        /// Buffered expiry
        expires_at: DateTime<Utc>,
        /// Seconds until the cache will refresh
        seconds_remaining: i64,
    },
    /// A token is cached but expired or issued to another identity.
    Stale {
        /// True if the configured identity no longer matches
        identity_changed: bool,
    },
}

impl CacheStatus {
    /// Returns true if the next `get_token` will not hit the network.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

/// Shared, lazily refreshed client-credentials token.
pub struct SharedTokenCache {
    settings: Arc<dyn SettingsSource>,
    clock: Arc<dyn Clock>,
    slot: RwLock<Option<CachedToken>>,
    auth_lock: Mutex<()>,
    auth_requests: AtomicU64,
}

impl SharedTokenCache {
    /// Creates an empty cache reading settings and time from the given ports.
    #[must_use]
    pub fn new(settings: Arc<dyn SettingsSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            settings,
            clock,
            slot: RwLock::new(None),
            auth_lock: Mutex::new(()),
            auth_requests: AtomicU64::new(0),
        }
    }

    /// Returns a valid token, authenticating if needed.
    ///
    /// Answers from the token endpoint that do not yield a token are logged
    /// and reported as `Ok(None)`; the caller decides whether to retry.
    ///
    /// # Errors
    ///
    /// Returns the transport error if the token request itself failed.
    pub async fn get_token<C>(&self, client: &C) -> Result<Option<AccessToken>, HttpClientError>
    where
        C: HttpClient + ?Sized,
    {
        match self.try_get_token(client).await {
            Ok(token) => Ok(Some(token)),
            Err(TokenError::Transport(err)) => Err(err),
            Err(err) => {
                warn!(error = %err, "Could not obtain shared token");
                Ok(None)
            }
        }
    }

    /// Like [`get_token`](Self::get_token) but keeps the failure details.
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] describing why no token is available.
    pub async fn try_get_token<C>(&self, client: &C) -> Result<AccessToken, TokenError>
    where
        C: HttpClient + ?Sized,
    {
        let settings = self.settings.auth_settings();
        let identity = settings.identity();

        if let Some(token) = self.valid_token(&identity) {
            return Ok(token);
        }

        let _auth = self.auth_lock.lock().await;
        self.drop_foreign_token(&identity);

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_token(&identity) {
            return Ok(token);
        }

        let fresh = self.authenticate(client, &settings, identity).await?;
        let token = fresh.access_token.clone();
        *self.slot.write() = Some(fresh);
        Ok(token)
    }

    /// Discards the cached token, expiry and identity.
    pub fn clear(&self) {
        if self.slot.write().take().is_some() {
            debug!("Shared token cleared");
        }
    }

    /// Reports the cache state relative to the current settings and time.
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        let identity = self.settings.auth_settings().identity();
        let now = self.clock.now();
        match self.slot.read().as_ref() {
            None => CacheStatus::Empty,
            Some(cached) if !cached.is_issued_by(&identity) => CacheStatus::Stale {
                identity_changed: true,
            },
            Some(cached) if cached.is_valid_at(now) => CacheStatus::Valid {
                expires_at: cached.expires_at,
                seconds_remaining: cached.seconds_until_expiry(now),
            },
            Some(_) => CacheStatus::Stale {
                identity_changed: false,
            },
        }
    }

    /// Number of token requests sent so far.
    #[must_use]
    pub fn auth_requests(&self) -> u64 {
        self.auth_requests.load(Ordering::Relaxed)
    }

    fn valid_token(&self, identity: &ClientIdentity) -> Option<AccessToken> {
        let now = self.clock.now();
        self.slot
            .read()
            .as_ref()
            .filter(|cached| cached.is_issued_by(identity) && cached.is_valid_at(now))
            .map(|cached| cached.access_token.clone())
    }

    fn drop_foreign_token(&self, identity: &ClientIdentity) {
        let mut slot = self.slot.write();
        if slot.as_ref().is_some_and(|cached| !cached.is_issued_by(identity)) {
            *slot = None;
            info!(
                client_id = %identity.client_id,
                api_host = %identity.api_host,
                "Credentials or host changed, discarding shared token"
            );
        }
    }

    async fn authenticate<C>(
        &self,
        client: &C,
        settings: &AuthSettings,
        identity: ClientIdentity,
    ) -> Result<CachedToken, TokenError>
    where
        C: HttpClient + ?Sized,
    {
        let body = serde_json::to_value(settings.grant_request()).map_err(TokenError::Encode)?;
        let request = RequestSpec::post_json(settings.token_url(), body)
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "application/json");

        info!(url = %request.url, "Authenticating to get shared token");
        self.auth_requests.fetch_add(1, Ordering::Relaxed);
        let response = client.execute(&request).await?;

        if !response.status.is_ok() {
            return Err(TokenError::Rejected {
                status: response.status,
                body: response.text(),
            });
        }

        let parsed: TokenResponse =
            response
                .json()
                .map_err(|e| TokenError::MalformedResponse {
                    message: e.to_string(),
                    body: response.text(),
                })?;
        let Some(access_token) = parsed.access_token() else {
            return Err(TokenError::MissingAccessToken {
                body: response.text(),
            });
        };

        let expires_in = parsed
            .expires_in
            .unwrap_or(settings.default_token_expiry_secs);
        if expires_in <= 0 {
            return Err(TokenError::MalformedResponse {
                message: format!("expires_in must be positive, got {expires_in}"),
                body: response.text(),
            });
        }
        let cached = CachedToken::issue(
            AccessToken::new(access_token),
            self.clock.now(),
            expires_in,
            settings.refresh_buffer_secs,
            identity,
        );

        info!(
            token = %cached.access_token.preview(),
            expires_in,
            "Shared token obtained"
        );
        Ok(cached)
    }
}

impl std::fmt::Debug for SharedTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTokenCache")
            .field("status", &self.status())
            .field("auth_requests", &self.auth_requests())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MockHttpClient, SwitchableSettings};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    const TOKEN_PATH: &str = "/authorisation/token";

    fn settings(client_id: &str) -> AuthSettings {
        AuthSettings::new(
            "https://api.example.com/v1",
            client_id,
            format!("{client_id}-secret"),
            "users:read",
        )
    }

    fn cache_at(
        start_secs: i64,
        settings: AuthSettings,
    ) -> (SharedTokenCache, Arc<ManualClock>, Arc<SwitchableSettings>) {
        let clock = Arc::new(ManualClock::at(start_secs));
        let source = Arc::new(SwitchableSettings::new(settings));
        let cache = SharedTokenCache::new(source.clone(), clock.clone());
        (cache, clock, source)
    }

    fn token_ok(token: &str, expires_in: i64) -> MockHttpClient {
        let body = json!({"access_token": token, "expires_in": expires_in});
        MockHttpClient::always(200, body)
    }

    #[tokio::test]
    async fn test_first_call_authenticates_with_client_credentials() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        let client = token_ok("abc123", 3600);

        let token = cache.get_token(&client).await.unwrap();

        assert_eq!(token.unwrap().as_str(), "abc123");
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.url, "https://api.example.com/v1/authorisation/token");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(
            request.body,
            Some(json!({
                "grant_type": "client_credentials",
                "client_id": "alpha",
                "client_secret": "alpha-secret",
                "scope": "users:read"
            }))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_authentication() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        let cache = Arc::new(cache);
        let client = Arc::new(token_ok("shared", 3600).with_delay(Duration::from_millis(50)));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = cache.clone();
                let client = client.clone();
                tokio::spawn(async move { cache.get_token(client.as_ref()).await })
            })
            .collect();

        for handle in handles {
            let token = handle.await.unwrap().unwrap().unwrap();
            assert_eq!(token.as_str(), "shared");
        }
        assert_eq!(client.calls_to(TOKEN_PATH), 1);
        assert_eq!(cache.auth_requests(), 1);
    }

    #[tokio::test]
    async fn test_expiry_honours_refresh_buffer() {
        let (cache, clock, _) = cache_at(0, settings("alpha"));
        let client = token_ok("abc123", 600);

        cache.get_token(&client).await.unwrap();

        // 600 s lifetime minus the 60 s buffer: valid until t = 540.
        clock.set(539);
        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 1);

        clock.set(541);
        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
    }

    #[tokio::test]
    async fn test_hour_long_token_refreshes_at_expiry() {
        let (cache, clock, _) = cache_at(0, settings("alpha"));
        let client = token_ok("abc123", 3600);

        cache.get_token(&client).await.unwrap();

        clock.set(3000);
        let token = cache.get_token(&client).await.unwrap().unwrap();
        assert_eq!(token.as_str(), "abc123");
        assert_eq!(client.calls_to(TOKEN_PATH), 1);

        clock.set(3600);
        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
    }

    #[tokio::test]
    async fn test_missing_expires_in_uses_default_lifetime() {
        let (cache, clock, _) = cache_at(0, settings("alpha"));
        let client = MockHttpClient::always(200, json!({"access_token": "abc123"}));

        cache.get_token(&client).await.unwrap();
        assert_eq!(
            cache.status(),
            CacheStatus::Valid {
                expires_at: ManualClock::instant(3540),
                seconds_remaining: 3540,
            }
        );

        clock.set(3540);
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                identity_changed: false
            }
        );
    }

    #[tokio::test]
    async fn test_identity_change_invalidates_unexpired_token() {
        let (cache, _, source) = cache_at(0, settings("alpha"));
        let client = MockHttpClient::sequence(vec![
            (200, json!({"access_token": "first", "expires_in": 3600})),
            (200, json!({"access_token": "second", "expires_in": 3600})),
        ]);

        assert_eq!(cache.get_token(&client).await.unwrap().unwrap().as_str(), "first");

        source.replace(settings("beta"));
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                identity_changed: true
            }
        );

        let token = cache.get_token(&client).await.unwrap().unwrap();
        assert_eq!(token.as_str(), "second");
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
        assert_eq!(client.requests()[1].body.as_ref().unwrap()["client_id"], "beta");

        // Stays cached under the new identity.
        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
    }

    #[tokio::test]
    async fn test_host_change_alone_invalidates() {
        let (cache, _, source) = cache_at(0, settings("alpha"));
        let client = token_ok("abc123", 3600);
        cache.get_token(&client).await.unwrap();

        let mut moved = settings("alpha");
        moved.api_host = "https://other.example.com/v1".to_string();
        source.replace(moved);

        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
        assert_eq!(
            client.requests()[1].url,
            "https://other.example.com/v1/authorisation/token"
        );
    }

    #[tokio::test]
    async fn test_failed_refresh_after_clear_returns_none_and_retries() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        let client = MockHttpClient::sequence(vec![
            (200, json!({"access_token": "abc123", "expires_in": 3600})),
            (401, json!({"error": "invalid_client"})),
            (200, json!({"access_token": "again", "expires_in": 3600})),
        ]);

        cache.get_token(&client).await.unwrap();
        cache.clear();

        assert_eq!(cache.get_token(&client).await.unwrap(), None);
        assert_eq!(cache.status(), CacheStatus::Empty);

        let token = cache.get_token(&client).await.unwrap().unwrap();
        assert_eq!(token.as_str(), "again");
        assert_eq!(client.calls_to(TOKEN_PATH), 3);
    }

    #[tokio::test]
    async fn test_failure_keeps_previous_stale_token_untouched() {
        let (cache, clock, _) = cache_at(0, settings("alpha"));
        let client = MockHttpClient::sequence(vec![
            (200, json!({"access_token": "abc123", "expires_in": 120})),
            (503, json!({"error": "unavailable"})),
        ]);

        cache.get_token(&client).await.unwrap();
        clock.set(100);

        let err = cache.try_get_token(&client).await.unwrap_err();
        match err {
            TokenError::Rejected { status, body } => {
                assert_eq!(status, StatusCode::new(503));
                assert!(body.contains("unavailable"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                identity_changed: false
            }
        );
    }

    #[tokio::test]
    async fn test_malformed_success_is_not_cached() {
        let (cache, _, _) = cache_at(0, settings("alpha"));

        let empty = MockHttpClient::always(200, json!({"access_token": ""}));
        assert!(matches!(
            cache.try_get_token(&empty).await,
            Err(TokenError::MissingAccessToken { .. })
        ));

        let garbage = MockHttpClient::raw(200, b"<html>oops</html>".to_vec());
        assert!(matches!(
            cache.try_get_token(&garbage).await,
            Err(TokenError::MalformedResponse { .. })
        ));

        assert_eq!(cache.status(), CacheStatus::Empty);
    }

    #[tokio::test]
    async fn test_non_positive_lifetime_is_not_cached() {
        let (cache, _, _) = cache_at(0, settings("alpha"));

        for expires_in in [json!(0), json!(-3600), json!(i64::MIN), json!(-1e300)] {
            let client =
                MockHttpClient::always(200, json!({"access_token": "abc123", "expires_in": expires_in}));
            assert!(matches!(
                cache.try_get_token(&client).await,
                Err(TokenError::MalformedResponse { .. })
            ));
            assert_eq!(cache.get_token(&client).await.unwrap(), None);
        }
        assert_eq!(cache.status(), CacheStatus::Empty);
    }

    #[tokio::test]
    async fn test_huge_lifetime_is_capped() {
        let (cache, clock, _) = cache_at(0, settings("alpha"));
        let client = MockHttpClient::sequence(vec![
            (200, json!({"access_token": "abc123", "expires_in": i64::MAX})),
            (200, json!({"access_token": "fresh", "expires_in": 1e300})),
            (200, json!({"access_token": "fresh", "expires_in": 3600})),
        ]);

        let token = cache.get_token(&client).await.unwrap().unwrap();
        assert_eq!(token.as_str(), "abc123");
        let capped = CachedToken::MAX_LIFETIME_SECS - 60;
        assert_eq!(
            cache.status(),
            CacheStatus::Valid {
                expires_at: ManualClock::instant(capped),
                seconds_remaining: capped,
            }
        );

        clock.set(capped);
        // An out-of-range float is a malformed answer; the stale token stays put.
        assert_eq!(cache.get_token(&client).await.unwrap(), None);
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                identity_changed: false
            }
        );

        let token = cache.get_token(&client).await.unwrap().unwrap();
        assert_eq!(token.as_str(), "fresh");
        assert_eq!(client.calls_to(TOKEN_PATH), 3);
    }

    #[tokio::test]
    async fn test_lifetime_shorter_than_buffer_refreshes_every_call() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        let client = token_ok("abc123", 30);

        assert_eq!(cache.get_token(&client).await.unwrap().unwrap().as_str(), "abc123");
        assert_eq!(
            cache.status(),
            CacheStatus::Stale {
                identity_changed: false
            }
        );
        cache.get_token(&client).await.unwrap();
        assert_eq!(client.calls_to(TOKEN_PATH), 2);
    }

    #[tokio::test]
    async fn test_transport_error_propagates_and_releases_lock() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        let failing = MockHttpClient::failing(HttpClientError::ConnectionFailed("reset".into()));

        let err = cache.get_token(&failing).await.unwrap_err();
        assert_eq!(err, HttpClientError::ConnectionFailed("reset".into()));
        assert!(cache.try_get_token(&failing).await.unwrap_err().is_transport());

        // The lock was released, so a healthy client can authenticate.
        let healthy = token_ok("abc123", 3600);
        let token = tokio::time::timeout(Duration::from_secs(1), cache.get_token(&healthy))
            .await
            .expect("auth lock still held")
            .unwrap();
        assert_eq!(token.unwrap().as_str(), "abc123");
    }

    #[test]
    fn test_clear_on_empty_cache_is_noop() {
        let (cache, _, _) = cache_at(0, settings("alpha"));
        cache.clear();
        cache.clear();
        assert_eq!(cache.status(), CacheStatus::Empty);
        assert_eq!(cache.auth_requests(), 0);
    }
}
