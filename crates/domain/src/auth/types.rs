//! Client-credentials authentication types

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::request::join_url;

/// Grant type sent in every token request.
pub const CLIENT_CREDENTIALS_GRANT: &str = "client_credentials";

/// The credentials and host a token was issued for.
///
/// Two identities are equal only if all three parts match. A cached token
/// issued under one identity is never handed out under another.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity {
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Base URL of the target API
    pub api_host: String,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("api_host", &self.api_host)
            .finish()
    }
}

/// Everything needed to run the client-credentials exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSettings {
    /// Base URL of the target API, e.g. `https://host/1777161849/api/v1`
    pub api_host: String,
    /// Token endpoint path relative to `api_host`
    pub auth_endpoint: String,
    /// OAuth2 client id
    pub client_id: String,
    /// OAuth2 client secret
    pub client_secret: String,
    /// Space-separated scopes
    pub scope: String,
    /// Lifetime assumed when the provider omits `expires_in`
    pub default_token_expiry_secs: i64,
    /// Margin subtracted from the lifetime so tokens refresh early
    pub refresh_buffer_secs: i64,
}

impl AuthSettings {
    /// Default token endpoint path.
    pub const DEFAULT_AUTH_ENDPOINT: &'static str = "/authorisation/token";
    /// Default token lifetime (one hour).
    pub const DEFAULT_TOKEN_EXPIRY_SECS: i64 = 3600;
    /// Default refresh buffer (one minute).
    pub const DEFAULT_REFRESH_BUFFER_SECS: i64 = 60;

    /// Creates settings with the default endpoint, lifetime and buffer.
    #[must_use]
    pub fn new(
        api_host: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            api_host: api_host.into(),
            auth_endpoint: Self::DEFAULT_AUTH_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope: scope.into(),
            default_token_expiry_secs: Self::DEFAULT_TOKEN_EXPIRY_SECS,
            refresh_buffer_secs: Self::DEFAULT_REFRESH_BUFFER_SECS,
        }
    }

    /// The identity tokens obtained with these settings belong to.
    #[must_use]
    pub fn identity(&self) -> ClientIdentity {
        ClientIdentity {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            api_host: self.api_host.clone(),
        }
    }

    /// Absolute URL of the token endpoint.
    #[must_use]
    pub fn token_url(&self) -> String {
        join_url(&self.api_host, &self.auth_endpoint)
    }

    /// Body of the client-credentials token request.
    #[must_use]
    pub fn grant_request(&self) -> TokenGrantRequest<'_> {
        TokenGrantRequest {
            grant_type: CLIENT_CREDENTIALS_GRANT,
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            scope: &self.scope,
        }
    }
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("api_host", &self.api_host)
            .field("auth_endpoint", &self.auth_endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .field("default_token_expiry_secs", &self.default_token_expiry_secs)
            .field("refresh_buffer_secs", &self.refresh_buffer_secs)
            .finish()
    }
}

/// JSON body of a client-credentials token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TokenGrantRequest<'a> {
    /// Always `client_credentials`
    pub grant_type: &'a str,
    /// OAuth2 client id
    pub client_id: &'a str,
    /// OAuth2 client secret
    pub client_secret: &'a str,
    /// Space-separated scopes
    pub scope: &'a str,
}

/// Token endpoint response. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// The issued access token
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub expires_in: Option<i64>,
    /// Usually `Bearer`
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// The access token, if present and non-empty.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }
}

/// Magnitude of the first float outside the `i64` range (2^63).
const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;

/// Accepts `3600`, `3600.0` or `"3600"`; providers disagree on the type.
/// Floats that do not fit an `i64` are rejected rather than saturated.
fn lenient_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(i64),
        Float(f64),
        Text(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Raw::Int(secs)) => Ok(Some(secs)),
        Some(Raw::Float(secs)) if !secs.is_finite() || secs.abs() >= I64_BOUND => Err(
            serde::de::Error::custom(format!("expires_in out of range: {secs}")),
        ),
        // In range after the guard above.
        #[allow(clippy::cast_possible_truncation)]
        Some(Raw::Float(secs)) => Ok(Some(secs.trunc() as i64)),
        Some(Raw::Text(text)) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// An opaque bearer token.
///
/// `Debug` only shows a short preview so tokens do not leak into logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a raw token string.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }

    /// First few characters of the token, for log lines.
    #[must_use]
    pub fn preview(&self) -> String {
        if self.0.chars().count() > 12 {
            format!("{}...", self.0.chars().take(8).collect::<String>())
        } else {
            self.0.clone()
        }
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("AccessToken").field(&self.preview()).finish()
    }
}

impl From<&str> for AccessToken {
    fn from(token: &str) -> Self {
        Self::new(token)
    }
}

/// A token together with its expiry and the identity that obtained it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedToken {
    /// The bearer token
    pub access_token: AccessToken,
    /// When the token endpoint answered
    pub issued_at: DateTime<Utc>,
    /// `issued_at + expires_in - refresh_buffer`
    pub expires_at: DateTime<Utc>,
    /// Credentials and host used for the exchange
    pub identity: ClientIdentity,
}

impl CachedToken {
    /// Longest lifetime honoured, whatever the provider claims (30 days).
    pub const MAX_LIFETIME_SECS: i64 = 30 * 24 * 60 * 60;

    /// Builds a cache entry, pulling the expiry forward by `refresh_buffer_secs`.
    ///
    /// The lifetime is capped at [`MAX_LIFETIME_SECS`](Self::MAX_LIFETIME_SECS).
    /// A lifetime that cannot be represented leaves the token already
    /// expired, so it is never treated as valid forever.
    #[must_use]
    pub fn issue(
        access_token: AccessToken,
        issued_at: DateTime<Utc>,
        expires_in_secs: i64,
        refresh_buffer_secs: i64,
        identity: ClientIdentity,
    ) -> Self {
        let lifetime = expires_in_secs
            .min(Self::MAX_LIFETIME_SECS)
            .saturating_sub(refresh_buffer_secs.max(0));
        let expires_at = TimeDelta::try_seconds(lifetime)
            .and_then(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(issued_at);
        Self {
            access_token,
            issued_at,
            expires_at,
            identity,
        }
    }

    /// True while `now` is strictly before the (buffered) expiry.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// True if the token was obtained with exactly this identity.
    #[must_use]
    pub fn is_issued_by(&self, identity: &ClientIdentity) -> bool {
        &self.identity == identity
    }

    /// Seconds left before the token must be refreshed.
    #[must_use]
    pub fn seconds_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds()
    }
}
