//! `OAuth2` token types and management.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Delegated credential: an access token with its absolute expiry and the
/// long-lived refresh token used to renew it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Access token string.
    pub access_token: String,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Absolute expiration instant of the access token.
    pub expires_at: DateTime<Utc>,
    /// Refresh token for obtaining new access tokens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope granted by authorization server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Creates a new bearer token expiring at `expires_at`.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: "Bearer".to_string(),
            expires_at,
            refresh_token: None,
            scope: None,
        }
    }

    /// Creates a token from a token endpoint response received at `issued_at`.
    ///
    /// An empty `refresh_token` in the response is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the response has no access token or no lifetime.
    pub fn from_response(response: TokenResponse, issued_at: DateTime<Utc>) -> Result<Self> {
        if response.access_token.is_empty() {
            return Err(Error::InvalidResponse("empty access_token".into()));
        }
        let expires_in = response
            .expires_in
            .ok_or_else(|| Error::InvalidResponse("missing expires_in".into()))?;
        let lifetime = i64::try_from(expires_in)
            .map_err(|_| Error::InvalidResponse(format!("expires_in out of range: {expires_in}")))?;

        Ok(Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: issued_at + Duration::seconds(lifetime),
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            scope: response.scope,
        })
    }

    /// Checks if the access token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks expiry against an explicit instant. A token expiring exactly
    /// at `now` counts as expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Returns true if the token is valid (not expired).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.is_expired()
    }

    /// Sets the refresh token. Empty strings clear it.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        let refresh_token = refresh_token.into();
        self.refresh_token = (!refresh_token.is_empty()).then_some(refresh_token);
        self
    }

    /// Keeps `previous`'s refresh token when this token carries none.
    ///
    /// Providers commonly omit the refresh token on renewal.
    #[must_use]
    pub fn retaining_refresh_token(mut self, previous: &Self) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token.clone_from(&previous.refresh_token);
        }
        self
    }

    /// Returns the refresh token if available.
    ///
    /// # Errors
    ///
    /// Returns an error if no refresh token is available.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or(Error::NoRefreshToken)
    }

    /// Returns true if a usable refresh token is present.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token().is_ok()
    }
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Token response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type.
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Error response from `OAuth2` server.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub error: String,
    /// Error description.
    #[serde(default)]
    pub error_description: String,
}

impl ErrorResponse {
    /// Converts to an Error.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::oauth_error(self.error, self.error_description)
    }
}
