//! `OAuth2` authorization flows.

mod code;

pub use code::AuthorizationCodeFlow;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::token::{ErrorResponse, Token, TokenResponse};

/// Default timeout applied to every token endpoint request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Common `OAuth2` client configuration.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    /// Client secret (optional for public clients).
    pub client_secret: Option<String>,
    /// Redirect URI for authorization code flow.
    pub redirect_uri: Option<String>,
    /// Provider configuration.
    pub provider: Provider,
    /// Upper bound for a single token endpoint round trip.
    pub timeout: Duration,
    /// HTTP client.
    http_client: Client,
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, provider: Provider) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            provider,
            timeout: DEFAULT_TIMEOUT,
            http_client: Client::new(),
        }
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the redirect URI.
    #[must_use]
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Sets the token endpoint timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Refreshes an access token using its refresh token.
    ///
    /// The returned token keeps the previous refresh token when the provider
    /// does not issue a new one.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh fails or if the token has no refresh token.
    pub async fn refresh_token(&self, token: &Token) -> Result<Token> {
        let refresh_token = token.refresh_token()?;

        let mut params = HashMap::new();
        params.insert("grant_type", "refresh_token");
        params.insert("refresh_token", refresh_token);
        params.insert("client_id", &self.client_id);

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "requesting token refresh");
        let new_token = self.post_token_request(&params).await?;
        Ok(new_token.retaining_refresh_token(token))
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange fails.
    pub(crate) async fn exchange_code(&self, code: &str) -> Result<Token> {
        let mut params = HashMap::new();
        params.insert("grant_type", "authorization_code");
        params.insert("code", code);
        params.insert("client_id", &self.client_id);

        if let Some(uri) = &self.redirect_uri {
            params.insert("redirect_uri", uri);
        }

        if let Some(secret) = &self.client_secret {
            params.insert("client_secret", secret);
        }

        debug!(provider = %self.provider.name, "exchanging authorization code");
        self.post_token_request(&params).await
    }

    async fn post_token_request(&self, params: &HashMap<&str, &str>) -> Result<Token> {
        let request = self
            .http_client
            .post(self.provider.token_url.clone())
            .form(params)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| Error::Timeout(self.timeout.as_secs()))??;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(provider = %self.provider.name, %status, "token endpoint rejected request");
            return Err(parse_error_body(status.as_u16(), &body));
        }

        let token_response: TokenResponse = serde_json::from_str(&body)?;
        Token::from_response(token_response, Utc::now())
    }
}

/// Interprets a non-success token endpoint body.
fn parse_error_body(status: u16, body: &str) -> Error {
    serde_json::from_str::<ErrorResponse>(body).map_or_else(
        |_| Error::InvalidResponse(format!("status {status}: {}", truncate(body, 200))),
        ErrorResponse::into_error,
    )
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_client_creation() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client_id", provider);
        assert_eq!(client.client_id, "test_client_id");
        assert!(client.client_secret.is_none());
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_oauth_client_with_secret() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client_id", provider)
            .with_client_secret("secret")
            .with_redirect_uri("http://localhost:8080")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(client.client_secret.as_deref(), Some("secret"));
        assert_eq!(
            client.redirect_uri.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(client.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_error_body_oauth_json() {
        let err = parse_error_body(400, r#"{"error":"invalid_grant"}"#);
        assert!(err.is_invalid_grant());
    }

    #[test]
    fn test_parse_error_body_non_json() {
        let err = parse_error_body(502, "<html>Bad Gateway</html>");
        match err {
            Error::InvalidResponse(msg) => assert!(msg.contains("502")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_makes_no_request() {
        // Unroutable endpoint: reaching the network would fail differently.
        let provider = Provider::new(
            "Local",
            "http://127.0.0.1:9/authorize",
            "http://127.0.0.1:9/token",
        )
        .unwrap();
        let client = OAuthClient::new("id", provider);
        let token = Token::new("A1", Utc::now());

        let err = client.refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, Error::NoRefreshToken));
    }

    #[tokio::test]
    async fn test_refresh_against_closed_port_is_http_error() {
        let provider = Provider::new(
            "Local",
            "http://127.0.0.1:9/authorize",
            "http://127.0.0.1:9/token",
        )
        .unwrap();
        let client = OAuthClient::new("id", provider).with_timeout(Duration::from_secs(5));
        let token = Token::new("A1", Utc::now()).with_refresh_token("R1");

        let err = client.refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, Error::Http(_) | Error::Timeout(_)));
    }
}
