//! Authorization Code Flow implementation.

use super::OAuthClient;
use crate::error::Result;
use crate::token::Token;
use url::Url;

/// Authorization Code Flow for `OAuth2`.
///
/// The user is redirected to the provider's consent page and comes back to
/// the configured redirect URI with a one-time code.
#[derive(Debug, Clone)]
pub struct AuthorizationCodeFlow {
    client: OAuthClient,
}

impl AuthorizationCodeFlow {
    /// Creates a new authorization code flow.
    #[must_use]
    pub const fn new(client: OAuthClient) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    #[must_use]
    pub const fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Builds the authorization URL for user consent.
    ///
    /// Building the URL has no side effects.
    ///
    /// # Arguments
    ///
    /// * `scopes` - Optional scopes to request (uses provider defaults if None)
    /// * `state` - Optional state parameter echoed back on the redirect
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    pub fn authorization_url(&self, scopes: Option<&[String]>, state: Option<&str>) -> Result<Url> {
        let mut url = self.client.provider.auth_url.clone();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("client_id", &self.client.client_id)
                .append_pair("response_type", "code");

            if let Some(redirect_uri) = &self.client.redirect_uri {
                pairs.append_pair("redirect_uri", redirect_uri);
            }

            let scope_str = scopes.map_or_else(
                || self.client.provider.default_scopes.join(" "),
                |s| s.join(" "),
            );

            if !scope_str.is_empty() {
                pairs.append_pair("scope", &scope_str);
            }

            if let Some(state_val) = state {
                pairs.append_pair("state", state_val);
            }

            // Google only issues a refresh token for offline access
            if self.client.provider.name == "Google" {
                pairs
                    .append_pair("access_type", "offline")
                    .append_pair("prompt", "consent");
            }
        }

        Ok(url)
    }

    /// Exchanges the authorization code for a token set.
    ///
    /// # Errors
    ///
    /// Returns an error if the token exchange fails.
    pub async fn exchange_code(&self, code: &str) -> Result<Token> {
        self.client.exchange_code(code).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::provider::{GMAIL_READONLY_SCOPE, Provider};

    #[test]
    fn test_authorization_url() {
        let provider = Provider::google().unwrap();
        let client =
            OAuthClient::new("test_client", provider).with_redirect_uri("http://localhost:8080");

        let flow = AuthorizationCodeFlow::new(client);
        let url = flow.authorization_url(None, Some("random_state")).unwrap();

        assert!(url.as_str().contains("client_id=test_client"));
        assert!(url.as_str().contains("response_type=code"));
        assert!(url.as_str().contains("state=random_state"));
        assert!(
            url.as_str()
                .contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080")
        );
    }

    #[test]
    fn test_default_scope_is_read_only() {
        let provider = Provider::google().unwrap();
        let flow = AuthorizationCodeFlow::new(OAuthClient::new("test_client", provider));
        let url = flow.authorization_url(None, None).unwrap();

        let scope = url
            .query_pairs()
            .find(|(k, _)| k == "scope")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(scope, GMAIL_READONLY_SCOPE);
    }

    #[test]
    fn test_authorization_url_custom_scopes() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client", provider);

        let flow = AuthorizationCodeFlow::new(client);
        let scopes = vec!["email".to_string(), "profile".to_string()];
        let url = flow.authorization_url(Some(&scopes), None).unwrap();

        assert!(url.as_str().contains("scope=email+profile"));
    }

    #[test]
    fn test_google_specific_params() {
        let provider = Provider::google().unwrap();
        let client = OAuthClient::new("test_client", provider);

        let flow = AuthorizationCodeFlow::new(client);
        let url = flow.authorization_url(None, None).unwrap();

        assert!(url.as_str().contains("access_type=offline"));
        assert!(url.as_str().contains("prompt=consent"));
    }

    #[test]
    fn test_url_building_is_deterministic() {
        let provider = Provider::google().unwrap();
        let flow = AuthorizationCodeFlow::new(OAuthClient::new("c", provider));
        let a = flow.authorization_url(None, Some("s")).unwrap();
        let b = flow.authorization_url(None, Some("s")).unwrap();
        assert_eq!(a, b);
    }
}
