//! Delegated credential acquisition and renewal.

mod refresher;

pub use refresher::TokenRefresher;

use async_trait::async_trait;
use replydesk_oauth::{AuthorizationCodeFlow, Token};
use url::Url;

/// The mail provider's `OAuth2` endpoints, as seen by this crate.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Builds the consent URL. Has no side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be constructed.
    fn authorization_url(&self, state: &str) -> replydesk_oauth::Result<Url>;

    /// Trades a one-time authorization code for a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the code or is unreachable.
    async fn exchange_code(&self, code: &str) -> replydesk_oauth::Result<Token>;

    /// Trades the credential's refresh token for a new access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider rejects the refresh token or is unreachable.
    async fn refresh(&self, credential: &Token) -> replydesk_oauth::Result<Token>;
}

#[async_trait]
impl TokenExchange for AuthorizationCodeFlow {
    fn authorization_url(&self, state: &str) -> replydesk_oauth::Result<Url> {
        Self::authorization_url(self, None, Some(state))
    }

    async fn exchange_code(&self, code: &str) -> replydesk_oauth::Result<Token> {
        Self::exchange_code(self, code).await
    }

    async fn refresh(&self, credential: &Token) -> replydesk_oauth::Result<Token> {
        self.client().refresh_token(credential).await
    }
}
