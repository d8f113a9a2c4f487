//! Mail gateway: the single path to the mail provider.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use replydesk_oauth::Token;
use tracing::warn;
use url::Url;

use super::{MailError, MailMessage, MailProvider, OutgoingMessage, SentMessage};
use crate::auth::TokenExchange;
use crate::error::{ServiceError, ServiceResult};
use crate::store::UserId;

/// Mediates every call to the mail provider.
///
/// The gateway holds no user state: callers pass an already validated
/// credential into each call. Provider failures are reported once, with
/// the provider's message, and never retried here.
#[derive(Clone)]
pub struct MailGateway {
    exchange: Arc<dyn TokenExchange>,
    provider: Arc<dyn MailProvider>,
    timeout: Duration,
}

impl MailGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        exchange: Arc<dyn TokenExchange>,
        provider: Arc<dyn MailProvider>,
        timeout: Duration,
    ) -> Self {
        Self {
            exchange,
            provider,
            timeout,
        }
    }

    /// Consent URL for `user`. The user id travels in `state`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Provider`] if the provider configuration
    /// cannot produce a URL.
    pub fn authorization_url(&self, user: UserId) -> ServiceResult<Url> {
        self.exchange
            .authorization_url(&user.to_string())
            .map_err(|e| ServiceError::Provider(e.to_string()))
    }

    /// Trades a one-time authorization code for a credential.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::ExchangeFailed`] if the code is empty, rejected,
    /// or the exchange fails or times out.
    pub async fn exchange_code(&self, code: &str) -> ServiceResult<Token> {
        let code = code.trim();
        if code.is_empty() {
            return Err(ServiceError::ExchangeFailed("authorization code is empty".into()));
        }

        match tokio::time::timeout(self.timeout, self.exchange.exchange_code(code)).await {
            Ok(Ok(token)) => Ok(token),
            Ok(Err(e)) => {
                warn!("Authorization code exchange failed: {e}");
                Err(ServiceError::ExchangeFailed(e.to_string()))
            }
            Err(_) => Err(ServiceError::ExchangeFailed(format!(
                "token endpoint timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Lists recent messages with a validated credential.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Provider`] on any provider failure or timeout.
    pub async fn list_messages(&self, credential: &Token) -> ServiceResult<Vec<MailMessage>> {
        self.bounded("list messages", self.provider.list_messages(credential))
            .await
    }

    /// Sends a message with a validated credential.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for a malformed recipient and
    /// [`ServiceError::Provider`] on any provider failure or timeout.
    pub async fn send_message(
        &self,
        credential: &Token,
        message: &OutgoingMessage,
    ) -> ServiceResult<SentMessage> {
        message
            .validate()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;
        self.bounded("send message", self.provider.send_message(credential, message))
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T, MailError>>,
    ) -> ServiceResult<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(MailError::InvalidMessage(msg))) => Err(ServiceError::InvalidInput(msg)),
            Ok(Err(e)) => {
                warn!("Gmail {operation} failed: {e}");
                Err(ServiceError::Provider(e.to_string()))
            }
            Err(_) => {
                warn!("Gmail {operation} timed out after {:?}", self.timeout);
                Err(ServiceError::Provider(format!(
                    "{operation} timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

impl std::fmt::Debug for MailGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailGateway")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
