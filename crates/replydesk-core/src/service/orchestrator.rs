//! Per-operation sequencing: load user, validate credential, call gateway.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use replydesk_oauth::Token;
use tracing::{debug, info};
use url::Url;

use crate::auth::{TokenExchange, TokenRefresher};
use crate::config::Config;
use crate::error::{Result, ServiceError, ServiceResult};
use crate::inference::{
    Category, ChatCompletionClient, CompletionProvider, InferenceGateway, InferenceLimits,
    Sentiment, ToneHint,
};
use crate::mail::{GmailClient, MailGateway, MailMessage, MailProvider, OutgoingMessage, SentMessage};
use crate::store::{BrandVoiceRepository, CredentialStore, Database, UserId};

/// Entry point for every user-facing operation.
///
/// Credential-dependent operations run `load user -> check credential ->
/// ensure valid -> call provider`. A missing user stops at `NotFound`, a
/// missing credential at `NotConnected`, and a failed refresh at
/// `RefreshFailed`; the provider is only called with a valid credential.
pub struct Orchestrator {
    store: Arc<dyn CredentialStore>,
    refresher: TokenRefresher,
    mail: MailGateway,
    inference: InferenceGateway,
    brand_voices: Option<BrandVoiceRepository>,
}

impl Orchestrator {
    /// Wires the orchestrator from its collaborators. `timeout` bounds each
    /// external call.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        mail: Arc<dyn MailProvider>,
        completions: Arc<dyn CompletionProvider>,
        limits: InferenceLimits,
        timeout: Duration,
    ) -> Self {
        Self {
            refresher: TokenRefresher::new(Arc::clone(&store), Arc::clone(&exchange), timeout),
            mail: MailGateway::new(exchange, mail, timeout),
            inference: InferenceGateway::new(completions, limits, timeout),
            brand_voices: None,
            store,
        }
    }

    /// Uses stored brand voices for replies requested without a tone.
    #[must_use]
    pub fn with_brand_voices(mut self, brand_voices: BrandVoiceRepository) -> Self {
        self.brand_voices = Some(brand_voices);
        self
    }

    /// Production wiring: `SQLite` store, Google `OAuth2`, Gmail REST and a
    /// chat-completion API, all from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is incomplete or invalid.
    pub fn from_config(config: &Config, database: &Database) -> Result<Self> {
        config.validate()?;
        if !config.grants_send() {
            debug!("google.scopes has no gmail.send scope; sending will be refused by Gmail");
        }
        let mail = GmailClient::with_base_url(&config.gmail.api_base, config.gmail.max_results);
        let completions = ChatCompletionClient::new(
            &config.inference.api_base,
            &config.inference.api_key,
            &config.inference.model,
        );
        Ok(Self::new(
            Arc::new(database.users()),
            Arc::new(config.oauth_flow()?),
            Arc::new(mail),
            Arc::new(completions),
            config.inference_limits(),
            config.request_timeout(),
        )
        .with_brand_voices(database.brand_voices()))
    }

    /// Consent URL for connecting the user's Gmail account. No side effects.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown users.
    pub async fn connect(&self, user: UserId) -> ServiceResult<Url> {
        self.store.load(user).await?;
        self.mail.authorization_url(user)
    }

    /// Exchanges an authorization code and stores the resulting credential,
    /// replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown users and
    /// [`ServiceError::ExchangeFailed`] if the exchange fails; nothing is
    /// stored in either case.
    pub async fn complete_authorization(&self, user: UserId, code: &str) -> ServiceResult<()> {
        self.store.load(user).await?;
        let credential = self.mail.exchange_code(code).await?;
        let stored = self.refresher.store(user, credential).await?;
        info!(%user, expires_at = %stored.expires_at, "Gmail account connected");
        Ok(())
    }

    /// Stores a token set obtained elsewhere. A missing or empty refresh
    /// token keeps the one already stored.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for an empty access token and
    /// [`ServiceError::NotFound`] for unknown users.
    pub async fn store_tokens(
        &self,
        user: UserId,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> ServiceResult<()> {
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(ServiceError::InvalidInput("access token is empty".into()));
        }
        let credential = Token::new(access_token, expires_at)
            .with_refresh_token(refresh_token.map(str::trim).unwrap_or_default());
        self.refresher.store(user, credential).await?;
        info!(%user, "Stored imported Gmail tokens");
        Ok(())
    }

    /// Forgets the user's credential.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown users.
    pub async fn disconnect(&self, user: UserId) -> ServiceResult<()> {
        self.refresher.clear(user).await?;
        info!(%user, "Gmail account disconnected");
        Ok(())
    }

    /// Lists recent messages from the user's mailbox.
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotConnected`, `RefreshFailed` or `Provider`.
    pub async fn list_messages(&self, user: UserId) -> ServiceResult<Vec<MailMessage>> {
        let credential = self.valid_credential(user).await?;
        let messages = self.mail.list_messages(&credential).await?;
        debug!(%user, count = messages.len(), "Listed messages");
        Ok(messages)
    }

    /// Sends a message from the user's connected account.
    ///
    /// The default scopes are read-only. Gmail only accepts the send when
    /// the operator adds [`GMAIL_SEND_SCOPE`] to `google.scopes` and the user
    /// reconnects; otherwise the call ends in `Provider`.
    ///
    /// [`GMAIL_SEND_SCOPE`]: replydesk_oauth::provider::GMAIL_SEND_SCOPE
    ///
    /// # Errors
    ///
    /// `NotFound`, `NotConnected`, `InvalidInput`, `RefreshFailed` or
    /// `Provider`, checked in that order.
    pub async fn send_message(
        &self,
        user: UserId,
        to: &str,
        subject: &str,
        body: &str,
    ) -> ServiceResult<SentMessage> {
        // User and credential are checked before the recipient; a bad
        // address still never costs a refresh.
        let credential = self.stored_credential(user).await?;
        let message = OutgoingMessage::new(to, subject, body);
        message
            .validate()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let credential = self.refresher.ensure_valid(user, credential).await?;
        let sent = self.mail.send_message(&credential, &message).await?;
        info!(%user, message_id = %sent.id, "Sent message");
        Ok(sent)
    }

    /// Classifies an email body. No credential involved.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure.
    pub async fn classify(&self, content: &str) -> ServiceResult<Category> {
        self.inference.classify(content).await
    }

    /// Scores the sentiment of an email body. No credential involved.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure.
    pub async fn analyze_sentiment(&self, content: &str) -> ServiceResult<Sentiment> {
        self.inference.analyze_sentiment(content).await
    }

    /// Drafts a reply. Without an explicit tone the user's brand voice is
    /// used, falling back to a professional tone.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Inference`] on provider failure, or
    /// [`ServiceError::Persistence`] if the brand voice cannot be read.
    pub async fn generate_reply(
        &self,
        user: UserId,
        content: &str,
        tone: Option<&str>,
    ) -> ServiceResult<String> {
        let hint = match tone.map(str::trim).filter(|t| !t.is_empty()) {
            Some(tone) => ToneHint::new(tone),
            None => self.brand_voice_hint(user).await?,
        };
        self.inference.generate_reply(content, &hint).await
    }

    async fn brand_voice_hint(&self, user: UserId) -> ServiceResult<ToneHint> {
        let Some(repository) = &self.brand_voices else {
            return Ok(ToneHint::default());
        };
        Ok(match repository.get(user).await? {
            Some(voice) if !voice.tone.trim().is_empty() => {
                ToneHint::new(voice.tone).with_phrases(voice.common_phrases)
            }
            _ => ToneHint::default(),
        })
    }

    async fn stored_credential(&self, user: UserId) -> ServiceResult<Token> {
        self.store
            .load(user)
            .await?
            .ok_or(ServiceError::NotConnected)
    }

    async fn valid_credential(&self, user: UserId) -> ServiceResult<Token> {
        let credential = self.stored_credential(user).await?;
        self.refresher.ensure_valid(user, credential).await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("refresher", &self.refresher)
            .field("mail", &self.mail)
            .field("inference", &self.inference)
            .finish_non_exhaustive()
    }
}
