//! Access-token renewal with per-user serialization.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use replydesk_oauth::Token;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TokenExchange;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{CredentialStore, UserId};

/// Hands out credentials whose access token has not expired, renewing them
/// through the provider when needed.
///
/// Every credential write for a user goes through a per-user lock, so at
/// most one refresh exchange per user is in flight. A caller that waited
/// on the lock re-reads the store and picks up the credential the previous
/// holder just wrote instead of refreshing again.
pub struct TokenRefresher {
    store: Arc<dyn CredentialStore>,
    exchange: Arc<dyn TokenExchange>,
    locks: DashMap<UserId, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl TokenRefresher {
    /// Creates a refresher writing renewed credentials to `store`.
    #[must_use]
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: Arc<dyn TokenExchange>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            exchange,
            locks: DashMap::new(),
            timeout,
        }
    }

    /// Returns a credential that is valid right now.
    ///
    /// An unexpired credential is returned unchanged without touching the
    /// store or the provider. An expired one is refreshed once; on success
    /// the renewed credential (keeping the old refresh token unless a new
    /// one was issued) is persisted and returned. On failure the stored
    /// credential is left as it was.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::RefreshFailed`] if there is no refresh token, the
    ///   provider rejects it, or the exchange fails or times out.
    /// - [`ServiceError::NotConnected`] if the credential was removed while
    ///   waiting for the lock.
    /// - [`ServiceError::Persistence`] / [`ServiceError::NotFound`] if the
    ///   store fails.
    pub async fn ensure_valid(&self, user: UserId, credential: Token) -> ServiceResult<Token> {
        if !credential.is_expired() {
            return Ok(credential);
        }
        if !credential.can_refresh() {
            warn!(%user, "Access token expired and no refresh token is stored");
            return Err(ServiceError::RefreshFailed(
                "access token expired and no refresh token is stored".into(),
            ));
        }

        let lock = self.lock_for(user);
        let result = {
            let _guard = lock.lock().await;
            self.refresh_locked(user).await
        };
        drop(lock);
        self.release_lock(user);
        result
    }

    /// Replaces the user's credential, serialized with any in-flight refresh.
    ///
    /// A credential without a refresh token keeps the one already stored.
    /// Returns what was written.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown users or
    /// [`ServiceError::Persistence`] if the write fails.
    pub async fn store(&self, user: UserId, credential: Token) -> ServiceResult<Token> {
        let lock = self.lock_for(user);
        let result = {
            let _guard = lock.lock().await;
            self.replace_locked(user, credential).await
        };
        drop(lock);
        self.release_lock(user);
        result
    }

    /// Removes the user's credential, serialized with any in-flight refresh.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] for unknown users or
    /// [`ServiceError::Persistence`] if the write fails.
    pub async fn clear(&self, user: UserId) -> ServiceResult<()> {
        let lock = self.lock_for(user);
        let result = {
            let _guard = lock.lock().await;
            self.store.clear(user).await.map_err(ServiceError::from)
        };
        drop(lock);
        self.release_lock(user);
        result
    }

    async fn replace_locked(&self, user: UserId, credential: Token) -> ServiceResult<Token> {
        let credential = match self.store.load(user).await? {
            Some(previous) => credential.retaining_refresh_token(&previous),
            None => credential,
        };
        self.store.put(user, &credential).await?;
        Ok(credential)
    }

    /// Body of the critical section. Must run with the user's lock held.
    async fn refresh_locked(&self, user: UserId) -> ServiceResult<Token> {
        let current = self
            .store
            .load(user)
            .await?
            .ok_or(ServiceError::NotConnected)?;

        if !current.is_expired() {
            debug!(%user, "Credential already renewed by a concurrent request");
            return Ok(current);
        }
        if !current.can_refresh() {
            return Err(ServiceError::RefreshFailed(
                "access token expired and no refresh token is stored".into(),
            ));
        }

        debug!(%user, "Refreshing expired access token");
        let renewed = match tokio::time::timeout(self.timeout, self.exchange.refresh(&current)).await
        {
            Ok(Ok(token)) => token.retaining_refresh_token(&current),
            Ok(Err(e)) => {
                warn!(%user, "Token refresh rejected: {e}");
                return Err(ServiceError::RefreshFailed(e.to_string()));
            }
            Err(_) => {
                warn!(%user, "Token refresh timed out after {:?}", self.timeout);
                return Err(ServiceError::RefreshFailed(format!(
                    "token endpoint timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
        };

        if renewed.is_expired_at(Utc::now()) {
            warn!(%user, "Provider returned an already expired access token");
            return Err(ServiceError::RefreshFailed(
                "provider returned an already expired access token".into(),
            ));
        }

        self.store.put(user, &renewed).await?;
        info!(%user, expires_at = %renewed.expires_at, "Refreshed Gmail access token");
        Ok(renewed)
    }

    fn lock_for(&self, user: UserId) -> Arc<Mutex<()>> {
        Arc::clone(&self.locks.entry(user).or_default())
    }

    /// Drops the user's lock entry once nobody else holds or waits on it.
    fn release_lock(&self, user: UserId) {
        self.locks
            .remove_if(&user, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    fn lock_count(&self) -> usize {
        self.locks.len()
    }
}

impl std::fmt::Debug for TokenRefresher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRefresher")
            .field("locks", &self.locks.len())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::Error;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// In-memory store counting writes.
    #[derive(Default)]
    struct MemoryStore {
        records: std::sync::Mutex<HashMap<UserId, Option<Token>>>,
        puts: AtomicUsize,
    }

    impl MemoryStore {
        fn with(user: UserId, token: Option<Token>) -> Self {
            let store = Self::default();
            store.records.lock().unwrap().insert(user, token);
            store
        }

        fn snapshot(&self, user: UserId) -> Option<Token> {
            self.records.lock().unwrap().get(&user).cloned().flatten()
        }
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn load(&self, user: UserId) -> crate::Result<Option<Token>> {
            self.records
                .lock()
                .unwrap()
                .get(&user)
                .cloned()
                .ok_or(Error::UserNotFound(user))
        }

        async fn put(&self, user: UserId, credential: &Token) -> crate::Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let mut records = self.records.lock().unwrap();
            let slot = records.get_mut(&user).ok_or(Error::UserNotFound(user))?;
            *slot = Some(credential.clone());
            Ok(())
        }

        async fn clear(&self, user: UserId) -> crate::Result<()> {
            let mut records = self.records.lock().unwrap();
            let slot = records.get_mut(&user).ok_or(Error::UserNotFound(user))?;
            *slot = None;
            Ok(())
        }
    }

    enum Reply {
        Renew { access: &'static str, refresh: Option<&'static str> },
        Reject,
        Hang,
    }

    struct ScriptedExchange {
        reply: Reply,
        refreshes: AtomicUsize,
        delay: std::time::Duration,
    }

    impl ScriptedExchange {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                refreshes: AtomicUsize::new(0),
                delay: std::time::Duration::ZERO,
            }
        }
    }

    #[async_trait]
    impl TokenExchange for ScriptedExchange {
        fn authorization_url(&self, _state: &str) -> replydesk_oauth::Result<Url> {
            Ok(Url::parse("https://auth.test/authorize").unwrap())
        }

        async fn exchange_code(&self, _code: &str) -> replydesk_oauth::Result<Token> {
            Err(replydesk_oauth::Error::oauth_error("invalid_grant", "unused"))
        }

        async fn refresh(&self, _credential: &Token) -> replydesk_oauth::Result<Token> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match &self.reply {
                Reply::Renew { access, refresh } => {
                    let mut token = Token::new(*access, Utc::now() + ChronoDuration::seconds(3600));
                    token.refresh_token = refresh.map(str::to_string);
                    Ok(token)
                }
                Reply::Reject => Err(replydesk_oauth::Error::oauth_error(
                    "invalid_grant",
                    "Token has been expired or revoked.",
                )),
                Reply::Hang => {
                    tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                    unreachable!("timeout fires first")
                }
            }
        }
    }

    const USER: UserId = UserId(1);

    fn expired(refresh: Option<&str>) -> Token {
        let mut token = Token::new("A1", Utc::now() - ChronoDuration::seconds(1));
        token.refresh_token = refresh.map(str::to_string);
        token
    }

    fn refresher(store: &Arc<MemoryStore>, exchange: &Arc<ScriptedExchange>) -> TokenRefresher {
        TokenRefresher::new(
            Arc::clone(store) as Arc<dyn CredentialStore>,
            Arc::clone(exchange) as Arc<dyn TokenExchange>,
            std::time::Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_valid_credential_passes_through() {
        let fresh = Token::new("A1", Utc::now() + ChronoDuration::seconds(600)).with_refresh_token("R1");
        let store = Arc::new(MemoryStore::with(USER, Some(fresh.clone())));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Reject));

        let result = refresher(&store, &exchange).ensure_valid(USER, fresh.clone()).await;
        assert_eq!(result.unwrap(), fresh);
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_persisted() {
        let store = Arc::new(MemoryStore::with(USER, Some(expired(Some("R1")))));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Renew { access: "A2", refresh: None }));
        let refresher = refresher(&store, &exchange);

        let renewed = refresher.ensure_valid(USER, expired(Some("R1"))).await.unwrap();
        assert_eq!(renewed.access_token, "A2");
        assert_eq!(renewed.refresh_token.as_deref(), Some("R1"));
        assert!(renewed.expires_at > Utc::now());
        assert_eq!(store.snapshot(USER), Some(renewed));
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_new_refresh_token_replaces_old() {
        let store = Arc::new(MemoryStore::with(USER, Some(expired(Some("R1")))));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Renew {
            access: "A2",
            refresh: Some("R2"),
        }));

        let renewed = refresher(&store, &exchange)
            .ensure_valid(USER, expired(Some("R1")))
            .await
            .unwrap();
        assert_eq!(renewed.refresh_token.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_rejected_refresh_leaves_store_untouched() {
        let original = expired(Some("R1"));
        let store = Arc::new(MemoryStore::with(USER, Some(original.clone())));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Reject));

        let err = refresher(&store, &exchange)
            .ensure_valid(USER, original.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RefreshFailed(ref msg) if msg.contains("revoked")));
        assert_eq!(store.snapshot(USER), Some(original));
        assert_eq!(store.puts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_refresh_token_fails_without_calls() {
        let store = Arc::new(MemoryStore::with(USER, Some(expired(None))));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Renew { access: "A2", refresh: None }));

        let err = refresher(&store, &exchange)
            .ensure_valid(USER, expired(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RefreshFailed(_)));
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_hung_refresh_times_out() {
        let original = expired(Some("R1"));
        let store = Arc::new(MemoryStore::with(USER, Some(original.clone())));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Hang));
        let refresher = TokenRefresher::new(
            Arc::clone(&store) as Arc<dyn CredentialStore>,
            Arc::clone(&exchange) as Arc<dyn TokenExchange>,
            std::time::Duration::from_millis(50),
        );

        let err = refresher.ensure_valid(USER, original.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::RefreshFailed(ref msg) if msg.contains("timed out")));
        assert_eq!(store.snapshot(USER), Some(original));
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemoryStore::with(USER, Some(expired(Some("R1")))));
        let mut exchange = ScriptedExchange::new(Reply::Renew { access: "A2", refresh: None });
        exchange.delay = std::time::Duration::from_millis(50);
        let exchange = Arc::new(exchange);
        let refresher = refresher(&store, &exchange);

        let (a, b, c) = tokio::join!(
            refresher.ensure_valid(USER, expired(Some("R1"))),
            refresher.ensure_valid(USER, expired(Some("R1"))),
            refresher.ensure_valid(USER, expired(Some("R1"))),
        );

        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(exchange.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.lock_count(), 0);
    }

    #[tokio::test]
    async fn test_credential_removed_while_waiting() {
        let store = Arc::new(MemoryStore::with(USER, None));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Reject));

        let err = refresher(&store, &exchange)
            .ensure_valid(USER, expired(Some("R1")))
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::NotConnected);
    }

    #[tokio::test]
    async fn test_store_and_clear() {
        let store = Arc::new(MemoryStore::with(USER, None));
        let exchange = Arc::new(ScriptedExchange::new(Reply::Reject));
        let refresher = refresher(&store, &exchange);
        let token = Token::new("A1", Utc::now()).with_refresh_token("R1");

        refresher.store(USER, token.clone()).await.unwrap();
        assert_eq!(store.snapshot(USER), Some(token));

        // A re-issued credential without a refresh token keeps the stored one.
        let reissued = Token::new("A2", Utc::now());
        let written = refresher.store(USER, reissued).await.unwrap();
        assert_eq!(written.refresh_token.as_deref(), Some("R1"));
        assert_eq!(store.snapshot(USER), Some(written));

        refresher.clear(USER).await.unwrap();
        assert_eq!(store.snapshot(USER), None);
        assert_eq!(refresher.lock_count(), 0);

        let err = refresher.store(UserId::new(2), Token::new("A", Utc::now())).await;
        assert!(matches!(err, Err(ServiceError::NotFound(_))));
    }
}
