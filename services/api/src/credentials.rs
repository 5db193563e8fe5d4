//! services/api/src/credentials.rs
//!
//! The credential manager: obtains, refreshes and persists an access token
//! for one user against the authorization provider, going through the
//! `CredentialStore` port for all persistence.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use training_song_core::domain::{StoredCredential, TokenGrant};
use training_song_core::ports::{AuthError, AuthorizationProvider, CredentialStore};

/// Drives the OAuth token lifecycle for one user at a time.
#[derive(Clone)]
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn AuthorizationProvider>,
}

impl CredentialManager {
    pub fn new(store: Arc<dyn CredentialStore>, provider: Arc<dyn AuthorizationProvider>) -> Self {
        Self { store, provider }
    }

    /// Returns a currently valid access token for `user`.
    ///
    /// - No stored credential: requires `code`, exchanges it, persists the
    ///   grant, returns its access token.
    /// - Stored and unexpired: returns the stored token with zero provider
    ///   calls.
    /// - Stored but expired: performs exactly one refresh, persists the
    ///   rotated triple, returns the new token. A refused refresh fails the
    ///   call; there is no second attempt.
    ///
    /// Every successful provider exchange is persisted before the token is
    /// handed back, so a crash between exchange and persistence is the only
    /// window in which a token can be lost.
    pub async fn obtain_session_token(
        &self,
        user: &str,
        code: Option<&str>,
    ) -> Result<String, AuthError> {
        match self.store.get(user).await? {
            None => {
                let code = code.ok_or(AuthError::MissingAuthorizationCode)?;
                info!(user, "no stored credential, exchanging authorization code");
                let grant = self.provider.exchange_code(code).await?;
                self.persist(user, &grant).await?;
                Ok(grant.access_token)
            }
            Some(credential) => {
                if credential.expired(Utc::now().timestamp()) {
                    info!(user, "stored access token expired, refreshing");
                    let grant = self.provider.refresh(&credential.refresh_token).await?;
                    self.persist(user, &grant).await?;
                    Ok(grant.access_token)
                } else {
                    Ok(credential.access_token)
                }
            }
        }
    }

    async fn persist(&self, user: &str, grant: &TokenGrant) -> Result<(), AuthError> {
        self.store
            .put(&StoredCredential {
                user: user.to_string(),
                access_token: grant.access_token.clone(),
                refresh_token: grant.refresh_token.clone(),
                expires_at: grant.expires_at,
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use training_song_core::ports::StoreError;

    #[derive(Default)]
    struct InMemoryStore {
        rows: Mutex<HashMap<String, StoredCredential>>,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for InMemoryStore {
        async fn get(&self, user: &str) -> Result<Option<StoredCredential>, StoreError> {
            Ok(self.rows.lock().unwrap().get(user).cloned())
        }

        async fn put(&self, credential: &StoredCredential) -> Result<(), StoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.rows
                .lock()
                .unwrap()
                .insert(credential.user.clone(), credential.clone());
            Ok(())
        }

        async fn delete(&self, user: &str) -> Result<(), StoreError> {
            self.rows.lock().unwrap().remove(user);
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingProvider {
        exchanges: AtomicUsize,
        refreshes: AtomicUsize,
        refuse_refresh: bool,
    }

    #[async_trait]
    impl AuthorizationProvider for CountingProvider {
        async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if code == "bad-code" {
                return Err(AuthError::AuthorizationFailed("bad code".to_string()));
            }
            Ok(TokenGrant {
                access_token: format!("access-for-{}", code),
                refresh_token: "refresh-1".to_string(),
                expires_at: Utc::now().timestamp() + 3600,
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.refuse_refresh {
                return Err(AuthError::RefreshFailed("revoked".to_string()));
            }
            Ok(TokenGrant {
                access_token: "refreshed-access".to_string(),
                refresh_token: "refresh-2".to_string(),
                expires_at: Utc::now().timestamp() + 3600,
            })
        }
    }

    fn manager(
        store: Arc<InMemoryStore>,
        provider: Arc<CountingProvider>,
    ) -> CredentialManager {
        CredentialManager::new(store, provider)
    }

    fn stored(user: &str, expires_at: i64) -> StoredCredential {
        StoredCredential {
            user: user.to_string(),
            access_token: "stored-access".to_string(),
            refresh_token: "stored-refresh".to_string(),
            expires_at,
        }
    }

    #[tokio::test]
    async fn missing_credential_and_code_is_rejected() {
        let store = Arc::new(InMemoryStore::default());
        let provider = Arc::new(CountingProvider::default());
        let result = manager(store, provider.clone())
            .obtain_session_token("u@example.com", None)
            .await;

        assert!(matches!(result, Err(AuthError::MissingAuthorizationCode)));
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn first_authorization_exchanges_and_persists() {
        let store = Arc::new(InMemoryStore::default());
        let provider = Arc::new(CountingProvider::default());
        let token = manager(store.clone(), provider.clone())
            .obtain_session_token("u@example.com", Some("the-code"))
            .await
            .unwrap();

        assert_eq!(token, "access-for-the-code");
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
        // The grant is on disk before the token is handed back.
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        let row = store.get("u@example.com").await.unwrap().unwrap();
        assert_eq!(row.access_token, "access-for-the-code");
    }

    #[tokio::test]
    async fn unexpired_credential_makes_zero_provider_calls() {
        let store = Arc::new(InMemoryStore::default());
        store
            .put(&stored("u@example.com", Utc::now().timestamp() + 3600))
            .await
            .unwrap();
        let provider = Arc::new(CountingProvider::default());
        let mgr = manager(store, provider.clone());

        let first = mgr.obtain_session_token("u@example.com", None).await.unwrap();
        let second = mgr.obtain_session_token("u@example.com", None).await.unwrap();

        assert_eq!(first, "stored-access");
        assert_eq!(first, second);
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 0);
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn expired_credential_triggers_exactly_one_refresh() {
        let store = Arc::new(InMemoryStore::default());
        store
            .put(&stored("u@example.com", Utc::now().timestamp() - 10))
            .await
            .unwrap();
        let provider = Arc::new(CountingProvider::default());

        let token = manager(store.clone(), provider.clone())
            .obtain_session_token("u@example.com", None)
            .await
            .unwrap();

        assert_eq!(token, "refreshed-access");
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        // Rotation persisted the new triple.
        let row = store.get("u@example.com").await.unwrap().unwrap();
        assert_eq!(row.access_token, "refreshed-access");
        assert_eq!(row.refresh_token, "refresh-2");
    }

    #[tokio::test]
    async fn refused_refresh_is_fatal_for_the_call() {
        let store = Arc::new(InMemoryStore::default());
        store
            .put(&stored("u@example.com", Utc::now().timestamp() - 10))
            .await
            .unwrap();
        let provider = Arc::new(CountingProvider {
            refuse_refresh: true,
            ..Default::default()
        });

        let result = manager(store.clone(), provider.clone())
            .obtain_session_token("u@example.com", None)
            .await;

        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
        assert_eq!(provider.refreshes.load(Ordering::SeqCst), 1);
        // The stale credential is left in place for a later attempt.
        let row = store.get("u@example.com").await.unwrap().unwrap();
        assert_eq!(row.access_token, "stored-access");
    }

    #[tokio::test]
    async fn rejected_code_is_not_persisted() {
        let store = Arc::new(InMemoryStore::default());
        let provider = Arc::new(CountingProvider::default());

        let result = manager(store.clone(), provider)
            .obtain_session_token("u@example.com", Some("bad-code"))
            .await;

        assert!(matches!(result, Err(AuthError::AuthorizationFailed(_))));
        assert!(store.get("u@example.com").await.unwrap().is_none());
    }
}
