//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete
//! implementation of the `CredentialStore` port from the `core` crate. It
//! owns the `tokens` table exclusively; every other component goes through
//! the credential manager. Token fields are encrypted before they are written
//! and decrypted after they are read.

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use training_song_core::domain::StoredCredential;
use training_song_core::ports::{CredentialStore, StoreError};

use crate::crypto::TokenCipher;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A Postgres-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
    cipher: TokenCipher,
}

impl PgCredentialStore {
    /// Creates a new `PgCredentialStore`.
    pub fn new(pool: PgPool, cipher: TokenCipher) -> Self {
        Self { pool, cipher }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn to_domain(&self, record: TokenRecord) -> Result<StoredCredential, StoreError> {
        Ok(StoredCredential {
            user: record.email,
            access_token: self
                .cipher
                .decrypt(&record.access_token)
                .map_err(|e| StoreError::Cipher(e.to_string()))?,
            refresh_token: self
                .cipher
                .decrypt(&record.refresh_token)
                .map_err(|e| StoreError::Cipher(e.to_string()))?,
            expires_at: record.expires_at,
        })
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct TokenRecord {
    email: String,
    access_token: String,
    refresh_token: String,
    expires_at: i64,
}

//=========================================================================================
// `CredentialStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get(&self, user: &str) -> Result<Option<StoredCredential>, StoreError> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT email, access_token, refresh_token, expires_at FROM tokens WHERE email = $1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        record.map(|r| self.to_domain(r)).transpose()
    }

    async fn put(&self, credential: &StoredCredential) -> Result<(), StoreError> {
        let access_token = self
            .cipher
            .encrypt(&credential.access_token)
            .map_err(|e| StoreError::Cipher(e.to_string()))?;
        let refresh_token = self
            .cipher
            .encrypt(&credential.refresh_token)
            .map_err(|e| StoreError::Cipher(e.to_string()))?;

        // Upsert: rotation overwrites the row in place, last writer wins.
        sqlx::query(
            "INSERT INTO tokens (email, access_token, refresh_token, expires_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (email) DO UPDATE \
             SET access_token = EXCLUDED.access_token, \
                 refresh_token = EXCLUDED.refresh_token, \
                 expires_at = EXCLUDED.expires_at",
        )
        .bind(&credential.user)
        .bind(&access_token)
        .bind(&refresh_token)
        .bind(credential.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, user: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM tokens WHERE email = $1")
            .bind(user)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(())
    }
}
