//! crates/training_song_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or the chart and playback providers.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::{ChartEntry, StoredCredential, TokenGrant, TrackLink};

//=========================================================================================
// Port Error Types
//=========================================================================================

/// Failures from the chart-data provider.
#[derive(Debug, thiserror::Error)]
pub enum ChartError {
    /// The provider has no data for this date/chart combination (e.g. the
    /// date precedes its historical coverage, or the chart id is unknown).
    #[error("No {chart} chart data found for {date}")]
    Unavailable { chart: String, date: NaiveDate },
    /// Transport or parsing failure talking to the provider.
    #[error("Chart provider error: {0}")]
    Provider(String),
}

/// Failures from the credential store backend or its cipher.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Credential cipher failure: {0}")]
    Cipher(String),
    #[error("Credential store backend error: {0}")]
    Backend(String),
}

/// Failures in the OAuth token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No stored credential exists for the user and no authorization code was
    /// supplied with the request.
    #[error("No stored credential and no authorization code was provided")]
    MissingAuthorizationCode,
    /// The authorization provider rejected the supplied code.
    #[error("Invalid authorization code: {0}")]
    AuthorizationFailed(String),
    /// The authorization provider refused to refresh an expired token.
    /// Fatal for this call; there is no further retry.
    #[error("Failed to refresh access token: {0}")]
    RefreshFailed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures from the playback provider. Never escalated to a process-fatal
/// error; the orchestrator reports these in-band.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Song {title} by {artist} not found on Spotify")]
    TrackNotFound { title: String, artist: String },
    #[error("No active playback device is available")]
    NoActiveDevice,
    #[error("Playback provider error: {0}")]
    Provider(String),
}

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// External chart-data provider. One outbound network call per invocation;
/// repeated calls for the same date re-fetch (call volume is low enough that
/// a cache would be dead weight).
#[async_trait]
pub trait ChartProvider: Send + Sync {
    /// Fetches the rank-1 entry for the given date and chart. Lower ranks are
    /// never consulted.
    async fn top_entry(&self, date: NaiveDate, chart: &str) -> Result<ChartEntry, ChartError>;
}

/// Durable, encrypted-at-rest credential storage keyed by user identifier.
///
/// Reads and writes are independent per user; concurrent refreshes for the
/// same user resolve last-writer-wins, which is acceptable because tokens are
/// idempotently re-derivable from the authorization provider.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, user: &str) -> Result<Option<StoredCredential>, StoreError>;
    /// Upsert: creates the row or overwrites it (token rotation).
    async fn put(&self, credential: &StoredCredential) -> Result<(), StoreError>;
    /// Administrative removal. Never invoked automatically.
    async fn delete(&self, user: &str) -> Result<(), StoreError>;
}

/// External OAuth2 authorization provider.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    /// Exchanges a one-time authorization code for a token triple.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError>;
    /// Trades a refresh token for a fresh triple. Providers may omit a new
    /// refresh token, in which case the one passed in is carried forward.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError>;
}

/// External playback provider: track search and remote playback control for
/// a user's streaming session.
#[async_trait]
pub trait PlaybackService: Send + Sync {
    async fn resolve_track(
        &self,
        access_token: &str,
        title: &str,
        artist: &str,
    ) -> Result<TrackLink, PlaybackError>;

    /// Whether the user currently has any playback device available.
    async fn has_active_device(&self, access_token: &str) -> Result<bool, PlaybackError>;

    async fn start_playback(&self, access_token: &str, track_uri: &str)
        -> Result<(), PlaybackError>;
}
