//! services/api/src/adapters/spotify.rs
//!
//! This module contains the Spotify adapter. One struct implements both the
//! `AuthorizationProvider` port (OAuth code exchange and refresh against the
//! accounts service) and the `PlaybackService` port (track search, device
//! listing and remote playback against the Web API).

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::time::Duration;
use training_song_core::domain::{TokenGrant, TrackLink};
use training_song_core::ports::{AuthError, AuthorizationProvider, PlaybackError, PlaybackService};

const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com";
const API_BASE_URL: &str = "https://api.spotify.com/v1";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter for Spotify's accounts service and Web API.
#[derive(Clone)]
pub struct SpotifyAdapter {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    accounts_base_url: String,
    api_base_url: String,
}

impl SpotifyAdapter {
    /// Creates a new `SpotifyAdapter` with the app credentials from config.
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::AuthorizationFailed(e.to_string()))?;
        Ok(Self {
            http,
            client_id,
            client_secret,
            redirect_uri,
            accounts_base_url: ACCOUNTS_BASE_URL.to_string(),
            api_base_url: API_BASE_URL.to_string(),
        })
    }

    /// Posts to the token endpoint with client credentials attached.
    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse, String> {
        let url = format!("{}/api/token", self.accounts_base_url);
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!(
                "token endpoint returned HTTP {}",
                response.status()
            ));
        }

        response.json::<TokenResponse>().await.map_err(|e| e.to_string())
    }

    fn bearer(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }
}

//=========================================================================================
// Wire Format
//=========================================================================================

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Deserialize)]
struct TrackPage {
    items: Vec<TrackRecord>,
}

#[derive(Deserialize)]
struct TrackRecord {
    name: String,
    uri: String,
    external_urls: ExternalUrls,
}

#[derive(Deserialize)]
struct ExternalUrls {
    spotify: String,
}

#[derive(Deserialize)]
struct DevicesResponse {
    // Only presence matters; the device objects themselves are never read.
    devices: Vec<serde_json::Value>,
}

//=========================================================================================
// `AuthorizationProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthorizationProvider for SpotifyAdapter {
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", &self.redirect_uri),
            ])
            .await
            .map_err(AuthError::AuthorizationFailed)?;

        let refresh_token = response
            .refresh_token
            .ok_or_else(|| {
                AuthError::AuthorizationFailed("exchange returned no refresh token".to_string())
            })?;

        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token,
            expires_at: Utc::now().timestamp() + response.expires_in,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenGrant, AuthError> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(AuthError::RefreshFailed)?;

        // Spotify often omits a new refresh token; keep rotating the old one.
        Ok(TokenGrant {
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at: Utc::now().timestamp() + response.expires_in,
        })
    }
}

//=========================================================================================
// `PlaybackService` Trait Implementation
//=========================================================================================

#[async_trait]
impl PlaybackService for SpotifyAdapter {
    async fn resolve_track(
        &self,
        access_token: &str,
        title: &str,
        artist: &str,
    ) -> Result<TrackLink, PlaybackError> {
        let query = format!("{} {}", title, artist);
        let response = self
            .http
            .get(self.bearer("/search"))
            .bearer_auth(access_token)
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| PlaybackError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Provider(format!(
                "search returned HTTP {}",
                response.status()
            )));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| PlaybackError::Provider(e.to_string()))?;

        let track = body
            .tracks
            .items
            .into_iter()
            .next()
            .ok_or_else(|| PlaybackError::TrackNotFound {
                title: title.to_string(),
                artist: artist.to_string(),
            })?;

        Ok(TrackLink {
            url: track.external_urls.spotify,
            canonical_name: track.name,
            uri: track.uri,
        })
    }

    async fn has_active_device(&self, access_token: &str) -> Result<bool, PlaybackError> {
        let response = self
            .http
            .get(self.bearer("/me/player/devices"))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| PlaybackError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Provider(format!(
                "device listing returned HTTP {}",
                response.status()
            )));
        }

        let body: DevicesResponse = response
            .json()
            .await
            .map_err(|e| PlaybackError::Provider(e.to_string()))?;

        Ok(!body.devices.is_empty())
    }

    async fn start_playback(
        &self,
        access_token: &str,
        track_uri: &str,
    ) -> Result<(), PlaybackError> {
        let response = self
            .http
            .put(self.bearer("/me/player/play"))
            .bearer_auth(access_token)
            .json(&serde_json::json!({ "uris": [track_uri] }))
            .send()
            .await
            .map_err(|e| PlaybackError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlaybackError::Provider(format!(
                "Spotify playback failed: HTTP {}",
                response.status()
            )));
        }

        Ok(())
    }
}
