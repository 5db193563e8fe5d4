//! services/api/src/orchestrator.rs
//!
//! Composes the date mapper, chart lookup, credential manager and playback
//! trigger into the one end-to-end operation behind `GET /`. The guiding rule
//! is that once a song has been resolved, nothing downstream of it may abort
//! the response: authorization and playback failures are reported in-band.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use training_song_core::date::map_percentage_to_date;
use training_song_core::domain::{ChartEntry, SessionRequest, SongSelection};
use training_song_core::fallback::{fallback_entry, DEFAULT_SONG};
use training_song_core::ports::{AuthError, ChartError, ChartProvider, PlaybackService};

use crate::credentials::CredentialManager;
use crate::web::callback::AuthCodeRendezvous;

/// The failures that abort a request outright; everything else degrades into
/// a populated response with a non-empty error message.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Please enter a percentage between 0 and 100 (got {0})")]
    InvalidPercentage(f64),
    #[error("No chart data found: {0}")]
    Chart(String),
}

/// Tunables the orchestrator needs from config.
#[derive(Clone, Copy)]
pub struct OrchestratorSettings {
    /// First year the canonical chart has data for.
    pub chart_coverage_start_year: i32,
    /// Percentages below this are read as fractions and rescaled by 100.
    pub fraction_threshold: f64,
    /// Bounded wait for an interactively captured authorization code.
    pub auth_code_wait: Duration,
}

pub struct RequestOrchestrator {
    chart: Arc<dyn ChartProvider>,
    credentials: CredentialManager,
    playback: Arc<dyn PlaybackService>,
    auth_codes: Arc<AuthCodeRendezvous>,
    settings: OrchestratorSettings,
}

impl RequestOrchestrator {
    pub fn new(
        chart: Arc<dyn ChartProvider>,
        credentials: CredentialManager,
        playback: Arc<dyn PlaybackService>,
        auth_codes: Arc<AuthCodeRendezvous>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            chart,
            credentials,
            playback,
            auth_codes,
            settings,
        }
    }

    /// Handles one end-user request from normalized percentage to assembled
    /// `SongSelection`.
    pub async fn handle_request(&self, req: SessionRequest) -> Result<SongSelection, RequestError> {
        let percentage = self.normalize_percentage(req.percentage)?;
        info!(percentage, chart = %req.chart_id, autoplay = req.autoplay, "handling request");

        let mut selection = self.resolve_song(percentage, &req.chart_id).await?;

        // Authorization. The song has already resolved, so from here on the
        // caller always gets a response; failures ride along in-band.
        let token = match self.session_token(&req).await {
            Ok(token) => token,
            Err(e) => {
                warn!(user = %req.user, error = %e, "could not establish a Spotify session");
                selection.push_error(&format!("{}. Failed to create Spotify client.", e));
                return Ok(selection);
            }
        };

        // Resolve the playback link regardless of autoplay; it is part of
        // the response either way.
        let track_uri = match self
            .playback
            .resolve_track(&token, &selection.song_title, &selection.artist_name)
            .await
        {
            Ok(link) => {
                selection.playback_link = link.url;
                Some(link.uri)
            }
            Err(e) => {
                selection.push_error(&e.to_string());
                None
            }
        };

        if req.autoplay {
            if let Some(uri) = track_uri {
                self.attempt_play(&token, &uri, &mut selection).await;
            }
        }

        Ok(selection)
    }

    /// Values under the threshold are fractions from a model's `[0, 1]`
    /// accuracy scale; everything else is already a percentage.
    fn normalize_percentage(&self, raw: f64) -> Result<f64, RequestError> {
        let percentage = if (0.0..self.settings.fraction_threshold).contains(&raw) {
            raw * 100.0
        } else {
            raw
        };
        if !(0.0..=100.0).contains(&percentage) {
            return Err(RequestError::InvalidPercentage(percentage));
        }
        Ok(percentage)
    }

    /// Picks the song: curated fallback before the chart's coverage begins,
    /// otherwise a dated chart lookup with the universal default standing in
    /// for coverage gaps.
    async fn resolve_song(
        &self,
        percentage: f64,
        chart_id: &str,
    ) -> Result<SongSelection, RequestError> {
        let coverage_start = self.settings.chart_coverage_start_year;
        let threshold = f64::from(coverage_start - 1900);

        if percentage < threshold {
            let entry = fallback_entry(percentage.floor() as u32);
            return Ok(SongSelection {
                song_description: format!(
                    "Your results were before the {} chart started in {}. Here's {} by {} instead.",
                    chart_id, coverage_start, entry.title, entry.artist
                ),
                song_title: entry.title,
                artist_name: entry.artist,
                target_date: None,
                percentage,
                chart_id: chart_id.to_string(),
                ..Default::default()
            });
        }

        let target_date = map_percentage_to_date(percentage)
            .map_err(|e| RequestError::InvalidPercentage(e.0))?;

        match self.chart.top_entry(target_date, chart_id).await {
            Ok(entry) => Ok(SongSelection {
                song_description: format!(
                    "The Number 1 song {}% through the 1900s on the {} chart was {} by {}. \n\
                     The date was {} and the song was on the chart for {} weeks.",
                    percentage,
                    chart_id,
                    entry.title,
                    entry.artist,
                    target_date,
                    entry.weeks_on_chart
                ),
                song_title: entry.title,
                artist_name: entry.artist,
                target_date: Some(target_date),
                percentage,
                chart_id: chart_id.to_string(),
                ..Default::default()
            }),
            Err(ChartError::Unavailable { .. }) => {
                // A coverage gap is not the caller's problem: serve the
                // universal default and say why.
                let entry = ChartEntry {
                    title: DEFAULT_SONG.0.to_string(),
                    artist: DEFAULT_SONG.1.to_string(),
                    weeks_on_chart: 0,
                };
                Ok(SongSelection {
                    song_description: format!(
                        "No {} chart data was available for {}. Here's {} by {} instead.",
                        chart_id, target_date, entry.title, entry.artist
                    ),
                    song_title: entry.title,
                    artist_name: entry.artist,
                    target_date: Some(target_date),
                    percentage,
                    chart_id: chart_id.to_string(),
                    ..Default::default()
                })
            }
            Err(ChartError::Provider(message)) => Err(RequestError::Chart(message)),
        }
    }

    /// Establishes the Spotify session, consulting the callback rendezvous
    /// when the request carries no code of its own.
    async fn session_token(&self, req: &SessionRequest) -> Result<String, AuthError> {
        let first_attempt = self
            .credentials
            .obtain_session_token(&req.user, req.authorization_code.as_deref())
            .await;

        match first_attempt {
            Err(AuthError::MissingAuthorizationCode) if req.authorization_code.is_none() => {
                // An interactive authorization may be mid-flight: give the
                // local callback a bounded window to hand us the code.
                match self.auth_codes.wait(self.settings.auth_code_wait).await {
                    Some(code) => {
                        self.credentials
                            .obtain_session_token(&req.user, Some(&code))
                            .await
                    }
                    None => Err(AuthError::MissingAuthorizationCode),
                }
            }
            other => other,
        }
    }

    /// Best-effort playback: device probing and start failures are recorded,
    /// never escalated.
    async fn attempt_play(&self, token: &str, uri: &str, selection: &mut SongSelection) {
        match self.playback.has_active_device(token).await {
            Ok(false) => {
                selection.push_error(
                    "Unable to start playback because there are no active devices available. \
                     Please ensure that Spotify is active on one of your devices and try again.",
                );
            }
            Ok(true) => {
                if let Err(e) = self.playback.start_playback(token, uri).await {
                    selection.push_error(&format!(
                        "{}. Unable to start playback. Please ensure that Spotify is active \
                         on one of your devices and try again.",
                        e
                    ));
                }
            }
            Err(e) => {
                selection.push_error(&format!("{}. Failed to start playback.", e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;
    use training_song_core::domain::{StoredCredential, TokenGrant, TrackLink};
    use training_song_core::ports::{
        AuthorizationProvider, CredentialStore, PlaybackError, StoreError,
    };

    struct FixedChart {
        result: fn(NaiveDate, &str) -> Result<ChartEntry, ChartError>,
    }

    #[async_trait]
    impl ChartProvider for FixedChart {
        async fn top_entry(&self, date: NaiveDate, chart: &str) -> Result<ChartEntry, ChartError> {
            (self.result)(date, chart)
        }
    }

    fn number_one(_date: NaiveDate, _chart: &str) -> Result<ChartEntry, ChartError> {
        Ok(ChartEntry {
            title: "Island Girl".to_string(),
            artist: "Elton John".to_string(),
            weeks_on_chart: 3,
        })
    }

    #[derive(Default)]
    struct InMemoryStore {
        rows: Mutex<HashMap<String, StoredCredential>>,
    }

    #[async_trait]
    impl CredentialStore for InMemoryStore {
        async fn get(&self, user: &str) -> Result<Option<StoredCredential>, StoreError> {
            Ok(self.rows.lock().unwrap().get(user).cloned())
        }
        async fn put(&self, credential: &StoredCredential) -> Result<(), StoreError> {
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

    struct NoProvider;

    #[async_trait]
    impl AuthorizationProvider for NoProvider {
        async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, AuthError> {
            Err(AuthError::AuthorizationFailed("unexpected exchange".to_string()))
        }
        async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
            Err(AuthError::RefreshFailed("unexpected refresh".to_string()))
        }
    }

    struct FakePlayback {
        devices_active: bool,
    }

    #[async_trait]
    impl PlaybackService for FakePlayback {
        async fn resolve_track(
            &self,
            _access_token: &str,
            title: &str,
            _artist: &str,
        ) -> Result<TrackLink, PlaybackError> {
            Ok(TrackLink {
                url: format!("https://open.spotify.com/track/{}", title.len()),
                canonical_name: title.to_string(),
                uri: "spotify:track:abc123".to_string(),
            })
        }
        async fn has_active_device(&self, _access_token: &str) -> Result<bool, PlaybackError> {
            Ok(self.devices_active)
        }
        async fn start_playback(
            &self,
            _access_token: &str,
            _track_uri: &str,
        ) -> Result<(), PlaybackError> {
            Ok(())
        }
    }

    fn settings() -> OrchestratorSettings {
        OrchestratorSettings {
            chart_coverage_start_year: 1952,
            fraction_threshold: 1.0,
            auth_code_wait: Duration::from_millis(10),
        }
    }

    fn orchestrator_with(
        store: Arc<InMemoryStore>,
        devices_active: bool,
    ) -> RequestOrchestrator {
        RequestOrchestrator::new(
            Arc::new(FixedChart { result: number_one }),
            CredentialManager::new(store, Arc::new(NoProvider)),
            Arc::new(FakePlayback { devices_active }),
            Arc::new(AuthCodeRendezvous::new()),
            settings(),
        )
    }

    async fn store_with_valid_credential(user: &str) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::default());
        store
            .put(&StoredCredential {
                user: user.to_string(),
                access_token: "valid-access".to_string(),
                refresh_token: "valid-refresh".to_string(),
                expires_at: Utc::now().timestamp() + 3600,
            })
            .await
            .unwrap();
        store
    }

    fn request(percentage: f64, autoplay: bool) -> SessionRequest {
        SessionRequest {
            percentage,
            chart_id: "hot-100".to_string(),
            autoplay,
            user: "u@example.com".to_string(),
            authorization_code: None,
        }
    }

    #[tokio::test]
    async fn resolves_song_link_and_date_end_to_end() {
        let store = store_with_valid_credential("u@example.com").await;
        let selection = orchestrator_with(store, true)
            .handle_request(request(75.8, false))
            .await
            .unwrap();

        assert_eq!(
            selection.target_date,
            NaiveDate::from_ymd_opt(1975, 10, 19)
        );
        assert_eq!(selection.song_title, "Island Girl");
        assert!(selection.playback_link.starts_with("https://open.spotify.com/"));
        assert_eq!(selection.error_message, "");
        assert!(selection.song_description.contains("on the chart for 3 weeks"));
    }

    #[tokio::test]
    async fn fractions_are_rescaled_onto_the_fallback_table() {
        let store = store_with_valid_credential("u@example.com").await;
        let selection = orchestrator_with(store, true)
            .handle_request(request(0.2, false))
            .await
            .unwrap();

        // 0.2 is read as 20%, which predates the chart; offset 20 has no
        // curated entry, so the universal default is served and explained.
        assert_eq!(selection.percentage, 20.0);
        assert_eq!(selection.target_date, None);
        assert_eq!(selection.song_title, "Never Gonna Give You Up");
        assert!(selection
            .song_description
            .contains("before the hot-100 chart started in 1952"));
    }

    #[tokio::test]
    async fn curated_fallback_offsets_keep_their_pick() {
        let store = store_with_valid_credential("u@example.com").await;
        let selection = orchestrator_with(store, true)
            .handle_request(request(22.4, false))
            .await
            .unwrap();

        assert_eq!(selection.song_title, "22");
        assert_eq!(selection.artist_name, "Taylor Swift");
    }

    #[tokio::test]
    async fn out_of_range_percentage_aborts() {
        let store = store_with_valid_credential("u@example.com").await;
        let result = orchestrator_with(store, true)
            .handle_request(request(101.0, false))
            .await;
        assert!(matches!(result, Err(RequestError::InvalidPercentage(_))));
    }

    #[tokio::test]
    async fn chart_coverage_gap_serves_the_default_song() {
        fn gap(date: NaiveDate, chart: &str) -> Result<ChartEntry, ChartError> {
            Err(ChartError::Unavailable {
                chart: chart.to_string(),
                date,
            })
        }
        let store = store_with_valid_credential("u@example.com").await;
        let orchestrator = RequestOrchestrator::new(
            Arc::new(FixedChart { result: gap }),
            CredentialManager::new(store, Arc::new(NoProvider)),
            Arc::new(FakePlayback {
                devices_active: true,
            }),
            Arc::new(AuthCodeRendezvous::new()),
            settings(),
        );

        let selection = orchestrator.handle_request(request(75.8, false)).await.unwrap();
        assert_eq!(selection.song_title, "Never Gonna Give You Up");
        assert!(selection.song_description.contains("1975-10-19"));
    }

    #[tokio::test]
    async fn provider_failure_aborts_the_request() {
        fn broken(_date: NaiveDate, _chart: &str) -> Result<ChartEntry, ChartError> {
            Err(ChartError::Provider("connection reset".to_string()))
        }
        let store = store_with_valid_credential("u@example.com").await;
        let orchestrator = RequestOrchestrator::new(
            Arc::new(FixedChart { result: broken }),
            CredentialManager::new(store, Arc::new(NoProvider)),
            Arc::new(FakePlayback {
                devices_active: true,
            }),
            Arc::new(AuthCodeRendezvous::new()),
            settings(),
        );

        let result = orchestrator.handle_request(request(75.8, false)).await;
        assert!(matches!(result, Err(RequestError::Chart(_))));
    }

    #[tokio::test]
    async fn missing_credentials_still_return_the_song() {
        let store = Arc::new(InMemoryStore::default());
        let selection = orchestrator_with(store, true)
            .handle_request(request(75.8, false))
            .await
            .unwrap();

        assert_eq!(selection.song_title, "Island Girl");
        assert_eq!(selection.playback_link, "");
        assert!(selection
            .error_message
            .contains("Failed to create Spotify client"));
    }

    #[tokio::test]
    async fn autoplay_without_active_devices_reports_in_band() {
        let store = store_with_valid_credential("u@example.com").await;
        let selection = orchestrator_with(store, false)
            .handle_request(request(75.8, true))
            .await
            .unwrap();

        // The link still resolves; only the playback attempt is reported.
        assert!(!selection.playback_link.is_empty());
        assert!(selection
            .error_message
            .contains("no active devices available"));
    }

    #[tokio::test]
    async fn parked_callback_code_feeds_a_first_authorization() {
        struct GrantingProvider;

        #[async_trait]
        impl AuthorizationProvider for GrantingProvider {
            async fn exchange_code(&self, code: &str) -> Result<TokenGrant, AuthError> {
                assert_eq!(code, "captured-code");
                Ok(TokenGrant {
                    access_token: "fresh-access".to_string(),
                    refresh_token: "fresh-refresh".to_string(),
                    expires_at: Utc::now().timestamp() + 3600,
                })
            }
            async fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant, AuthError> {
                Err(AuthError::RefreshFailed("unexpected refresh".to_string()))
            }
        }

        let store = Arc::new(InMemoryStore::default());
        let rendezvous = Arc::new(AuthCodeRendezvous::new());
        rendezvous.deliver("captured-code".to_string());

        let orchestrator = RequestOrchestrator::new(
            Arc::new(FixedChart { result: number_one }),
            CredentialManager::new(store.clone(), Arc::new(GrantingProvider)),
            Arc::new(FakePlayback {
                devices_active: true,
            }),
            rendezvous,
            settings(),
        );

        let selection = orchestrator.handle_request(request(75.8, false)).await.unwrap();
        assert_eq!(selection.error_message, "");
        assert!(store.get("u@example.com").await.unwrap().is_some());
    }
}
