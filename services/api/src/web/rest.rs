//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::orchestrator::RequestError;
use crate::web::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::error;
use training_song_core::domain::{SessionRequest, SongSelection};
use training_song_core::ports::CredentialStore;
use utoipa::{IntoParams, OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(root_handler, hello_handler, email_in_db_handler),
    components(schemas(SongResponse, HelloResponse, EmailInDbResponse)),
    tags(
        (name = "Training Song API", description = "Maps a training accuracy onto the chart-topping song of a date in the 1900s.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// Query parameters for the main endpoint.
#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RootParams {
    /// Percentage in `[0, 100]`, or a fraction in `[0, 1)` which is rescaled.
    pub p: f64,
    /// Chart identifier; defaults to the canonical chart.
    pub chart: Option<String>,
    /// Whether to attempt playback on an active device.
    pub autoplay: Option<bool>,
    /// The user identifier the stored credential is keyed by.
    #[serde(alias = "userIdentifier")]
    pub email: Option<String>,
    /// One-time authorization code; only needed on first-ever authorization.
    #[serde(alias = "authorizationCode")]
    pub spotify_client_code: Option<String>,
}

/// The response payload for the main endpoint.
#[derive(Serialize, ToSchema)]
pub struct SongResponse {
    spotify_link: String,
    song_name: String,
    artist_name: String,
    /// `YYYY-MM-DD`, or empty for pre-coverage fallback selections.
    target_date: String,
    percentage: f64,
    chart: String,
    /// In-band errors from authorization or playback; empty when clean.
    errors: String,
    song_info: String,
}

impl From<SongSelection> for SongResponse {
    fn from(selection: SongSelection) -> Self {
        Self {
            spotify_link: selection.playback_link,
            song_name: selection.song_title,
            artist_name: selection.artist_name,
            target_date: selection
                .target_date
                .map(|d| d.to_string())
                .unwrap_or_default(),
            percentage: selection.percentage,
            chart: selection.chart_id,
            errors: selection.error_message,
            song_info: selection.song_description,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct HelloResponse {
    hello: String,
}

#[derive(Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EmailParams {
    email: String,
}

#[derive(Serialize, ToSchema)]
pub struct EmailInDbResponse {
    present_in_db: bool,
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("email pattern is valid")
    })
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Look up the chart-topping song for a training accuracy.
///
/// The song always resolves when technically possible; authorization and
/// playback problems are reported in the `errors` field of a 200 response.
#[utoipa::path(
    get,
    path = "/",
    params(RootParams),
    responses(
        (status = 200, description = "Song resolved (possibly with in-band errors)", body = SongResponse),
        (status = 400, description = "Invalid percentage or missing/invalid email"),
        (status = 404, description = "Chart lookup failed")
    )
)]
pub async fn root_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<RootParams>,
) -> Result<Json<SongResponse>, (StatusCode, String)> {
    let email = params.email.as_deref().unwrap_or_default();
    if email.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Missing Spotify code and email".to_string(),
        ));
    }
    if !email_pattern().is_match(email) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid email address", email),
        ));
    }

    let request = SessionRequest {
        percentage: params.p,
        chart_id: params.chart.unwrap_or_else(|| "hot-100".to_string()),
        autoplay: params.autoplay.unwrap_or(false),
        user: email.to_string(),
        authorization_code: params.spotify_client_code,
    };

    match app_state.orchestrator.handle_request(request).await {
        Ok(selection) => Ok(Json(selection.into())),
        Err(e @ RequestError::InvalidPercentage(_)) => {
            Err((StatusCode::BAD_REQUEST, e.to_string()))
        }
        Err(e @ RequestError::Chart(_)) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/hello",
    responses((status = 200, description = "Service is up", body = HelloResponse))
)]
pub async fn hello_handler() -> Json<HelloResponse> {
    Json(HelloResponse {
        hello: "world".to_string(),
    })
}

/// Whether a stored credential exists for the given email.
///
/// Lets the caller decide whether an interactive authorization round-trip is
/// needed before calling `/`.
#[utoipa::path(
    get,
    path = "/email_in_db",
    params(EmailParams),
    responses(
        (status = 200, description = "Presence flag", body = EmailInDbResponse),
        (status = 500, description = "Credential store failure")
    )
)]
pub async fn email_in_db_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<EmailParams>,
) -> Result<Json<EmailInDbResponse>, (StatusCode, String)> {
    match app_state.store.get(&params.email).await {
        Ok(credential) => Ok(Json(EmailInDbResponse {
            present_in_db: credential.is_some(),
        })),
        Err(e) => {
            error!("Failed to check credential presence: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to check credential presence".to_string(),
            ))
        }
    }
}
