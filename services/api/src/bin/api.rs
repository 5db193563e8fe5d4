//! services/api/src/bin/api.rs

use api_lib::{
    adapters::{BillboardAdapter, PgCredentialStore, SpotifyAdapter},
    config::Config,
    credentials::CredentialManager,
    crypto::TokenCipher,
    error::ApiError,
    orchestrator::{OrchestratorSettings, RequestOrchestrator},
    web::{
        callback::AuthCodeRendezvous, email_in_db_handler, hello_handler, local_callback_handler,
        rest::ApiDoc, root_handler, state::AppState,
    },
};
use axum::{http::Method, routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Arc::new(Config::from_env()?);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting server...");

    // The cipher is built before anything touches the database: starting
    // without a usable key would only produce undecryptable rows.
    let cipher = TokenCipher::from_base64_key(&config.encrypt_key)?;

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;
    let store = Arc::new(PgCredentialStore::new(db_pool, cipher));
    info!("Running database migrations...");
    store.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Initialize Provider Adapters ---
    let chart_adapter = Arc::new(
        BillboardAdapter::new(config.chart_api_base_url.clone(), config.http_timeout)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
    );
    let spotify_adapter = Arc::new(
        SpotifyAdapter::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.redirect_uri.clone(),
            config.http_timeout,
        )
        .map_err(|e| ApiError::Internal(e.to_string()))?,
    );

    // --- 4. Build the Shared AppState ---
    let auth_codes = Arc::new(AuthCodeRendezvous::new());
    let credentials = CredentialManager::new(store.clone(), spotify_adapter.clone());
    let orchestrator = RequestOrchestrator::new(
        chart_adapter,
        credentials,
        spotify_adapter,
        auth_codes.clone(),
        OrchestratorSettings {
            chart_coverage_start_year: config.chart_coverage_start_year,
            fraction_threshold: config.fraction_threshold,
            auth_code_wait: config.auth_code_wait,
        },
    );
    let app_state = Arc::new(AppState {
        config: config.clone(),
        orchestrator,
        store,
        auth_codes,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    // --- 5. Create the Web Router ---
    let api_router = Router::new()
        .route("/", get(root_handler))
        .route("/hello", get(hello_handler))
        .route("/email_in_db", get(email_in_db_handler))
        .route("/local_callback", get(local_callback_handler))
        .layer(cors)
        .with_state(app_state);

    // Merge the API router with the Swagger UI router for a complete application.
    let app = Router::new()
        .merge(api_router)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    // --- 6. Start the Server ---
    info!("Starting server on {}", config.bind_address);
    info!(
        "Swagger UI available at http://{}/swagger-ui",
        config.bind_address
    );
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
