//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use crate::orchestrator::RequestOrchestrator;
use crate::web::callback::AuthCodeRendezvous;
use std::sync::Arc;
use training_song_core::ports::CredentialStore;

/// The shared application state, created once at startup and passed to all
/// handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: RequestOrchestrator,
    /// Direct store access exists only for the `email_in_db` presence probe;
    /// everything credential-shaped goes through the orchestrator.
    pub store: Arc<dyn CredentialStore>,
    pub auth_codes: Arc<AuthCodeRendezvous>,
}
