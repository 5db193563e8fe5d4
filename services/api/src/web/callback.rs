//! services/api/src/web/callback.rs
//!
//! Captures the authorization code that Spotify sends to the local redirect
//! URI during an interactive authorization, and hands it to the orchestrator
//! through a single-slot rendezvous: the code is delivered exactly once, and
//! consumers wait with an explicit bound instead of polling shared state.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::web::state::AppState;

//=========================================================================================
// The Rendezvous
//=========================================================================================

enum Slot {
    Idle,
    /// A code arrived before anyone was waiting for it.
    Parked(String),
    /// A consumer is waiting; completing the sender wakes it.
    Waiting(oneshot::Sender<String>),
}

/// A single-slot handoff between the OAuth callback and the orchestrator.
///
/// At most one code is in flight at a time; a newer delivery replaces a stale
/// parked one, mirroring the at-most-one-credential-per-user model.
pub struct AuthCodeRendezvous {
    slot: Mutex<Slot>,
}

impl AuthCodeRendezvous {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Idle),
        }
    }

    /// Delivers a captured code. Wakes the waiting consumer if there is one,
    /// otherwise parks the code for the next `wait` call.
    pub fn deliver(&self, code: String) {
        let mut slot = self.slot.lock().expect("rendezvous lock poisoned");
        match std::mem::replace(&mut *slot, Slot::Idle) {
            Slot::Waiting(sender) => {
                // The waiter may have timed out between registering and now;
                // park the code so the next consumer still gets it.
                if let Err(code) = sender.send(code) {
                    *slot = Slot::Parked(code);
                }
            }
            Slot::Idle | Slot::Parked(_) => {
                *slot = Slot::Parked(code);
            }
        }
    }

    /// Waits up to `timeout` for a code, consuming it. Returns immediately if
    /// one is already parked; returns `None` when the bound elapses.
    pub async fn wait(&self, timeout: Duration) -> Option<String> {
        let receiver = {
            let mut slot = self.slot.lock().expect("rendezvous lock poisoned");
            match std::mem::replace(&mut *slot, Slot::Idle) {
                Slot::Parked(code) => return Some(code),
                Slot::Idle | Slot::Waiting(_) => {
                    // Registering replaces any previous (now stale) waiter.
                    let (sender, receiver) = oneshot::channel();
                    *slot = Slot::Waiting(sender);
                    receiver
                }
            }
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(code)) => Some(code),
            _ => {
                // Clear our dead waiter so later deliveries park instead.
                let mut slot = self.slot.lock().expect("rendezvous lock poisoned");
                if let Slot::Waiting(_) = *slot {
                    *slot = Slot::Idle;
                }
                None
            }
        }
    }
}

impl Default for AuthCodeRendezvous {
    fn default() -> Self {
        Self::new()
    }
}

//=========================================================================================
// The Callback Handler
//=========================================================================================

#[derive(Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    error: Option<String>,
}

/// `GET /local_callback`, the redirect target for interactive authorization.
pub async fn local_callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    if let Some(error) = params.error {
        warn!(error, "authorization was denied");
        return (
            StatusCode::BAD_REQUEST,
            "Authorization was denied. You can close this window.",
        );
    }

    match params.code {
        Some(code) => {
            info!("captured authorization code from callback");
            state.auth_codes.deliver(code);
            (StatusCode::OK, "Success! You can close this window.")
        }
        None => (
            StatusCode::BAD_REQUEST,
            "Missing authorization code in callback.",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parked_code_is_consumed_immediately() {
        let rendezvous = AuthCodeRendezvous::new();
        rendezvous.deliver("abc".to_string());
        assert_eq!(
            rendezvous.wait(Duration::from_millis(10)).await,
            Some("abc".to_string())
        );
        // Consumed exactly once.
        assert_eq!(rendezvous.wait(Duration::from_millis(10)).await, None);
    }

    #[tokio::test]
    async fn delivery_wakes_a_waiting_consumer() {
        let rendezvous = Arc::new(AuthCodeRendezvous::new());
        let waiter = {
            let rendezvous = rendezvous.clone();
            tokio::spawn(async move { rendezvous.wait(Duration::from_secs(5)).await })
        };
        // Give the waiter a moment to register its slot.
        tokio::time::sleep(Duration::from_millis(20)).await;
        rendezvous.deliver("xyz".to_string());

        assert_eq!(waiter.await.unwrap(), Some("xyz".to_string()));
    }

    #[tokio::test]
    async fn wait_times_out_without_a_delivery() {
        let rendezvous = AuthCodeRendezvous::new();
        assert_eq!(rendezvous.wait(Duration::from_millis(20)).await, None);
        // A delivery after the timeout parks for the next consumer.
        rendezvous.deliver("late".to_string());
        assert_eq!(
            rendezvous.wait(Duration::from_millis(10)).await,
            Some("late".to_string())
        );
    }

    #[tokio::test]
    async fn newer_delivery_replaces_a_stale_parked_code() {
        let rendezvous = AuthCodeRendezvous::new();
        rendezvous.deliver("stale".to_string());
        rendezvous.deliver("fresh".to_string());
        assert_eq!(
            rendezvous.wait(Duration::from_millis(10)).await,
            Some("fresh".to_string())
        );
    }
}
