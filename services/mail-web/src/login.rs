//! Browser sign-in through the authorization-code redirect
//!
//! `GET /login` generates a PKCE pair, remembers the verifier under a random
//! `state`, and redirects to the authorize endpoint. `GET /getAToken` looks
//! the verifier up again and has the credential cache redeem the code.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use graph_auth::AuthorizationRequest;

use crate::AppState;
use crate::error::AppError;

/// Maximum age of a pending login before its verifier is discarded.
const LOGIN_EXPIRY: Duration = Duration::from_secs(600);

struct PendingLogin {
    verifier: String,
    created_at: Instant,
}

/// Verifiers for sign-ins that have been started but not yet called back.
#[derive(Clone)]
pub struct PendingLogins {
    entries: Arc<Mutex<HashMap<String, PendingLogin>>>,
    ttl: Duration,
}

impl PendingLogins {
    pub fn new() -> Self {
        Self::with_ttl(LOGIN_EXPIRY)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Store `verifier` and return the `state` value that retrieves it.
    pub async fn begin(&self, verifier: String) -> String {
        let state = uuid::Uuid::new_v4().as_simple().to_string();
        let mut entries = self.entries.lock().await;
        // Lazy cleanup while holding the lock
        entries.retain(|_, pending| pending.created_at.elapsed() < self.ttl);
        entries.insert(
            state.clone(),
            PendingLogin {
                verifier,
                created_at: Instant::now(),
            },
        );
        state
    }

    /// Remove and return the verifier for `state`. Each state is single-use;
    /// an expired entry is consumed and reported as missing.
    pub async fn take(&self, state: &str) -> Option<String> {
        let pending = self.entries.lock().await.remove(state)?;
        (pending.created_at.elapsed() < self.ttl).then_some(pending.verifier)
    }
}

impl Default for PendingLogins {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the browser is sent and where it comes back.
pub struct LoginSettings {
    pub authorize_endpoint: String,
    pub client_id: String,
    pub redirect_uri: String,
}

/// GET /login
pub async fn login(State(state): State<AppState>) -> Response {
    let verifier = graph_auth::generate_verifier();
    let challenge = graph_auth::compute_challenge(&verifier);
    let login_state = state.logins.begin(verifier).await;

    let url = AuthorizationRequest {
        authorize_endpoint: &state.login.authorize_endpoint,
        client_id: &state.login.client_id,
        redirect_uri: &state.login.redirect_uri,
        scopes: state.cache.scopes(),
        state: &login_state,
        challenge: &challenge,
    }
    .url();

    info!("redirecting to authorize endpoint");
    Redirect::to(&url).into_response()
}

/// Query string of the redirect callback. Azure sends either `code` or
/// `error` + `error_description`.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// GET /getAToken
pub async fn callback(
    State(state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        warn!(error, "authorize endpoint returned an error");
        return Err(graph_auth::Error::Authentication(format!("{error}: {description}")).into());
    }

    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        return Err(AppError::BadRequest(
            "missing code or state query parameter".into(),
        ));
    };

    let Some(verifier) = state.logins.take(&login_state).await else {
        return Err(AppError::BadRequest(
            "unknown or expired login state, start again at /login".into(),
        ));
    };

    state
        .cache
        .complete_authorization(&code, &verifier, &state.login.redirect_uri)
        .await?;

    info!("sign-in completed");
    Ok(Redirect::to("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn take_returns_verifier_once() {
        let logins = PendingLogins::new();
        let state = logins.begin("verifier-1".into()).await;

        assert_eq!(logins.take(&state).await.as_deref(), Some("verifier-1"));
        assert!(logins.take(&state).await.is_none(), "state is single-use");
    }

    #[tokio::test]
    async fn states_are_distinct() {
        let logins = PendingLogins::new();
        let a = logins.begin("a".into()).await;
        let b = logins.begin("b".into()).await;
        assert_ne!(a, b);
        assert_eq!(logins.take(&b).await.as_deref(), Some("b"));
        assert_eq!(logins.take(&a).await.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn unknown_state_is_none() {
        let logins = PendingLogins::new();
        assert!(logins.take("never-issued").await.is_none());
    }

    #[tokio::test]
    async fn expired_state_is_rejected() {
        let logins = PendingLogins::with_ttl(Duration::from_millis(20));
        let state = logins.begin("stale".into()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(logins.take(&state).await.is_none());
    }

    #[tokio::test]
    async fn begin_prunes_expired_entries() {
        let logins = PendingLogins::with_ttl(Duration::from_millis(20));
        logins.begin("old".into()).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        logins.begin("new".into()).await;
        assert_eq!(logins.entries.lock().await.len(), 1);
    }
}
