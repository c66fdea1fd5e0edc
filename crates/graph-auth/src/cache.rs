//! Credential cache
//!
//! Hands out a currently valid access token while keeping interactive
//! sign-ins to a minimum. Order of preference on every call:
//! 1. the persisted token, if it has not expired (no network)
//! 2. silent refresh with the persisted refresh token
//! 3. device code sign-in (a human has to act)
//!
//! The whole check → acquire → persist sequence runs under one async mutex,
//! so concurrent callers during an expiry wait for the single in-flight
//! acquisition and share its outcome: a new token is read back from the
//! store, and a failure is handed to every caller that queued behind it.
//!
//! A browser sign-in (`complete_authorization`) does not queue. It persists
//! its token directly and cuts short whatever acquisition is pending.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::provider::IdentityProvider;
use crate::store::{TokenRecord, TokenStore, unix_now};
use crate::token::TokenResponse;

/// Wall clock in seconds since the unix epoch. Injectable for tests.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// How a token handed to a caller was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionSource {
    Cached,
    Refresh,
    DeviceCode,
    AuthorizationCode,
}

impl AcquisitionSource {
    pub fn label(&self) -> &'static str {
        match self {
            AcquisitionSource::Cached => "cached",
            AcquisitionSource::Refresh => "refresh",
            AcquisitionSource::DeviceCode => "device_code",
            AcquisitionSource::AuthorizationCode => "authorization_code",
        }
    }
}

/// Bounded exponential backoff for transient refresh failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Token summary for health reporting. Never carries token values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStatus {
    pub has_token: bool,
    pub valid: bool,
    pub has_refresh_token: bool,
    pub expires_on: Option<u64>,
}

pub struct CredentialCache {
    provider: Arc<dyn IdentityProvider>,
    store: TokenStore,
    scopes: Vec<String>,
    retry: RetryPolicy,
    clock: Clock,
    /// Held for a whole acquisition; guards the failure of the last one.
    acquisition: Mutex<Option<Error>>,
    /// Bumped while `acquisition` is held, each time an acquisition ends.
    attempts_finished: AtomicU64,
    /// Fired after a browser sign-in has persisted its token.
    signed_in: Notify,
}

impl CredentialCache {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: TokenStore,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            provider,
            store,
            scopes,
            retry: RetryPolicy::default(),
            clock: Arc::new(unix_now),
            acquisition: Mutex::new(None),
            attempts_finished: AtomicU64::new(0),
            signed_in: Notify::new(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Return an access token that is valid right now.
    ///
    /// May block for a human-timescale duration when device code sign-in is
    /// needed. `Storage` errors (unreadable, malformed, or unwritable token
    /// file) are never downgraded to "no token".
    #[instrument(skip_all, fields(provider = self.provider.id()))]
    pub async fn get_valid_access_token(&self) -> Result<String> {
        let seen = self.attempts_finished.load(Ordering::Acquire);
        let mut last_failure = self.acquisition.lock().await;
        // Registered before the store is read so a sign-in persisted after
        // the read still wakes this caller.
        let signed_in = self.signed_in.notified();

        let cached = self.store.load().await.inspect_err(record_failure)?;
        let now = (self.clock)();

        if let Some(record) = &cached {
            if record.is_valid_at(now) {
                debug!(expires_in_secs = record.expires_on - now, "using cached access token");
                record_acquisition(AcquisitionSource::Cached);
                return Ok(record.access_token.clone());
            }
            debug!(expired_secs_ago = now - record.expires_on, "cached access token expired");
        }

        let finished_while_waiting = self.attempts_finished.load(Ordering::Acquire) != seen;
        if let Some(error) = last_failure.as_ref().filter(|_| finished_while_waiting) {
            debug!(error = %error, "acquisition failed while waiting, sharing its error");
            return Err(error.clone());
        }

        let previous_refresh = cached.and_then(|r| r.refresh_token);
        let acquired = tokio::select! {
            acquired = self.acquire(previous_refresh.as_deref()) => Some(acquired),
            () = signed_in => None,
        };

        let result = match acquired {
            Some(Ok((response, source))) => {
                let record = TokenRecord::from_response(response, (self.clock)())
                    .or_refresh_token(previous_refresh);
                self.persist(&record, source)
                    .await
                    .map(|()| record.access_token)
            }
            Some(Err(e)) => {
                record_failure(&e);
                Err(e)
            }
            None => {
                info!("browser sign-in completed, abandoning pending acquisition");
                self.signed_in_token().await
            }
        };

        *last_failure = result.as_ref().err().cloned();
        self.attempts_finished.fetch_add(1, Ordering::Release);
        result
    }

    /// Redeem an authorization code from the redirect callback and persist
    /// the result, replacing whatever the store held.
    ///
    /// Does not wait for a pending acquisition. Once the token is stored,
    /// callers blocked on device code sign-in receive it instead.
    #[instrument(skip_all, fields(provider = self.provider.id()))]
    pub async fn complete_authorization(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
    ) -> Result<()> {
        let response = self
            .provider
            .exchange_code(code, verifier, redirect_uri, &self.scopes)
            .await
            .inspect_err(record_failure)?;

        let record = TokenRecord::from_response(response, (self.clock)());
        self.persist(&record, AcquisitionSource::AuthorizationCode)
            .await?;
        self.signed_in.notify_waiters();
        Ok(())
    }

    /// Snapshot of the persisted token.
    ///
    /// Does not take the acquisition lock, so health checks stay responsive
    /// while a device code sign-in is pending. Saves are atomic renames, so
    /// the read sees either the old or the new record.
    pub async fn status(&self) -> Result<CacheStatus> {
        let now = (self.clock)();
        Ok(match self.store.load().await? {
            Some(record) => CacheStatus {
                has_token: true,
                valid: record.is_valid_at(now),
                has_refresh_token: record.refresh_token.is_some(),
                expires_on: Some(record.expires_on),
            },
            None => CacheStatus {
                has_token: false,
                valid: false,
                has_refresh_token: false,
                expires_on: None,
            },
        })
    }

    /// Refresh first, device code second.
    ///
    /// A rejected refresh token falls through to device code sign-in. A
    /// transient failure that outlives the retries is returned as-is:
    /// prompting a human cannot fix a network outage.
    async fn acquire(
        &self,
        refresh_token: Option<&str>,
    ) -> Result<(TokenResponse, AcquisitionSource)> {
        match refresh_token {
            Some(refresh) => match self.refresh_with_retry(refresh).await {
                Ok(response) => {
                    info!("access token refreshed");
                    return Ok((response, AcquisitionSource::Refresh));
                }
                Err(Error::Authentication(reason)) => {
                    warn!(
                        error = %reason,
                        "refresh token rejected, falling back to device code sign-in"
                    );
                }
                Err(e) => return Err(e),
            },
            None => info!("no refresh token available, starting device code sign-in"),
        }

        let response = self.provider.device_code(&self.scopes).await?;
        Ok((response, AcquisitionSource::DeviceCode))
    }

    /// The token a browser sign-in just stored.
    async fn signed_in_token(&self) -> Result<String> {
        match self.store.load().await.inspect_err(record_failure)? {
            Some(record) if record.is_valid_at((self.clock)()) => Ok(record.access_token),
            _ => Err(Error::Authentication(
                "browser sign-in completed without leaving a valid token".into(),
            )),
        }
    }

    async fn refresh_with_retry(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 1;
        loop {
            match self.provider.refresh(refresh_token, &self.scopes).await {
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    warn!(
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient refresh failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    async fn persist(&self, record: &TokenRecord, source: AcquisitionSource) -> Result<()> {
        self.store.save(record).await.inspect_err(record_failure)?;
        info!(
            source = source.label(),
            expires_on = record.expires_on,
            has_refresh_token = record.refresh_token.is_some(),
            "stored new access token"
        );
        record_acquisition(source);
        Ok(())
    }
}

fn record_acquisition(source: AcquisitionSource) {
    metrics::counter!("token_acquisitions_total", "source" => source.label()).increment(1);
}

fn record_failure(error: &Error) {
    metrics::counter!("token_acquisition_failures_total", "kind" => error.kind()).increment(1);
}
