//! Device code sign-in (RFC 8628)
//!
//! The interactive fallback when no usable refresh token exists:
//! 1. POST the devicecode endpoint for a user code and verification URL
//! 2. Show those to the operator, who completes sign-in in a browser
//! 3. Poll the token endpoint until the provider issues tokens, refuses,
//!    or the wait is cut off by the timeout

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_POLL_INTERVAL_SECS, DEVICE_CODE_GRANT_TYPE, MIN_POLL_INTERVAL, SLOW_DOWN_INCREMENT,
};
use crate::error::{Error, Result};
use crate::token::{OAuthErrorBody, TokenResponse, is_retryable_status, read_token_response};

/// Response from the devicecode endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceCodeResponse {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    /// Seconds until `device_code` stops being accepted
    pub expires_in: u64,
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Ready-to-display instructions, localized by the provider
    #[serde(default)]
    pub message: Option<String>,
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

impl DeviceCodeResponse {
    /// The provider's polling interval, never shorter than `MIN_POLL_INTERVAL`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval).max(MIN_POLL_INTERVAL)
    }

    /// Text to show the operator.
    pub fn instructions(&self) -> String {
        match &self.message {
            Some(message) => message.clone(),
            None => format!(
                "To sign in, use a web browser to open the page {} and enter the code {} to authenticate.",
                self.verification_uri, self.user_code
            ),
        }
    }
}

/// Presents device code instructions to whoever must complete sign-in.
pub type DeviceCodePrompt = Arc<dyn Fn(&DeviceCodeResponse) + Send + Sync>;

/// Log the instructions and echo them to stderr for a terminal operator.
pub fn stderr_prompt() -> DeviceCodePrompt {
    Arc::new(|device: &DeviceCodeResponse| {
        info!(
            verification_uri = %device.verification_uri,
            user_code = %device.user_code,
            expires_in_secs = device.expires_in,
            "device code sign-in required"
        );
        eprintln!("{}", device.instructions());
    })
}

/// What to do after a non-success poll response.
#[derive(Debug, PartialEq, Eq)]
enum PollOutcome {
    Pending,
    SlowDown,
    Failed(String),
}

fn classify_poll_error(body: &str) -> PollOutcome {
    match OAuthErrorBody::parse(body) {
        Some(e) if e.error == "authorization_pending" => PollOutcome::Pending,
        Some(e) if e.error == "slow_down" => PollOutcome::SlowDown,
        Some(e) => PollOutcome::Failed(match e.error.as_str() {
            "authorization_declined" => "device code sign-in was declined".to_string(),
            "expired_token" => "device code expired before sign-in completed".to_string(),
            _ => format!("device code sign-in failed: {}", e.describe()),
        }),
        None => PollOutcome::Failed(format!("device code sign-in failed: {body}")),
    }
}

/// Ask the provider for a device code.
pub async fn request_device_code(
    http: &reqwest::Client,
    device_code_endpoint: &str,
    client_id: &str,
    scope: &str,
) -> Result<DeviceCodeResponse> {
    let response = http
        .post(device_code_endpoint)
        .form(&[("client_id", client_id), ("scope", scope)])
        .send()
        .await
        .map_err(|e| Error::Http(format!("device code request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if is_retryable_status(status) {
            return Err(Error::Http(format!(
                "device code endpoint returned {status}: {body}"
            )));
        }
        let detail = OAuthErrorBody::parse(&body)
            .map(|e| e.describe())
            .unwrap_or(body);
        return Err(Error::Authentication(format!(
            "device code request rejected ({status}): {detail}"
        )));
    }

    response
        .json::<DeviceCodeResponse>()
        .await
        .map_err(|e| Error::Authentication(format!("invalid device code response: {e}")))
}

/// Poll the token endpoint until sign-in completes.
///
/// The wait is bounded by the smaller of the device code lifetime and
/// `timeout`. Transport failures while polling are logged and polling
/// continues; the bound still applies.
pub async fn poll_for_token(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    device: &DeviceCodeResponse,
    timeout: Duration,
) -> Result<TokenResponse> {
    let limit = Duration::from_secs(device.expires_in).min(timeout);
    tokio::time::timeout(limit, poll_loop(http, token_endpoint, client_id, device))
        .await
        .map_err(|_| {
            Error::Authentication(format!(
                "device code sign-in timed out after {}s",
                limit.as_secs()
            ))
        })?
}

async fn poll_loop(
    http: &reqwest::Client,
    token_endpoint: &str,
    client_id: &str,
    device: &DeviceCodeResponse,
) -> Result<TokenResponse> {
    let mut interval = device.poll_interval();

    loop {
        tokio::time::sleep(interval).await;

        let response = match http
            .post(token_endpoint)
            .form(&[
                ("grant_type", DEVICE_CODE_GRANT_TYPE),
                ("client_id", client_id),
                ("device_code", device.device_code.as_str()),
            ])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "device code poll failed, will retry");
                continue;
            }
        };

        let status = response.status();
        if status.is_success() {
            info!("device code sign-in completed");
            return read_token_response(response, "device code sign-in").await;
        }

        let body = response.text().await.unwrap_or_default();
        if is_retryable_status(status) {
            warn!(%status, "token endpoint error while polling, will retry");
            continue;
        }

        match classify_poll_error(&body) {
            PollOutcome::Pending => debug!("authorization pending"),
            PollOutcome::SlowDown => {
                interval += SLOW_DOWN_INCREMENT;
                debug!(interval_secs = interval.as_secs(), "provider asked to slow down");
            }
            PollOutcome::Failed(reason) => return Err(Error::Authentication(reason)),
        }
    }
}
