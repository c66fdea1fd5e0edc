//! Identity provider abstraction
//!
//! The credential cache only knows how to ask for tokens; `IdentityProvider`
//! is the seam that lets it run against Azure AD in production and a
//! counting fake in tests.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use common::SecretString;
use tracing::instrument;

use crate::constants::DEFAULT_DEVICE_CODE_TIMEOUT;
use crate::device_code::{self, DeviceCodePrompt, stderr_prompt};
use crate::error::Result;
use crate::token::{self, ClientCredentials, TokenResponse, request_scope};

/// Boxed future returned by every provider operation.
pub type ProviderFuture<'a> = Pin<Box<dyn Future<Output = Result<TokenResponse>> + Send + 'a>>;

/// Source of fresh tokens.
///
/// Uses `Pin<Box<dyn Future>>` return types so the cache can hold an
/// `Arc<dyn IdentityProvider>`.
pub trait IdentityProvider: Send + Sync {
    /// Identifier for logging (e.g. "azure")
    fn id(&self) -> &str;

    /// Silent renewal with a refresh token.
    fn refresh<'a>(&'a self, refresh_token: &'a str, scopes: &'a [String]) -> ProviderFuture<'a>;

    /// Interactive sign-in. Blocks until a human completes it or it fails.
    fn device_code<'a>(&'a self, scopes: &'a [String]) -> ProviderFuture<'a>;

    /// Redeem an authorization code from the redirect callback.
    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
        scopes: &'a [String],
    ) -> ProviderFuture<'a>;
}

/// Azure AD v2.0 endpoints for one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
    pub device_code: String,
}

impl Endpoints {
    /// `tenant_id` may be a GUID, a domain, or `common`/`organizations`/`consumers`.
    pub fn for_tenant(authority_host: &str, tenant_id: &str) -> Self {
        let base = format!(
            "{}/{}/oauth2/v2.0",
            authority_host.trim_end_matches('/'),
            tenant_id
        );
        Self {
            authorize: format!("{base}/authorize"),
            token: format!("{base}/token"),
            device_code: format!("{base}/devicecode"),
        }
    }
}

/// Microsoft identity platform client for one app registration.
pub struct AzureIdentity {
    http: reqwest::Client,
    client: ClientCredentials,
    endpoints: Endpoints,
    device_code_timeout: Duration,
    prompt: DeviceCodePrompt,
}

impl AzureIdentity {
    pub fn new(http: reqwest::Client, client_id: impl Into<String>, endpoints: Endpoints) -> Self {
        Self {
            http,
            client: ClientCredentials::public(client_id),
            endpoints,
            device_code_timeout: DEFAULT_DEVICE_CODE_TIMEOUT,
            prompt: stderr_prompt(),
        }
    }

    /// Confidential registrations send this on code exchange and refresh.
    pub fn with_client_secret(mut self, secret: Option<SecretString>) -> Self {
        self.client.client_secret = secret;
        self
    }

    pub fn with_device_code_timeout(mut self, timeout: Duration) -> Self {
        self.device_code_timeout = timeout;
        self
    }

    pub fn with_prompt(mut self, prompt: DeviceCodePrompt) -> Self {
        self.prompt = prompt;
        self
    }

    #[instrument(skip_all, fields(client_id = %self.client.client_id))]
    async fn run_device_code(&self, scopes: &[String]) -> Result<TokenResponse> {
        let scope = request_scope(scopes);
        let device = device_code::request_device_code(
            &self.http,
            &self.endpoints.device_code,
            &self.client.client_id,
            &scope,
        )
        .await?;

        (self.prompt)(&device);

        device_code::poll_for_token(
            &self.http,
            &self.endpoints.token,
            &self.client.client_id,
            &device,
            self.device_code_timeout,
        )
        .await
    }
}

impl IdentityProvider for AzureIdentity {
    fn id(&self) -> &str {
        "azure"
    }

    fn refresh<'a>(&'a self, refresh_token: &'a str, scopes: &'a [String]) -> ProviderFuture<'a> {
        Box::pin(token::refresh_token(
            &self.http,
            &self.endpoints.token,
            &self.client,
            refresh_token,
            scopes,
        ))
    }

    fn device_code<'a>(&'a self, scopes: &'a [String]) -> ProviderFuture<'a> {
        Box::pin(self.run_device_code(scopes))
    }

    fn exchange_code<'a>(
        &'a self,
        code: &'a str,
        verifier: &'a str,
        redirect_uri: &'a str,
        scopes: &'a [String],
    ) -> ProviderFuture<'a> {
        Box::pin(token::exchange_code(
            &self.http,
            &self.endpoints.token,
            &self.client,
            code,
            verifier,
            redirect_uri,
            scopes,
        ))
    }
}
