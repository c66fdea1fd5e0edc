//! Token endpoint exchanges
//!
//! Handles the two non-interactive token endpoint interactions:
//! 1. Authorization code exchange (redirect-callback sign-in)
//! 2. Refresh token exchange (silent renewal)
//!
//! Device code polling also lands on the token endpoint and shares the
//! response handling below; see `device_code`.

use common::SecretString;
use serde::{Deserialize, Serialize};

use crate::constants::OFFLINE_ACCESS_SCOPE;
use crate::error::{Error, Result};

/// Response from the token endpoint for every grant type.
///
/// `expires_in` is a delta in seconds from the response time. The cache
/// converts it to an absolute `expires_on` when building a `TokenRecord`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only issued when `offline_access` was granted
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: u64,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// OAuth 2.0 error body (RFC 6749 section 5.2).
#[derive(Debug, Deserialize)]
pub(crate) struct OAuthErrorBody {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl OAuthErrorBody {
    pub(crate) fn parse(body: &str) -> Option<Self> {
        serde_json::from_str(body).ok()
    }

    pub(crate) fn describe(&self) -> String {
        match &self.error_description {
            // Azure descriptions are multi-line with trace ids; the first line is the useful part
            Some(desc) => format!(
                "{}: {}",
                self.error,
                desc.lines().next().unwrap_or_default().trim()
            ),
            None => self.error.clone(),
        }
    }
}

/// The app registration identity sent with every token request.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    /// Present only for confidential (web) registrations
    pub client_secret: Option<SecretString>,
}

impl ClientCredentials {
    pub fn public(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
        }
    }

    fn push_form_fields<'a>(&'a self, form: &mut Vec<(&'static str, &'a str)>) {
        form.push(("client_id", self.client_id.as_str()));
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.expose().as_str()));
        }
    }
}

/// Join configured scopes into the space-separated `scope` parameter,
/// appending `offline_access` if the configuration left it out.
pub fn request_scope(scopes: &[String]) -> String {
    let mut joined: Vec<&str> = scopes.iter().map(String::as_str).collect();
    if !joined
        .iter()
        .any(|s| s.eq_ignore_ascii_case(OFFLINE_ACCESS_SCOPE))
    {
        joined.push(OFFLINE_ACCESS_SCOPE);
    }
    joined.join(" ")
}

/// Exchange an authorization code for tokens (redirect-callback flow).
///
/// The PKCE verifier proves this process started the flow that produced `code`.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_endpoint: &str,
    client: &ClientCredentials,
    code: &str,
    verifier: &str,
    redirect_uri: &str,
    scopes: &[String],
) -> Result<TokenResponse> {
    let scope = request_scope(scopes);
    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("code_verifier", verifier),
        ("redirect_uri", redirect_uri),
        ("scope", scope.as_str()),
    ];
    client.push_form_fields(&mut form);

    let response = http
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    read_token_response(response, "token exchange").await
}

/// Refresh an access token using a refresh token.
pub async fn refresh_token(
    http: &reqwest::Client,
    token_endpoint: &str,
    client: &ClientCredentials,
    refresh: &str,
    scopes: &[String],
) -> Result<TokenResponse> {
    let scope = request_scope(scopes);
    let mut form = vec![
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh),
        ("scope", scope.as_str()),
    ];
    client.push_form_fields(&mut form);

    let response = http
        .post(token_endpoint)
        .form(&form)
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    read_token_response(response, "token refresh").await
}

/// Statuses that say "try again later" rather than "no": 5xx, 408 and 429.
pub(crate) fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status.is_server_error()
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status == reqwest::StatusCode::TOO_MANY_REQUESTS
}

/// Map a token endpoint response onto `TokenResponse` or a classified error.
///
/// Retryable statuses are transient (`Http`); any other 4xx is the provider
/// refusing the grant (`Authentication`).
pub(crate) async fn read_token_response(
    response: reqwest::Response,
    operation: &str,
) -> Result<TokenResponse> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<TokenResponse>()
            .await
            .map_err(|e| Error::Authentication(format!("invalid {operation} response: {e}")));
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));

    if is_retryable_status(status) {
        return Err(Error::Http(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    let detail = OAuthErrorBody::parse(&body)
        .map(|e| e.describe())
        .unwrap_or(body);
    Err(Error::Authentication(format!(
        "{operation} rejected ({status}): {detail}"
    )))
}
