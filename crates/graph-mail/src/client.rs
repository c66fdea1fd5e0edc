//! Graph API client
//!
//! Three operations consumed by the web layer. Each obtains a token first;
//! token failures surface as `Error::Auth` before any Graph request is sent.

use std::sync::Arc;

use reqwest::{Method, StatusCode};
use tracing::{debug, instrument, warn};

use crate::TokenSource;
use crate::error::{Error, Result};
use crate::models::{MessagePage, ODataErrorBody, SendMailRequest, User};

/// Microsoft Graph v1.0 endpoint
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Number of most recent inbox messages fetched by `get_inbox`
pub const INBOX_PAGE_SIZE: u32 = 25;

pub struct GraphClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn TokenSource>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            tokens,
        }
    }

    /// Profile of the signed-in user. `None` when Graph reports no such user.
    #[instrument(skip_all)]
    pub async fn get_user(&self) -> Result<Option<User>> {
        let response = self
            .request(Method::GET, "/me")
            .await?
            .query(&[("$select", "displayName,mail,userPrincipalName")])
            .send()
            .await
            .map_err(|e| Error::Http(format!("GET /me failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("Graph returned 404 for /me");
            return Ok(None);
        }

        let response = check_status(response).await?;
        response
            .json::<User>()
            .await
            .map(Some)
            .map_err(|e| Error::Decode(format!("user: {e}")))
    }

    /// Most recent inbox messages, newest first.
    #[instrument(skip_all)]
    pub async fn get_inbox(&self) -> Result<MessagePage> {
        let top = INBOX_PAGE_SIZE.to_string();
        let response = self
            .request(Method::GET, "/me/mailFolders/inbox/messages")
            .await?
            .query(&[
                ("$select", "from,isRead,receivedDateTime,subject"),
                ("$top", top.as_str()),
                ("$orderby", "receivedDateTime DESC"),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(format!("GET inbox messages failed: {e}")))?;

        let response = check_status(response).await?;
        let page = response
            .json::<MessagePage>()
            .await
            .map_err(|e| Error::Decode(format!("message page: {e}")))?;
        debug!(messages = page.value.len(), "fetched inbox page");
        Ok(page)
    }

    /// Send a plain-text mail to one recipient.
    #[instrument(skip_all)]
    pub async fn send_mail(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        let response = self
            .request(Method::POST, "/me/sendMail")
            .await?
            .json(&SendMailRequest::plain_text(subject, body, recipient))
            .send()
            .await
            .map_err(|e| Error::Http(format!("POST /me/sendMail failed: {e}")))?;

        check_status(response).await?;
        debug!("mail accepted by Graph");
        Ok(())
    }

    async fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token))
    }
}

/// Pass successes through; turn anything else into `RemoteApi`.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ODataErrorBody>(&body) {
        Ok(parsed) => (parsed.error.code, parsed.error.message),
        Err(_) => (
            status
                .canonical_reason()
                .unwrap_or("UnknownError")
                .to_string(),
            body,
        ),
    };
    warn!(status = status.as_u16(), code = %code, "Graph request failed");
    Err(Error::RemoteApi {
        status: status.as_u16(),
        code,
        message,
    })
}
