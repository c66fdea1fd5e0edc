//! Mailbox operations over Microsoft Graph
//!
//! A thin facade: every call asks a `TokenSource` for a bearer token and
//! forwards a fixed request shape to Graph. No retries, no paging, no
//! caching beyond what the token source does.

pub mod client;
pub mod error;
pub mod models;

pub use client::{DEFAULT_GRAPH_BASE_URL, GraphClient, INBOX_PAGE_SIZE};
pub use error::{Error, Result};
pub use models::{EmailAddress, Message, MessagePage, Recipient, User};

use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by `TokenSource::access_token`.
pub type TokenFuture<'a> = Pin<Box<dyn Future<Output = graph_auth::Result<String>> + Send + 'a>>;

/// Supplies bearer tokens for Graph calls.
///
/// Boxed-future signature keeps it usable as `Arc<dyn TokenSource>`.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> TokenFuture<'_>;
}

impl TokenSource for graph_auth::CredentialCache {
    fn access_token(&self) -> TokenFuture<'_> {
        Box::pin(self.get_valid_access_token())
    }
}
