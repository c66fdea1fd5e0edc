//! Error types for token acquisition and storage

/// Errors from the credential cache and the identity provider.
///
/// `Authentication` and `Storage` stay separate so the web layer
/// can tell "sign in again" apart from "the token file is broken".
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Sign-in denied or timed out, or the provider rejected the
    /// client/tenant/scope configuration or the refresh token.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The token file could not be read, parsed, or written.
    #[error("token storage error: {0}")]
    Storage(String),

    /// Transport failure or 5xx from the identity provider.
    #[error("HTTP request failed: {0}")]
    Http(String),
}

impl Error {
    /// Whether a retry with backoff may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Http(_))
    }

    /// Short label for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Authentication(_) => "authentication",
            Error::Storage(_) => "storage",
            Error::Http(_) => "http",
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
