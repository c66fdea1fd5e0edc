//! Error types for Graph calls

/// Errors from the mailbox facade.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No token could be obtained. Keeps the auth/storage distinction intact.
    #[error(transparent)]
    Auth(#[from] graph_auth::Error),

    /// Graph answered with an OData error. Displays as `"{code} - {message}"`.
    #[error("{code} - {message}")]
    RemoteApi {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Graph request failed: {0}")]
    Http(String),

    #[error("unexpected Graph response: {0}")]
    Decode(String),
}

/// Result alias for Graph operations.
pub type Result<T> = std::result::Result<T, Error>;
