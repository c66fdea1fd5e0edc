//! Handler error type and its HTTP mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::warn;

/// Errors a route handler can return.
///
/// Every variant renders as a plain-text body; the status code tells the
/// browser (or script) which side is at fault.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Graph(#[from] graph_mail::Error),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    BadRequest(String),
}

impl From<graph_auth::Error> for AppError {
    fn from(err: graph_auth::Error) -> Self {
        AppError::Graph(graph_mail::Error::Auth(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        use graph_mail::Error as Graph;
        match self {
            AppError::Graph(Graph::RemoteApi { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Graph(Graph::Auth(graph_auth::Error::Authentication(_))) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Graph(Graph::Auth(graph_auth::Error::Storage(_))) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Graph(Graph::Auth(graph_auth::Error::Http(_)))
            | AppError::Graph(Graph::Http(_))
            | AppError::Graph(Graph::Decode(_)) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn body(&self) -> String {
        match self {
            AppError::Graph(graph_mail::Error::Auth(graph_auth::Error::Authentication(_))) => {
                format!("{self}. Sign in again at /login")
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Graph(graph_mail::Error::RemoteApi { code, .. }) = &self {
            crate::metrics::record_graph_error(code);
        }
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %self, "request failed");
        }
        (status, self.body()).into_response()
    }
}
