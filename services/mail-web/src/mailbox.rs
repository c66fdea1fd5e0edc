//! Mailbox routes backed by `GraphClient`

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use serde::Deserialize;
use tracing::info;

use crate::AppState;
use crate::error::AppError;
use crate::render;

/// GET / — profile of the signed-in user.
pub async fn index(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    match state.graph.get_user().await? {
        Some(user) => Ok(Html(render::index_page(&user))),
        None => Err(AppError::NotFound("User not found")),
    }
}

/// GET /list-inbox — most recent inbox messages.
pub async fn list_inbox(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let page = state.graph.get_inbox().await?;
    Ok(Html(render::inbox_page(&page.value)))
}

#[derive(Debug, Deserialize)]
pub struct SendMailForm {
    subject: String,
    #[serde(default)]
    body: String,
    recipient: String,
}

/// POST /send-mail — send a plain-text message.
pub async fn send_mail(
    State(state): State<AppState>,
    Json(form): Json<SendMailForm>,
) -> Result<impl IntoResponse, AppError> {
    let recipient = form.recipient.trim();
    if recipient.is_empty() {
        return Err(AppError::BadRequest("recipient must not be empty".into()));
    }

    state
        .graph
        .send_mail(&form.subject, &form.body, recipient)
        .await?;

    info!("mail sent");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "sent", "recipient": recipient })),
    ))
}
