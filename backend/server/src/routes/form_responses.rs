use std::sync::Arc;

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use forms::{models::FeedbackForm, validation::ResponseDraft};
use serde_json::json;
use tracing::info;

use crate::{
    error::AppError,
    state::AppState,
    utils::{parse_body, parse_id},
};

const NOT_FOUND: &str = "Feedback form not found";

/// Public: whoever scanned the QR code submits here without an account.
pub async fn submit_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let draft = parse_body::<ResponseDraft>(&body)?;

    let form_id = draft
        .form_id
        .as_deref()
        .and_then(parse_id)
        .ok_or(AppError::BadRequest("Invalid form Id"))?;

    let form = state
        .documents
        .get::<FeedbackForm>(form_id)
        .await?
        .ok_or(AppError::NotFound(NOT_FOUND))?;

    let response = draft.into_response(form.id)?;
    if !state.documents.save_response(&response).await? {
        return Err(AppError::NotFound(NOT_FOUND));
    }

    info!("Stored response {} for form {}", response.id, form.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Form submitted successfully", "formResponse": response })),
    ))
}
