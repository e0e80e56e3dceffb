//! Form management for business accounts, plus the public read the fill page
//! uses. Every `{id}` route answers an unparseable id with 400 before it
//! touches the store, and treats another business's form as missing.
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use forms::{models::FeedbackForm, validation::FormDraft};
use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::BusinessUser,
    error::AppError,
    qr::{form_url, png_data_url, render_png},
    state::AppState,
    utils::{parse_body, parse_id},
};

const INVALID_ID: &str = "Invalid feedback form id";
const NOT_FOUND: &str = "Feedback form not found";
const BAD_BASE_URL: &str = "frontendBaseUrl must be a non-empty string";

fn form_id(raw: &str) -> Result<Uuid, AppError> {
    parse_id(raw).ok_or(AppError::BadRequest(INVALID_ID))
}

async fn owned_form(
    state: &AppState,
    caller: &BusinessUser,
    id: Uuid,
) -> Result<FeedbackForm, AppError> {
    state
        .documents
        .get::<FeedbackForm>(id)
        .await?
        .filter(|form| form.business_id == caller.business.id)
        .ok_or(AppError::NotFound(NOT_FOUND))
}

pub async fn create_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let form = parse_body::<FormDraft>(&body)?.into_form(caller.business.id)?;
    state.documents.save(&form).await?;

    info!("Business {} created form {}", caller.business.id, form.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({ "message": "Feedback form created", "feedbackForm": form })),
    ))
}

pub async fn list_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
) -> Result<impl IntoResponse, AppError> {
    let forms = state.documents.forms_for(caller.business.id).await?;

    Ok(Json(json!({ "feedbackForms": forms })))
}

pub async fn get_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = form_id(&id)?;

    let form = state
        .documents
        .get::<FeedbackForm>(id)
        .await?
        .ok_or(AppError::NotFound(NOT_FOUND))?;

    Ok(Json(json!({ "feedbackForm": form })))
}

pub async fn update_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let id = form_id(&id)?;

    let draft = parse_body::<FormDraft>(&body)?;
    draft.ensure_not_empty()?;

    let form = owned_form(&state, &caller, id).await?;
    let updated = draft.apply_to(&form)?;
    state.documents.save(&updated).await?;

    info!("Business {} updated form {}", caller.business.id, id);

    Ok(Json(json!({ "message": "Feedback form updated", "feedbackForm": updated })))
}

pub async fn delete_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = form_id(&id)?;

    owned_form(&state, &caller, id).await?;
    if !state.documents.delete_form(id).await? {
        return Err(AppError::NotFound(NOT_FOUND));
    }

    info!("Business {} deleted form {}", caller.business.id, id);

    Ok(Json(json!({ "message": "Feedback form deleted" })))
}

/// `frontendBaseUrl` is optional, but when the key is sent it has to be a
/// non-blank string.
fn base_url_override(body: &Map<String, Value>) -> Result<Option<&str>, AppError> {
    match body.get("frontendBaseUrl") {
        None => Ok(None),
        Some(Value::String(url)) if !url.trim().is_empty() => Ok(Some(url)),
        Some(_) => Err(AppError::BadRequest(BAD_BASE_URL)),
    }
}

pub async fn qr_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let id = form_id(&id)?;

    let body = parse_body::<Map<String, Value>>(&body)?;
    let base_url = base_url_override(&body)?.unwrap_or(&state.config.form_base_url);

    let form = owned_form(&state, &caller, id).await?;

    let url = form_url(base_url, &form.id.to_string());
    let png = render_png(&url).map_err(AppError::internal)?;

    Ok(Json(json!({
        "message": "Feedback form QR generated",
        "formUrl": url,
        "qrCodeDataUrl": png_data_url(&png),
    })))
}

pub async fn responses_handler(
    State(state): State<Arc<AppState>>,
    caller: BusinessUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = form_id(&id)?;

    owned_form(&state, &caller, id).await?;
    let responses = state.documents.responses_for(id).await?;

    Ok(Json(json!({ "formResponses": responses })))
}
