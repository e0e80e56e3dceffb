use std::sync::Arc;

use axum::{Json, extract::State, response::IntoResponse};
use forms::models::{Business, BusinessListItem};
use serde_json::json;

use crate::{auth::BusinessUser, error::AppError, state::AppState};

/// Profile shown in the business dashboard header.
pub async fn business_me_handler(BusinessUser { business, .. }: BusinessUser) -> impl IntoResponse {
    Json(json!({ "success": true, "data": business }))
}

pub async fn list_businesses_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, AppError> {
    let mut businesses = state.documents.all::<Business>().await?;
    businesses.sort_by(|a, b| a.created_at.cmp(&b.created_at));

    let businesses: Vec<BusinessListItem> = businesses.iter().map(BusinessListItem::from).collect();

    Ok(Json(json!({
        "message": "Business API v1",
        "ok": true,
        "businesses": businesses,
    })))
}
