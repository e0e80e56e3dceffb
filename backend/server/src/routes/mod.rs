use std::sync::Arc;

use axum::{
    Json, Router,
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;

pub mod auth;
pub mod business;
pub mod feedback_forms;
pub mod form_responses;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/health", get(health_handler))
        .route("/api/auth/register", post(auth::register_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/api/auth/logout", post(auth::logout_handler))
        .route("/api/auth/me", get(auth::me_handler))
        .route("/api/business/me", get(business::business_me_handler))
        .route("/api/v1/business", get(business::list_businesses_handler))
        .route(
            "/api/feedback-forms",
            post(feedback_forms::create_handler).get(feedback_forms::list_handler),
        )
        .route(
            "/api/feedback-forms/{id}",
            get(feedback_forms::get_handler)
                .put(feedback_forms::update_handler)
                .delete(feedback_forms::delete_handler),
        )
        .route("/api/feedback-forms/{id}/qr", post(feedback_forms::qr_handler))
        .route(
            "/api/feedback-forms/{id}/responses",
            get(feedback_forms::responses_handler),
        )
        .route("/api/form-responses", post(form_responses::submit_handler))
        .with_state(state)
}

pub async fn index_handler() -> impl IntoResponse {
    Json(json!({ "message": "Hello from the backend", "ok": true }))
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
