use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::IntoResponse,
};
use chrono::Utc;
use forms::{
    models::{Business, User},
    validation::{Credentials, LoginDraft, RegisterDraft},
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::{AuthUser, hash_password, issue_token, verify_password},
    error::AppError,
    state::AppState,
    utils::{expired_cookie, parse_body, session_cookie},
};

const EMAIL_TAKEN: &str = "Email already registered";
const BAD_LOGIN: &str = "Invalid email or password";

pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let registration = parse_body::<RegisterDraft>(&body)?.into_registration()?;

    // create_user below still claims the email atomically
    if state
        .documents
        .user_by_email(&registration.email)
        .await?
        .is_some()
    {
        return Err(AppError::Conflict(EMAIL_TAKEN));
    }

    let password_hash = hash_password(registration.password, state.config.bcrypt_cost).await?;

    let now = Utc::now();
    let user = User {
        id: Uuid::new_v4(),
        name: registration.name,
        email: registration.email,
        password_hash,
        role: registration.role,
        created_at: now,
        updated_at: now,
    };

    if !state.documents.create_user(&user).await? {
        return Err(AppError::Conflict(EMAIL_TAKEN));
    }

    if let Some(profile) = registration.business {
        let business = Business::new(user.id, profile);
        if let Err(e) = state.documents.create_business(&business).await {
            state.documents.delete_user(&user).await?;
            return Err(e.into());
        }

        info!("Created business {} for user {}", business.id, user.id);
    }

    info!("Registered user {}", user.id);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "User registered",
            "user": { "_id": user.id, "email": user.email },
        })),
    ))
}

pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let Credentials { email, password } = parse_body::<LoginDraft>(&body)?.into_credentials()?;

    let user = state
        .documents
        .user_by_email(&email)
        .await?
        .ok_or(AppError::BadRequest(BAD_LOGIN))?;

    if !verify_password(password, user.password_hash.clone()).await? {
        return Err(AppError::BadRequest(BAD_LOGIN));
    }

    let token = issue_token(
        state.config.jwt_secret.as_bytes(),
        user.id,
        state.config.token_ttl,
    )?;
    let cookie = session_cookie(&token, state.config.token_ttl);

    Ok((
        [(SET_COOKIE, cookie)],
        Json(json!({ "message": "User logged in", "token": token })),
    ))
}

pub async fn logout_handler() -> impl IntoResponse {
    (
        [(SET_COOKIE, expired_cookie())],
        Json(json!({ "message": "User logged out" })),
    )
}

pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    AuthUser { user_id }: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .documents
        .get::<User>(user_id)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    Ok(Json(json!({ "success": true, "data": user.profile() })))
}
