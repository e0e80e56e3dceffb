//! # Sessions
//!
//! Passwords are bcrypt hashes. Sessions are compact HS256 JWTs carrying
//! `{ userId, iat, exp }`, so any JWT library holding the secret can read them.
//!
//! Clients send the token either as `Authorization: Bearer <token>` or in the
//! `token` cookie set at login. The header wins when both are present.
use std::{sync::Arc, time::Duration};

use axum::{extract::FromRequestParts, http::request::Parts};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use forms::models::{Business, Role, User};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;
use tokio::task::spawn_blocking;
use tracing::warn;
use uuid::Uuid;

use crate::{error::AppError, state::AppState, utils::session_token};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("unsupported algorithm")]
    Algorithm,

    #[error("bad signature")]
    Signature,

    #[error("token expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Uuid,
    pub iat: i64,
    pub exp: i64,
}

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(AppError::internal)?
        .map_err(AppError::internal)
}

fn sign(secret: &[u8], input: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(input.as_bytes());

    Some(mac)
}

pub fn issue_token(secret: &[u8], user_id: Uuid, ttl: Duration) -> Result<String, AppError> {
    let now = Utc::now().timestamp();
    let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    let claims = Claims {
        user_id,
        iat: now,
        exp: now.saturating_add(ttl),
    };

    let claims = serde_json::to_vec(&claims).map_err(AppError::internal)?;
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(HEADER),
        URL_SAFE_NO_PAD.encode(claims)
    );

    let mac = sign(secret, &signing_input)
        .ok_or_else(|| AppError::internal("Session signing key rejected"))?;
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{signing_input}.{signature}"))
}

/// Checks shape, signature and expiry against `now` (unix seconds).
pub fn verify_token(secret: &[u8], token: &str, now: i64) -> Result<Claims, TokenError> {
    let (signing_input, signature) = token.rsplit_once('.').ok_or(TokenError::Malformed)?;
    let (header, claims) = signing_input
        .split_once('.')
        .ok_or(TokenError::Malformed)?;
    if claims.contains('.') {
        return Err(TokenError::Malformed);
    }

    let header: Value = decode_json(header)?;
    if header.get("alg").and_then(Value::as_str) != Some("HS256") {
        return Err(TokenError::Algorithm);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    sign(secret, signing_input)
        .ok_or(TokenError::Signature)?
        .verify_slice(&signature)
        .map_err(|_| TokenError::Signature)?;

    let claims: Claims = decode_json(claims)?;
    if claims.exp <= now {
        return Err(TokenError::Expired);
    }

    Ok(claims)
}

fn decode_json<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .ok()
        .and_then(|raw| serde_json::from_slice(&raw).ok())
        .ok_or(TokenError::Malformed)
}

/// Any signed-in account.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthorized)?;

        let claims = verify_token(
            state.config.jwt_secret.as_bytes(),
            &token,
            Utc::now().timestamp(),
        )
        .map_err(|e| {
            warn!("Rejected session token: {e}");
            AppError::InvalidToken
        })?;

        Ok(Self {
            user_id: claims.user_id,
        })
    }
}

/// A signed-in business account together with its profile.
#[derive(Debug, Clone)]
pub struct BusinessUser {
    pub user: User,
    pub business: Business,
}

impl FromRequestParts<Arc<AppState>> for BusinessUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { user_id } = AuthUser::from_request_parts(parts, state).await?;

        let user = state
            .documents
            .get::<User>(user_id)
            .await?
            .ok_or(AppError::NotFound("User not found"))?;

        if user.role != Role::Business {
            return Err(AppError::NotBusiness);
        }

        let business = state
            .documents
            .business_by_owner(user.id)
            .await?
            .ok_or(AppError::NotFound("Business profile not found"))?;

        Ok(Self { user, business })
    }
}
