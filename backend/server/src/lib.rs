//! Documentation of the feedback collection backend.
//!
//! Businesses sign up, build feedback forms, and print a QR code that sends
//! customers to the public fill page. Customers submit answers without an
//! account and the owning business reads them back.
//!
//!
//!
//! # API
//!
//! Every body is JSON with camelCase keys and `_id` identifiers. Failures use
//! `{"error": "..."}` with the status from [`error::AppError`].
//!
//! | Method | Path | Caller |
//! |--------|------|--------|
//! | GET | `/`, `/health` | anyone |
//! | POST | `/api/auth/register`, `/api/auth/login`, `/api/auth/logout` | anyone |
//! | GET | `/api/auth/me` | signed in |
//! | GET | `/api/business/me` | business |
//! | GET | `/api/v1/business` | anyone |
//! | POST, GET | `/api/feedback-forms` | business |
//! | GET | `/api/feedback-forms/{id}` | anyone |
//! | PUT, DELETE | `/api/feedback-forms/{id}` | owning business |
//! | POST | `/api/feedback-forms/{id}/qr` | owning business |
//! | GET | `/api/feedback-forms/{id}/responses` | owning business |
//! | POST | `/api/form-responses` | anyone |
//!
//!
//!
//! # Sessions
//!
//! - Login returns the token in the body and sets it as an `HttpOnly` cookie
//! - Requests may carry it as `Authorization: Bearer <token>` or as the cookie
//! - The bearer header wins when both are present
//! - Tokens are HS256 signed with `JWT_SECRET` and expire after `TOKEN_TTL_SECS`
//!
//!
//!
//! # Frontend Flows
//!
//! - Signup page posts to register, then login
//! - Dashboard loads `/api/auth/me`, `/api/business/me`, and the form list
//! - Form builder posts the draft, the QR dialog posts to `/{id}/qr`
//! - The fill page reads `/api/feedback-forms/{id}` and posts to `/api/form-responses`
//!
//!
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run -p suggestion
//! ```
//!
//! Run without Redis.
//! ```sh
//! STORE_BACKEND=memory cargo run -p suggestion
//! ```
//!
//! Smoke test a running server.
//! ```sh
//! cargo run -p tester -- --base-url http://localhost:3000
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::time::Duration;

use anyhow::Context;
use axum::http::{
    HeaderValue, Method,
    header::{AUTHORIZATION, CONTENT_TYPE},
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod qr;
pub mod routes;
pub mod state;
pub mod utils;

use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let origin = HeaderValue::from_str(&state.config.frontend_origin)
        .context("FRONTEND_ORIGIN is not a valid header value")?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    let address = format!("0.0.0.0:{}", state.config.port);

    let app = routes::router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
