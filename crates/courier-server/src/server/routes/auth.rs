//! Registration and login routes.
//!
//! Both endpoints return a signed token the client presents during the
//! relay handshake.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::auth::AuthError;
use crate::server::AppState;

/// Create the auth router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/auth/register", post(register_handler))
        .route("/v1/auth/login", post(login_handler))
}

/// Request body for register and login.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    /// Username; doubles as the messaging identity
    pub username: Option<String>,
    /// Plaintext password, hashed before storage
    pub password: Option<String>,
}

/// Successful response carrying a token.
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Signed authentication token for the relay handshake
    pub token: String,
    /// Human-readable status
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    message: String,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

#[instrument(skip(state, req))]
async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return error_response(StatusCode::BAD_REQUEST, "Username and password required");
    };

    match state.users.create(&username, &password).await {
        Ok(user) => {
            info!(user = %user, "User registered");
            let token = state.tokens.mint(&user);
            (
                StatusCode::CREATED,
                Json(TokenResponse {
                    token,
                    message: "User registered successfully".to_string(),
                }),
            )
                .into_response()
        }
        Err(AuthError::UserExists) => {
            error_response(StatusCode::CONFLICT, "Username already taken")
        }
        Err(AuthError::InvalidUsername(reason)) => {
            error_response(StatusCode::BAD_REQUEST, &reason)
        }
        Err(e) => {
            error!(error = %e, "Registration failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}

#[instrument(skip(state, req))]
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Response {
    let (Some(username), Some(password)) = (req.username, req.password) else {
        return error_response(StatusCode::BAD_REQUEST, "Username and password required");
    };

    match state.users.verify(&username, &password).await {
        Ok(user) => {
            info!(user = %user, "User logged in");
            let token = state.tokens.mint(&user);
            (
                StatusCode::OK,
                Json(TokenResponse {
                    token,
                    message: "Logged in successfully".to_string(),
                }),
            )
                .into_response()
        }
        Err(AuthError::BadLogin) => error_response(StatusCode::BAD_REQUEST, "Invalid credentials"),
        Err(e) => {
            error!(error = %e, "Login failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Server error")
        }
    }
}
