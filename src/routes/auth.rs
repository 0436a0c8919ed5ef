use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CredentialsPayload {
    login: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

async fn register(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> impl IntoResponse {
    if payload.login.trim().is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "login and password are required".into() }),
        )
            .into_response();
    }

    match state.ledger.register_user(&payload.login, &payload.password).await {
        Ok((_, token)) => (StatusCode::OK, [("Authorization", format!("Bearer {token}"))]).into_response(),
        Err(LedgerError::UserExists) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: "login already registered".into() }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "registration failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "registration failed".into() }))
                .into_response()
        }
    }
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<CredentialsPayload>,
) -> impl IntoResponse {
    if payload.login.trim().is_empty() || payload.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "login and password are required".into() }),
        )
            .into_response();
    }

    match state.ledger.login_user(&payload.login, &payload.password).await {
        Ok((_, token)) => (StatusCode::OK, [("Authorization", format!("Bearer {token}"))]).into_response(),
        Err(LedgerError::InvalidCredentials) => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse { error: "invalid login or password".into() }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "login failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "login failed".into() }))
                .into_response()
        }
    }
}
