use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::ledger::LedgerError;
use crate::luhn;
use crate::models::User;
use crate::money;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    current: Decimal,
    withdrawn: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawRequest {
    order: String,
    sum: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

pub fn balance_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_balance))
        .route("/withdraw", post(withdraw))
}

async fn get_balance(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<BalanceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let view = state.ledger.get_user_balance(user.id).await.map_err(|e| {
        tracing::error!(error = %e, "failed to fetch balance");
        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "failed to fetch balance".into() }))
    })?;

    Ok(Json(BalanceResponse {
        current: money::to_decimal(view.current),
        withdrawn: money::to_decimal(view.withdrawn),
    }))
}

async fn withdraw(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(req): Json<WithdrawRequest>,
) -> impl IntoResponse {
    match luhn::validate(&req.order) {
        Ok(true) => {}
        Ok(false) => {
            return (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(ErrorResponse { error: "invalid order number".into() }),
            )
                .into_response();
        }
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse { error: "malformed order number".into() }),
            )
                .into_response();
        }
    }

    if req.sum <= Decimal::ZERO {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "sum must be positive".into() }),
        )
            .into_response();
    }

    let amount = money::to_minor(req.sum);

    match state.ledger.create_withdraw(user.id, &req.order, amount).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(LedgerError::InsufficientFunds) => (
            StatusCode::PAYMENT_REQUIRED,
            Json(ErrorResponse { error: "insufficient balance".into() }),
        )
            .into_response(),
        Err(LedgerError::NonPositiveAmount) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse { error: "sum must be positive".into() }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "withdraw failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "withdraw failed".into() }))
                .into_response()
        }
    }
}
