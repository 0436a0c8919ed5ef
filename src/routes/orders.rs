use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Serialize;

use crate::ledger::LedgerError;
use crate::luhn;
use crate::models::order::OrderStatus;
use crate::models::User;
use crate::money;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    number: String,
    status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    accrual: Option<rust_decimal::Decimal>,
    uploaded_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct WithdrawalResponse {
    order: String,
    sum: rust_decimal::Decimal,
    processed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: String,
}

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(submit_order).get(list_orders))
}

pub fn withdrawal_routes() -> Router<AppState> {
    Router::new().route("/", get(list_withdrawals))
}

async fn submit_order(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    body: String,
) -> impl IntoResponse {
    let order_id = body.trim();

    match luhn::validate(order_id) {
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

    match state.ledger.create_or_get_order(order_id, user.id).await {
        Ok((_, true)) => StatusCode::ACCEPTED.into_response(),
        Ok((_, false)) => StatusCode::OK.into_response(),
        Err(LedgerError::OrderOwnedByOther) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse { error: "order already submitted by another user".into() }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "order submission failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "order submission failed".into() }))
                .into_response()
        }
    }
}

async fn list_orders(State(state): State<AppState>, Extension(user): Extension<User>) -> impl IntoResponse {
    match state.ledger.get_orders_for_user(user.id).await {
        Ok(orders) if orders.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(orders) => {
            let body: Vec<OrderResponse> = orders
                .into_iter()
                .map(|o| OrderResponse {
                    number: o.id,
                    status: o.status,
                    accrual: o.accrual.map(money::to_decimal),
                    uploaded_at: o.created_at,
                })
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list orders");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "failed to list orders".into() }))
                .into_response()
        }
    }
}

async fn list_withdrawals(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> impl IntoResponse {
    match state.ledger.get_user_withdrawals(user.id).await {
        Ok(withdrawals) if withdrawals.is_empty() => StatusCode::NO_CONTENT.into_response(),
        Ok(withdrawals) => {
            let body: Vec<WithdrawalResponse> = withdrawals
                .into_iter()
                .map(|t| WithdrawalResponse {
                    order: t.order_id,
                    sum: money::to_decimal(t.amount),
                    processed_at: t.created_at,
                })
                .collect();
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to list withdrawals");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error: "failed to list withdrawals".into() }))
                .into_response()
        }
    }
}
