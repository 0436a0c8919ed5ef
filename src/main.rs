use std::env;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use loyalty_ledger::accrual::AccrualClient;
use loyalty_ledger::config::Config;
use loyalty_ledger::db;
use loyalty_ledger::ledger::LedgerService;
use loyalty_ledger::models::User;
use loyalty_ledger::routes::{auth_routes, balance_routes, order_routes, withdrawal_routes};
use loyalty_ledger::worker;
use loyalty_ledger::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load().map_err(|e| {
        tracing::error!("{e}");
        anyhow::anyhow!(e)
    })?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(
                    format!("loyalty_ledger={}", if config.debug { "debug" } else { "info" }).parse()?,
                )
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    tracing::info!("connecting to database...");
    let pool = db::create_pool(&config.database_uri).await?;

    tracing::info!("running migrations...");
    db::run_migrations(&pool).await?;

    let accrual = AccrualClient::new(config.accrual_system_address.clone());
    let ledger = Arc::new(LedgerService::new(pool.clone(), config.jwt_secret.clone(), accrual));

    let (worker_handle, worker_token) =
        worker::spawn(Arc::clone(&ledger), config.worker_pool_size, config.worker_interval);

    let state = AppState { pool, ledger };

    let app = Router::new()
        .route("/health", get(health))
        .nest("/api/user", auth_routes())
        .nest(
            "/api/user/orders",
            order_routes().layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .nest(
            "/api/user/balance",
            balance_routes().layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .nest(
            "/api/user/withdrawals",
            withdrawal_routes().layer(middleware::from_fn_with_state(state.clone(), auth_middleware)),
        )
        .layer(cors_layer())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.run_address).await?;
    tracing::info!("loyalty-ledger listening on {}", config.run_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(worker_token.clone()))
        .await?;

    let _ = tokio::time::timeout(std::time::Duration::from_secs(30), worker_handle).await;

    Ok(())
}

fn cors_layer() -> CorsLayer {
    use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
    use axum::http::Method;

    let allowed_headers = [AUTHORIZATION, CONTENT_TYPE, ACCEPT];
    let allowed_methods = [Method::GET, Method::POST, Method::OPTIONS];

    if let Ok(origins) = env::var("CORS_ALLOWED_ORIGINS") {
        let allowed: Vec<HeaderValue> = origins.split(',').filter_map(|s| s.trim().parse().ok()).collect();
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
    } else {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(allowed_methods)
            .allow_headers(allowed_headers)
    }
}

async fn shutdown_signal(worker_token: tokio_util::sync::CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    worker_token.cancel();
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "missing authorization header".into() }))
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "invalid authorization header".into() }))
    })?;

    let user_id = state
        .ledger
        .validate_token(token)
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "invalid or expired token".into() })))?;

    let user = state.ledger.get_user_by_id(user_id).await.map_err(|e| {
        tracing::error!(error = %e, "failed to load user for auth middleware");
        (StatusCode::UNAUTHORIZED, Json(ErrorResponse { error: "user not found".into() }))
    })?;

    req.extensions_mut().insert::<User>(user);

    Ok(next.run(req).await)
}
