pub mod accrual;
pub mod config;
pub mod db;
pub mod ledger;
pub mod luhn;
pub mod models;
pub mod money;
pub mod routes;
pub mod worker;

use std::sync::Arc;

use sqlx::PgPool;

use ledger::LedgerService;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub ledger: Arc<LedgerService>,
}
