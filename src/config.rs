//! Startup configuration: CLI flags with environment-variable overrides (env wins over flag
//! when both are set), matching the flag+env precedence of the system this was modeled on.

use std::time::Duration;

use clap::Parser;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URI (or -d) is required")]
    MissingDatabaseUri,
    #[error("ACCRUAL_SYSTEM_ADDRESS (or -r) is required")]
    MissingAccrualAddress,
    #[error("invalid WORKER_INTERVAL: {0}")]
    InvalidWorkerInterval(String),
}

#[derive(Parser, Debug)]
#[command(name = "loyalty-ledger")]
struct Cli {
    /// Listen address for the HTTP server.
    #[arg(short = 'a', long = "address", default_value = "0.0.0.0:8080")]
    run_address: String,

    /// Postgres connection string.
    #[arg(short = 'd', long = "database-uri")]
    database_uri: Option<String>,

    /// Base URL of the external accrual oracle.
    #[arg(short = 'r', long = "accrual-address")]
    accrual_system_address: Option<String>,

    /// JWT signing secret.
    #[arg(long = "jwt-secret", default_value = "dev-secret-change-in-production")]
    jwt_secret: String,

    /// Number of concurrent order-sync tasks per reconciliation tick.
    #[arg(long = "worker-pool-size", default_value_t = 5)]
    worker_pool_size: usize,

    /// Seconds between reconciliation ticks.
    #[arg(long = "worker-interval-secs", default_value_t = 5)]
    worker_interval_secs: u64,

    #[arg(long = "debug", default_value_t = false)]
    debug: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub run_address: String,
    pub database_uri: String,
    pub accrual_system_address: String,
    pub jwt_secret: String,
    pub worker_pool_size: usize,
    pub worker_interval: Duration,
    pub debug: bool,
}

impl Config {
    /// Loads flags, then overrides with any environment variable that's set, then validates
    /// that the fields with no sane default are present.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = Cli::parse();

        let run_address = std::env::var("RUN_ADDRESS").unwrap_or(cli.run_address);
        let database_uri = std::env::var("DATABASE_URI")
            .ok()
            .or(cli.database_uri)
            .ok_or(ConfigError::MissingDatabaseUri)?;
        let accrual_system_address = std::env::var("ACCRUAL_SYSTEM_ADDRESS")
            .ok()
            .or(cli.accrual_system_address)
            .ok_or(ConfigError::MissingAccrualAddress)?;
        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or(cli.jwt_secret);

        let worker_pool_size = std::env::var("WORKER_POOL_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(cli.worker_pool_size);

        let worker_interval_secs = match std::env::var("WORKER_INTERVAL") {
            Ok(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidWorkerInterval(v))?,
            Err(_) => cli.worker_interval_secs,
        };

        let debug = std::env::var("DEBUG")
            .ok()
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(cli.debug);

        Ok(Config {
            run_address,
            database_uri,
            accrual_system_address,
            jwt_secret,
            worker_pool_size,
            worker_interval: Duration::from_secs(worker_interval_secs),
            debug,
        })
    }
}
