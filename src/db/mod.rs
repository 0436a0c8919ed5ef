use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// One embedded forward-only migration. `version` is parsed from the filename prefix and
/// doubles as the ordering key and the tracking-table primary key.
struct Migration {
    version: i32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "001_create_users",
        sql: include_str!("../../migrations/001_create_users.up.sql"),
    },
    Migration {
        version: 2,
        name: "002_create_orders",
        sql: include_str!("../../migrations/002_create_orders.up.sql"),
    },
    Migration {
        version: 3,
        name: "003_create_transactions",
        sql: include_str!("../../migrations/003_create_transactions.up.sql"),
    },
];

/// Ensures the tracking table exists, then applies every embedded migration not yet recorded,
/// in ascending version order, each in its own transaction. A failure partway through aborts
/// startup; migrations already recorded are left alone on the next attempt.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INT PRIMARY KEY,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM migrations WHERE version = $1)",
        )
        .bind(migration.version)
        .fetch_one(pool)
        .await?;

        if already_applied {
            continue;
        }

        tracing::info!(version = migration.version, name = migration.name, "applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.sql).execute(&mut *tx).await?;
        sqlx::query("INSERT INTO migrations (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
    }

    tracing::info!("database migrations up to date");
    Ok(())
}
