use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction as DbTx};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: String,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub accrual: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order id already exists")]
    OrderExists,
    #[error("update affected {0} rows, expected exactly 1")]
    NotExactlyOneRow(u64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Order {
    pub async fn create_in_tx(
        tx: &mut DbTx<'_, Postgres>,
        id: &str,
        user_id: Uuid,
    ) -> Result<Self, OrderError> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO orders (id, user_id, status, created_at, updated_at)
             VALUES ($1, $2, 'NEW', NOW(), NOW())
             RETURNING id, user_id, status, accrual, created_at, updated_at",
        )
        .bind(id)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                OrderError::OrderExists
            } else {
                OrderError::Database(e)
            }
        })
    }

    pub async fn get(pool: &PgPool, id: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, user_id, status, accrual, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Fetches and exclusively locks one order by id within an open transaction, skipping
    /// (rather than waiting on) a row another transaction already holds. A conflicting fetch
    /// comes back as `Ok(None)` — the caller treats that as "a peer owns this order right now"
    /// and returns without touching it.
    pub async fn get_for_sync(
        tx: &mut DbTx<'_, Postgres>,
        id: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, user_id, status, accrual, created_at, updated_at
             FROM orders WHERE id = $1 FOR UPDATE SKIP LOCKED",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// Selects up to `limit` non-terminal orders, oldest-updated-first, exclusively locking
    /// each with skip-locked semantics so concurrent reconciliation workers never pick the
    /// same order twice. Returns only rows this call actually locked.
    pub async fn get_for_sync_batch(
        tx: &mut DbTx<'_, Postgres>,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, user_id, status, accrual, created_at, updated_at
             FROM orders
             WHERE status IN ('NEW', 'PROCESSING')
             ORDER BY updated_at ASC
             LIMIT $1
             FOR UPDATE SKIP LOCKED",
        )
        .bind(limit)
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn get_for_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, user_id, status, accrual, created_at, updated_at
             FROM orders WHERE user_id = $1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Sets status/accrual/updated_at for a row the caller already holds `FOR UPDATE
    /// SKIP LOCKED` on. `rows_affected != 1` is a hard error here: the caller always targets a
    /// row it just locked by primary key, so anything else is a programming error.
    pub async fn update_status_in_tx(
        tx: &mut DbTx<'_, Postgres>,
        id: &str,
        status: OrderStatus,
        accrual: Option<i64>,
    ) -> Result<(), OrderError> {
        let result = sqlx::query(
            "UPDATE orders SET status = $1, accrual = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(status)
        .bind(accrual)
        .bind(id)
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            return Err(OrderError::NotExactlyOneRow(result.rows_affected()));
        }
        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
    }

    #[test]
    fn display_matches_wire_status() {
        assert_eq!(OrderStatus::New.to_string(), "NEW");
        assert_eq!(OrderStatus::Processed.to_string(), "PROCESSED");
    }
}
