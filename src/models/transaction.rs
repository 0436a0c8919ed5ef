use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, Transaction as DbTx};
use uuid::Uuid;

/// Kind of ledger entry. `signed_amount` is the only place this distinction affects a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
pub enum TransactionKind {
    Accrual,
    Withdraw,
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionKind::Accrual => write!(f, "accrual"),
            TransactionKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// An immutable ledger row. Once written, never updated or deleted; `Ledger::append` is the
/// only way new rows come into being.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub order_id: String,
    #[sqlx(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// +amount for an accrual, -amount for a withdraw.
pub fn signed_amount(kind: TransactionKind, amount: i64) -> i64 {
    match kind {
        TransactionKind::Accrual => amount,
        TransactionKind::Withdraw => -amount,
    }
}

impl Transaction {
    /// Inserts a ledger row within an already-open transaction. Callers are responsible for
    /// also calling `User::update_balance` with the same kind/amount inside the same
    /// transaction; this function does not touch the `users` row.
    pub async fn create_in_tx(
        tx: &mut DbTx<'_, Postgres>,
        user_id: Uuid,
        order_id: &str,
        kind: TransactionKind,
        amount: i64,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO transactions (id, user_id, order_id, type, amount)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, order_id, type, amount, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(order_id)
        .bind(kind)
        .bind(amount)
        .fetch_one(&mut **tx)
        .await
    }

    /// Withdraw-kind rows for a user, newest first.
    pub async fn get_withdrawals_for_user(
        pool: &sqlx::PgPool,
        user_id: Uuid,
    ) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, user_id, order_id, type, amount, created_at
             FROM transactions
             WHERE user_id = $1 AND type = 'withdraw'
             ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    /// Sum of withdraw-kind amounts for a user (0 if none). Used by `User::get_balance_view`.
    pub async fn get_withdrawn_sum(
        executor: impl sqlx::PgExecutor<'_>,
        user_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let sum: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(amount) FROM transactions WHERE user_id = $1 AND type = 'withdraw'",
        )
        .bind(user_id)
        .fetch_one(executor)
        .await?;
        Ok(sum.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accrual_is_positive() {
        assert_eq!(signed_amount(TransactionKind::Accrual, 100), 100);
    }

    #[test]
    fn withdraw_is_negative() {
        assert_eq!(signed_amount(TransactionKind::Withdraw, 100), -100);
    }
}
