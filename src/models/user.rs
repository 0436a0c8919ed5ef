use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction as DbTx};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("login already registered")]
    UserExists,
    #[error("user not found")]
    NotFound,
    #[error("update affected {0} rows, expected exactly 1")]
    NotExactlyOneRow(u64),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
}

/// Current balance plus the total ever withdrawn, per `GetUserBalance`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct BalanceView {
    pub current: i64,
    pub withdrawn: i64,
}

impl User {
    pub async fn create_in_tx(
        tx: &mut DbTx<'_, Postgres>,
        login: &str,
        hashed_password: &str,
    ) -> Result<Self, UserError> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO users (id, login, hashed_password, balance)
             VALUES ($1, $2, $3, 0)
             RETURNING id, login, hashed_password, balance, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(login)
        .bind(hashed_password)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                UserError::UserExists
            } else {
                UserError::Database(e)
            }
        })
    }

    pub async fn find_by_login(pool: &PgPool, login: &str) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, login, hashed_password, balance, created_at FROM users WHERE login = $1",
        )
        .bind(login)
        .fetch_optional(pool)
        .await
    }

    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, login, hashed_password, balance, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Locks the user row `FOR UPDATE` within an open transaction. Used by withdraw and
    /// accrual-crediting paths, which are the only two writers of `balance`.
    pub async fn find_by_id_for_update(
        tx: &mut DbTx<'_, Postgres>,
        id: Uuid,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT id, login, hashed_password, balance, created_at
             FROM users WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
    }

    /// `balance := balance + signed_amount`. Fails hard if the row count affected isn't
    /// exactly 1 — the caller always holds a `FOR UPDATE` lock on this exact row already, so
    /// anything else is a programming error, not a race.
    pub async fn update_balance(
        tx: &mut DbTx<'_, Postgres>,
        user_id: Uuid,
        signed_amount: i64,
    ) -> Result<(), UserError> {
        let result = sqlx::query("UPDATE users SET balance = balance + $1 WHERE id = $2")
            .bind(signed_amount)
            .bind(user_id)
            .execute(&mut **tx)
            .await?;

        if result.rows_affected() != 1 {
            return Err(UserError::NotExactlyOneRow(result.rows_affected()));
        }
        Ok(())
    }

    pub async fn get_balance_view(pool: &PgPool, user_id: Uuid) -> Result<BalanceView, UserError> {
        let current: Option<i64> = sqlx::query_scalar("SELECT balance FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        let current = current.ok_or(UserError::NotFound)?;
        let withdrawn = super::Transaction::get_withdrawn_sum(pool, user_id).await?;

        Ok(BalanceView { current, withdrawn })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balance_view_serializes_as_current_withdrawn() {
        let view = BalanceView { current: 10050, withdrawn: 4050 };
        let json = serde_json::to_value(view).unwrap();
        assert_eq!(json["current"], 10050);
        assert_eq!(json["withdrawn"], 4050);
    }
}
