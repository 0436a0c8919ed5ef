//! Composes the store models and the accrual client into the operations the HTTP handlers and
//! the reconciliation worker call.

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::accrual::{AccrualClient, AccrualError, AccrualStatus};
use crate::models::order::{Order, OrderError, OrderStatus};
use crate::models::token::TokenService;
use crate::models::transaction::{signed_amount, Transaction, TransactionKind};
use crate::models::user::{BalanceView, User, UserError};
use crate::money;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("login already registered")]
    UserExists,
    #[error("invalid login or password")]
    InvalidCredentials,
    #[error("user not found")]
    UserNotFound,
    #[error("order belongs to a different user")]
    OrderOwnedByOther,
    #[error("withdrawal amount must be positive")]
    NonPositiveAmount,
    #[error("insufficient balance")]
    InsufficientFunds,
    #[error("accrual oracle error: {0}")]
    Accrual(#[from] AccrualError),
    #[error("unrecognized accrual status")]
    UnknownAccrualStatus,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<UserError> for LedgerError {
    fn from(e: UserError) -> Self {
        match e {
            UserError::UserExists => LedgerError::UserExists,
            UserError::NotFound => LedgerError::UserNotFound,
            UserError::NotExactlyOneRow(n) => {
                tracing::error!(rows = n, "user balance update affected unexpected row count");
                LedgerError::Database(sqlx::Error::RowNotFound)
            }
            UserError::Database(e) => LedgerError::Database(e),
        }
    }
}

impl From<OrderError> for LedgerError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::OrderExists => {
                unreachable!("OrderExists is handled explicitly by create_or_get_order")
            }
            OrderError::NotExactlyOneRow(n) => {
                tracing::error!(rows = n, "order update affected unexpected row count");
                LedgerError::Database(sqlx::Error::RowNotFound)
            }
            OrderError::Database(e) => LedgerError::Database(e),
        }
    }
}

pub struct LedgerService {
    pool: PgPool,
    jwt_secret: String,
    accrual: AccrualClient,
}

impl LedgerService {
    pub fn new(pool: PgPool, jwt_secret: String, accrual: AccrualClient) -> Self {
        Self {
            pool,
            jwt_secret,
            accrual,
        }
    }

    pub async fn register_user(
        &self,
        login: &str,
        password: &str,
    ) -> Result<(User, String), LedgerError> {
        let hashed = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|_| LedgerError::InvalidCredentials)?;

        let mut tx = self.pool.begin().await?;
        let user = User::create_in_tx(&mut tx, login, &hashed).await?;
        tx.commit().await?;

        let token = TokenService::issue(user.id, &self.jwt_secret);
        Ok((user, token))
    }

    pub async fn login_user(
        &self,
        login: &str,
        password: &str,
    ) -> Result<(User, String), LedgerError> {
        let user = User::find_by_login(&self.pool, login)
            .await?
            .ok_or(LedgerError::InvalidCredentials)?;

        let valid = bcrypt::verify(password, &user.hashed_password).unwrap_or(false);
        if !valid {
            return Err(LedgerError::InvalidCredentials);
        }

        let token = TokenService::issue(user.id, &self.jwt_secret);
        Ok((user, token))
    }

    pub fn validate_token(&self, token: &str) -> Option<Uuid> {
        TokenService::verify(token, &self.jwt_secret)
    }

    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<User, LedgerError> {
        User::find_by_id(&self.pool, user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)
    }

    pub async fn get_user_balance(&self, user_id: Uuid) -> Result<BalanceView, LedgerError> {
        Ok(User::get_balance_view(&self.pool, user_id).await?)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Option<Order>, LedgerError> {
        Ok(Order::get(&self.pool, order_id).await?)
    }

    pub async fn get_orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, LedgerError> {
        Ok(Order::get_for_user(&self.pool, user_id).await?)
    }

    pub async fn get_user_withdrawals(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(Transaction::get_withdrawals_for_user(&self.pool, user_id).await?)
    }

    /// Creates a new order for `user_id`, or surfaces the existing row so the handler can decide
    /// between a same-user replay (200) and a cross-user conflict (409). The `bool` is `true`
    /// iff this call is the one that created the row.
    pub async fn create_or_get_order(
        &self,
        order_id: &str,
        user_id: Uuid,
    ) -> Result<(Order, bool), LedgerError> {
        let mut tx = self.pool.begin().await?;
        match Order::create_in_tx(&mut tx, order_id, user_id).await {
            Ok(order) => {
                tx.commit().await?;
                Ok((order, true))
            }
            Err(OrderError::OrderExists) => {
                let existing = Order::get(&self.pool, order_id)
                    .await?
                    .expect("unique violation implies the row exists");
                if existing.user_id == user_id {
                    Ok((existing, false))
                } else {
                    Err(LedgerError::OrderOwnedByOther)
                }
            }
            Err(other) => Err(other.into()),
        }
    }

    pub async fn create_withdraw(
        &self,
        user_id: Uuid,
        order_id: &str,
        amount: i64,
    ) -> Result<(), LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount);
        }

        let mut tx = self.pool.begin().await?;
        let user = User::find_by_id_for_update(&mut tx, user_id)
            .await?
            .ok_or(LedgerError::UserNotFound)?;

        if user.balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }

        Transaction::create_in_tx(&mut tx, user_id, order_id, TransactionKind::Withdraw, amount)
            .await?;
        User::update_balance(
            &mut tx,
            user_id,
            signed_amount(TransactionKind::Withdraw, amount),
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn orders_to_sync(&self, limit: i64) -> Result<Vec<String>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        let orders = Order::get_for_sync_batch(&mut tx, limit).await?;
        tx.commit().await?;
        Ok(orders.into_iter().map(|o| o.id).collect())
    }

    /// Reconciles one order against the oracle. Returns `Ok(())` both when the order was
    /// synced successfully and when it was benignly skipped (already locked by a peer, or
    /// already terminal); the distinction is only meaningful for logging.
    pub async fn sync_order(
        &self,
        order_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), LedgerError> {
        let mut tx = self.pool.begin().await?;

        let order = match Order::get_for_sync(&mut tx, order_id).await? {
            Some(o) => o,
            None => return Ok(()),
        };

        if order.status.is_terminal() {
            return Ok(());
        }

        let view = self.accrual.get_order(order_id, cancel).await?;

        let (status, accrual) = match view.status {
            AccrualStatus::Registered => (OrderStatus::New, None),
            AccrualStatus::Processing => (OrderStatus::Processing, None),
            AccrualStatus::Invalid => (OrderStatus::Invalid, None),
            AccrualStatus::Processed => {
                let accrual = view
                    .accrual
                    .map(money::to_minor)
                    .ok_or(LedgerError::UnknownAccrualStatus)?;
                (OrderStatus::Processed, Some(accrual))
            }
        };

        Order::update_status_in_tx(&mut tx, order_id, status, accrual).await?;

        if status == OrderStatus::Processed {
            let amount = accrual.expect("accrual is Some whenever status is Processed");
            User::find_by_id_for_update(&mut tx, order.user_id)
                .await?
                .ok_or(LedgerError::UserNotFound)?;
            Transaction::create_in_tx(
                &mut tx,
                order.user_id,
                order_id,
                TransactionKind::Accrual,
                amount,
            )
            .await?;
            User::update_balance(
                &mut tx,
                order.user_id,
                signed_amount(TransactionKind::Accrual, amount),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
