// PostgreSQL adapter for the balance ledger port.
//
// Every mutation runs as one database transaction: row-lock the balance,
// validate, write the new value, append the audit record, commit. Row-level
// locking serializes concurrent settlements for the same user across rooms.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::error;

use crate::domain::errors::LedgerError;
use crate::domain::ports::{BalanceLedger, LedgerUpdate};

#[derive(Clone)]
pub struct PostgresLedger {
    pool: PgPool,
}

impl PostgresLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BalanceLedger for PostgresLedger {
    async fn fetch_balance(&self, user_id: i64) -> Result<i64, LedgerError> {
        let balance: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    error!(user_id, error = %e, "balance read failed");
                    LedgerError::Storage
                })?;
        balance.ok_or(LedgerError::UserNotFound)
    }

    async fn apply_transaction(&self, update: LedgerUpdate) -> Result<i64, LedgerError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            error!(user_id = update.user_id, error = %e, "failed to begin ledger transaction");
            LedgerError::Storage
        })?;

        let balance_before: Option<i64> =
            sqlx::query_scalar("SELECT balance_cents FROM users WHERE id = $1 FOR UPDATE")
                .bind(update.user_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| {
                    error!(user_id = update.user_id, error = %e, "balance lock failed");
                    LedgerError::Storage
                })?;
        // Dropping the transaction here rolls everything back.
        let Some(balance_before) = balance_before else {
            return Err(LedgerError::UserNotFound);
        };
        if update.new_balance_cents < 0 {
            return Err(LedgerError::InvalidBalance);
        }

        sqlx::query("UPDATE users SET balance_cents = $1, updated_at = NOW() WHERE id = $2")
            .bind(update.new_balance_cents)
            .bind(update.user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                error!(user_id = update.user_id, error = %e, "balance write failed");
                LedgerError::Storage
            })?;

        sqlx::query(
            r#"
            INSERT INTO balance_transactions
                (user_id, kind, amount_cents, balance_before_cents, balance_after_cents, description)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(update.user_id)
        .bind(update.kind.as_str())
        .bind(update.amount_cents)
        .bind(balance_before)
        .bind(update.new_balance_cents)
        .bind(&update.description)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            error!(user_id = update.user_id, error = %e, "transaction record insert failed");
            LedgerError::Storage
        })?;

        tx.commit().await.map_err(|e| {
            error!(user_id = update.user_id, error = %e, "ledger commit failed");
            LedgerError::Storage
        })?;

        Ok(update.new_balance_cents)
    }
}
