//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::domain::{
    Country, GatewayPriority, NewTransaction, Transaction, TransactionStatus, User, UserAccount,
};
use crate::ports::{RepositoryError, RepositoryResult, TransactionRepository};

/// Postgres-backed system of record.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionRepository for PostgresRepository {
    async fn create_transaction(&self, tx: NewTransaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            INSERT INTO transactions (
                amount, type, status, currency, gateway_name, country_name, user_id, created_at
            ) VALUES ($1, $2, 'pending', $3, $4, $5, $6, NOW())
            RETURNING id, amount, type, status, currency, gateway_name, country_name, user_id, created_at
            "#,
        )
        .bind(&tx.amount)
        .bind(tx.kind.as_str())
        .bind(&tx.currency)
        .bind(&tx.gateway_name)
        .bind(&tx.country_name)
        .bind(tx.user_id)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_transaction_by_id(&self, id: i64) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(
            r#"
            SELECT id, amount, type, status, currency, gateway_name, country_name, user_id, created_at
            FROM transactions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?
            .into_domain()
    }

    async fn update_transaction_status(
        &self,
        id: i64,
        status: TransactionStatus,
    ) -> RepositoryResult<bool> {
        let result =
            sqlx::query("UPDATE transactions SET status = $1 WHERE id = $2 AND status = 'pending'")
                .bind(status.as_str())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        // Nothing matched: either the row is gone or it is already terminal.
        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RepositoryError::NotFound(format!("transaction {}", id))),
        }
    }

    async fn get_user_by_id(&self, user_id: i64) -> RepositoryResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email,
                   c.id AS country_id, c.name AS country_name, c.code AS country_code,
                   c.currency AS country_currency
            FROM users u
            INNER JOIN countries c ON u.country_id = c.id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("user {}", user_id)))
    }

    async fn get_user_account(&self, user_id: i64) -> RepositoryResult<UserAccount> {
        let row = sqlx::query_as::<_, UserAccountRow>(
            "SELECT id, user_id, balance, currency, updated_at FROM user_accounts WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserAccountRow::into_domain)
            .ok_or_else(|| RepositoryError::NotFound(format!("account for user {}", user_id)))
    }

    async fn update_user_balance(&self, user_id: i64, delta: &BigDecimal) -> RepositoryResult<()> {
        // Single conditional statement: concurrent debits cannot overdraw.
        let result = sqlx::query(
            r#"
            UPDATE user_accounts
            SET balance = balance + $1, updated_at = NOW()
            WHERE user_id = $2 AND balance + $1 >= 0
            "#,
        )
        .bind(delta)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT id FROM user_accounts WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        match exists {
            Some(_) => Err(RepositoryError::InsufficientBalance(user_id)),
            None => Err(RepositoryError::NotFound(format!(
                "account for user {}",
                user_id
            ))),
        }
    }

    async fn get_gateway_priorities(
        &self,
        country_id: i64,
    ) -> RepositoryResult<Vec<GatewayPriority>> {
        let rows = sqlx::query_as::<_, GatewayPriorityRow>(
            r#"
            SELECT gp.country_id, g.name AS gateway_name, gp.priority, gp.is_active
            FROM gateway_priority gp
            JOIN gateways g ON gp.gateway_id = g.id
            WHERE gp.country_id = $1 AND gp.is_active
            ORDER BY gp.priority ASC
            "#,
        )
        .bind(country_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(GatewayPriorityRow::into_domain).collect())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    amount: BigDecimal,
    #[sqlx(rename = "type")]
    kind: String,
    status: String,
    currency: String,
    gateway_name: String,
    country_name: String,
    user_id: i64,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let kind = self
            .kind
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("transaction {}: {}", self.id, e)))?;
        let status = self
            .status
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("transaction {}: {}", self.id, e)))?;

        Ok(Transaction {
            id: self.id,
            amount: self.amount,
            currency: self.currency.trim_end().to_string(),
            kind,
            status,
            user_id: self.user_id,
            gateway_name: self.gateway_name,
            country_name: self.country_name,
            created_at: self.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    country_id: i64,
    country_name: String,
    country_code: String,
    country_currency: String,
}

impl UserRow {
    fn into_domain(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            country: Country {
                id: self.country_id,
                name: self.country_name,
                code: self.country_code.trim_end().to_string(),
                currency: self.country_currency.trim_end().to_string(),
            },
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct UserAccountRow {
    id: i64,
    user_id: i64,
    balance: BigDecimal,
    currency: String,
    updated_at: DateTime<Utc>,
}

impl UserAccountRow {
    fn into_domain(self) -> UserAccount {
        UserAccount {
            id: self.id,
            user_id: self.user_id,
            balance: self.balance,
            currency: self.currency.trim_end().to_string(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct GatewayPriorityRow {
    country_id: i64,
    gateway_name: String,
    priority: i32,
    is_active: bool,
}

impl GatewayPriorityRow {
    fn into_domain(self) -> GatewayPriority {
        GatewayPriority {
            country_id: self.country_id,
            gateway_name: self.gateway_name,
            priority: self.priority,
            is_active: self.is_active,
        }
    }
}
