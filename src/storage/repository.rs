use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use sqlx::sqlite::SqliteRow;
use sqlx::{Decode, Row, Sqlite, SqliteConnection, Type};

use crate::domain::{
    Account, Amount, NewOperation, Operation, OperationFilter, OperationKind, User, UserId,
    Wallet, WalletId, format_amount, format_timestamp,
};

use super::error::{QueryContext, StoreError};

// Each store borrows one connection: a pooled one for standalone reads, or the
// connection of a unit of work so every statement lands in that transaction.

/// Current time at the precision we persist, so values read back compare equal.
pub(crate) fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn parse_timestamp(column: &'static str, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Decode { column, value })
}

/// Read a column, turning a missing or mistyped value into a decode error.
fn column<'r, T>(row: &'r SqliteRow, name: &'static str) -> Result<T, StoreError>
where
    T: Decode<'r, Sqlite> + Type<Sqlite>,
{
    row.try_get(name).map_err(|e| StoreError::Decode {
        column: name,
        value: e.to_string(),
    })
}

fn parse_decimal(column: &'static str, value: String) -> Result<Amount, StoreError> {
    Amount::from_str(&value).map_err(|_| StoreError::Decode { column, value })
}

fn row_to_account(row: &SqliteRow) -> Result<Account, StoreError> {
    Ok(Account {
        user_id: column(row, "user_id")?,
        email: column(row, "email")?,
        wallet_id: column(row, "wallet_id")?,
        balance: parse_decimal("balance", column(row, "balance")?)?,
        currency: column(row, "currency")?,
    })
}

const SELECT_ACCOUNT: &str = r#"
    SELECT u.id AS user_id, u.email, w.id AS wallet_id, w.balance, w.currency
    FROM users u
    JOIN wallets w ON w.user_id = u.id
"#;

// ========================
// Users
// ========================

pub struct UserStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> UserStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Insert a new user. Emails are unique.
    pub async fn create(&mut self, email: &str) -> Result<User, StoreError> {
        let created_at = timestamp_now();
        let row = sqlx::query("INSERT INTO users (email, created_at) VALUES (?, ?) RETURNING id")
            .bind(email)
            .bind(format_timestamp(created_at))
            .fetch_one(&mut *self.conn)
            .await
            .context("Failed to create user")?;

        Ok(User {
            id: column(&row, "id")?,
            email: email.to_string(),
            created_at,
        })
    }

    pub async fn find(&mut self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, email, created_at FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch user")?;

        row.map(|row| {
            Ok(User {
                id: column(&row, "id")?,
                email: column(&row, "email")?,
                created_at: parse_timestamp("created_at", column(&row, "created_at")?)?,
            })
        })
        .transpose()
    }

    /// Look up a user together with their wallet.
    pub async fn find_account(&mut self, id: UserId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ACCOUNT} WHERE u.id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch account by user")?;

        row.as_ref().map(row_to_account).transpose()
    }
}

// ========================
// Wallets
// ========================

pub struct WalletStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> WalletStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Open a zero-balance wallet for a user.
    pub async fn create(&mut self, user_id: UserId, currency: &str) -> Result<Wallet, StoreError> {
        let row = sqlx::query(
            "INSERT INTO wallets (user_id, balance, currency) VALUES (?, '0', ?) RETURNING id",
        )
        .bind(user_id)
        .bind(currency)
        .fetch_one(&mut *self.conn)
        .await
        .context("Failed to create wallet")?;

        Ok(Wallet {
            id: column(&row, "id")?,
            user_id,
            balance: Amount::ZERO,
            currency: currency.to_string(),
        })
    }

    pub async fn find(&mut self, id: WalletId) -> Result<Option<Wallet>, StoreError> {
        let row = sqlx::query("SELECT id, user_id, balance, currency FROM wallets WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    pub async fn find_by_user(&mut self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        let row =
            sqlx::query("SELECT id, user_id, balance, currency FROM wallets WHERE user_id = ?")
                .bind(user_id)
                .fetch_optional(&mut *self.conn)
                .await
                .context("Failed to fetch wallet by user")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// Joined user + wallet view, keyed by wallet.
    pub async fn account(&mut self, id: WalletId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_ACCOUNT} WHERE w.id = ?"))
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to fetch account by wallet")?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Add a positive amount to a wallet. Returns the new balance.
    pub async fn credit(&mut self, id: WalletId, amount: Amount) -> Result<Amount, StoreError> {
        if amount <= Amount::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        self.apply_delta(id, amount).await
    }

    /// Subtract a positive amount from a wallet. Returns the new balance.
    /// Sufficiency is the caller's decision; this only moves the number.
    pub async fn debit(&mut self, id: WalletId, amount: Amount) -> Result<Amount, StoreError> {
        if amount <= Amount::ZERO {
            return Err(StoreError::InvalidAmount(amount));
        }
        self.apply_delta(id, -amount).await
    }

    async fn apply_delta(&mut self, id: WalletId, delta: Amount) -> Result<Amount, StoreError> {
        // SQLite has no exact decimal type, so the arithmetic happens here.
        // Within a unit of work the read and the write see the same snapshot.
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await
            .context("Failed to read wallet balance")?
            .ok_or(StoreError::NotFound {
                entity: "wallet",
                id,
            })?;

        let balance = parse_decimal("balance", column(&row, "balance")?)?
            .checked_add(delta)
            .ok_or(StoreError::BalanceOverflow { id })?;

        sqlx::query("UPDATE wallets SET balance = ? WHERE id = ?")
            .bind(format_amount(balance))
            .bind(id)
            .execute(&mut *self.conn)
            .await
            .context("Failed to update wallet balance")?;

        Ok(balance)
    }

    fn row_to_wallet(row: &SqliteRow) -> Result<Wallet, StoreError> {
        Ok(Wallet {
            id: column(row, "id")?,
            user_id: column(row, "user_id")?,
            balance: parse_decimal("balance", column(row, "balance")?)?,
            currency: column(row, "currency")?,
        })
    }
}

// ========================
// Operations
// ========================

const SELECT_OPERATIONS: &str = r#"
    SELECT id, operation, wallet_from, wallet_to, amount, created_at
    FROM operations
    WHERE (? IS NULL OR substr(created_at, 1, 10) = ?)
    ORDER BY id
    LIMIT ? OFFSET ?
"#;

pub struct OperationStore<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> OperationStore<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Append an entry to the log. There is no update or delete counterpart.
    pub async fn append(&mut self, op: &NewOperation) -> Result<Operation, StoreError> {
        let created_at = op.created_at.trunc_subsecs(6);
        let row = sqlx::query(
            r#"
            INSERT INTO operations (operation, wallet_from, wallet_to, amount, created_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(op.kind.as_str())
        .bind(op.wallet_from)
        .bind(op.wallet_to)
        .bind(format_amount(op.amount))
        .bind(format_timestamp(created_at))
        .fetch_one(&mut *self.conn)
        .await
        .context("Failed to append operation")?;

        Ok(Operation {
            id: column(&row, "id")?,
            kind: op.kind,
            wallet_from: op.wallet_from,
            wallet_to: op.wallet_to,
            amount: op.amount,
            created_at,
        })
    }

    /// Load every matching operation, in id order.
    pub async fn list(&mut self, filter: &OperationFilter) -> Result<Vec<Operation>, StoreError> {
        let date = filter.date.map(|d| d.format("%Y-%m-%d").to_string());
        let rows = sqlx::query(SELECT_OPERATIONS)
            .bind(date.clone())
            .bind(date)
            .bind(filter.limit.unwrap_or(-1))
            .bind(filter.offset)
            .fetch_all(&mut *self.conn)
            .await
            .context("Failed to list operations")?;

        rows.iter().map(Self::row_to_operation).collect()
    }

    /// Stream matching operations in id order without buffering the result set.
    /// The stream stops being useful after its first error.
    pub fn stream(self, filter: &OperationFilter) -> BoxStream<'c, Result<Operation, StoreError>> {
        let date = filter.date.map(|d| d.format("%Y-%m-%d").to_string());
        sqlx::query(SELECT_OPERATIONS)
            .bind(date.clone())
            .bind(date)
            .bind(filter.limit.unwrap_or(-1))
            .bind(filter.offset)
            .fetch(self.conn)
            .map(|row| {
                row.context("Failed to query operations")
                    .and_then(|row| Self::row_to_operation(&row))
            })
            .boxed()
    }

    pub async fn count(&mut self) -> Result<i64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM operations")
            .fetch_one(&mut *self.conn)
            .await
            .context("Failed to count operations")?;
        column(&row, "count")
    }

    fn row_to_operation(row: &SqliteRow) -> Result<Operation, StoreError> {
        let kind_str: String = column(row, "operation")?;

        Ok(Operation {
            id: column(row, "id")?,
            kind: OperationKind::from_str(&kind_str).ok_or(StoreError::Decode {
                column: "operation",
                value: kind_str,
            })?,
            wallet_from: column(row, "wallet_from")?,
            wallet_to: column(row, "wallet_to")?,
            amount: parse_decimal("amount", column(row, "amount")?)?,
            created_at: parse_timestamp("created_at", column(row, "created_at")?)?,
        })
    }
}
